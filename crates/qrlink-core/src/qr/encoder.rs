//! Encoder seam and the default PNG encoder.

use crate::config::ArtifactConfig;
use crate::error::{QrLinkError, Result};
use crate::qr::hybrid::QrHybridConfig;
use qrcode::{Color, QrCode};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// The 8-byte signature every PNG file starts with.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// An encoded image ready to be written.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Symbol side in modules, quiet zone excluded.
    pub modules: u32,
}

/// Turns a payload into PNG bytes.
///
/// Implementations are CPU-bound and called from a blocking task.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, payload: &str, config: &QrHybridConfig, target_size: u32) -> Result<EncodedImage>;
}

/// Renders with the `qrcode` crate into an 8-bit RGB PNG.
#[derive(Debug, Clone, Default)]
pub struct PngQrEncoder;

impl QrEncoder for PngQrEncoder {
    fn encode(&self, payload: &str, config: &QrHybridConfig, target_size: u32) -> Result<EncodedImage> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), config.level.to_ec_level())
            .map_err(|e| QrLinkError::generation(format!("Encoder rejected payload: {}", e)))?;
        let dark = parse_hex_color(&config.dark_color)?;
        let light = parse_hex_color(&config.light_color)?;

        let modules = code.width() as u32;
        let margin = config.margin;
        let total = modules + 2 * margin;
        let target = target_size.clamp(ArtifactConfig::MIN_TARGET_SIZE, ArtifactConfig::MAX_TARGET_SIZE);
        let scale = (target / total).max(1);
        let side = total * scale;

        let colors = code.to_colors();
        let mut raster = Vec::with_capacity((side * side * 3) as usize);
        for y in 0..side {
            let my = y / scale;
            for x in 0..side {
                let mx = x / scale;
                let inside = my >= margin && mx >= margin && my < margin + modules && mx < margin + modules;
                let is_dark = inside
                    && colors[((my - margin) * modules + (mx - margin)) as usize] == Color::Dark;
                raster.extend_from_slice(if is_dark { &dark } else { &light });
            }
        }

        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, side, side);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| QrLinkError::generation(format!("PNG header: {}", e)))?;
            writer
                .write_image_data(&raster)
                .map_err(|e| QrLinkError::generation(format!("PNG data: {}", e)))?;
            writer
                .finish()
                .map_err(|e| QrLinkError::generation(format!("PNG finish: {}", e)))?;
        }

        Ok(EncodedImage {
            bytes,
            width: side,
            height: side,
            modules,
        })
    }
}

/// Parse `#RRGGBB` (or `RRGGBB`) into RGB bytes.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let hex_digits = value.trim().trim_start_matches('#');
    let invalid = || QrLinkError::InvalidParams {
        message: format!("Invalid color '{}', expected #RRGGBB", value),
    };
    if hex_digits.len() != 6 {
        return Err(invalid());
    }
    let decoded = hex::decode(hex_digits).map_err(|_| invalid())?;
    Ok([decoded[0], decoded[1], decoded[2]])
}

pub fn has_png_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// Check that the file at `path` starts with the PNG signature.
///
/// Missing or short files report `false`; other read failures are errors.
pub async fn validate_png_file(path: &Path) -> Result<bool> {
    Ok(read_header::<8>(path).await?.is_some_and(|h| has_png_signature(&h)))
}

/// Width and height from the IHDR chunk, or `None` if the file is not a PNG.
pub async fn read_png_dimensions(path: &Path) -> Result<Option<(u32, u32)>> {
    let Some(header) = read_header::<24>(path).await? else {
        return Ok(None);
    };
    if !has_png_signature(&header) || &header[12..16] != b"IHDR" {
        return Ok(None);
    }
    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    Ok(Some((width, height)))
}

async fn read_header<const N: usize>(path: &Path) -> Result<Option<[u8; N]>> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(QrLinkError::io_with_path(e, path)),
    };
    let mut header = [0u8; N];
    match file.read_exact(&mut header).await {
        Ok(_) => Ok(Some(header)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(QrLinkError::io_with_path(e, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::level::{ErrorCorrectionLevel, ViewingContext};
    use tempfile::TempDir;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF8000").unwrap(), [255, 128, 0]);
        assert_eq!(parse_hex_color("000000").unwrap(), [0, 0, 0]);
        assert!(parse_hex_color("#FFF").is_err());
        assert!(parse_hex_color("#GGGGGG").is_err());
    }

    #[test]
    fn test_encode_produces_png_of_expected_size() {
        let config = QrHybridConfig::for_context(ViewingContext::MobileScan, ErrorCorrectionLevel::M);
        let image = PngQrEncoder.encode("https://example.com", &config, 256).unwrap();

        assert!(has_png_signature(&image.bytes));
        assert_eq!(image.width, image.height);
        assert_eq!(image.width % (image.modules + 2 * config.margin), 0);
        assert!(image.width <= 256);
    }

    #[tokio::test]
    async fn test_validate_png_file() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.png");
        let bad = temp.path().join("bad.png");
        let short = temp.path().join("short.png");
        std::fs::write(&good, [PNG_SIGNATURE.as_slice(), b"rest"].concat()).unwrap();
        std::fs::write(&bad, b"GIF89a-not-a-png").unwrap();
        std::fs::write(&short, b"\x89PN").unwrap();

        assert!(validate_png_file(&good).await.unwrap());
        assert!(!validate_png_file(&bad).await.unwrap());
        assert!(!validate_png_file(&short).await.unwrap());
        assert!(!validate_png_file(&temp.path().join("missing.png")).await.unwrap());
        assert_eq!(read_png_dimensions(&bad).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_png_dimensions_of_encoded_image() {
        let temp = TempDir::new().unwrap();
        let config = QrHybridConfig::for_context(ViewingContext::WebEmbed, ErrorCorrectionLevel::Q);
        let image = PngQrEncoder.encode("hello", &config, 128).unwrap();
        let path = temp.path().join("qr.png");
        std::fs::write(&path, &image.bytes).unwrap();

        assert_eq!(
            read_png_dimensions(&path).await.unwrap(),
            Some((image.width, image.height))
        );
    }
}
