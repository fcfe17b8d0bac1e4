//! Encode and write one artifact.

use crate::error::{QrLinkError, Result};
use crate::qr::{validate_png_file, QrEncoder, QrHybridConfig};
use crate::storage::atomic_write_bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A freshly written artifact.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub encode_ms: u64,
    pub write_ms: u64,
    pub verify_ms: u64,
}

/// Wraps the encoder with an atomic write and a signature check.
#[derive(Clone)]
pub struct LocalArtifactGenerator {
    encoder: Arc<dyn QrEncoder>,
}

impl LocalArtifactGenerator {
    pub fn new(encoder: Arc<dyn QrEncoder>) -> Self {
        Self { encoder }
    }

    /// Encode `payload` and write it to `path`.
    ///
    /// Encoding runs on a blocking thread. The bytes are written to a temp
    /// file and renamed into place, then the signature of the final file is
    /// verified; a file that fails verification is removed.
    pub async fn generate(
        &self,
        payload: &str,
        config: &QrHybridConfig,
        target_size: u32,
        path: &Path,
    ) -> Result<GeneratedArtifact> {
        let started = Instant::now();
        let encoder = self.encoder.clone();
        let owned_payload = payload.to_string();
        let owned_config = config.clone();
        let image = tokio::task::spawn_blocking(move || {
            encoder.encode(&owned_payload, &owned_config, target_size)
        })
        .await
        .map_err(|e| QrLinkError::generation(format!("Encoder task failed: {}", e)))??;
        let encode_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        atomic_write_bytes(path, &image.bytes).await?;
        let write_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        if !validate_png_file(path).await? {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Failed to remove invalid artifact {}: {}", path.display(), e);
            }
            return Err(QrLinkError::generation(format!(
                "Written artifact {} failed the PNG signature check",
                path.display()
            )));
        }
        let verify_ms = started.elapsed().as_millis() as u64;

        debug!(
            "Generated {} ({} bytes, {}x{})",
            path.display(),
            image.bytes.len(),
            image.width,
            image.height
        );

        Ok(GeneratedArtifact {
            path: path.to_path_buf(),
            size_bytes: image.bytes.len() as u64,
            width: image.width,
            height: image.height,
            encode_ms,
            write_ms,
            verify_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::{EncodedImage, ErrorCorrectionLevel, PngQrEncoder, ViewingContext};
    use tempfile::TempDir;

    struct GarbageEncoder;

    impl QrEncoder for GarbageEncoder {
        fn encode(&self, _: &str, _: &QrHybridConfig, _: u32) -> Result<EncodedImage> {
            Ok(EncodedImage {
                bytes: b"definitely not a png".to_vec(),
                width: 1,
                height: 1,
                modules: 1,
            })
        }
    }

    fn config() -> QrHybridConfig {
        QrHybridConfig::for_context(ViewingContext::MobileScan, ErrorCorrectionLevel::M)
    }

    #[tokio::test]
    async fn test_generate_writes_valid_png() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qr-0123456789abcdef-1.png");
        let generator = LocalArtifactGenerator::new(Arc::new(PngQrEncoder));

        let artifact = generator
            .generate("https://example.com", &config(), 256, &path)
            .await
            .unwrap();

        assert!(validate_png_file(&path).await.unwrap());
        assert_eq!(artifact.size_bytes, std::fs::metadata(&path).unwrap().len());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_output_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qr-0123456789abcdef-1.png");
        let generator = LocalArtifactGenerator::new(Arc::new(GarbageEncoder));

        let err = generator.generate("x", &config(), 256, &path).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::GenerationError);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing-dir").join("qr.png");
        let generator = LocalArtifactGenerator::new(Arc::new(PngQrEncoder));

        let err = generator.generate("x", &config(), 256, &path).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FileError);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
