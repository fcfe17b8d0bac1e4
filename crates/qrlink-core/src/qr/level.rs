//! Error-correction levels, viewing contexts and the byte-capacity table.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Error-correction level, ordered by increasing robustness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorCorrectionLevel {
    L,
    M,
    Q,
    H,
}

/// Byte-mode capacity per version (row 0 is version 1), columns L, M, Q, H.
const VERSION_CAPACITY: [[usize; 4]; 40] = [
    [17, 14, 11, 7],
    [32, 26, 20, 14],
    [53, 42, 32, 24],
    [78, 62, 46, 34],
    [106, 84, 60, 44],
    [134, 106, 74, 58],
    [154, 122, 86, 64],
    [192, 152, 108, 84],
    [230, 180, 130, 98],
    [271, 213, 151, 119],
    [321, 251, 177, 137],
    [367, 287, 203, 155],
    [425, 331, 241, 177],
    [458, 362, 258, 194],
    [520, 412, 292, 220],
    [586, 450, 322, 250],
    [644, 504, 364, 280],
    [718, 560, 394, 310],
    [792, 624, 442, 338],
    [858, 666, 482, 382],
    [929, 711, 509, 403],
    [1003, 779, 565, 439],
    [1091, 857, 611, 461],
    [1171, 911, 661, 511],
    [1273, 997, 715, 535],
    [1367, 1059, 751, 593],
    [1465, 1125, 805, 625],
    [1528, 1190, 868, 658],
    [1628, 1264, 908, 698],
    [1732, 1370, 982, 742],
    [1840, 1452, 1030, 790],
    [1952, 1538, 1112, 842],
    [2068, 1628, 1168, 898],
    [2188, 1722, 1228, 958],
    [2303, 1809, 1283, 983],
    [2431, 1911, 1351, 1051],
    [2563, 1989, 1423, 1093],
    [2699, 2099, 1499, 1139],
    [2809, 2213, 1579, 1219],
    [2953, 2331, 1663, 1273],
];

pub const MAX_VERSION: u8 = 40;

impl ErrorCorrectionLevel {
    pub const ALL: [ErrorCorrectionLevel; 4] = [
        ErrorCorrectionLevel::L,
        ErrorCorrectionLevel::M,
        ErrorCorrectionLevel::Q,
        ErrorCorrectionLevel::H,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCorrectionLevel::L => "L",
            ErrorCorrectionLevel::M => "M",
            ErrorCorrectionLevel::Q => "Q",
            ErrorCorrectionLevel::H => "H",
        }
    }

    /// Approximate share of codewords that can be restored.
    pub fn recovery_percent(&self) -> u8 {
        match self {
            ErrorCorrectionLevel::L => 7,
            ErrorCorrectionLevel::M => 15,
            ErrorCorrectionLevel::Q => 25,
            ErrorCorrectionLevel::H => 30,
        }
    }

    /// One step less robust, or `None` at L.
    pub fn lower(self) -> Option<Self> {
        match self {
            ErrorCorrectionLevel::L => None,
            ErrorCorrectionLevel::M => Some(ErrorCorrectionLevel::L),
            ErrorCorrectionLevel::Q => Some(ErrorCorrectionLevel::M),
            ErrorCorrectionLevel::H => Some(ErrorCorrectionLevel::Q),
        }
    }

    /// One step more robust, or `None` at H.
    pub fn higher(self) -> Option<Self> {
        match self {
            ErrorCorrectionLevel::L => Some(ErrorCorrectionLevel::M),
            ErrorCorrectionLevel::M => Some(ErrorCorrectionLevel::Q),
            ErrorCorrectionLevel::Q => Some(ErrorCorrectionLevel::H),
            ErrorCorrectionLevel::H => None,
        }
    }

    /// Largest byte-mode payload any version can carry at this level.
    pub fn max_capacity(&self) -> usize {
        VERSION_CAPACITY[MAX_VERSION as usize - 1][self.index()]
    }

    /// Byte-mode capacity of `version`, clamped to 1..=40.
    pub fn capacity_for_version(&self, version: u8) -> usize {
        let version = version.clamp(1, MAX_VERSION);
        VERSION_CAPACITY[(version - 1) as usize][self.index()]
    }

    /// Smallest version whose capacity holds `bytes`.
    pub fn min_version_for(&self, bytes: usize) -> Option<u8> {
        (1..=MAX_VERSION).find(|v| self.capacity_for_version(*v) >= bytes)
    }

    pub(crate) fn to_ec_level(self) -> qrcode::EcLevel {
        match self {
            ErrorCorrectionLevel::L => qrcode::EcLevel::L,
            ErrorCorrectionLevel::M => qrcode::EcLevel::M,
            ErrorCorrectionLevel::Q => qrcode::EcLevel::Q,
            ErrorCorrectionLevel::H => qrcode::EcLevel::H,
        }
    }
}

impl std::fmt::Display for ErrorCorrectionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCorrectionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" | "LOW" => Ok(ErrorCorrectionLevel::L),
            "M" | "MEDIUM" => Ok(ErrorCorrectionLevel::M),
            "Q" | "QUARTILE" => Ok(ErrorCorrectionLevel::Q),
            "H" | "HIGH" => Ok(ErrorCorrectionLevel::H),
            other => Err(format!("unknown error-correction level: {}", other)),
        }
    }
}

/// Where the code is going to be looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewingContext {
    #[default]
    MobileScan,
    DesktopDisplay,
    TerminalRender,
    WebEmbed,
    HighQuality,
}

impl ViewingContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewingContext::MobileScan => "mobile-scan",
            ViewingContext::DesktopDisplay => "desktop-display",
            ViewingContext::TerminalRender => "terminal-render",
            ViewingContext::WebEmbed => "web-embed",
            ViewingContext::HighQuality => "high-quality",
        }
    }

    /// Quiet-zone width in modules.
    pub fn recommended_margin(&self) -> u32 {
        match self {
            ViewingContext::HighQuality => 6,
            ViewingContext::MobileScan | ViewingContext::DesktopDisplay => 4,
            ViewingContext::WebEmbed => 2,
            ViewingContext::TerminalRender => 1,
        }
    }

    /// Weakest level that still scans reliably in this context.
    pub fn minimum_level(&self) -> ErrorCorrectionLevel {
        match self {
            ViewingContext::HighQuality => ErrorCorrectionLevel::Q,
            ViewingContext::MobileScan | ViewingContext::WebEmbed => ErrorCorrectionLevel::M,
            ViewingContext::DesktopDisplay | ViewingContext::TerminalRender => {
                ErrorCorrectionLevel::L
            }
        }
    }
}

impl std::fmt::Display for ViewingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewingContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "mobile-scan" | "mobile" => Ok(ViewingContext::MobileScan),
            "desktop-display" | "desktop" => Ok(ViewingContext::DesktopDisplay),
            "terminal-render" | "terminal" => Ok(ViewingContext::TerminalRender),
            "web-embed" | "web" => Ok(ViewingContext::WebEmbed),
            "high-quality" | "high" => Ok(ViewingContext::HighQuality),
            other => Err(format!("unknown viewing context: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered_by_robustness() {
        assert!(ErrorCorrectionLevel::L < ErrorCorrectionLevel::H);
        assert_eq!(ErrorCorrectionLevel::H.lower(), Some(ErrorCorrectionLevel::Q));
        assert_eq!(ErrorCorrectionLevel::L.lower(), None);
        assert!(ErrorCorrectionLevel::L.max_capacity() > ErrorCorrectionLevel::H.max_capacity());
    }

    #[test]
    fn test_capacity_is_monotonic_in_version() {
        for level in ErrorCorrectionLevel::ALL {
            let mut previous = 0;
            for version in 1..=MAX_VERSION {
                let capacity = level.capacity_for_version(version);
                assert!(capacity > previous, "{level} v{version}");
                previous = capacity;
            }
            assert_eq!(level.capacity_for_version(40), level.max_capacity());
        }
    }

    #[test]
    fn test_min_version_for() {
        assert_eq!(ErrorCorrectionLevel::L.min_version_for(17), Some(1));
        assert_eq!(ErrorCorrectionLevel::L.min_version_for(18), Some(2));
        assert_eq!(ErrorCorrectionLevel::L.min_version_for(858), Some(20));
        assert_eq!(ErrorCorrectionLevel::L.min_version_for(859), Some(21));
        assert_eq!(ErrorCorrectionLevel::H.min_version_for(1274), None);
    }

    #[test]
    fn test_min_version_matches_encoder_width() {
        for level in ErrorCorrectionLevel::ALL {
            for bytes in [10, 100, 300, 600, 900, 1200, 1800, 2300] {
                let Some(version) = level.min_version_for(bytes) else {
                    continue;
                };
                let payload = "a".repeat(bytes);
                let code = qrcode::QrCode::with_error_correction_level(payload, level.to_ec_level())
                    .unwrap();
                assert_eq!(
                    17 + 4 * version as usize,
                    code.width(),
                    "{level} with {bytes} bytes"
                );
            }
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("high".parse::<ErrorCorrectionLevel>(), Ok(ErrorCorrectionLevel::H));
        assert_eq!("terminal_render".parse::<ViewingContext>(), Ok(ViewingContext::TerminalRender));
        assert!("sideways".parse::<ViewingContext>().is_err());
        assert_eq!(
            serde_json::to_value(ViewingContext::HighQuality).unwrap(),
            serde_json::json!("high-quality")
        );
    }
}
