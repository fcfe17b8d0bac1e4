//! Encoder parameter selection from payload length and viewing context.

use crate::config::{ArtifactConfig, ValidationConfig};
use crate::error::{QrLinkError, Result};
use crate::qr::level::{ErrorCorrectionLevel, ViewingContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What to do when the primary configuration does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Retry one error-correction level lower.
    ReduceErrorCorrection,
    /// No fallback is available.
    None,
}

/// Parameters handed to the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrHybridConfig {
    pub level: ErrorCorrectionLevel,
    pub margin: u32,
    pub dark_color: String,
    pub light_color: String,
    pub context: ViewingContext,
    pub adaptive: bool,
    pub fallback_strategy: FallbackStrategy,
}

impl QrHybridConfig {
    /// Context defaults with an explicit level.
    pub fn for_context(context: ViewingContext, level: ErrorCorrectionLevel) -> Self {
        Self {
            level,
            margin: context.recommended_margin(),
            dark_color: ArtifactConfig::DARK_COLOR.to_string(),
            light_color: ArtifactConfig::LIGHT_COLOR.to_string(),
            context,
            adaptive: false,
            fallback_strategy: FallbackStrategy::None,
        }
    }

    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_colors(mut self, dark: impl Into<String>, light: impl Into<String>) -> Self {
        self.dark_color = dark.into();
        self.light_color = light.into();
        self
    }
}

/// Payload length bucket, by character count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LengthBucket {
    VeryShort,
    Short,
    Medium,
    Long,
    VeryLong,
}

impl LengthBucket {
    pub fn classify(chars: usize) -> Self {
        match chars {
            0..=100 => LengthBucket::VeryShort,
            101..=300 => LengthBucket::Short,
            301..=800 => LengthBucket::Medium,
            801..=1500 => LengthBucket::Long,
            _ => LengthBucket::VeryLong,
        }
    }

    fn base_level(self) -> ErrorCorrectionLevel {
        match self {
            LengthBucket::VeryShort => ErrorCorrectionLevel::H,
            LengthBucket::Short => ErrorCorrectionLevel::Q,
            LengthBucket::Medium => ErrorCorrectionLevel::M,
            LengthBucket::Long | LengthBucket::VeryLong => ErrorCorrectionLevel::L,
        }
    }

    fn forces_lowest_level(self) -> bool {
        matches!(self, LengthBucket::Long | LengthBucket::VeryLong)
    }
}

/// Selected configuration plus the numbers behind the choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimalQrConfig {
    pub config: QrHybridConfig,
    /// Byte capacity of the chosen level at the largest version.
    pub expected_capacity: usize,
    /// Symbol side in modules, quiet zone included.
    pub estimated_size: u32,
    pub bucket: LengthBucket,
    pub recommendation: String,
    pub fallback_config: Option<QrHybridConfig>,
}

/// Chooses encoder parameters.
#[derive(Debug, Clone, Default)]
pub struct QrHybridConfigManager;

impl QrHybridConfigManager {
    pub fn new() -> Self {
        Self
    }

    /// Pick the configuration for `payload` in `context`.
    ///
    /// Long payloads force level L regardless of context or preference. A
    /// preferred level is otherwise honored, lowered step by step if the
    /// payload would not fit. Fails only when the payload exceeds the
    /// capacity of level L.
    pub fn get_optimal_qr_config(
        &self,
        payload: &str,
        context: ViewingContext,
        preferred: Option<ErrorCorrectionLevel>,
    ) -> Result<OptimalQrConfig> {
        let chars = payload.chars().count();
        let bytes = payload.len();
        if bytes > ErrorCorrectionLevel::L.max_capacity() {
            return Err(QrLinkError::generation(format!(
                "Payload of {} bytes exceeds maximum QR capacity of {} bytes",
                bytes,
                ErrorCorrectionLevel::L.max_capacity()
            )));
        }

        let bucket = LengthBucket::classify(chars);
        let mut level = if bucket.forces_lowest_level() {
            ErrorCorrectionLevel::L
        } else {
            preferred.unwrap_or_else(|| adjust_for_context(bucket.base_level(), context))
        };

        while level.max_capacity() < bytes {
            match level.lower() {
                Some(lower) => level = lower,
                None => break,
            }
        }

        let margin = context.recommended_margin();
        let fallback_config = level
            .lower()
            .filter(|_| chars > ValidationConfig::TRIVIAL_PAYLOAD_LENGTH)
            .map(|lower| QrHybridConfig {
                adaptive: true,
                ..QrHybridConfig::for_context(context, lower)
            });

        let config = QrHybridConfig {
            adaptive: preferred.is_none(),
            fallback_strategy: if fallback_config.is_some() {
                FallbackStrategy::ReduceErrorCorrection
            } else {
                FallbackStrategy::None
            },
            ..QrHybridConfig::for_context(context, level)
        };

        let version = level.min_version_for(bytes).unwrap_or(crate::qr::level::MAX_VERSION);
        let estimated_size = 17 + 4 * u32::from(version) + 2 * margin;
        let recommendation = recommendation_for(bucket, level, context);

        debug!(
            "Selected QR config: {} chars, bucket {:?}, level {}, margin {}, context {}",
            chars, bucket, level, margin, context
        );

        Ok(OptimalQrConfig {
            config,
            expected_capacity: level.max_capacity(),
            estimated_size,
            bucket,
            recommendation,
            fallback_config,
        })
    }
}

/// High-quality output gets one step more robustness; terminal rendering one
/// step less, since its blocks are coarse and the margin is compact.
fn adjust_for_context(base: ErrorCorrectionLevel, context: ViewingContext) -> ErrorCorrectionLevel {
    match context {
        ViewingContext::HighQuality => base.higher().unwrap_or(base),
        ViewingContext::TerminalRender => base.lower().unwrap_or(base),
        _ => base,
    }
}

fn recommendation_for(
    bucket: LengthBucket,
    level: ErrorCorrectionLevel,
    context: ViewingContext,
) -> String {
    let reason = match bucket {
        LengthBucket::VeryShort | LengthBucket::Short => "short payload leaves room for robustness",
        LengthBucket::Medium => "medium payload balances capacity and robustness",
        LengthBucket::Long | LengthBucket::VeryLong => "long payload needs maximum capacity",
    };
    format!(
        "Level {} ({}% recovery) for {}: {}",
        level,
        level.recovery_percent(),
        context,
        reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> QrHybridConfigManager {
        QrHybridConfigManager::new()
    }

    #[test]
    fn test_short_deep_link_high_quality() {
        let payload = format!("radixwallet://tx?{}", "a".repeat(33));
        assert_eq!(payload.len(), 50);

        let optimal = manager()
            .get_optimal_qr_config(&payload, ViewingContext::HighQuality, None)
            .unwrap();
        assert_eq!(optimal.config.level, ErrorCorrectionLevel::H);
        assert_eq!(optimal.config.margin, 6);
        assert!(optimal.fallback_config.is_none());
        assert!(optimal.expected_capacity >= payload.len());
    }

    #[test]
    fn test_long_payload_forces_level_l() {
        let payload = "x".repeat(2000);
        for context in [
            ViewingContext::HighQuality,
            ViewingContext::MobileScan,
            ViewingContext::TerminalRender,
        ] {
            let optimal = manager()
                .get_optimal_qr_config(&payload, context, Some(ErrorCorrectionLevel::H))
                .unwrap();
            assert_eq!(optimal.config.level, ErrorCorrectionLevel::L);
            assert!(optimal.expected_capacity >= payload.len());
            assert!(optimal.fallback_config.is_none());
        }
    }

    #[test]
    fn test_buckets_and_fallback() {
        let optimal = manager()
            .get_optimal_qr_config(&"m".repeat(500), ViewingContext::MobileScan, None)
            .unwrap();
        assert_eq!(optimal.bucket, LengthBucket::Medium);
        assert_eq!(optimal.config.level, ErrorCorrectionLevel::M);
        assert_eq!(
            optimal.fallback_config.as_ref().map(|c| c.level),
            Some(ErrorCorrectionLevel::L)
        );
        assert_eq!(optimal.config.fallback_strategy, FallbackStrategy::ReduceErrorCorrection);
    }

    #[test]
    fn test_terminal_margin_is_compact() {
        let optimal = manager()
            .get_optimal_qr_config("https://example.com", ViewingContext::TerminalRender, None)
            .unwrap();
        assert_eq!(optimal.config.margin, 1);
        assert_eq!(optimal.config.level, ErrorCorrectionLevel::Q);
    }

    #[test]
    fn test_preferred_level_lowered_until_it_fits() {
        // 700 chars (medium bucket) but 1400 bytes, which is over H capacity.
        let payload = "é".repeat(700);
        assert_eq!(payload.len(), 1400);
        let optimal = manager()
            .get_optimal_qr_config(&payload, ViewingContext::MobileScan, Some(ErrorCorrectionLevel::H))
            .unwrap();
        assert_eq!(optimal.config.level, ErrorCorrectionLevel::Q);
        assert!(!optimal.config.adaptive);
    }

    #[test]
    fn test_oversize_payload_is_rejected() {
        let err = manager()
            .get_optimal_qr_config(&"z".repeat(3000), ViewingContext::MobileScan, None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::GenerationError);
    }
}
