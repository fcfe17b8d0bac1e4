//! Scan-reliability scoring for a (payload, configuration) pair.
//!
//! Three independent metric groups are scored 0-100 and combined with fixed
//! weights: content 30%, generation 40%, context 30%. A result is valid when
//! it carries no hard errors and scores at least 60.

use crate::config::{ArtifactConfig, ValidationConfig};
use crate::error::{QrLinkError, Result};
use crate::qr::encoder::parse_hex_color;
use crate::qr::hybrid::QrHybridConfig;
use crate::qr::level::{ErrorCorrectionLevel, ViewingContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetrics {
    pub length_score: f64,
    pub character_score: f64,
    pub format_score: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetrics {
    pub capacity_score: f64,
    pub error_correction_score: f64,
    pub margin_score: f64,
    /// Payload bytes as a percentage of the level's capacity.
    pub capacity_utilization: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetrics {
    pub margin_fit_score: f64,
    pub level_fit_score: f64,
    pub contrast_score: f64,
    pub contrast_ratio: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrValidationResult {
    pub is_valid: bool,
    pub score: f64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub recommendations: Vec<String>,
    pub content: ContentMetrics,
    pub generation: GenerationMetrics,
    pub context: ContextMetrics,
}

/// One candidate and its validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredConfig {
    pub config: QrHybridConfig,
    pub validation: QrValidationResult,
}

/// Ranked comparison of candidate configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrComparison {
    pub best: ScoredConfig,
    /// Up to three other valid candidates, best first.
    pub alternatives: Vec<ScoredConfig>,
    pub evaluated: usize,
}

/// Collects findings while metric groups are computed.
#[derive(Default)]
struct Findings {
    warnings: Vec<String>,
    errors: Vec<String>,
    recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QrValidationEngine;

impl QrValidationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score `payload` encoded with `config`, viewed in `context`.
    ///
    /// `context` defaults to the one recorded in the configuration.
    pub fn validate_qr(
        &self,
        payload: &str,
        config: &QrHybridConfig,
        context: Option<ViewingContext>,
    ) -> QrValidationResult {
        let context = context.unwrap_or(config.context);
        let mut findings = Findings::default();

        let content = content_metrics(payload, &mut findings);
        let generation = generation_metrics(payload, config, &mut findings);
        let context_metrics = context_metrics(config, context, &mut findings);

        let score = round1(
            content.score * ValidationConfig::CONTENT_WEIGHT
                + generation.score * ValidationConfig::GENERATION_WEIGHT
                + context_metrics.score * ValidationConfig::CONTEXT_WEIGHT,
        );
        let is_valid = findings.errors.is_empty() && score >= ValidationConfig::MIN_VALID_SCORE;

        debug!(
            "Validated QR config level {} margin {} for {}: score {}, valid {}",
            config.level, config.margin, context, score, is_valid
        );

        QrValidationResult {
            is_valid,
            score,
            warnings: findings.warnings,
            errors: findings.errors,
            recommendations: findings.recommendations,
            content,
            generation,
            context: context_metrics,
        }
    }

    /// Validate every candidate and rank them.
    ///
    /// Valid candidates rank above invalid ones, then by score. The best
    /// candidate is always returned; alternatives are limited to valid ones.
    pub fn compare_qr_methods(
        &self,
        payload: &str,
        candidates: &[QrHybridConfig],
        context: Option<ViewingContext>,
    ) -> Result<QrComparison> {
        if candidates.is_empty() {
            return Err(QrLinkError::InvalidParams {
                message: "at least one candidate configuration is required".to_string(),
            });
        }

        let mut scored: Vec<ScoredConfig> = candidates
            .iter()
            .map(|config| ScoredConfig {
                validation: self.validate_qr(payload, config, context),
                config: config.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.validation
                .is_valid
                .cmp(&a.validation.is_valid)
                .then(b.validation.score.total_cmp(&a.validation.score))
        });

        let evaluated = scored.len();
        let mut ranked = scored.into_iter();
        let best = ranked
            .next()
            .ok_or_else(|| QrLinkError::Other("comparison produced no result".to_string()))?;
        let alternatives = ranked
            .filter(|s| s.validation.is_valid)
            .take(ValidationConfig::MAX_ALTERNATIVES)
            .collect();

        Ok(QrComparison {
            best,
            alternatives,
            evaluated,
        })
    }
}

/// One candidate per error-correction level with the context's defaults.
pub fn default_candidates(context: ViewingContext) -> Vec<QrHybridConfig> {
    ErrorCorrectionLevel::ALL
        .iter()
        .map(|level| QrHybridConfig::for_context(context, *level))
        .collect()
}

fn content_metrics(payload: &str, findings: &mut Findings) -> ContentMetrics {
    let trimmed = payload.trim();
    let chars = trimmed.chars().count();

    let length_score = if chars == 0 {
        findings.errors.push("Payload is empty".to_string());
        0.0
    } else if chars > ArtifactConfig::MAX_PAYLOAD_LENGTH {
        findings.errors.push(format!(
            "Payload length {} exceeds maximum of {}",
            chars,
            ArtifactConfig::MAX_PAYLOAD_LENGTH
        ));
        0.0
    } else {
        match chars {
            0..=300 => 100.0,
            301..=800 => 90.0,
            801..=1500 => 75.0,
            _ => 60.0,
        }
    };

    let control = trimmed.chars().filter(|c| c.is_control()).count();
    let non_ascii = trimmed.chars().filter(|c| !c.is_ascii()).count();
    if control > 0 {
        findings
            .warnings
            .push(format!("Payload contains {} control character(s)", control));
    }
    if non_ascii > 0 {
        findings
            .recommendations
            .push("Percent-encode non-ASCII characters to keep the payload compact".to_string());
    }
    let character_score = if chars == 0 {
        0.0
    } else {
        let odd = (control * 2 + non_ascii) as f64 / chars as f64;
        (100.0 - odd * 50.0).max(0.0)
    };

    let format_score = if chars == 0 {
        0.0
    } else if url::Url::parse(trimmed).is_ok() {
        100.0
    } else {
        findings
            .recommendations
            .push("Payload is not a URI; wallets expect a deep link".to_string());
        80.0
    };

    ContentMetrics {
        length_score,
        character_score: round1(character_score),
        format_score,
        score: round1((length_score + character_score + format_score) / 3.0),
    }
}

fn generation_metrics(
    payload: &str,
    config: &QrHybridConfig,
    findings: &mut Findings,
) -> GenerationMetrics {
    let bytes = payload.trim().len();
    let capacity = config.level.max_capacity();
    let utilization = bytes as f64 / capacity as f64 * 100.0;

    let capacity_score = if bytes > capacity {
        findings.errors.push(format!(
            "Payload of {} bytes exceeds level {} capacity of {} bytes",
            bytes, config.level, capacity
        ));
        if let Some(lower) = config.level.lower() {
            findings
                .recommendations
                .push(format!("Use error-correction level {} for more capacity", lower));
        }
        0.0
    } else if utilization > ValidationConfig::HIGH_UTILIZATION {
        findings.warnings.push(format!(
            "High capacity utilization: {:.1}% of level {} capacity",
            utilization, config.level
        ));
        40.0
    } else if utilization > 70.0 {
        75.0
    } else if utilization > 50.0 {
        90.0
    } else {
        100.0
    };

    let error_correction_score = match config.level {
        ErrorCorrectionLevel::H => 100.0,
        ErrorCorrectionLevel::Q => 90.0,
        ErrorCorrectionLevel::M => 80.0,
        ErrorCorrectionLevel::L => 65.0,
    };

    let margin_score = match config.margin {
        0 => {
            findings
                .warnings
                .push("No quiet zone; most scanners need at least one module".to_string());
            40.0
        }
        1 => 70.0,
        2 | 3 => 85.0,
        _ => 100.0,
    };

    GenerationMetrics {
        capacity_score,
        error_correction_score,
        margin_score,
        capacity_utilization: round1(utilization),
        score: round1(capacity_score * 0.5 + error_correction_score * 0.3 + margin_score * 0.2),
    }
}

fn context_metrics(
    config: &QrHybridConfig,
    context: ViewingContext,
    findings: &mut Findings,
) -> ContextMetrics {
    let recommended_margin = context.recommended_margin();
    let margin_fit_score = if config.margin >= recommended_margin {
        100.0
    } else {
        findings.recommendations.push(format!(
            "Use a margin of {} modules for {}",
            recommended_margin, context
        ));
        (100.0 - 15.0 * f64::from(recommended_margin - config.margin)).max(40.0)
    };

    let minimum = context.minimum_level();
    let level_fit_score = if config.level >= minimum {
        100.0
    } else {
        let steps = minimum as i32 - config.level as i32;
        findings.recommendations.push(format!(
            "Use at least error-correction level {} for {}",
            minimum, context
        ));
        (100.0 - 20.0 * f64::from(steps)).max(40.0)
    };

    let (contrast_ratio, contrast_score) =
        match (parse_hex_color(&config.dark_color), parse_hex_color(&config.light_color)) {
            (Ok(dark), Ok(light)) => {
                let dark_lum = relative_luminance(dark);
                let light_lum = relative_luminance(light);
                let ratio = (dark_lum.max(light_lum) + 0.05) / (dark_lum.min(light_lum) + 0.05);
                let mut score = if ratio >= 7.0 {
                    100.0
                } else if ratio >= 4.5 {
                    85.0
                } else if ratio >= 3.0 {
                    findings
                        .warnings
                        .push(format!("Low color contrast ratio {:.1}:1", ratio));
                    60.0
                } else {
                    findings
                        .errors
                        .push(format!("Insufficient color contrast ratio {:.1}:1", ratio));
                    20.0
                };
                if dark_lum > light_lum {
                    findings
                        .warnings
                        .push("Inverted colors; some scanners cannot read light-on-dark codes".to_string());
                    score /= 2.0;
                }
                (round1(ratio), score)
            }
            _ => {
                findings.errors.push(format!(
                    "Invalid color pair {} / {}",
                    config.dark_color, config.light_color
                ));
                (0.0, 0.0)
            }
        };

    ContextMetrics {
        margin_fit_score,
        level_fit_score,
        contrast_score,
        contrast_ratio,
        score: round1((margin_fit_score + level_fit_score + contrast_score) / 3.0),
    }
}

/// WCAG relative luminance of an sRGB color.
fn relative_luminance([r, g, b]: [u8; 3]) -> f64 {
    let channel = |c: u8| {
        let c = f64::from(c) / 255.0;
        if c <= 0.039_28 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * channel(r) + 0.7152 * channel(g) + 0.0722 * channel(b)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::hybrid::QrHybridConfigManager;

    fn engine() -> QrValidationEngine {
        QrValidationEngine::new()
    }

    #[test]
    fn test_short_deep_link_scores_high() {
        let payload = format!("radixwallet://tx?{}", "a".repeat(33));
        let optimal = QrHybridConfigManager::new()
            .get_optimal_qr_config(&payload, ViewingContext::HighQuality, None)
            .unwrap();

        let result = engine().validate_qr(&payload, &optimal.config, None);
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert!(result.score >= 90.0, "score {}", result.score);
    }

    #[test]
    fn test_high_utilization_warns() {
        let payload = "x".repeat(2600);
        let config = QrHybridConfig::for_context(ViewingContext::DesktopDisplay, ErrorCorrectionLevel::L);

        let result = engine().validate_qr(&payload, &config, None);
        assert!(result.generation.capacity_utilization > 85.0);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.to_lowercase().contains("high capacity utilization")));
    }

    #[test]
    fn test_over_capacity_is_an_error() {
        let payload = "x".repeat(1300);
        let config = QrHybridConfig::for_context(ViewingContext::MobileScan, ErrorCorrectionLevel::H);

        let result = engine().validate_qr(&payload, &config, None);
        assert!(!result.is_valid);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_empty_payload_is_invalid() {
        let config = QrHybridConfig::for_context(ViewingContext::MobileScan, ErrorCorrectionLevel::M);
        let result = engine().validate_qr("   ", &config, None);
        assert!(!result.is_valid);
        assert_eq!(result.content.length_score, 0.0);
    }

    #[test]
    fn test_low_contrast_is_rejected() {
        let config = QrHybridConfig::for_context(ViewingContext::MobileScan, ErrorCorrectionLevel::M)
            .with_colors("#777777", "#888888");
        let result = engine().validate_qr("https://example.com", &config, None);
        assert!(!result.is_valid);
        assert!(result.context.contrast_ratio < 3.0);
    }

    #[test]
    fn test_compare_ranks_valid_first() {
        let payload = "x".repeat(1400);
        let comparison = engine()
            .compare_qr_methods(&payload, &default_candidates(ViewingContext::DesktopDisplay), None)
            .unwrap();

        assert_eq!(comparison.evaluated, 4);
        assert!(comparison.best.validation.is_valid);
        assert_ne!(comparison.best.config.level, ErrorCorrectionLevel::H);
        assert!(comparison.alternatives.len() <= 3);
        assert!(comparison.alternatives.iter().all(|a| a.validation.is_valid));
        assert!(comparison
            .alternatives
            .iter()
            .all(|a| a.validation.score <= comparison.best.validation.score));
    }

    #[test]
    fn test_compare_requires_candidates() {
        assert!(engine().compare_qr_methods("x", &[], None).is_err());
    }
}
