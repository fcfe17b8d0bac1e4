//! Artifact generation, QR scoring and retention methods.

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactRequest, ArtifactResponse};
use crate::error::{QrLinkError, Result};
use crate::qr::{
    default_candidates, ErrorCorrectionLevel, OptimalQrConfig, QrComparison, QrHybridConfig,
    QrValidationResult, ViewingContext,
};
use crate::storage::{CleanupResult, DirectoryStats};
use crate::QrLinkApi;

/// Chosen parameters for a payload and how they score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrValidationReport {
    pub optimal: OptimalQrConfig,
    pub validation: QrValidationResult,
}

impl QrLinkApi {
    /// Generate (or reuse) the artifact for `request`.
    pub async fn generate_qr(&self, request: &ArtifactRequest) -> Result<ArtifactResponse> {
        self.state.artifacts.generate(request).await
    }

    /// Choose parameters for `payload` and score them without writing anything.
    pub fn validate_qr(
        &self,
        payload: &str,
        context: Option<ViewingContext>,
        quality: Option<ErrorCorrectionLevel>,
    ) -> Result<QrValidationReport> {
        if payload.trim().is_empty() {
            return Err(QrLinkError::InvalidParams {
                message: "payload must not be empty".to_string(),
            });
        }
        let context = context.unwrap_or_default();
        let optimal = self
            .state
            .artifacts
            .hybrid_config()
            .get_optimal_qr_config(payload, context, quality)?;
        let validation = self
            .state
            .artifacts
            .validation_engine()
            .validate_qr(payload, &optimal.config, Some(context));
        Ok(QrValidationReport {
            optimal,
            validation,
        })
    }

    /// Rank candidate configurations for `payload`.
    ///
    /// Without candidates, one per error-correction level is compared.
    pub fn compare_qr_configs(
        &self,
        payload: &str,
        candidates: Option<Vec<QrHybridConfig>>,
        context: Option<ViewingContext>,
    ) -> Result<QrComparison> {
        let candidates =
            candidates.unwrap_or_else(|| default_candidates(context.unwrap_or_default()));
        self.state
            .artifacts
            .validation_engine()
            .compare_qr_methods(payload, &candidates, context)
    }

    pub async fn get_directory_stats(&self) -> Result<DirectoryStats> {
        self.state.artifacts.get_directory_stats().await
    }

    /// Apply retention to the active directory now.
    pub async fn cleanup_qr_directory(&self) -> Result<CleanupResult> {
        self.state.artifacts.cleanup().await
    }
}
