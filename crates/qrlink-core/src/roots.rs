//! Handling of external "directory changed" (roots) notifications.
//!
//! State machine: Idle -> Processing -> {Accepted, Rejected} -> Idle.
//! Entering Processing requires that no other notification is in flight
//! (concurrent calls are rejected as busy, never queued) and that at least
//! [`RootsConfig::MIN_INTERVAL`] has passed since the previous processed one.
//! Malformed notifications are rejected at the parse boundary, before any
//! filesystem access.

use crate::config::RootsConfig;
use crate::configuration::ConfigurationProvider;
use crate::storage::probe_writable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A validated roots notification: a non-empty ordered list of candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootsNotification {
    roots: Vec<String>,
    timestamp: Option<i64>,
}

impl RootsNotification {
    pub fn new(roots: Vec<String>, timestamp: Option<i64>) -> Result<Self, RootsErrorReason> {
        if roots.is_empty() {
            return Err(RootsErrorReason::Malformed {
                message: "roots must be a non-empty array".to_string(),
            });
        }
        if roots.len() > RootsConfig::MAX_CANDIDATES {
            return Err(RootsErrorReason::Malformed {
                message: format!(
                    "too many roots: {} (max {})",
                    roots.len(),
                    RootsConfig::MAX_CANDIDATES
                ),
            });
        }
        if roots.iter().any(|r| r.trim().is_empty()) {
            return Err(RootsErrorReason::Malformed {
                message: "roots must not contain empty strings".to_string(),
            });
        }
        Ok(Self { roots, timestamp })
    }

    /// Parse the wire shape `{ roots: string[], timestamp?: number }`.
    pub fn parse(value: &Value) -> Result<Self, RootsErrorReason> {
        let malformed = |message: &str| RootsErrorReason::Malformed {
            message: message.to_string(),
        };

        let object = value
            .as_object()
            .ok_or_else(|| malformed("notification must be an object"))?;
        let roots = object
            .get("roots")
            .and_then(|v| v.as_array())
            .ok_or_else(|| malformed("roots must be an array"))?
            .iter()
            .map(|v| v.as_str().map(String::from))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("roots must contain only strings"))?;
        let timestamp = match object.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_i64()
                    .or_else(|| v.as_f64().map(|f| f as i64))
                    .ok_or_else(|| malformed("timestamp must be a number"))?,
            ),
        };

        Self::new(roots, timestamp)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

/// Structured reason attached to a roots result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RootsErrorReason {
    Busy,
    RateLimited { retry_after_ms: u64 },
    Malformed { message: String },
    CandidateRejected { candidate: String, reasons: Vec<String> },
    NoValidCandidate,
}

impl std::fmt::Display for RootsErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootsErrorReason::Busy => write!(f, "another roots notification is being processed"),
            RootsErrorReason::RateLimited { retry_after_ms } => {
                write!(f, "rate limited, retry after {} ms", retry_after_ms)
            }
            RootsErrorReason::Malformed { message } => write!(f, "malformed notification: {}", message),
            RootsErrorReason::CandidateRejected { candidate, reasons } => {
                write!(f, "{} rejected: {}", candidate, reasons.join("; "))
            }
            RootsErrorReason::NoValidCandidate => write!(f, "no candidate directory was acceptable"),
        }
    }
}

/// Result returned to the caller of the roots manager. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsValidationResult {
    pub selected_directory: Option<PathBuf>,
    pub is_valid: bool,
    pub message: String,
    pub errors: Vec<RootsErrorReason>,
    pub processing_time_ms: u64,
}

impl RootsValidationResult {
    fn rejected(reason: RootsErrorReason, started: Instant) -> Self {
        Self {
            selected_directory: None,
            is_valid: false,
            message: reason.to_string(),
            errors: vec![reason],
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.errors.iter().any(|e| matches!(e, RootsErrorReason::Busy))
    }

    pub fn is_rate_limited(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, RootsErrorReason::RateLimited { .. }))
    }
}

/// Observable state of the manager.
///
/// [`RootsManager::state`] reports `Idle` or `Processing`; the terminal
/// `Accepted` and `Rejected` states of the last processed notification are
/// kept in [`RootsManager::last_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootsState {
    Idle,
    Processing,
    Accepted,
    Rejected,
}

/// Resets the processing flag when a notification leaves Processing.
pub(crate) struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives directory renegotiation from roots notifications.
pub struct RootsManager {
    provider: Arc<ConfigurationProvider>,
    processing: AtomicBool,
    last_processed: Mutex<Option<Instant>>,
    last_outcome: Mutex<Option<RootsState>>,
    min_interval: Duration,
    check_writable: bool,
}

impl RootsManager {
    pub fn new(provider: Arc<ConfigurationProvider>) -> Self {
        Self {
            provider,
            processing: AtomicBool::new(false),
            last_processed: Mutex::new(None),
            last_outcome: Mutex::new(None),
            min_interval: RootsConfig::MIN_INTERVAL,
            check_writable: true,
        }
    }

    /// Override the minimum spacing between processed notifications.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Enable or disable the create-and-probe writability check on candidates.
    pub fn with_writability_check(mut self, enable: bool) -> Self {
        self.check_writable = enable;
        self
    }

    pub fn state(&self) -> RootsState {
        if self.processing.load(Ordering::Acquire) {
            RootsState::Processing
        } else {
            RootsState::Idle
        }
    }

    /// `Accepted` or `Rejected` for the last notification that reached
    /// Processing, `None` before the first one.
    pub fn last_outcome(&self) -> Option<RootsState> {
        match self.last_outcome.lock() {
            Ok(outcome) => *outcome,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn record_outcome(&self, result: &RootsValidationResult) {
        let outcome = if result.is_valid {
            RootsState::Accepted
        } else {
            RootsState::Rejected
        };
        match self.last_outcome.lock() {
            Ok(mut last) => *last = Some(outcome),
            Err(poisoned) => *poisoned.into_inner() = Some(outcome),
        }
    }

    /// Parse a raw notification and process it.
    pub async fn handle_roots_changed(&self, raw: &Value) -> RootsValidationResult {
        let started = Instant::now();
        match RootsNotification::parse(raw) {
            Ok(notification) => self.process(notification).await,
            Err(reason) => {
                warn!("Rejected roots notification: {}", reason);
                RootsValidationResult::rejected(reason, started)
            }
        }
    }

    /// Process a validated notification.
    pub async fn process(&self, notification: RootsNotification) -> RootsValidationResult {
        let started = Instant::now();

        let Some(_guard) = self.try_begin() else {
            debug!("Roots notification rejected: busy");
            return RootsValidationResult::rejected(RootsErrorReason::Busy, started);
        };

        let result = self.process_candidates(notification, started).await;
        self.record_outcome(&result);
        result
    }

    async fn process_candidates(
        &self,
        notification: RootsNotification,
        started: Instant,
    ) -> RootsValidationResult {
        if let Some(retry_after) = self.check_rate_limit(started) {
            debug!("Roots notification rejected: rate limited");
            return RootsValidationResult::rejected(
                RootsErrorReason::RateLimited {
                    retry_after_ms: retry_after.as_millis() as u64,
                },
                started,
            );
        }

        self.provider.record_offered_roots(notification.roots());

        let mut errors = Vec::new();
        for candidate in notification.roots() {
            match self.try_candidate(candidate).await {
                Ok(dir) => {
                    info!("Accepted roots candidate {} -> {}", candidate, dir.display());
                    return RootsValidationResult {
                        message: format!("QR directory set to {}", dir.display()),
                        selected_directory: Some(dir),
                        is_valid: true,
                        errors,
                        processing_time_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Err(reasons) => {
                    warn!("Skipping roots candidate {}: {}", candidate, reasons.join("; "));
                    errors.push(RootsErrorReason::CandidateRejected {
                        candidate: candidate.clone(),
                        reasons,
                    });
                }
            }
        }

        errors.push(RootsErrorReason::NoValidCandidate);
        RootsValidationResult {
            selected_directory: None,
            is_valid: false,
            message: RootsErrorReason::NoValidCandidate.to_string(),
            errors,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub(crate) fn try_begin(&self) -> Option<ProcessingGuard<'_>> {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard {
                flag: &self.processing,
            })
    }

    /// Returns the remaining wait if rate limited, otherwise stamps `now`.
    fn check_rate_limit(&self, now: Instant) -> Option<Duration> {
        let mut last = match self.last_processed.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.min_interval {
                return Some(self.min_interval - elapsed);
            }
        }
        *last = Some(now);
        None
    }

    /// Security check, then optional create-and-probe, then provider update.
    async fn try_candidate(&self, candidate: &str) -> Result<PathBuf, Vec<String>> {
        let report = self.provider.validator().validate(candidate);
        let Some(dir) = report.sanitized_path.clone() else {
            return Err(report.violation_messages());
        };

        if self.check_writable {
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                return Err(vec![format!("cannot create directory: {}", e)]);
            }
            if !probe_writable(&dir).await {
                return Err(vec!["directory is not writable".to_string()]);
            }
        }

        self.provider
            .update_qr_directory(candidate)
            .await
            .map(|status| status.current_directory)
            .map_err(|e| vec![e.to_string()])
    }
}
