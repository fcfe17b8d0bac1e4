//! Cached, retried balance lookups against an external ledger source.

use crate::error::{QrLinkError, Result};
use crate::lookup::address::{validate_address_of, EntityType};
use crate::lookup::cache::LookupCache;
use crate::lookup::retry::{retry_async, RetryConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const DECIMALS: u32 = 18;
const SCALE: u128 = 10u128.pow(DECIMALS);

/// Non-negative fixed-point amount with 18 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_attos(attos: u128) -> Self {
        Amount(attos)
    }

    pub fn attos(&self) -> u128 {
        self.0
    }
}

impl FromStr for Amount {
    type Err = QrLinkError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| QrLinkError::InvalidAmount {
            message: format!("'{}': {}", s, message),
        };
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty"));
        }
        if trimmed.starts_with('-') {
            return Err(invalid("negative"));
        }

        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }
        if fraction.len() > DECIMALS as usize {
            return Err(invalid("more than 18 decimal places"));
        }

        let whole_value: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("too large"))?
        };
        let fraction_value: u128 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", fraction, width = DECIMALS as usize);
            padded.parse().map_err(|_| invalid("not a decimal number"))?
        };

        whole_value
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(fraction_value))
            .map(Amount)
            .ok_or_else(|| invalid("too large"))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let fraction = self.0 % SCALE;
        if fraction == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:0width$}", fraction, width = DECIMALS as usize);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A value read from the ledger together with the state version it reflects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedValue<T> {
    pub value: T,
    pub state_version: u64,
}

/// Remote ledger queries.
///
/// Implementations classify failures with the transient kinds
/// (network, timeout, rate limit, gateway) or the validation kinds
/// (invalid address, entity not found); only the former are retried.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn fetch_balance(&self, account: &str, resource: &str) -> Result<VersionedValue<Amount>>;

    async fn current_state_version(&self) -> Result<u64>;
}

/// Balance result returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceInfo {
    pub account: String,
    pub resource: String,
    pub amount: Amount,
    pub state_version: u64,
    pub cached: bool,
}

pub type BalanceKey = (String, String);

/// Validates addresses, serves from cache, and falls back to retried remote reads.
pub struct BalanceLookup {
    source: Arc<dyn LedgerSource>,
    cache: Arc<LookupCache<BalanceKey, VersionedValue<Amount>>>,
    retry: RetryConfig,
}

impl BalanceLookup {
    pub fn new(source: Arc<dyn LedgerSource>) -> Self {
        Self {
            source,
            cache: Arc::new(LookupCache::default()),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<LookupCache<BalanceKey, VersionedValue<Amount>>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<LookupCache<BalanceKey, VersionedValue<Amount>>> {
        &self.cache
    }

    /// Balance of `resource` held by `account`.
    pub async fn get_balance(&self, account: &str, resource: &str) -> Result<BalanceInfo> {
        let account = validate_address_of(account, EntityType::Account)?.address;
        let resource = validate_address_of(resource, EntityType::Resource)?.address;
        let key = (account.clone(), resource.clone());

        if let Some(hit) = self.cache.get(&key) {
            debug!("Balance cache hit for {}", account);
            return Ok(BalanceInfo {
                account,
                resource,
                amount: hit.value,
                state_version: hit.state_version,
                cached: true,
            });
        }

        let source = self.source.clone();
        let (result, stats) = retry_async(&self.retry, || {
            let source = source.clone();
            let account = account.clone();
            let resource = resource.clone();
            async move { source.fetch_balance(&account, &resource).await }
        })
        .await;
        let fetched = result?;
        debug!(
            "Fetched balance for {} in {} attempt(s)",
            account, stats.attempts
        );

        self.cache.observe_state_version(fetched.state_version);
        self.cache.insert(key, fetched.clone(), fetched.state_version);

        Ok(BalanceInfo {
            account,
            resource,
            amount: fetched.value,
            state_version: fetched.state_version,
            cached: false,
        })
    }

    /// Ask the source for its state version and drop cache entries behind it.
    pub async fn sync_state_version(&self) -> Result<u64> {
        let source = self.source.clone();
        let (result, _) = retry_async(&self.retry, || {
            let source = source.clone();
            async move { source.current_state_version().await }
        })
        .await;
        let version = result?;
        self.cache.observe_state_version(version);
        Ok(version)
    }

    /// Fail with `INSUFFICIENT_BALANCE` unless `account` holds at least `required`.
    pub async fn ensure_sufficient(
        &self,
        account: &str,
        resource: &str,
        required: &str,
    ) -> Result<BalanceInfo> {
        let required: Amount = required.parse()?;
        let balance = self.get_balance(account, resource).await?;
        if balance.amount < required {
            return Err(QrLinkError::InsufficientBalance {
                required: required.to_string(),
                available: balance.amount.to_string(),
            });
        }
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lookup::address::tests::sample_address;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::time::Duration;

    struct FakeLedger {
        calls: AtomicU32,
        failures_before_success: u32,
        version: AtomicU64,
        amount: &'static str,
    }

    impl FakeLedger {
        fn new(amount: &'static str, failures_before_success: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures_before_success,
                version: AtomicU64::new(10),
                amount,
            }
        }
    }

    #[async_trait]
    impl LedgerSource for FakeLedger {
        async fn fetch_balance(&self, _: &str, _: &str) -> Result<VersionedValue<Amount>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(QrLinkError::Timeout(Duration::from_secs(5)));
            }
            Ok(VersionedValue {
                value: self.amount.parse()?,
                state_version: self.version.load(Ordering::SeqCst),
            })
        }

        async fn current_state_version(&self) -> Result<u64> {
            Ok(self.version.load(Ordering::SeqCst))
        }
    }

    fn addresses() -> (String, String) {
        (
            sample_address(EntityType::Account, 1),
            sample_address(EntityType::Resource, 2),
        )
    }

    #[test]
    fn test_amount_parse_and_display() {
        assert_eq!("1.5".parse::<Amount>().unwrap().to_string(), "1.5");
        assert_eq!("0010".parse::<Amount>().unwrap().to_string(), "10");
        assert_eq!(".25".parse::<Amount>().unwrap().to_string(), "0.25");
        assert!("1.5".parse::<Amount>().unwrap() > "1.49".parse::<Amount>().unwrap());
        for bad in ["", "-1", "abc", "1.2.3", ".", "0.0000000000000000001"] {
            let err = bad.parse::<Amount>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidAmount, "{bad}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_then_caches() {
        let ledger = Arc::new(FakeLedger::new("100", 2));
        let lookup = BalanceLookup::new(ledger.clone());
        let (account, resource) = addresses();

        let first = lookup.get_balance(&account, &resource).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.amount.to_string(), "100");
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 3);

        let second = lookup.get_balance(&account, &resource).await.unwrap();
        assert!(second.cached);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_address_never_reaches_source() {
        let ledger = Arc::new(FakeLedger::new("1", 0));
        let lookup = BalanceLookup::new(ledger.clone());
        let (_, resource) = addresses();

        let err = lookup.get_balance("account_rdx1bogus", &resource).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
        assert!(!err.is_retryable());
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_state_version_advance_invalidates() {
        let ledger = Arc::new(FakeLedger::new("5", 0));
        let lookup = BalanceLookup::new(ledger.clone());
        let (account, resource) = addresses();

        lookup.get_balance(&account, &resource).await.unwrap();
        ledger.version.store(11, Ordering::SeqCst);
        lookup.sync_state_version().await.unwrap();

        let refreshed = lookup.get_balance(&account, &resource).await.unwrap();
        assert!(!refreshed.cached);
        assert_eq!(refreshed.state_version, 11);
    }

    #[tokio::test]
    async fn test_ensure_sufficient() {
        let ledger = Arc::new(FakeLedger::new("2.5", 0));
        let lookup = BalanceLookup::new(ledger);
        let (account, resource) = addresses();

        assert!(lookup.ensure_sufficient(&account, &resource, "2.5").await.is_ok());
        let err = lookup
            .ensure_sufficient(&account, &resource, "3")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 3, available 2.5"
        );
    }
}
