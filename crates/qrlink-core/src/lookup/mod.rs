//! Ledger lookups: address validation, caching and retry.
//!
//! The ledger itself is an external collaborator reached through
//! [`LedgerSource`].

pub mod address;
mod balance;
mod cache;
pub mod retry;

pub use address::{validate_address, validate_address_of, EntityType, LedgerAddress};
pub use balance::{Amount, BalanceInfo, BalanceKey, BalanceLookup, LedgerSource, VersionedValue};
pub use cache::{CacheEntry, CacheStats, LookupCache};
pub use retry::{retry_async, RetryConfig, RetryStats};
