//! Observer registry for configuration changes.
//!
//! Notification is synchronous. Callbacks are cloned out of the lock before
//! being invoked, so a callback may subscribe or unsubscribe without deadlock.

use super::status::ConfigurationStatus;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Callback invoked with the new status after every successful change.
pub type ConfigChangeCallback = Arc<dyn Fn(&ConfigurationStatus) + Send + Sync + 'static>;

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<BTreeMap<u64, ConfigChangeCallback>>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe(self: &Arc<Self>, callback: ConfigChangeCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut observers) = self.observers.lock() {
            observers.insert(id, callback);
        }
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        self.observers
            .lock()
            .map(|mut observers| observers.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub(crate) fn notify(&self, status: &ConfigurationStatus) {
        let callbacks: Vec<ConfigChangeCallback> = match self.observers.lock() {
            Ok(observers) => observers.values().cloned().collect(),
            Err(_) => return,
        };
        debug!("Notifying {} configuration observer(s)", callbacks.len());
        for callback in callbacks {
            callback(status);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }
}

/// Unsubscribe token. Dropping it removes the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<ObserverRegistry>,
}

impl Subscription {
    /// Remove the callback now.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
