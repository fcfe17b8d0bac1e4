//! Output-directory configuration: sources, precedence and change notification.

mod observer;
mod provider;
mod status;

pub use observer::{ConfigChangeCallback, Subscription};
pub use provider::ConfigurationProvider;
pub use status::{ConfigSource, ConfigurationStatus, StartupSources};
