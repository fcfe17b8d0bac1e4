//! API implementation submodules.
//!
//! Each submodule contains `impl QrLinkApi` blocks that extend the public API
//! with domain-specific methods. The struct definition remains in `lib.rs`.

mod artifacts;
mod builder;
mod directory;
mod state;

pub use artifacts::QrValidationReport;
pub use builder::QrLinkApiBuilder;
pub use directory::AllowedDirectories;
pub(crate) use state::ApiState;
