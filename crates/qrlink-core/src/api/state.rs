//! Shared state owned by a [`crate::QrLinkApi`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::artifact::LocalArtifactManager;
use crate::configuration::ConfigurationProvider;
use crate::roots::RootsManager;

/// Every component the API composes.
///
/// The provider is shared: the roots manager writes through it and the
/// artifact manager follows it through a change subscription.
pub(crate) struct ApiState {
    pub(crate) provider: Arc<ConfigurationProvider>,
    pub(crate) roots: RootsManager,
    pub(crate) artifacts: LocalArtifactManager,
    /// Where the configuration status is persisted, if anywhere.
    pub(crate) config_path: Option<PathBuf>,
}
