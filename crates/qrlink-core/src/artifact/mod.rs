//! Artifact generation: encoding, atomic writes and content-addressed reuse.

pub mod dedup;
mod generator;
mod manager;

pub use dedup::{find_reusable, select_reusable, ReuseCandidate};
pub use generator::{GeneratedArtifact, LocalArtifactGenerator};
pub use manager::{
    ArtifactManagerOptions, ArtifactMetadata, ArtifactRequest, ArtifactResponse,
    GenerationTimings, LocalArtifactManager,
};
