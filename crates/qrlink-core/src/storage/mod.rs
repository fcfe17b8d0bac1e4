//! Artifact storage: atomic writes, naming and directory retention.

pub mod atomic;
pub mod directory;
pub mod filename;

pub use atomic::{atomic_read_json, atomic_write_bytes, atomic_write_json};
pub use directory::{
    probe_writable, CleanupResult, DirectoryConfig, DirectoryInfo, DirectoryManager,
    DirectoryStats, RetentionPolicy, StoredArtifact,
};
pub use filename::{hash_payload, FilenameGenerator, FilenameResult};
