//! Content-addressed reuse of existing artifacts.
//!
//! [`select_reusable`] is the pure policy; [`find_reusable`] gathers its
//! input from disk.

use crate::error::Result;
use crate::qr::read_png_dimensions;
use crate::storage::{DirectoryManager, StoredArtifact};

/// An on-disk artifact and the result of its signature check.
#[derive(Debug, Clone)]
pub struct ReuseCandidate {
    pub artifact: StoredArtifact,
    /// Image dimensions, present only when the PNG signature is valid.
    pub dimensions: Option<(u32, u32)>,
}

/// Newest candidate with a matching hash, a non-empty body and a valid signature.
pub fn select_reusable<'a>(hash: &str, candidates: &'a [ReuseCandidate]) -> Option<&'a ReuseCandidate> {
    candidates
        .iter()
        .filter(|c| c.artifact.hash == hash && c.artifact.size > 0 && c.dimensions.is_some())
        .max_by_key(|c| c.artifact.created)
}

/// Scan `directory` for an artifact that can be returned instead of regenerating.
pub async fn find_reusable(directory: &DirectoryManager, hash: &str) -> Result<Option<ReuseCandidate>> {
    let mut candidates = Vec::new();
    for artifact in directory.scan_artifacts().await? {
        if artifact.hash != hash {
            continue;
        }
        let dimensions = read_png_dimensions(&artifact.path).await?;
        candidates.push(ReuseCandidate { artifact, dimensions });
    }
    Ok(select_reusable(hash, &candidates).cloned())
}
