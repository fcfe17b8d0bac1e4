//! Content-addressed artifact naming.
//!
//! Files are named `<prefix>-<hash>-<timestamp>.<ext>`, where `hash` is a
//! truncated SHA-256 of the trimmed payload and `timestamp` is milliseconds
//! since the Unix epoch. The hash ignores the timestamp, so identical payloads
//! always share a hash and can be deduplicated by name.

use crate::config::ArtifactConfig;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// `<hash>-<unix millis>` tail of an artifact filename.
static HASH_AND_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<hash>[0-9a-f]{{{}}})-(?P<timestamp>[0-9]{{1,15}})$",
        ArtifactConfig::HASH_LENGTH
    ))
    .expect("artifact name regex must compile")
});

/// Truncated SHA-256 of the trimmed payload, lowercase hex.
pub fn hash_payload(payload: &str) -> String {
    let digest = Sha256::digest(payload.trim().as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(ArtifactConfig::HASH_LENGTH);
    hash
}

/// A composed artifact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilenameResult {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub full_path: PathBuf,
}

/// Components recovered from an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifactName {
    pub hash: String,
    pub timestamp_ms: i64,
}

/// Derives artifact filenames from payload content.
#[derive(Debug, Clone)]
pub struct FilenameGenerator {
    prefix: String,
    extension: String,
}

impl Default for FilenameGenerator {
    fn default() -> Self {
        Self::new(ArtifactConfig::FILENAME_PREFIX, ArtifactConfig::EXTENSION)
    }
}

impl FilenameGenerator {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Compose a filename for `payload` inside `dir`, stamped with the current time.
    pub fn generate_unique_filename(&self, payload: &str, dir: &Path) -> FilenameResult {
        self.generate_at(payload, dir, Utc::now())
    }

    /// Compose a filename with an explicit timestamp.
    pub fn generate_at(&self, payload: &str, dir: &Path, timestamp: DateTime<Utc>) -> FilenameResult {
        let hash = hash_payload(payload);
        let filename = format!(
            "{}-{}-{}.{}",
            self.prefix,
            hash,
            timestamp.timestamp_millis(),
            self.extension
        );
        FilenameResult {
            full_path: dir.join(&filename),
            hash,
            timestamp,
            filename,
        }
    }

    /// Whether two payloads would be stored under the same content hash.
    pub fn would_generate_same_hash(&self, a: &str, b: &str) -> bool {
        hash_payload(a) == hash_payload(b)
    }

    /// Parse a filename produced by this generator.
    ///
    /// Returns `None` for foreign files, temp files and other prefixes.
    pub fn parse_filename(&self, filename: &str) -> Option<ParsedArtifactName> {
        let stem = filename.strip_suffix(&format!(".{}", self.extension))?;
        let rest = stem.strip_prefix(&format!("{}-", self.prefix))?;
        let captures = HASH_AND_TIMESTAMP.captures(rest)?;
        let timestamp_ms = captures["timestamp"].parse::<i64>().ok()?;

        Some(ParsedArtifactName {
            hash: captures["hash"].to_string(),
            timestamp_ms,
        })
    }

    /// Creation time encoded in an artifact filename.
    pub fn timestamp_of(&self, filename: &str) -> Option<DateTime<Utc>> {
        let parsed = self.parse_filename(filename)?;
        Utc.timestamp_millis_opt(parsed.timestamp_ms).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_pure_and_trimmed() {
        let a = hash_payload("radixwallet://tx?id=1");
        let b = hash_payload("  radixwallet://tx?id=1\n");
        assert_eq!(a, b);
        assert_eq!(a.len(), ArtifactConfig::HASH_LENGTH);
        assert_ne!(a, hash_payload("radixwallet://tx?id=2"));
    }

    #[test]
    fn test_generated_names_parse_back_to_their_hash() {
        let generator = FilenameGenerator::default();
        let name = generator.generate_at("radixwallet://tx?id=9", Path::new("/qr"), Utc::now());
        let parsed = generator.parse_filename(&name.filename).unwrap();
        assert_eq!(parsed.hash, hash_payload("radixwallet://tx?id=9"));
    }

    #[test]
    fn test_hash_distinct_over_many_payloads() {
        let hashes: std::collections::HashSet<String> = (0..2000)
            .map(|i| hash_payload(&format!("radixwallet://tx?nonce={i}")))
            .collect();
        assert_eq!(hashes.len(), 2000);
    }

    #[test]
    fn test_generate_layout() {
        let generator = FilenameGenerator::default();
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let result = generator.generate_at("payload", Path::new("/data/qr"), ts);

        assert_eq!(
            result.filename,
            format!("qr-{}-1700000000123.png", hash_payload("payload"))
        );
        assert_eq!(result.full_path, Path::new("/data/qr").join(&result.filename));
    }

    #[test]
    fn test_same_hash_regardless_of_time() {
        let generator = FilenameGenerator::default();
        let dir = Path::new("/data");
        let first = generator.generate_at("same", dir, Utc.timestamp_millis_opt(1).unwrap());
        let second = generator.generate_at("same", dir, Utc.timestamp_millis_opt(99_999).unwrap());

        assert_eq!(first.hash, second.hash);
        assert_ne!(first.filename, second.filename);
        assert!(generator.would_generate_same_hash("same", " same "));
        assert!(!generator.would_generate_same_hash("same", "other"));
    }

    #[test]
    fn test_parse_round_trip_and_rejects_foreign() {
        let generator = FilenameGenerator::default();
        let result = generator.generate_unique_filename("abc", Path::new("/d"));
        let parsed = generator.parse_filename(&result.filename).unwrap();

        assert_eq!(parsed.hash, result.hash);
        assert_eq!(parsed.timestamp_ms, result.timestamp.timestamp_millis());

        assert!(generator.parse_filename("notes.txt").is_none());
        assert!(generator.parse_filename("qr-short-123.png").is_none());
        assert!(generator.parse_filename("qr-0123456789abcdef-x.png").is_none());
        assert!(generator
            .parse_filename(".qr-0123456789abcdef-1.png.abc.tmp")
            .is_none());
    }
}
