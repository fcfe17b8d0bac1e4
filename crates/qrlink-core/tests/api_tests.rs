//! Integration tests for the QrLinkApi public interface.
//!
//! These tests drive directory negotiation and artifact generation end to
//! end against a temporary allow-listed root.

use qrlink_core::{
    ArtifactRequest, ConfigSource, ErrorCorrectionLevel, ErrorKind, QrLinkApi, QrLinkApiBuilder,
    ViewingContext,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const PAYLOAD: &str = "radixwallet://transaction?intent=txid_tdx_2_1example&network=stokenet";

/// A temp dir and its canonical path, used as the only allowed root.
fn create_test_env() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().canonicalize().unwrap();
    (temp_dir, root)
}

fn builder_for(root: &PathBuf) -> QrLinkApiBuilder {
    QrLinkApi::builder()
        .with_default_roots(false)
        .with_allowed_root(root.clone())
        .with_base_dir(root.clone())
        .with_environment(None)
        .with_background_cleanup(false)
        .with_roots_min_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn test_api_creation_uses_default_directory() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    let status = api.get_qr_directory();
    assert_eq!(status.source, ConfigSource::Default);
    assert_eq!(status.current_directory, root.join("qrimages"));
    assert!(status.is_valid);
    assert!(api.config_path().is_none());
}

#[tokio::test]
async fn test_api_creation_fails_without_allowed_roots() {
    let result = QrLinkApi::builder()
        .with_default_roots(false)
        .with_base_dir("/nonexistent/qrlink")
        .build()
        .await;
    let err = result.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test]
async fn test_startup_precedence() {
    let (_temp, root) = create_test_env();
    let env_dir = root.join("from-env").to_string_lossy().into_owned();
    let cli_dir = root.join("from-cli").to_string_lossy().into_owned();

    let api = builder_for(&root)
        .with_command_line_dir(Some(cli_dir.clone()))
        .build()
        .await
        .unwrap();
    assert_eq!(api.get_qr_directory().source, ConfigSource::CommandLine);

    let api = builder_for(&root)
        .with_environment(Some(env_dir))
        .with_command_line_dir(Some(cli_dir))
        .build()
        .await
        .unwrap();
    let status = api.get_qr_directory();
    assert_eq!(status.source, ConfigSource::Environment);
    assert_eq!(status.current_directory, root.join("from-env"));

    // An unsafe environment value falls through to the next source.
    let api = builder_for(&root)
        .with_environment(Some("/etc/qr".to_string()))
        .build()
        .await
        .unwrap();
    assert_eq!(api.get_qr_directory().source, ConfigSource::Default);
}

#[tokio::test]
async fn test_set_and_reset_directory() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();
    let target = root.join("explicit");

    let status = api
        .set_qr_directory(&target.to_string_lossy())
        .await
        .unwrap();
    assert_eq!(status.source, ConfigSource::ExternalRoots);
    assert_eq!(status.current_directory, target);

    let err = api.set_qr_directory("/etc").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
    assert_eq!(api.get_qr_directory().current_directory, target);

    let status = api.reset_qr_directory().await;
    assert_eq!(status.source, ConfigSource::Default);
    assert_eq!(status.current_directory, root.join("qrimages"));
}

#[tokio::test]
async fn test_roots_changed_picks_first_valid_candidate() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    let result = api
        .roots_changed(&json!({
            "roots": ["../../etc", "account/qrimages"],
            "timestamp": 1_700_000_000_000i64
        }))
        .await;

    assert!(result.is_valid, "{:?}", result.errors);
    let expected = root.join("account").join("qrimages");
    assert_eq!(result.selected_directory.as_ref(), Some(&expected));
    assert_eq!(result.errors.len(), 1);
    assert!(expected.is_dir());

    let listing = api.list_allowed_directories();
    assert_eq!(listing.source, ConfigSource::ExternalRoots);
    assert_eq!(listing.current_directory, expected);
    assert_eq!(listing.allowed_roots, vec![root.clone()]);
    assert!(listing.offered_roots.contains(&"../../etc".to_string()));
}

#[tokio::test]
async fn test_roots_changed_rejects_malformed_notification() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    let result = api.roots_changed(&json!({ "roots": [] })).await;
    assert!(!result.is_valid);
    assert!(result.selected_directory.is_none());
    assert_eq!(api.get_qr_directory().source, ConfigSource::Default);
}

#[tokio::test]
async fn test_generate_writes_png_and_reuses_it() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    let first = api.generate_qr(&ArtifactRequest::new(PAYLOAD)).await.unwrap();
    assert!(!first.metadata.reused);
    assert!(first.file_path.starts_with(root.join("qrimages")));
    assert!(first.filename.starts_with("qr-"));
    assert!(first.filename.ends_with(".png"));
    assert!(first.size_bytes > 0);
    assert_eq!(first.width, first.height);

    let bytes = std::fs::read(&first.file_path).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

    let second = api.generate_qr(&ArtifactRequest::new(PAYLOAD)).await.unwrap();
    assert!(second.metadata.reused);
    assert_eq!(second.file_path, first.file_path);
    assert_eq!(second.hash, first.hash);

    let stats = api.get_directory_stats().await.unwrap();
    assert_eq!(stats.info.artifact_count, 1);
}

#[tokio::test]
async fn test_generate_follows_directory_changes() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    let result = api
        .roots_changed(&json!({ "roots": ["negotiated"] }))
        .await;
    assert!(result.is_valid);

    let artifact = api.generate_qr(&ArtifactRequest::new(PAYLOAD)).await.unwrap();
    assert!(artifact.file_path.starts_with(root.join("negotiated")));
    assert_eq!(
        artifact.metadata.directory_source,
        Some(ConfigSource::ExternalRoots)
    );
}

#[tokio::test]
async fn test_generate_rejects_bad_requests() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    let err = api.generate_qr(&ArtifactRequest::new("   ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationError);

    let mut request = ArtifactRequest::new(PAYLOAD);
    request.output_dir = Some("/etc".to_string());
    let err = api.generate_qr(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityError);
}

#[tokio::test]
async fn test_configuration_persists_across_instances() {
    let (_temp, root) = create_test_env();
    let config_dir = root.join("config");
    let target = root.join("remembered");

    let api = builder_for(&root)
        .with_config_dir(config_dir.clone())
        .build()
        .await
        .unwrap();
    api.set_qr_directory(&target.to_string_lossy()).await.unwrap();
    assert!(config_dir.join("qr-config.json").is_file());
    drop(api);

    let restored = builder_for(&root)
        .with_config_dir(config_dir)
        .with_environment(Some(root.join("from-env").to_string_lossy().into_owned()))
        .build()
        .await
        .unwrap();
    let status = restored.get_qr_directory();
    assert_eq!(status.source, ConfigSource::ExternalRoots);
    assert_eq!(status.current_directory, target);
}

#[tokio::test]
async fn test_configuration_change_callbacks() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let subscription = api.on_configuration_changed(Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    api.set_qr_directory(&root.join("a").to_string_lossy())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    api.set_qr_directory(&root.join("b").to_string_lossy())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validate_and_compare() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    let report = api
        .validate_qr(PAYLOAD, Some(ViewingContext::MobileScan), None)
        .unwrap();
    assert!(report.validation.is_valid);
    assert!(report.optimal.expected_capacity >= PAYLOAD.len());

    let comparison = api.compare_qr_configs(PAYLOAD, None, None).unwrap();
    assert_eq!(comparison.evaluated, ErrorCorrectionLevel::ALL.len());
    assert!(comparison.best.validation.is_valid);
    assert!(comparison.alternatives.len() <= 3);

    let err = api.compare_qr_configs(PAYLOAD, Some(Vec::new()), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);

    let err = api.validate_qr("", None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
}

#[tokio::test]
async fn test_cleanup_keeps_fresh_artifacts() {
    let (_temp, root) = create_test_env();
    let api = builder_for(&root).build().await.unwrap();

    api.generate_qr(&ArtifactRequest::new(PAYLOAD)).await.unwrap();
    std::fs::write(root.join("qrimages").join("notes.txt"), b"keep me").unwrap();

    let result = api.cleanup_qr_directory().await.unwrap();
    assert_eq!(result.removed_files, 0);
    assert!(root.join("qrimages").join("notes.txt").exists());
}
