//! Upload decisions against seeded remote state

use std::sync::Arc;

use spsync_core::domain::Fingerprint;
use spsync_core::ports::IRemoteLibrary;
use spsync_sync::detector::ChangeDetector;
use spsync_sync::hashing::fingerprint_bytes;
use spsync_sync::stats::{Counter, UploadStatistics};

use crate::common::*;

fn detector(remote: &Arc<FakeLibrary>, use_fingerprint: bool) -> (ChangeDetector, Arc<UploadStatistics>) {
    let stats = Arc::new(UploadStatistics::new());
    let remote: Arc<dyn IRemoteLibrary> = remote.clone();
    (ChangeDetector::new(remote, stats.clone(), use_fingerprint), stats)
}

#[tokio::test]
async fn test_absent_file_is_new() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeLibrary::new();
    let (detector, stats) = detector(&remote, true);

    let record = local_file(dir.path(), "a.txt", b"hello");
    let decision = detector.needs_upload(&record, &root()).await;

    assert!(decision.needs_upload);
    assert!(!decision.exists());
    assert_eq!(decision.fingerprint, Some(fingerprint_bytes(b"hello")));
    assert_eq!(stats.get(Counter::ComparedByHash), 0);
    assert_eq!(stats.get(Counter::ComparedBySize), 0);
}

#[tokio::test]
async fn test_matching_fingerprint_ignores_case() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeLibrary::new();
    let upper = Fingerprint::new(fingerprint_bytes(b"hello").as_str().to_ascii_uppercase());
    remote.seed_file("a.txt", 999, Some(upper));
    let (detector, stats) = detector(&remote, true);

    let record = local_file(dir.path(), "a.txt", b"hello");
    let decision = detector.needs_upload(&record, &root()).await;

    assert!(!decision.needs_upload);
    assert!(decision.exists());
    assert_eq!(stats.get(Counter::ComparedByHash), 1);
    assert_eq!(stats.get(Counter::HashMatched), 1);
    assert_eq!(stats.get(Counter::SkippedFiles), 1);
    assert_eq!(stats.get(Counter::BytesSkipped), 5);
}

#[tokio::test]
async fn test_different_fingerprint_uploads_even_with_equal_size() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeLibrary::new();
    remote.seed_file("a.txt", 5, Some(fingerprint_bytes(b"world")));
    let (detector, stats) = detector(&remote, true);

    let record = local_file(dir.path(), "a.txt", b"hello");
    let decision = detector.needs_upload(&record, &root()).await;

    assert!(decision.needs_upload);
    assert!(decision.exists());
    assert_eq!(stats.get(Counter::ComparedByHash), 1);
    assert_eq!(stats.get(Counter::ComparedBySize), 0);
    assert_eq!(stats.get(Counter::SkippedFiles), 0);
}

#[tokio::test]
async fn test_empty_column_falls_back_to_size() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeLibrary::new();
    remote.seed_file("a.txt", 5, None);
    let (detector, stats) = detector(&remote, true);

    let record = local_file(dir.path(), "a.txt", b"hello");
    let decision = detector.needs_upload(&record, &root()).await;

    assert!(!decision.needs_upload);
    assert_eq!(stats.get(Counter::ComparedBySize), 1);
    assert_eq!(stats.get(Counter::HashMatched), 0);
    assert_eq!(stats.get(Counter::SkippedFiles), 1);
}

#[tokio::test]
async fn test_presupplied_fingerprint_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeLibrary::new();
    let converted = fingerprint_bytes(b"<html>converted</html>");
    remote.seed_file("guide.html", 1, Some(converted.clone()));
    let (detector, _) = detector(&remote, true);

    let record = local_file(dir.path(), "guide.html", b"# raw markdown").with_fingerprint(converted.clone());
    let decision = detector.needs_upload(&record, &root()).await;

    assert!(!decision.needs_upload);
    assert_eq!(decision.fingerprint, Some(converted));
}

#[tokio::test]
async fn test_unreadable_local_file_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeLibrary::new();
    remote.seed_file("a.txt", 5, Some(fingerprint_bytes(b"hello")));
    let (detector, stats) = detector(&remote, true);

    let record = local_file(dir.path(), "a.txt", b"hello");
    std::fs::remove_file(&record.local_path).unwrap();
    let decision = detector.needs_upload(&record, &root()).await;

    assert!(decision.needs_upload);
    assert!(decision.fingerprint.is_none());
    assert_eq!(stats.get(Counter::ComparedByHash), 0);
}

#[tokio::test]
async fn test_failed_existence_check_counts_as_new() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeLibrary::new();
    remote.seed_file("a.txt", 5, Some(fingerprint_bytes(b"hello")));
    remote.fail_probes(true);
    let (detector, stats) = detector(&remote, true);

    let record = local_file(dir.path(), "a.txt", b"hello");
    let decision = detector.needs_upload(&record, &root()).await;

    assert!(decision.needs_upload);
    assert!(!decision.exists());
    assert_eq!(decision.fingerprint, Some(fingerprint_bytes(b"hello")));
    assert_eq!(stats.get(Counter::ComparedByHash), 0);
    assert_eq!(stats.get(Counter::SkippedFiles), 0);
}
