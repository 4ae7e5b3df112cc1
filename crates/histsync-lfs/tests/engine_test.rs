// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Large-file engine behaviour against the in-memory blob store

use histsync_blob::mock::MockBlobStore;
use histsync_lfs::{
    hash_file, no_progress, pointer_path_for, HashAlgorithm, LfsEngine, LfsError, LfsOptions,
    Manifest, PointerFile,
};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const TAG: &str = "lfs-assets";

fn setup(threshold: u64) -> (TempDir, MockBlobStore, LfsEngine) {
    let dir = TempDir::new().unwrap();
    let store = MockBlobStore::new();
    let engine = LfsEngine::new(
        Arc::new(store.clone()),
        dir.path(),
        LfsOptions {
            threshold_bytes: threshold,
            max_workers: 3,
            ..LfsOptions::default()
        },
    );
    (dir, store, engine)
}

fn write(path: &Path, data: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[tokio::test]
async fn convert_then_restore_round_trips() {
    let (dir, _store, engine) = setup(100);
    let path = dir.path().join("media/clip.mov");
    let content = patterned(10_000, 3);
    write(&path, &content);
    let original_hash = hash_file(&path, HashAlgorithm::Sha256).await.unwrap();

    let mut manifest = Manifest::load(dir.path()).await.unwrap();
    let pointer = engine.convert(&path, &mut manifest, &no_progress).await.unwrap();

    assert!(!path.exists());
    let pointer_path = pointer_path_for(&path);
    assert_eq!(PointerFile::read(&pointer_path).await.unwrap(), pointer);
    assert_eq!(pointer.hash, original_hash);
    assert_eq!(pointer.size, 10_000);

    let manifest = Manifest::load(dir.path()).await.unwrap();
    assert_eq!(manifest.versions("media/clip.mov").len(), 1);

    let restored = engine
        .restore(&pointer_path, &manifest, true, &no_progress)
        .await
        .unwrap();
    assert_eq!(restored, path);
    assert_eq!(std::fs::read(&path).unwrap(), content);
    assert_eq!(hash_file(&path, HashAlgorithm::Sha256).await.unwrap(), original_hash);
    assert!(!pointer_path.exists());
}

#[tokio::test]
async fn oversized_file_becomes_pointer_named_by_digest() {
    let (dir, store, engine) = setup(50 * 1024);
    let path = dir.path().join("backup.tar");
    let content = patterned(500 * 1024, 9);
    write(&path, &content);

    let mut manifest = Manifest::new(dir.path());
    let report = engine
        .externalize_oversized(dir.path(), &[], &mut manifest, &no_progress)
        .await
        .unwrap();
    assert_eq!(report.converted, vec![path.clone()]);
    assert!(report.failed.is_empty());

    let digest = hex::encode(Sha256::digest(&content));
    let pointer = PointerFile::read(&pointer_path_for(&path)).await.unwrap();
    assert_eq!(pointer.asset_name, format!("{}-backup.tar", &digest[..12]));
    assert_eq!(pointer.release_tag, TAG);
    assert!(!path.exists());
    assert_eq!(store.asset_names(TAG).await, vec![pointer.asset_name.clone()]);
}

#[tokio::test]
async fn converting_unchanged_content_uploads_once() {
    let (dir, store, engine) = setup(10);
    let path = dir.path().join("db.sqlite");
    let content = patterned(4096, 1);
    let mut manifest = Manifest::new(dir.path());

    write(&path, &content);
    let first = engine.convert(&path, &mut manifest, &no_progress).await.unwrap();
    write(&path, &content);
    let second = engine.convert(&path, &mut manifest, &no_progress).await.unwrap();

    assert_eq!(first.asset_name, second.asset_name);
    assert_eq!(store.upload_count(), 1);
    assert_eq!(store.asset_names(TAG).await.len(), 1);
    assert_eq!(manifest.versions("db.sqlite").len(), 1);
}

#[tokio::test]
async fn pointer_records_the_name_the_store_kept() {
    let (dir, store, engine) = setup(10);
    store.set_lowercase_uploads(true);
    let path = dir.path().join("Raw Take.WAV");
    let content = patterned(4096, 5);
    write(&path, &content);

    let mut manifest = Manifest::new(dir.path());
    let pointer = engine.convert(&path, &mut manifest, &no_progress).await.unwrap();

    let digest = hex::encode(Sha256::digest(&content));
    assert_eq!(pointer.asset_name, format!("{}-raw.take.wav", &digest[..12]));
    assert_eq!(store.asset_names(TAG).await, vec![pointer.asset_name.clone()]);
    assert_eq!(
        manifest.versions("Raw Take.WAV")[0].asset_name,
        pointer.asset_name
    );

    engine
        .restore(&pointer_path_for(&path), &manifest, true, &no_progress)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), content);
}

#[tokio::test]
async fn upload_progress_reaches_total() {
    let (dir, _store, engine) = setup(10);
    let path = dir.path().join("big.bin");
    write(&path, &patterned(200_000, 2));

    let seen: Mutex<Vec<(PathBuf, u64, u64)>> = Mutex::new(Vec::new());
    let progress = |p: &Path, done: u64, total: u64| {
        seen.lock().unwrap().push((p.to_path_buf(), done, total));
    };
    let mut manifest = Manifest::new(dir.path());
    engine.convert(&path, &mut manifest, &progress).await.unwrap();

    let seen = seen.into_inner().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|(p, _, total)| p == &path && *total == 200_000));
    assert_eq!(seen.last().unwrap().1, 200_000);
}

#[tokio::test]
async fn download_progress_reports_against_the_pointer() {
    let (dir, _store, engine) = setup(10);
    let path = dir.path().join("big.bin");
    write(&path, &patterned(150_000, 4));
    let mut manifest = Manifest::new(dir.path());
    engine.convert(&path, &mut manifest, &no_progress).await.unwrap();

    let pointer_path = pointer_path_for(&path);
    let last = Mutex::new(None);
    let progress = |p: &Path, done: u64, total: u64| {
        assert_eq!(p, pointer_path.as_path());
        *last.lock().unwrap() = Some((done, total));
    };
    engine
        .restore(&pointer_path, &manifest, true, &progress)
        .await
        .unwrap();
    assert_eq!(last.into_inner().unwrap(), Some((150_000, 150_000)));
}

#[tokio::test]
async fn restore_falls_back_to_first_resolvable_version() {
    let (dir, store, engine) = setup(10);
    let path = dir.path().join("data/model.bin");
    let v1 = patterned(1000, 1);
    let v2 = patterned(1000, 2);
    let v3 = patterned(1000, 3);
    let mut manifest = Manifest::new(dir.path());

    let mut names = Vec::new();
    for content in [&v1, &v2, &v3] {
        write(&path, content);
        names.push(engine.convert(&path, &mut manifest, &no_progress).await.unwrap().asset_name);
    }
    // Latest and oldest vanish; the middle version is the first that resolves.
    assert!(store.delete_asset(TAG, &names[2]).await);
    assert!(store.delete_asset(TAG, &names[0]).await);

    let pointer_path = pointer_path_for(&path);
    engine
        .restore(&pointer_path, &manifest, true, &no_progress)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), v2);
    assert!(!pointer_path.exists());
}

#[tokio::test]
async fn restore_prefers_oldest_resolvable_version() {
    let (dir, store, engine) = setup(10);
    let path = dir.path().join("model.bin");
    let v1 = patterned(1000, 1);
    let v2 = patterned(1000, 2);
    let mut manifest = Manifest::new(dir.path());

    write(&path, &v1);
    engine.convert(&path, &mut manifest, &no_progress).await.unwrap();
    write(&path, &v2);
    let latest = engine.convert(&path, &mut manifest, &no_progress).await.unwrap();

    // Pointer names an asset that never existed; both recorded ones do.
    let pointer_path = pointer_path_for(&path);
    let mut broken = latest.clone();
    broken.asset_name = "ffffffffffff-model.bin".to_string();
    broken.write(&pointer_path).await.unwrap();
    assert_eq!(store.asset_names(TAG).await.len(), 2);

    engine
        .restore(&pointer_path, &manifest, true, &no_progress)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), v1);
}

#[tokio::test]
async fn restore_fails_when_no_version_resolves() {
    let (dir, store, engine) = setup(10);
    let path = dir.path().join("a.bin");
    write(&path, &patterned(100, 5));
    let mut manifest = Manifest::new(dir.path());
    let pointer = engine.convert(&path, &mut manifest, &no_progress).await.unwrap();
    store.delete_asset(TAG, &pointer.asset_name).await;

    let pointer_path = pointer_path_for(&path);
    let err = engine
        .restore(&pointer_path, &manifest, true, &no_progress)
        .await
        .unwrap_err();
    assert!(matches!(err, LfsError::AssetNotFound { tried: 1, .. }));
    assert!(pointer_path.exists());
    assert!(!path.exists());
}

#[tokio::test]
async fn corrupted_download_leaves_pointer_intact() {
    let (dir, store, engine) = setup(10);
    let path = dir.path().join("photo.raw");
    write(&path, &patterned(5000, 7));
    let mut manifest = Manifest::new(dir.path());
    engine.convert(&path, &mut manifest, &no_progress).await.unwrap();

    let pointer_path = pointer_path_for(&path);
    let before = std::fs::read(&pointer_path).unwrap();
    store.set_corrupt_downloads(true);

    let err = engine
        .restore(&pointer_path, &manifest, true, &no_progress)
        .await
        .unwrap_err();
    assert!(matches!(err, LfsError::IntegrityMismatch { .. }));
    assert_eq!(std::fs::read(&pointer_path).unwrap(), before);
    assert!(!path.exists());
    assert!(!dir.path().join("photo.raw.pointer.tmp").exists());

    // Retry once the transport is healthy again.
    store.set_corrupt_downloads(false);
    engine
        .restore(&pointer_path, &manifest, true, &no_progress)
        .await
        .unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn corrupted_download_accepted_without_verification() {
    let (dir, store, engine) = setup(10);
    let path = dir.path().join("photo.raw");
    write(&path, &patterned(5000, 7));
    let mut manifest = Manifest::new(dir.path());
    engine.convert(&path, &mut manifest, &no_progress).await.unwrap();
    store.set_corrupt_downloads(true);

    engine
        .restore(&pointer_path_for(&path), &manifest, false, &no_progress)
        .await
        .unwrap();
    assert_ne!(std::fs::read(&path).unwrap(), patterned(5000, 7));
}

#[tokio::test]
async fn invalid_pointer_is_rejected() {
    let (dir, _store, engine) = setup(10);
    let pointer_path = dir.path().join("x.bin.pointer");
    std::fs::write(&pointer_path, "version 1\nhash nope\n").unwrap();

    let manifest = Manifest::new(dir.path());
    let err = engine
        .restore(&pointer_path, &manifest, true, &no_progress)
        .await
        .unwrap_err();
    assert!(matches!(err, LfsError::InvalidHash(_)));
    assert!(pointer_path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restore_all_bounds_concurrency_and_reports_every_pointer() {
    let (dir, store, engine) = setup(10);
    let mut manifest = Manifest::new(dir.path());
    let mut pointers = Vec::new();
    for i in 0..8u8 {
        let path = dir.path().join(format!("set/file{}.bin", i));
        write(&path, &patterned(2048, i));
        let pointer = engine.convert(&path, &mut manifest, &no_progress).await.unwrap();
        pointers.push((pointer_path_for(&path), pointer));
    }
    // Two pointers cannot be resolved.
    store.delete_asset(TAG, &pointers[1].1.asset_name).await;
    store.delete_asset(TAG, &pointers[6].1.asset_name).await;
    store.set_download_delay(Duration::from_millis(40));

    let calls = AtomicUsize::new(0);
    let last = Mutex::new((0, 0));
    let results = engine
        .restore_all(dir.path(), &manifest, |done, total| {
            calls.fetch_add(1, Ordering::SeqCst);
            *last.lock().unwrap() = (done, total);
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 8);
    assert_eq!(results.values().filter(|ok| **ok).count(), 6);
    assert!(!results[&pointers[1].0]);
    assert!(!results[&pointers[6].0]);
    assert!(results[&pointers[0].0]);
    assert!(store.max_concurrent_downloads() <= 3);
    assert!(store.max_concurrent_downloads() >= 2);
    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(*last.lock().unwrap(), (8, 8));
}

#[tokio::test]
async fn restore_all_on_empty_tree() {
    let (dir, _store, engine) = setup(10);
    let manifest = Manifest::new(dir.path());
    let results = engine
        .restore_all(dir.path(), &manifest, |_, _| panic!("no progress expected"))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn externalize_skips_excluded_and_internal_paths() {
    let (dir, _store, engine) = setup(100);
    let root = dir.path();
    write(&root.join("keep/large.bin"), &patterned(500, 1));
    write(&root.join("cache/large.bin"), &patterned(500, 2));
    write(&root.join("keep/small.txt"), b"tiny");

    let mut manifest = Manifest::new(root);
    let report = engine
        .externalize_oversized(root, &["cache".to_string()], &mut manifest, &no_progress)
        .await
        .unwrap();
    assert_eq!(report.converted, vec![root.join("keep/large.bin")]);
    assert!(root.join("cache/large.bin").exists());
    assert!(root.join("keep/small.txt").exists());

    // The manifest itself sits under .lfs and is never a candidate.
    let again = engine
        .externalize_oversized(root, &["cache".to_string()], &mut manifest, &no_progress)
        .await
        .unwrap();
    assert!(again.converted.is_empty());
}
