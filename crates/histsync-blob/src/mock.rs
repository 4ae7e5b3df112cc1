// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! In-memory blob store for testing
//!
//! [`MockBlobStore`] keeps releases and asset bytes in an
//! `Arc<RwLock<..>>`, so clones share state and can be handed to concurrent
//! tasks. It also exposes fault-injection hooks the engine tests rely on:
//!
//! - [`MockBlobStore::delete_asset`] removes an asset to exercise fallback
//! - [`MockBlobStore::set_corrupt_downloads`] flips bytes on the way out
//! - [`MockBlobStore::set_download_delay`] plus
//!   [`MockBlobStore::max_concurrent_downloads`] measure fan-out width

use crate::error::{BlobError, BlobResult};
use crate::{validate_asset_name, Asset, BlobStore, ProgressFn, Release};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const PROGRESS_CHUNK: usize = 64 * 1024;

#[derive(Default)]
struct MockRelease {
    id: u64,
    assets: BTreeMap<String, (Asset, Vec<u8>)>,
}

#[derive(Default)]
struct MockState {
    releases: HashMap<String, MockRelease>,
    next_id: u64,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
struct Gauges {
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    corrupt_downloads: AtomicBool,
    lowercase_uploads: AtomicBool,
}

/// In-memory [`BlobStore`] with fault injection
#[derive(Clone, Default)]
pub struct MockBlobStore {
    state: Arc<RwLock<MockState>>,
    gauges: Arc<Gauges>,
    download_delay: Arc<std::sync::Mutex<Option<Duration>>>,
}

impl MockBlobStore {
    /// Create an empty store with no releases
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful uploads since creation
    pub fn upload_count(&self) -> usize {
        self.gauges.uploads.load(Ordering::SeqCst)
    }

    /// Number of completed downloads since creation
    pub fn download_count(&self) -> usize {
        self.gauges.downloads.load(Ordering::SeqCst)
    }

    /// Highest number of downloads observed in flight at the same time
    pub fn max_concurrent_downloads(&self) -> usize {
        self.gauges.max_in_flight.load(Ordering::SeqCst)
    }

    /// Sleep this long inside every download, so overlapping transfers can
    /// be observed
    pub fn set_download_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.download_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// When enabled, every download flips the first byte of the payload
    pub fn set_corrupt_downloads(&self, enabled: bool) {
        self.gauges.corrupt_downloads.store(enabled, Ordering::SeqCst);
    }

    /// When enabled, uploads are stored under a lowercased name, like a host
    /// that rewrites the names it is given
    pub fn set_lowercase_uploads(&self, enabled: bool) {
        self.gauges.lowercase_uploads.store(enabled, Ordering::SeqCst);
    }

    /// Remove an asset from a release; returns whether it existed
    pub async fn delete_asset(&self, tag: &str, name: &str) -> bool {
        let mut state = self.state.write().await;
        state
            .releases
            .get_mut(tag)
            .map(|release| release.assets.remove(name).is_some())
            .unwrap_or(false)
    }

    /// Sorted asset names of a release (empty if the release does not exist)
    pub async fn asset_names(&self, tag: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .releases
            .get(tag)
            .map(|release| release.assets.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stored bytes of an asset
    pub async fn asset_bytes(&self, tag: &str, name: &str) -> Option<Vec<u8>> {
        let state = self.state.read().await;
        state
            .releases
            .get(tag)
            .and_then(|release| release.assets.get(name))
            .map(|(_, data)| data.clone())
    }

    /// Seed an asset directly, bypassing upload accounting
    pub async fn insert_asset(&self, tag: &str, name: &str, data: Vec<u8>) -> Asset {
        let mut state = self.state.write().await;
        let release_id = match state.releases.get(tag) {
            Some(release) => release.id,
            None => state.next_id(),
        };
        let asset_id = state.next_id();
        let release = state
            .releases
            .entry(tag.to_string())
            .or_insert_with(|| MockRelease {
                id: release_id,
                ..Default::default()
            });
        let asset = Asset {
            id: asset_id,
            name: name.to_string(),
            size: data.len() as u64,
        };
        release
            .assets
            .insert(name.to_string(), (asset.clone(), data));
        asset
    }

    fn delay(&self) -> Option<Duration> {
        self.download_delay.lock().ok().and_then(|slot| *slot)
    }

    async fn find_asset_data(&self, asset: &Asset) -> Option<Vec<u8>> {
        let state = self.state.read().await;
        state
            .releases
            .values()
            .flat_map(|release| release.assets.values())
            .find(|(stored, _)| stored.id == asset.id)
            .map(|(_, data)| data.clone())
    }
}

impl fmt::Debug for MockBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBlobStore")
            .field("uploads", &self.upload_count())
            .field("downloads", &self.download_count())
            .finish()
    }
}

struct InFlight<'a>(&'a Gauges);

impl<'a> InFlight<'a> {
    fn enter(gauges: &'a Gauges) -> Self {
        let now = gauges.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gauges.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(gauges)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn report_in_chunks(total: usize, on_progress: &ProgressFn<'_>) {
    let mut done = 0usize;
    while done < total {
        done = (done + PROGRESS_CHUNK).min(total);
        on_progress(done as u64, total as u64);
    }
    if total == 0 {
        on_progress(0, 0);
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn get_or_create_release(&self, tag: &str) -> BlobResult<Release> {
        if tag.is_empty() {
            return Err(BlobError::backend("release tag cannot be empty"));
        }
        let mut state = self.state.write().await;
        if let Some(release) = state.releases.get(tag) {
            return Ok(Release {
                id: release.id,
                tag_name: tag.to_string(),
            });
        }
        let id = state.next_id();
        state.releases.insert(
            tag.to_string(),
            MockRelease {
                id,
                ..Default::default()
            },
        );
        Ok(Release {
            id,
            tag_name: tag.to_string(),
        })
    }

    async fn get_release(&self, tag: &str) -> BlobResult<Option<Release>> {
        let state = self.state.read().await;
        Ok(state.releases.get(tag).map(|release| Release {
            id: release.id,
            tag_name: tag.to_string(),
        }))
    }

    async fn get_asset_by_name(&self, release: &Release, name: &str) -> BlobResult<Option<Asset>> {
        let state = self.state.read().await;
        Ok(state
            .releases
            .get(&release.tag_name)
            .and_then(|r| r.assets.get(name))
            .map(|(asset, _)| asset.clone()))
    }

    async fn upload_asset(
        &self,
        release: &Release,
        local_path: &Path,
        asset_name: &str,
        on_progress: &ProgressFn<'_>,
    ) -> BlobResult<Asset> {
        validate_asset_name(asset_name)?;
        let data = tokio::fs::read(local_path).await?;
        let asset_name = if self.gauges.lowercase_uploads.load(Ordering::SeqCst) {
            asset_name.to_ascii_lowercase()
        } else {
            asset_name.to_string()
        };

        let mut state = self.state.write().await;
        let id = state.next_id();
        let stored = state
            .releases
            .get_mut(&release.tag_name)
            .ok_or_else(|| BlobError::not_found(format!("release {}", release.tag_name)))?;
        if stored.assets.contains_key(&asset_name) {
            return Err(BlobError::http(
                422,
                format!("asset {} already_exists", asset_name),
            ));
        }

        let asset = Asset {
            id,
            name: asset_name.clone(),
            size: data.len() as u64,
        };
        report_in_chunks(data.len(), on_progress);
        stored.assets.insert(asset_name, (asset.clone(), data));
        self.gauges.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(asset)
    }

    async fn download_asset(
        &self,
        asset: &Asset,
        local_path: &Path,
        on_progress: &ProgressFn<'_>,
    ) -> BlobResult<()> {
        let _guard = InFlight::enter(&self.gauges);
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let mut data = self
            .find_asset_data(asset)
            .await
            .ok_or_else(|| BlobError::not_found(format!("asset {}", asset.name)))?;
        if self.gauges.corrupt_downloads.load(Ordering::SeqCst) {
            if let Some(first) = data.first_mut() {
                *first ^= 0xFF;
            } else {
                data.push(0xFF);
            }
        }

        tokio::fs::write(local_path, &data).await?;
        report_in_chunks(data.len(), on_progress);
        self.gauges.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
