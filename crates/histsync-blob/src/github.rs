// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! GitHub release assets as a blob store
//!
//! Releases are looked up by tag through the REST API; assets are uploaded
//! to the uploads host and downloaded through the asset endpoint with
//! `Accept: application/octet-stream`, which redirects to the storage CDN.
//! Both directions stream, so memory use does not grow with asset size.

use crate::error::{BlobError, BlobResult};
use crate::{validate_asset_name, Asset, BlobStore, ProgressFn, Release};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Default REST API root
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default root for asset uploads
pub const DEFAULT_UPLOAD_URL: &str = "https://uploads.github.com";

const ASSETS_PER_PAGE: usize = 100;
const UPLOAD_PROGRESS_TICK: Duration = Duration::from_millis(250);

/// Connection settings for [`GithubReleaseStore`]
#[derive(Clone)]
pub struct GithubConfig {
    /// `owner/repo`
    pub repository: String,

    /// Access token with `contents: write` on the repository
    pub token: String,

    /// REST API root, overridable for GitHub Enterprise
    pub api_url: String,

    /// Upload root, overridable for GitHub Enterprise
    pub upload_url: String,
}

impl GithubConfig {
    pub fn new(repository: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("repository", &self.repository)
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("upload_url", &self.upload_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    tag_name: String,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    id: u64,
    name: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct CreateRelease<'a> {
    tag_name: &'a str,
    name: &'a str,
    body: &'a str,
    draft: bool,
    prerelease: bool,
}

impl From<ReleaseResponse> for Release {
    fn from(r: ReleaseResponse) -> Self {
        Release {
            id: r.id,
            tag_name: r.tag_name,
        }
    }
}

impl From<AssetResponse> for Asset {
    fn from(a: AssetResponse) -> Self {
        Asset {
            id: a.id,
            name: a.name,
            size: a.size,
        }
    }
}

/// [`BlobStore`] backed by GitHub release assets
#[derive(Clone)]
pub struct GithubReleaseStore {
    config: GithubConfig,
    client: Client,
}

impl GithubReleaseStore {
    /// Build a store with authenticated default headers
    pub fn new(config: GithubConfig) -> BlobResult<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| BlobError::backend("access token contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("histsync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { config, client })
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.config.api_url, self.config.repository, suffix
        )
    }

    async fn create_release(&self, tag: &str) -> BlobResult<Release> {
        let request = CreateRelease {
            tag_name: tag,
            name: tag,
            body: "Large file storage managed by histsync",
            draft: false,
            prerelease: false,
        };
        let response = self
            .client
            .post(self.repo_url("releases"))
            .header(ACCEPT, "application/vnd.github+json")
            .json(&request)
            .send()
            .await?;
        let release: ReleaseResponse = check(response).await?.json().await?;
        info!(tag, id = release.id, "Created release");
        Ok(release.into())
    }
}

impl fmt::Debug for GithubReleaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubReleaseStore")
            .field("config", &self.config)
            .finish()
    }
}

/// Turn a non-success response into [`BlobError::Http`]
async fn check(response: Response) -> BlobResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(BlobError::http(status.as_u16(), message))
}

#[async_trait]
impl BlobStore for GithubReleaseStore {
    async fn get_or_create_release(&self, tag: &str) -> BlobResult<Release> {
        if let Some(release) = self.get_release(tag).await? {
            return Ok(release);
        }
        match self.create_release(tag).await {
            Ok(release) => Ok(release),
            // Lost a race with another creator: the tag exists now.
            Err(BlobError::Http { status: 422, .. }) => self
                .get_release(tag)
                .await?
                .ok_or_else(|| BlobError::not_found(format!("release {}", tag))),
            Err(e) => Err(e),
        }
    }

    async fn get_release(&self, tag: &str) -> BlobResult<Option<Release>> {
        let response = self
            .client
            .get(self.repo_url(&format!("releases/tags/{}", tag)))
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let release: ReleaseResponse = check(response).await?.json().await?;
        Ok(Some(release.into()))
    }

    async fn get_asset_by_name(&self, release: &Release, name: &str) -> BlobResult<Option<Asset>> {
        let mut page = 1usize;
        loop {
            let response = self
                .client
                .get(self.repo_url(&format!("releases/{}/assets", release.id)))
                .header(ACCEPT, "application/vnd.github+json")
                .query(&[("per_page", ASSETS_PER_PAGE), ("page", page)])
                .send()
                .await?;
            let assets: Vec<AssetResponse> = check(response).await?.json().await?;
            let exhausted = assets.len() < ASSETS_PER_PAGE;

            if let Some(found) = assets.into_iter().find(|a| a.name == name) {
                return Ok(Some(found.into()));
            }
            if exhausted {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn upload_asset(
        &self,
        release: &Release,
        local_path: &Path,
        asset_name: &str,
        on_progress: &ProgressFn<'_>,
    ) -> BlobResult<Asset> {
        validate_asset_name(asset_name)?;
        let file = tokio::fs::File::open(local_path).await?;
        let total = file.metadata().await?.len();

        let sent = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&sent);
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        });

        let url = format!(
            "{}/repos/{}/releases/{}/assets",
            self.config.upload_url, self.config.repository, release.id
        );
        debug!(asset = asset_name, bytes = total, "Uploading asset");

        let request = self
            .client
            .post(url)
            .query(&[("name", asset_name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream))
            .send();
        tokio::pin!(request);

        let mut ticker = tokio::time::interval(UPLOAD_PROGRESS_TICK);
        let response = loop {
            tokio::select! {
                result = &mut request => break result?,
                _ = ticker.tick() => on_progress(sent.load(Ordering::Relaxed), total),
            }
        };

        let asset: AssetResponse = check(response).await?.json().await?;
        on_progress(total, total);
        info!(asset = %asset.name, bytes = total, "Uploaded asset");
        Ok(asset.into())
    }

    async fn download_asset(
        &self,
        asset: &Asset,
        local_path: &Path,
        on_progress: &ProgressFn<'_>,
    ) -> BlobResult<()> {
        let response = self
            .client
            .get(self.repo_url(&format!("releases/assets/{}", asset.id)))
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await?;
        let response = check(response).await?;
        let total = response.content_length().unwrap_or(asset.size);

        let mut file = tokio::fs::File::create(local_path).await?;
        let mut received = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            on_progress(received, total);
        }
        file.flush().await?;

        debug!(asset = %asset.name, bytes = received, "Downloaded asset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = GithubConfig::new("owner/repo", "t")
            .with_api_url("https://ghe.example.com/api/v3/")
            .with_upload_url("https://ghe.example.com/api/uploads/");
        assert_eq!(config.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.upload_url, "https://ghe.example.com/api/uploads");
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = GithubConfig::new("owner/repo", "ghp_secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("owner/repo"));
    }

    #[test]
    fn test_repo_url() {
        let store = GithubReleaseStore::new(GithubConfig::new("owner/repo", "t")).unwrap();
        assert_eq!(
            store.repo_url("releases/tags/lfs"),
            "https://api.github.com/repos/owner/repo/releases/tags/lfs"
        );
    }

    #[test]
    fn test_rejects_token_with_newline() {
        let result = GithubReleaseStore::new(GithubConfig::new("owner/repo", "bad\ntoken"));
        assert!(matches!(result, Err(BlobError::Backend(_))));
    }
}
