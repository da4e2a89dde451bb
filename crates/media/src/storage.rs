// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object storage backends for VOD segments, playlists, and thumbnails.
//!
//! Two variants behind one enum: a local filesystem tree (dev and single-node
//! deployments) and S3-compatible object storage. Callers depend only on the
//! shared operation set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::config::StorageConfig;

/// Bound on presigned-URL generation.
const PRESIGN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

impl Storage {
    pub async fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        match config.storage_type.as_str() {
            "local" => Ok(Self::Local(LocalStorage::new(
                config.storage_base_path.clone(),
                &config.storage_public_url,
            ))),
            "s3" => Ok(Self::S3(S3Storage::connect(config).await?)),
            other => anyhow::bail!("unknown storage backend: {other}"),
        }
    }

    /// Upload a local file under `key`.
    pub async fn put_file(&self, local: &Path, key: &str) -> anyhow::Result<()> {
        match self {
            Self::Local(s) => s.put_file(local, key).await,
            Self::S3(s) => s.put_file(local, key).await,
        }
    }

    /// Upload raw bytes under `key`.
    pub async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        match self {
            Self::Local(s) => s.put_bytes(key, bytes).await,
            Self::S3(s) => s.put_bytes(key, bytes, content_type).await,
        }
    }

    /// Stable public URL for `key`.
    pub fn public_url(&self, key: &str) -> String {
        match self {
            Self::Local(s) => format!("{}/{key}", s.public_url),
            Self::S3(s) => s.public_url(key),
        }
    }

    /// Time-limited GET URL for `key`.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        match self {
            Self::Local(s) => Ok(format!("{}/{key}", s.public_url)),
            Self::S3(s) => s.presign_get(key, expires_in).await,
        }
    }

    /// Immediate child "directories" under `prefix` (one per VOD session).
    pub async fn list_prefixes(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Local(s) => s.list_prefixes(prefix).await,
            Self::S3(s) => s.list_prefixes(prefix).await,
        }
    }
}

// ── Local filesystem ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LocalStorage {
    base: PathBuf,
    public_url: String,
}

impl LocalStorage {
    pub fn new(base: PathBuf, public_url: &str) -> Self {
        Self { base, public_url: public_url.trim_end_matches('/').to_owned() }
    }

    async fn put_file(&self, local: &Path, key: &str) -> anyhow::Result<()> {
        let dest = self.base.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, &dest).await?;
        debug!(key, "stored locally");
        Ok(())
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let dest = self.base.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, bytes).await?;
        Ok(())
    }

    async fn list_prefixes(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let dir = self.base.join(prefix);
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

// ── S3-compatible object storage ──────────────────────────────────────────

#[derive(Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_url: Option<String>,
}

impl S3Storage {
    async fn connect(config: &StorageConfig) -> anyhow::Result<Self> {
        let base = aws_config::from_env().region(aws_sdk_s3::config::Region::new(
            config.s3_region.clone(),
        ));
        let shared = base.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.s3_use_path_style);
        if let Some(ref endpoint) = config.s3_endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let (Some(key), Some(secret)) =
            (&config.s3_access_key_id, &config.s3_secret_access_key)
        {
            builder = builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                key, secret, None, None, "skein-static",
            ));
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.s3_bucket.clone(),
            public_url: config.s3_public_url.as_ref().map(|u| u.trim_end_matches('/').to_owned()),
        })
    }

    async fn put_file(&self, local: &Path, key: &str) -> anyhow::Result<()> {
        let body = ByteStream::from_path(local).await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(key))
            .send()
            .await?;
        debug!(key, "uploaded to s3");
        Ok(())
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("s3://{}/{key}", self.bucket),
        }
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        let presign = PresigningConfig::builder()
            .start_time(std::time::SystemTime::now())
            .expires_in(expires_in)
            .build()?;
        let request = tokio::time::timeout(
            PRESIGN_TIMEOUT,
            self.client.get_object().bucket(&self.bucket).key(key).presigned(presign),
        )
        .await??;
        Ok(request.uri().to_string())
    }

    async fn list_prefixes(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let normalized = format!("{}/", prefix.trim_end_matches('/'));
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&normalized)
            .delimiter("/")
            .send()
            .await?;
        Ok(resp
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix())
            .filter_map(|p| {
                p.strip_prefix(&normalized).map(|s| s.trim_end_matches('/').to_owned())
            })
            .filter(|s| !s.is_empty())
            .collect())
    }
}

/// Content type by extension; playlists and segments have fixed HLS types.
pub fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if key.ends_with(".ts") {
        "video/mp2t"
    } else if key.ends_with(".jpg") || key.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
