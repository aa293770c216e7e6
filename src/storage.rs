use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{
    JSON_DIR_NAME, JSON_EXTENSION, RAW_DIR_NAME, RAW_EXTENSION, STAGING_EXTENSION,
};
use crate::timegrid::Stamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreArea {
    Raw,
    Json,
}

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    raw_dir: PathBuf,
    json_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw_dir: root.join(RAW_DIR_NAME),
            json_dir: root.join(JSON_DIR_NAME),
            root,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.storage_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn area_dir(&self, area: StoreArea) -> &Path {
        match area {
            StoreArea::Raw => &self.raw_dir,
            StoreArea::Json => &self.json_dir,
        }
    }

    pub fn raw_path(&self, stamp: &Stamp) -> PathBuf {
        self.raw_dir.join(format!("{stamp}.{RAW_EXTENSION}"))
    }

    pub fn json_path(&self, stamp: &Stamp) -> PathBuf {
        self.json_dir.join(format!("{stamp}.{JSON_EXTENSION}"))
    }

    pub fn json_staging_path(&self, stamp: &Stamp) -> PathBuf {
        self.json_dir
            .join(format!("{stamp}.{JSON_EXTENSION}.{STAGING_EXTENSION}"))
    }

    fn raw_staging_path(&self, stamp: &Stamp) -> PathBuf {
        self.raw_dir
            .join(format!("{stamp}.{RAW_EXTENSION}.{STAGING_EXTENSION}"))
    }

    pub async fn has_raw_data(&self, stamp: &Stamp) -> std::io::Result<bool> {
        fs::try_exists(self.raw_path(stamp)).await
    }

    pub async fn has_json(&self, stamp: &Stamp) -> std::io::Result<bool> {
        fs::try_exists(self.json_path(stamp)).await
    }

    pub async fn ensure_dir(&self, area: StoreArea) -> Result<PathBuf> {
        let dir = self.area_dir(area).to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    pub async fn prepare(&self) -> Result<()> {
        for area in [StoreArea::Raw, StoreArea::Json] {
            let dir = self.ensure_dir(area).await?;
            let mut entries = fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|value| value.to_str()) != Some(STAGING_EXTENSION) {
                    continue;
                }
                match fs::remove_file(&path).await {
                    Ok(()) => info!("Removed stale staging file {}", path.display()),
                    Err(error) => warn!("Failed removing {}: {error}", path.display()),
                }
            }
        }
        Ok(())
    }

    pub async fn open_raw_writer(&self, stamp: &Stamp) -> Result<RawWriter> {
        self.ensure_dir(StoreArea::Raw).await?;
        let staging = self.raw_staging_path(stamp);
        let file = File::create(&staging)
            .await
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        Ok(RawWriter {
            file: Some(file),
            staging,
            target: self.raw_path(stamp),
            bytes_written: 0,
            committed: false,
        })
    }

    /// Moves the converter output into place. Returns `false` without touching the existing
    /// artifact when JSON for `stamp` is already present.
    pub async fn commit_json(&self, stamp: &Stamp) -> Result<bool> {
        let staging = self.json_staging_path(stamp);
        let target = self.json_path(stamp);

        // hard_link fails on an existing target, so a present artifact is never replaced
        let committed = match fs::hard_link(&staging, &target).await {
            Ok(()) => true,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                warn!("JSON for {stamp} already present, discarding new conversion");
                false
            }
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("Failed linking {} -> {}", staging.display(), target.display())
                });
            }
        };

        if let Err(error) = fs::remove_file(&staging).await {
            warn!("Failed removing {}: {error}", staging.display());
        }
        Ok(committed)
    }

    pub async fn delete_raw_data(&self, stamp: &Stamp) {
        for path in [self.raw_path(stamp), self.raw_staging_path(stamp)] {
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => warn!("Failed removing {}: {error}", path.display()),
            }
        }
    }

    pub async fn list_json_stamps(&self) -> std::io::Result<Vec<Stamp>> {
        let mut dir = match fs::read_dir(&self.json_dir).await {
            Ok(dir) => dir,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let mut stamps = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|value| value.to_str()) != Some(JSON_EXTENSION) {
                continue;
            }
            if let Some(stamp) = path
                .file_stem()
                .and_then(|value| value.to_str())
                .and_then(Stamp::parse)
            {
                stamps.push(stamp);
            }
        }

        stamps.sort();
        Ok(stamps)
    }
}

/// Stamp to JSON artifact lookup, all the resolver needs from a backend.
#[async_trait]
pub trait SnapshotLookup: Send + Sync {
    fn json_path(&self, stamp: &Stamp) -> PathBuf;
    async fn has_json(&self, stamp: &Stamp) -> std::io::Result<bool>;
}

#[async_trait]
impl SnapshotLookup for SnapshotStore {
    fn json_path(&self, stamp: &Stamp) -> PathBuf {
        SnapshotStore::json_path(self, stamp)
    }

    async fn has_json(&self, stamp: &Stamp) -> std::io::Result<bool> {
        SnapshotStore::has_json(self, stamp).await
    }
}

/// Sink for one raw download. Bytes land in a staging file that only becomes visible under
/// the permanent name on [`RawWriter::commit`]; dropping an uncommitted writer removes it.
#[derive(Debug)]
pub struct RawWriter {
    file: Option<File>,
    staging: PathBuf,
    target: PathBuf,
    bytes_written: u64,
    committed: bool,
}

impl RawWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .with_context(|| format!("Writer for {} is closed", self.staging.display()))?;
        file.write_all(chunk)
            .await
            .with_context(|| format!("Failed writing {}", self.staging.display()))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn commit(mut self) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .with_context(|| format!("Failed flushing {}", self.staging.display()))?;
            file.sync_all()
                .await
                .with_context(|| format!("Failed syncing {}", self.staging.display()))?;
        }

        fs::rename(&self.staging, &self.target).await.with_context(|| {
            format!(
                "Failed renaming {} -> {}",
                self.staging.display(),
                self.target.display()
            )
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for RawWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        match std::fs::remove_file(&self.staging) {
            Ok(()) => debug!("Discarded partial download {}", self.staging.display()),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Failed removing {}: {error}", self.staging.display()),
        }
    }
}
