use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::constants::{
    GFS_BOTTOM_LAT, GFS_FILE_SUFFIX, GFS_LEFT_LON, GFS_LEVELS, GFS_RIGHT_LON, GFS_TOP_LAT,
    GFS_VARIABLES,
};
use crate::http_client::get_streaming;
use crate::storage::SnapshotStore;
use crate::timegrid::{GridTimestamp, Stamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(Stamp),
    AlreadyCached(Stamp),
    /// Raw data is on disk without JSON, i.e. an earlier conversion failed.
    RawPending(Stamp),
    NotAvailable,
}

#[derive(Clone)]
pub struct Fetcher {
    http: Client,
    upstream_url: String,
    store: Arc<SnapshotStore>,
}

impl Fetcher {
    pub fn new(http: Client, upstream_url: impl Into<String>, store: Arc<SnapshotStore>) -> Self {
        Self {
            http,
            upstream_url: upstream_url.into(),
            store,
        }
    }

    pub async fn fetch(&self, target: GridTimestamp) -> Result<FetchOutcome> {
        let stamp = target.stamp();

        if self
            .store
            .has_json(&stamp)
            .await
            .with_context(|| format!("Failed to check JSON for {stamp}"))?
        {
            return Ok(FetchOutcome::AlreadyCached(stamp));
        }
        if self
            .store
            .has_raw_data(&stamp)
            .await
            .with_context(|| format!("Failed to check raw data for {stamp}"))?
        {
            return Ok(FetchOutcome::RawPending(stamp));
        }

        let query = build_query(target);
        let response = match get_streaming(&self.http, &self.upstream_url, &query).await {
            Ok(response) => response,
            Err(error) => {
                debug!("{stamp} not available: {error:#}");
                return Ok(FetchOutcome::NotAvailable);
            }
        };
        debug!("response {} | {stamp}", response.status());

        let mut writer = self.store.open_raw_writer(&stamp).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => writer.write_chunk(&bytes).await?,
                Err(error) => {
                    warn!("Download of {stamp} interrupted: {error}");
                    return Ok(FetchOutcome::NotAvailable);
                }
            }
        }

        let size = writer.bytes_written();
        if size == 0 {
            warn!("Upstream returned an empty body for {stamp}");
            return Ok(FetchOutcome::NotAvailable);
        }

        writer.commit().await?;
        info!("Fetched {stamp} ({size} bytes)");
        Ok(FetchOutcome::Fetched(stamp))
    }
}

pub fn build_query(target: GridTimestamp) -> Vec<(&'static str, String)> {
    let stamp = target.stamp();
    let mut query = vec![(
        "file",
        format!("gfs.t{:02}{GFS_FILE_SUFFIX}", target.run_hour()),
    )];
    for selector in GFS_LEVELS.iter().chain(GFS_VARIABLES.iter()) {
        query.push((*selector, "on".to_string()));
    }
    query.extend([
        ("leftlon", GFS_LEFT_LON.to_string()),
        ("rightlon", GFS_RIGHT_LON.to_string()),
        ("toplat", GFS_TOP_LAT.to_string()),
        ("bottomlat", GFS_BOTTOM_LAT.to_string()),
        ("dir", format!("/gfs.{stamp}")),
    ]);
    query
}
