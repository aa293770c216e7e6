use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;

use crate::constants::GRID_INTERVAL_HOURS;
use crate::storage::SnapshotLookup;
use crate::timegrid::{parse_time_iso, GridTimestamp, InvalidTimestamp, Stamp};

pub const MAX_SEARCH_LIMIT_DAYS: u32 = 3650;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid params, expecting timeIso=ISO_TIME_STRING ({0})")]
    InvalidInput(#[from] InvalidTimestamp),

    #[error("no data available within {horizon_days} days")]
    NoDataAvailable { horizon_days: i64 },

    #[error("no data within searchLimit of {limit_days} days")]
    NoDataWithinLimit { limit_days: u32 },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonArtifact {
    pub stamp: Stamp,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn SnapshotLookup>,
    horizon_days: i64,
}

impl Resolver {
    pub fn new(store: Arc<dyn SnapshotLookup>, horizon_days: i64) -> Self {
        Self {
            store,
            horizon_days: horizon_days.max(0),
        }
    }

    pub async fn latest(&self, now: DateTime<Utc>) -> Result<JsonArtifact, ResolveError> {
        let horizon = Duration::days(self.horizon_days + 1);
        let mut candidate = GridTimestamp::floor(now);

        for _ in 0..steps_for(horizon) {
            if now - candidate.as_datetime() >= horizon {
                break;
            }
            if let Some(artifact) = self.lookup(candidate).await? {
                return Ok(artifact);
            }
            debug!("{} doesn't exist yet, trying previous interval", candidate.stamp());
            candidate = candidate.previous();
        }

        Err(ResolveError::NoDataAvailable {
            horizon_days: self.horizon_days,
        })
    }

    pub async fn nearest_iso(
        &self,
        time_iso: &str,
        limit_days: Option<u32>,
    ) -> Result<JsonArtifact, ResolveError> {
        let target = parse_time_iso(time_iso)?;
        self.nearest(target, limit_days).await
    }

    /// Without a limit this is a backward walk bounded by the horizon. With a limit it walks
    /// back while strictly inside the limit, then forward up to and including it.
    pub async fn nearest(
        &self,
        target: DateTime<Utc>,
        limit_days: Option<u32>,
    ) -> Result<JsonArtifact, ResolveError> {
        let origin = GridTimestamp::floor(target);

        let Some(limit_days) = limit_days else {
            let horizon = Duration::days(self.horizon_days + 1);
            let mut candidate = origin;
            for _ in 0..steps_for(horizon) {
                if target - candidate.as_datetime() >= horizon {
                    break;
                }
                if let Some(artifact) = self.lookup(candidate).await? {
                    return Ok(artifact);
                }
                candidate = candidate.previous();
            }
            return Err(ResolveError::NoDataAvailable {
                horizon_days: self.horizon_days,
            });
        };

        let limit = Duration::days(i64::from(limit_days.min(MAX_SEARCH_LIMIT_DAYS)));
        if let Some(artifact) = self.lookup(origin).await? {
            return Ok(artifact);
        }

        let mut candidate = origin.previous();
        for _ in 0..steps_for(limit) {
            if target - candidate.as_datetime() >= limit {
                break;
            }
            if let Some(artifact) = self.lookup(candidate).await? {
                return Ok(artifact);
            }
            candidate = candidate.previous();
        }

        debug!("Nothing within {limit_days} days before {}, searching forwards", origin.stamp());
        let mut candidate = origin.next();
        for _ in 0..steps_for(limit) {
            if candidate.as_datetime() - target > limit {
                break;
            }
            if let Some(artifact) = self.lookup(candidate).await? {
                return Ok(artifact);
            }
            candidate = candidate.next();
        }

        Err(ResolveError::NoDataWithinLimit { limit_days })
    }

    async fn lookup(&self, candidate: GridTimestamp) -> Result<Option<JsonArtifact>, ResolveError> {
        let stamp = candidate.stamp();
        if self.store.has_json(&stamp).await? {
            let path = self.store.json_path(&stamp);
            return Ok(Some(JsonArtifact { stamp, path }));
        }
        Ok(None)
    }
}

// Grid points a walk of `span` can visit, with room for the point that ends it.
fn steps_for(span: Duration) -> usize {
    (span.num_hours().max(0) as usize) / GRID_INTERVAL_HOURS as usize + 2
}
