use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::constants::GRID_INTERVAL_HOURS;
use crate::convert::Converter;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::storage::{SnapshotStore, StoreArea};
use crate::timegrid::{GridTimestamp, Stamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    HorizonExhausted,
    AlreadyCached(Stamp),
    BackfillComplete(Stamp),
    ConversionFailed(Stamp),
    RawPending(Stamp),
    StorageFault,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HorizonExhausted => f.write_str("horizon exhausted"),
            Self::AlreadyCached(stamp) => write!(f, "{stamp} already cached"),
            Self::BackfillComplete(stamp) => write!(f, "backfill complete at {stamp}"),
            Self::ConversionFailed(stamp) => write!(f, "conversion of {stamp} failed"),
            Self::RawPending(stamp) => write!(f, "{stamp} has unconverted raw data"),
            Self::StorageFault => f.write_str("storage fault"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CycleReport {
    pub start: Stamp,
    pub requests: usize,
    pub fetched: Vec<Stamp>,
    pub converted: Vec<Stamp>,
    pub stop: StopReason,
}

#[derive(Clone, Debug)]
pub enum CycleOutcome {
    Skipped,
    Completed(CycleReport),
}

pub struct Harvester {
    store: Arc<SnapshotStore>,
    fetcher: Fetcher,
    converter: Arc<dyn Converter>,
    horizon_days: i64,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Harvester {
    pub fn new(
        cfg: &Config,
        http: Client,
        store: Arc<SnapshotStore>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(http, cfg.upstream_url.clone(), store.clone()),
            store,
            converter,
            horizon_days: cfg.harvest_horizon_days.max(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn horizon_days(&self) -> i64 {
        self.horizon_days
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        self.run_cycle_from(now, GridTimestamp::floor(now)).await
    }

    pub async fn run_cycle_from(&self, now: DateTime<Utc>, target: GridTimestamp) -> CycleOutcome {
        let Some(_guard) = self.try_begin_cycle() else {
            info!("Harvest cycle already in flight, skipping trigger for {}", target.stamp());
            return CycleOutcome::Skipped;
        };

        let report = self.harvest_chain(now, target).await;
        info!(
            "Harvest cycle from {} finished after {} requests ({} fetched, {} converted): {}",
            report.start,
            report.requests,
            report.fetched.len(),
            report.converted.len(),
            report.stop
        );
        CycleOutcome::Completed(report)
    }

    fn try_begin_cycle(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    // Enough iterations to walk every grid point inside the horizon plus the one that trips it.
    fn max_steps(&self) -> usize {
        ((self.horizon_days as usize + 1) * 24 / GRID_INTERVAL_HOURS as usize) + 2
    }

    fn beyond_horizon(&self, now: DateTime<Utc>, target: GridTimestamp) -> bool {
        (now - target.as_datetime()).num_days() > self.horizon_days
    }

    async fn harvest_chain(&self, now: DateTime<Utc>, start: GridTimestamp) -> CycleReport {
        let mut report = CycleReport {
            start: start.stamp(),
            requests: 0,
            fetched: Vec::new(),
            converted: Vec::new(),
            stop: StopReason::HorizonExhausted,
        };
        let mut target = start;

        for _ in 0..self.max_steps() {
            if self.beyond_horizon(now, target) {
                debug!(
                    "Hit harvest horizon at {}, harvest complete or there is a big gap in data",
                    target.stamp()
                );
                report.stop = StopReason::HorizonExhausted;
                return report;
            }

            let outcome = match self.fetcher.fetch(target).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    error!("Fetching {} failed: {error:#}", target.stamp());
                    report.stop = StopReason::StorageFault;
                    return report;
                }
            };

            match outcome {
                FetchOutcome::AlreadyCached(stamp) => {
                    debug!("Already have {stamp}, not looking further");
                    report.stop = StopReason::AlreadyCached(stamp);
                    return report;
                }
                FetchOutcome::RawPending(stamp) => {
                    warn!("Raw data for {stamp} is present without JSON; leaving it for inspection");
                    report.stop = StopReason::RawPending(stamp);
                    return report;
                }
                FetchOutcome::NotAvailable => {
                    report.requests += 1;
                    target = target.previous();
                }
                FetchOutcome::Fetched(stamp) => {
                    report.requests += 1;
                    report.fetched.push(stamp.clone());

                    if let Err(error) = self.convert(&stamp).await {
                        error!("Conversion of {stamp} failed: {error:#}");
                        report.stop = StopReason::ConversionFailed(stamp);
                        return report;
                    }
                    report.converted.push(stamp.clone());
                    self.store.delete_raw_data(&stamp).await;

                    let previous = target.previous();
                    match self.store.has_json(&previous.stamp()).await {
                        Ok(true) => {
                            debug!("Got {}, no need to harvest further", previous.stamp());
                            report.stop = StopReason::BackfillComplete(stamp);
                            return report;
                        }
                        Ok(false) => {
                            info!("Attempting to harvest older data {}", previous.stamp());
                            target = previous;
                        }
                        Err(error) => {
                            error!("Failed to check JSON for {}: {error}", previous.stamp());
                            report.stop = StopReason::StorageFault;
                            return report;
                        }
                    }
                }
            }
        }

        report
    }

    async fn convert(&self, stamp: &Stamp) -> Result<()> {
        self.store.ensure_dir(StoreArea::Json).await?;
        let raw_path = self.store.raw_path(stamp);
        let staging = self.store.json_staging_path(stamp);

        if let Err(error) = self.converter.convert(&raw_path, &staging).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed removing {}: {cleanup}", staging.display());
                }
            }
            return Err(error);
        }

        if self.store.commit_json(stamp).await? {
            info!("Converted {stamp} to {}", self.store.json_path(stamp).display());
        }
        Ok(())
    }
}

/// Stops the periodic trigger. Dropping the handle has the same effect; a cycle that is
/// already running is never interrupted.
pub struct HarvesterHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HarvesterHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub async fn shutdown(self) {
        self.stop();
        if let Err(error) = self.task.await {
            warn!("Harvest loop task failed: {error}");
        }
    }
}

pub fn spawn_harvester(harvester: Arc<Harvester>, period: Duration) -> HarvesterHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        info!("Starting harvest loop every {}s", period.as_secs());
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let harvester = harvester.clone();
                    tokio::spawn(async move {
                        harvester.run_cycle(Utc::now()).await;
                    });
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        info!("Harvest loop stopped");
                        break;
                    }
                }
            }
        }
    });

    HarvesterHandle { stop_tx, task }
}
