use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

use crate::config::Config;
use crate::constants::{
    DEFAULT_CONVERTER_BIN, DEFAULT_LISTEN_ADDR, DEFAULT_POLL_INTERVAL_SECONDS,
    DEFAULT_REQUEST_TIMEOUT_SECONDS,
};
use crate::convert::Converter;
use crate::timegrid::{GridTimestamp, Stamp};

const FILTER_PATH: &str = "/cgi-bin/filter_gfs_1p00.pl";

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}

pub fn grid(year: i32, month: u32, day: u32, hour: u32) -> GridTimestamp {
    GridTimestamp::floor(utc(year, month, day, hour, 0))
}

pub fn test_config(storage_dir: &Path, upstream_url: &str, horizon_days: i64) -> Config {
    Config {
        listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        storage_dir: storage_dir.to_path_buf(),
        upstream_url: upstream_url.to_string(),
        converter_bin: DEFAULT_CONVERTER_BIN.into(),
        request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS),
        harvest_horizon_days: horizon_days,
    }
}

#[derive(Default)]
struct UpstreamState {
    available: HashSet<String>,
    hits: HashMap<String, usize>,
}

pub struct FakeUpstream {
    url: String,
    state: Arc<Mutex<UpstreamState>>,
}

impl FakeUpstream {
    pub async fn start(available: &[Stamp]) -> Self {
        let state = Arc::new(Mutex::new(UpstreamState {
            available: available
                .iter()
                .map(|stamp| stamp.as_str().to_string())
                .collect(),
            hits: HashMap::new(),
        }));

        let app = Router::new()
            .route(FILTER_PATH, get(filter))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}{FILTER_PATH}"),
            state,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body_for(stamp: &Stamp) -> Vec<u8> {
        format!("GRIB{stamp}7777").into_bytes()
    }

    pub fn hits_for(&self, stamp: &Stamp) -> usize {
        let state = self.state.lock().unwrap();
        state.hits.get(stamp.as_str()).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.lock().unwrap().hits.values().sum()
    }
}

async fn filter(
    State(state): State<Arc<Mutex<UpstreamState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let stamp = params
        .get("dir")
        .and_then(|dir| dir.strip_prefix("/gfs."))
        .unwrap_or_default()
        .to_string();

    let available = {
        let mut state = state.lock().unwrap();
        *state.hits.entry(stamp.clone()).or_insert(0) += 1;
        state.available.contains(&stamp)
    };

    if available {
        (StatusCode::OK, format!("GRIB{stamp}7777")).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[derive(Default)]
pub struct WritingConverter {
    calls: AtomicUsize,
}

impl WritingConverter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for WritingConverter {
    async fn convert(&self, raw_path: &Path, json_path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let raw = tokio::fs::read(raw_path).await?;
        let document = serde_json::json!([{ "header": { "bytes": raw.len() }, "data": [] }]);
        tokio::fs::write(json_path, serde_json::to_vec(&document)?).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FailingConverter {
    calls: AtomicUsize,
}

impl FailingConverter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for FailingConverter {
    async fn convert(&self, _raw_path: &Path, json_path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // a half-written output must not survive a failed conversion
        tokio::fs::write(json_path, b"[{\"hea").await?;
        bail!("grib2json exited with exit status: 1")
    }
}

#[derive(Default)]
pub struct GatedConverter {
    pub entered: Notify,
    pub release: Notify,
    inner: WritingConverter,
}

impl GatedConverter {
    pub fn calls(&self) -> usize {
        self.inner.calls()
    }
}

#[async_trait]
impl Converter for GatedConverter {
    async fn convert(&self, raw_path: &Path, json_path: &Path) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.convert(raw_path, json_path).await
    }
}
