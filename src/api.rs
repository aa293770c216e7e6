use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::constants::STAMP_HEADER;
use crate::resolve::{JsonArtifact, ResolveError, MAX_SEARCH_LIMIT_DAYS};
use crate::types::AppState;
use crate::utils::service_name;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NearestQuery {
    #[serde(default, rename = "timeIso")]
    time_iso: Option<String>,
    #[serde(default, rename = "searchLimit")]
    search_limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MetaResponse {
    ready: bool,
    #[serde(rename = "latestStamp")]
    latest_stamp: Option<String>,
    #[serde(rename = "stampCount")]
    stamp_count: usize,
    #[serde(rename = "storageDir")]
    storage_dir: String,
    #[serde(rename = "harvestHorizonDays")]
    harvest_horizon_days: i64,
    #[serde(rename = "pollIntervalSeconds")]
    poll_interval_seconds: u64,
    #[serde(rename = "cycleInFlight")]
    cycle_in_flight: bool,
}

pub async fn index() -> String {
    service_name()
}

pub async fn alive() -> String {
    format!("{} {}", Utc::now().timestamp_millis(), service_name())
}

pub async fn latest(State(state): State<AppState>) -> Response {
    match state.resolver.latest(Utc::now()).await {
        Ok(artifact) => artifact_response(artifact).await,
        Err(error) => resolve_error_response(error),
    }
}

pub async fn nearest(State(state): State<AppState>, Query(query): Query<NearestQuery>) -> Response {
    let Some(time_iso) = query
        .time_iso
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return error_json(
            StatusCode::BAD_REQUEST,
            "Invalid params, expecting: timeIso=ISO_TIME_STRING",
        );
    };

    let limit_days = match parse_search_limit(query.search_limit.as_deref()) {
        Ok(limit) => limit,
        Err(message) => return error_json(StatusCode::BAD_REQUEST, &message),
    };

    match state.resolver.nearest_iso(time_iso, limit_days).await {
        Ok(artifact) => artifact_response(artifact).await,
        Err(error) => resolve_error_response(error),
    }
}

pub async fn meta(State(state): State<AppState>) -> Response {
    let stamps = match state.store.list_json_stamps().await {
        Ok(stamps) => stamps,
        Err(error) => {
            error!("Failed to list JSON artifacts: {error}");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable.");
        }
    };

    Json(MetaResponse {
        ready: !stamps.is_empty(),
        latest_stamp: stamps.last().map(|stamp| stamp.to_string()),
        stamp_count: stamps.len(),
        storage_dir: state.store.root().display().to_string(),
        harvest_horizon_days: state.harvester.horizon_days(),
        poll_interval_seconds: state.cfg.poll_interval.as_secs(),
        cycle_in_flight: state.harvester.is_cycle_in_flight(),
    })
    .into_response()
}

fn parse_search_limit(raw: Option<&str>) -> Result<Option<u32>, String> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<u32>() {
        Ok(days) if days <= MAX_SEARCH_LIMIT_DAYS => Ok(Some(days)),
        _ => Err(format!(
            "Invalid searchLimit {raw:?}, expecting whole days between 0 and {MAX_SEARCH_LIMIT_DAYS}"
        )),
    }
}

async fn artifact_response(artifact: JsonArtifact) -> Response {
    let body = match tokio::fs::read(&artifact.path).await {
        Ok(body) => body,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} disappeared before it could be served", artifact.path.display());
            return error_json(StatusCode::NOT_FOUND, "No data available.");
        }
        Err(error) => {
            error!("Failed reading {}: {error}", artifact.path.display());
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable.");
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Ok(value) = HeaderValue::from_str(artifact.stamp.as_str()) {
        headers.insert(STAMP_HEADER, value);
    }
    (headers, body).into_response()
}

fn resolve_error_response(error: ResolveError) -> Response {
    let status = match &error {
        ResolveError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ResolveError::NoDataAvailable { .. } | ResolveError::NoDataWithinLimit { .. } => {
            StatusCode::NOT_FOUND
        }
        ResolveError::StorageUnavailable(_) => {
            error!("Lookup failed: {error}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_json(status, &error.to_string())
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::to_bytes;
    use reqwest::Client;
    use tempfile::TempDir;

    use crate::ingest::Harvester;
    use crate::resolve::Resolver;
    use crate::storage::{SnapshotStore, StoreArea};
    use crate::test_support::{grid, test_config, WritingConverter};

    fn state(dir: &TempDir) -> AppState {
        let cfg = Arc::new(test_config(dir.path(), "http://127.0.0.1:1/filter", 30));
        let store = Arc::new(SnapshotStore::from_config(&cfg));
        let harvester = Arc::new(Harvester::new(
            &cfg,
            Client::new(),
            store.clone(),
            Arc::new(WritingConverter::default()),
        ));
        AppState {
            resolver: Resolver::new(store.clone(), cfg.harvest_horizon_days),
            cfg,
            store,
            harvester,
        }
    }

    fn query(time_iso: Option<&str>, search_limit: Option<&str>) -> Query<NearestQuery> {
        Query(NearestQuery {
            time_iso: time_iso.map(str::to_string),
            search_limit: search_limit.map(str::to_string),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn search_limit_must_be_whole_days() {
        assert_eq!(parse_search_limit(None), Ok(None));
        assert_eq!(parse_search_limit(Some(" ")), Ok(None));
        assert_eq!(parse_search_limit(Some("3")), Ok(Some(3)));
        assert!(parse_search_limit(Some("-1")).is_err());
        assert!(parse_search_limit(Some("1.5")).is_err());
        assert!(parse_search_limit(Some("999999")).is_err());
    }

    #[tokio::test]
    async fn index_and_alive_name_the_service() {
        assert!(index().await.starts_with("WindJS GRIB2 server, version "));
        let alive = alive().await;
        let (millis, name) = alive.split_once(' ').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(name, service_name());
    }

    #[tokio::test]
    async fn nearest_requires_a_valid_time() {
        let dir = TempDir::new().unwrap();

        let missing = nearest(State(state(&dir)), query(None, None)).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let invalid = nearest(State(state(&dir)), query(Some("soon"), None)).await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let bad_limit = nearest(
            State(state(&dir)),
            query(Some("2024-03-18T12:00:00Z"), Some("two")),
        )
        .await;
        assert_eq!(bad_limit.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn nearest_serves_the_artifact_body() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let stamp = grid(2024, 3, 18, 6).stamp();
        state.store.ensure_dir(StoreArea::Json).await.unwrap();
        std::fs::write(state.store.json_path(&stamp), br#"[{"header":{}}]"#).unwrap();

        let response = nearest(
            State(state),
            query(Some("2024-03-18T13:00:00Z"), Some("1")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get(STAMP_HEADER).unwrap(), "2024031806");
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!([{ "header": {} }]));
    }

    #[tokio::test]
    async fn nearest_reports_not_found_outside_the_limit() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let stamp = grid(2024, 3, 20, 12).stamp();
        state.store.ensure_dir(StoreArea::Json).await.unwrap();
        std::fs::write(state.store.json_path(&stamp), b"[]").unwrap();

        let response = nearest(
            State(state),
            query(Some("2024-03-18T12:00:00Z"), Some("1")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("searchLimit"));
    }

    #[tokio::test]
    async fn latest_without_data_is_not_found() {
        let dir = TempDir::new().unwrap();
        let response = latest(State(state(&dir))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn meta_summarizes_the_store() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        state.store.ensure_dir(StoreArea::Json).await.unwrap();
        for hour in [0, 6, 12] {
            let stamp = grid(2024, 3, 18, hour).stamp();
            std::fs::write(state.store.json_path(&stamp), b"[]").unwrap();
        }

        let body = body_json(meta(State(state)).await).await;

        assert_eq!(body["ready"], true);
        assert_eq!(body["latestStamp"], "2024031812");
        assert_eq!(body["stampCount"], 3);
        assert_eq!(body["harvestHorizonDays"], 30);
        assert_eq!(body["cycleInFlight"], false);
    }
}
