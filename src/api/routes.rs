use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::debug;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::error::ProxyError;
use crate::proxy::{ApiRoute, EdgeProxy, ImageProxy, ProxyResponse, TableBoard};
use crate::state::sync_state::{FavoriteDetail, Selection};
use crate::sync::engine::{EventReport, FixturesView, LeagueTable, SyncStatus, TeamReport};
use crate::sync::SyncEngine;
use crate::types::{FavoriteTeam, GoalFlash};

#[derive(Clone)]
pub struct ApiState {
    pub edge: Arc<EdgeProxy>,
    pub image: Arc<ImageProxy>,
    pub tables: Arc<TableBoard>,
    pub engine: Arc<SyncEngine>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // One entry point for the whole proxy surface; see `api_entry`.
        .route("/api", any(api_entry))
        .route("/api/*rest", any(api_entry))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .route("/sync/status", get(get_sync_status))
        .route("/sync/fixtures", get(get_sync_fixtures))
        .route("/sync/tables", get(get_sync_tables))
        .route("/sync/favorite", get(get_sync_favorite))
        .route("/sync/teams/:id", get(get_team_report))
        .route("/sync/events/:id", get(get_event_report))
        .route("/sync/refresh", post(post_refresh))
        .route("/sync/selection", post(post_selection))
        .route("/sync/goal-test", post(post_goal_test))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub mode: String,
    pub last_cycle_at_ms: Option<i64>,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_p99_ms: Option<f64>,
    /// `None` until the standings board has refreshed once.
    pub tables_live: Option<bool>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

#[derive(Serialize)]
pub struct CycleStarted {
    pub started: bool,
}

#[derive(Serialize)]
pub struct GoalTestResponse {
    pub flash: Option<GoalFlash>,
}

#[derive(Serialize)]
pub struct FavoriteResponse {
    pub favorite: FavoriteTeam,
    #[serde(flatten)]
    pub detail: FavoriteDetail,
}

fn us_to_ms(us: Option<u64>) -> Option<f64> {
    us.map(|v| v as f64 / 1000.0)
}

// ---------------------------------------------------------------------------
// Proxy surface
// ---------------------------------------------------------------------------

/// `/api/image` and `/api/tables` are fixed names; every other path is
/// `/api/{version}/{upstream-path}`. Dispatching here instead of in the
/// router keeps the static names and the version segment from colliding.
async fn api_entry(State(state): State<ApiState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return ProxyError::MethodNotAllowed.into_response();
    }

    let path = uri.path();
    let query = uri.query();
    let rest = path
        .trim_start_matches('/')
        .strip_prefix("api")
        .unwrap_or_default()
        .trim_matches('/');

    let result: Result<ProxyResponse, ProxyError> = match rest {
        "image" => state.image.serve(query).await,
        "tables" => state.tables.serve(query).await,
        _ => match ApiRoute::from_request(path, query) {
            Ok(route) => state.edge.serve(&route).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(resp) => resp.into_response(),
        Err(e) => {
            debug!(path, status = e.status().as_u16(), "[PROXY] rejected: {e}");
            e.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let cache = state.edge.cache();
    let (_, _, p99) = state.latency.percentiles();
    Json(HealthResponse {
        mode: state.health.mode().to_string(),
        last_cycle_at_ms: state.health.last_cycle_at_ms(),
        cycles_ok: state.health.cycles_ok(),
        cycles_failed: state.health.cycles_failed(),
        cache_entries: cache.len(),
        cache_hits: cache.hits(),
        cache_misses: cache.misses(),
        upstream_p99_ms: us_to_ms(p99),
        tables_live: state.tables.meta().await.map(|m| m.live_now),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: us_to_ms(p50),
        p95_ms: us_to_ms(p95),
        p99_ms: us_to_ms(p99),
    })
}

// ---------------------------------------------------------------------------
// Sync surface
// ---------------------------------------------------------------------------

async fn get_sync_status(State(state): State<ApiState>) -> Json<SyncStatus> {
    Json(state.engine.status().await)
}

async fn get_sync_fixtures(State(state): State<ApiState>) -> Json<FixturesView> {
    Json(state.engine.fixtures().await)
}

async fn get_sync_tables(State(state): State<ApiState>) -> Json<Vec<LeagueTable>> {
    Json(state.engine.tables().await)
}

async fn get_sync_favorite(State(state): State<ApiState>) -> Json<FavoriteResponse> {
    let (favorite, detail) = state.engine.favorite().await;
    Json(FavoriteResponse { favorite, detail })
}

async fn get_team_report(
    State(state): State<ApiState>,
    Path(team_id): Path<String>,
) -> Json<TeamReport> {
    Json(state.engine.team_report(&team_id).await)
}

async fn get_event_report(
    State(state): State<ApiState>,
    Path(event_id): Path<String>,
) -> Json<EventReport> {
    Json(state.engine.event_report(&event_id).await)
}

async fn post_refresh(State(state): State<ApiState>) -> (StatusCode, Json<CycleStarted>) {
    let started = state.engine.trigger();
    let status = if started { StatusCode::ACCEPTED } else { StatusCode::OK };
    (status, Json(CycleStarted { started }))
}

async fn post_selection(
    State(state): State<ApiState>,
    Json(selection): Json<Selection>,
) -> Json<CycleStarted> {
    let started = state.engine.select(selection).await;
    Json(CycleStarted { started })
}

async fn post_goal_test(State(state): State<ApiState>) -> Json<GoalTestResponse> {
    Json(GoalTestResponse { flash: state.engine.trigger_test_flash().await })
}
