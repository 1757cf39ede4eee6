use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::{
    TABLES_CACHE_MAX_AGE_SECS, TABLES_REFRESH_IDLE_MS, TABLES_REFRESH_LIVE_MS,
    TABLE_WARM_INTERVAL_SECS,
};
use crate::error::{ProxyError, Result};
use crate::fetcher::parse::first_array;
use crate::proxy::edge::{cache_control_value, set_cache_status, CacheStatus, EdgeProxy, ProxyResponse};
use crate::types::{ApiVersion, League};

/// Refresh bookkeeping shared by every league's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub updated_at: DateTime<Utc>,
    pub next_refresh_at: DateTime<Utc>,
    pub refresh_every_ms: i64,
    pub live_now: bool,
}

#[derive(Default)]
struct TableSnapshot {
    /// league id → serialized upstream standings payload
    tables: HashMap<String, Bytes>,
    meta: Option<TableMeta>,
}

/// Server-side standings for the configured leagues.
///
/// All leagues refresh together: one live probe decides the cadence (short
/// while any league has a live match, long otherwise). The snapshot lock is
/// held across a refresh, so concurrent viewers wait for one refresh instead
/// of each starting their own.
pub struct TableBoard {
    edge: Arc<EdgeProxy>,
    leagues: Vec<League>,
    clock: Arc<dyn Clock>,
    snapshot: Mutex<TableSnapshot>,
}

impl TableBoard {
    pub fn new(edge: Arc<EdgeProxy>, leagues: Vec<League>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self { edge, leagues, clock, snapshot: Mutex::new(TableSnapshot::default()) })
    }

    pub fn is_configured(&self, league_id: &str) -> bool {
        self.leagues.iter().any(|l| l.id == league_id)
    }

    pub async fn meta(&self) -> Option<TableMeta> {
        self.snapshot.lock().await.meta.clone()
    }

    /// `query` is the raw inbound query string carrying `l={leagueId}`.
    pub async fn serve(&self, query: Option<&str>) -> std::result::Result<ProxyResponse, ProxyError> {
        let league_id = query
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == "l")
                    .map(|(_, v)| v.trim().to_string())
            })
            .unwrap_or_default();
        if !self.is_configured(&league_id) {
            return Err(ProxyError::InvalidLeague);
        }

        let mut snapshot = self.snapshot.lock().await;
        let now = self.clock.now();

        if let (Some(body), Some(meta)) = (snapshot.tables.get(&league_id), snapshot.meta.as_ref()) {
            if now < meta.next_refresh_at {
                return Ok(table_response(body.clone(), meta, CacheStatus::Hit));
            }
        }

        match self.refresh(&mut snapshot).await {
            Ok(()) => {
                let body = snapshot.tables.get(&league_id).cloned();
                match (body, snapshot.meta.as_ref()) {
                    (Some(body), Some(meta)) => Ok(table_response(body, meta, CacheStatus::Miss)),
                    _ => Err(ProxyError::Internal("Unable to resolve table response".to_string())),
                }
            }
            Err(e) => {
                warn!(league = %league_id, "[TABLES] refresh failed: {e}");
                match (snapshot.tables.get(&league_id), snapshot.meta.as_ref()) {
                    (Some(body), Some(meta)) => {
                        Ok(table_response(body.clone(), meta, CacheStatus::Stale))
                    }
                    _ => Err(ProxyError::Network(format!("Unable to refresh table data: {e}"))),
                }
            }
        }
    }

    /// Refresh if the snapshot is missing or due. Used by the warmer.
    pub async fn ensure_fresh(&self) -> Result<bool> {
        let mut snapshot = self.snapshot.lock().await;
        let now = self.clock.now();
        let due = snapshot.meta.as_ref().map_or(true, |m| now >= m.next_refresh_at);
        if !due {
            return Ok(false);
        }
        self.refresh(&mut snapshot).await?;
        Ok(true)
    }

    async fn refresh(&self, snapshot: &mut TableSnapshot) -> Result<()> {
        let live_now = self.any_live_now().await;
        let refresh_every_ms = if live_now { TABLES_REFRESH_LIVE_MS } else { TABLES_REFRESH_IDLE_MS };

        let fetches = self.leagues.iter().map(|league| {
            let path = format!("lookuptable.php?l={}", league.id);
            async move {
                let payload = self.edge.fetch_upstream_json(ApiVersion::V1, &path).await?;
                Ok::<_, crate::error::AppError>((league.id.clone(), Bytes::from(serde_json::to_vec(&payload)?)))
            }
        });

        // All-or-nothing: a partial refresh would mix table generations.
        let mut fresh = HashMap::new();
        for result in join_all(fetches).await {
            let (league_id, body) = result?;
            fresh.insert(league_id, body);
        }

        let now = self.clock.now();
        snapshot.tables = fresh;
        snapshot.meta = Some(TableMeta {
            updated_at: now,
            next_refresh_at: now + chrono::Duration::milliseconds(refresh_every_ms),
            refresh_every_ms,
            live_now,
        });
        info!(
            leagues = self.leagues.len(),
            live_now,
            refresh_every_ms,
            "[TABLES] standings refreshed"
        );
        Ok(())
    }

    async fn any_live_now(&self) -> bool {
        for league in &self.leagues {
            let path = format!("livescore/{}", league.id);
            match self.edge.fetch_upstream_json(ApiVersion::V2, &path).await {
                Ok(payload) if !first_array(&payload).is_empty() => return true,
                Ok(_) => {}
                Err(e) => warn!(league = %league.id, "[TABLES] live probe failed: {e}"),
            }
        }
        false
    }

    /// Background warmer: keeps standings fresh so the first viewer after an
    /// expiry does not pay for the refresh.
    pub async fn run_warmer(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(TABLE_WARM_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if let Err(e) = self.ensure_fresh().await {
                error!("[TABLES] warm failed: {e}");
            }
        }
    }
}

fn table_response(body: Bytes, meta: &TableMeta, cache_status: CacheStatus) -> ProxyResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    if let Ok(v) = HeaderValue::from_str(&cache_control_value(TABLES_CACHE_MAX_AGE_SECS)) {
        headers.insert(header::CACHE_CONTROL, v);
    }
    set_cache_status(&mut headers, cache_status);
    headers.insert(
        HeaderName::from_static("x-tables-live"),
        HeaderValue::from_static(if meta.live_now { "1" } else { "0" }),
    );
    headers.insert(HeaderName::from_static("x-tables-refresh-ms"), HeaderValue::from(meta.refresh_every_ms));
    if let Ok(v) = HeaderValue::from_str(&meta.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)) {
        headers.insert(HeaderName::from_static("x-tables-updated-at"), v);
    }
    ProxyResponse { status: StatusCode::OK, headers, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::latency::LatencyStats;
    use crate::clock::ManualClock;
    use crate::proxy::edge::tests::test_config;
    use crate::state::ResponseCache;
    use axum::extract::Path;
    use axum::routing::get;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Upstream {
        base: String,
        table_hits: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
    }

    /// Upstream with one live EPL match and working tables until `failing` is set.
    async fn spawn_upstream() -> Upstream {
        let table_hits = Arc::new(AtomicUsize::new(0));
        let failing = Arc::new(AtomicBool::new(false));
        let (hits, fail) = (Arc::clone(&table_hits), Arc::clone(&failing));
        let app = axum::Router::new().route(
            "/api/:version/json/:key/*path",
            get(move |Path((_v, _k, path)): Path<(String, String, String)>| {
                let (hits, fail) = (Arc::clone(&hits), Arc::clone(&fail));
                async move {
                    if fail.load(Ordering::SeqCst) {
                        return (StatusCode::INTERNAL_SERVER_ERROR, "down".to_string());
                    }
                    if path == "livescore/4328" {
                        return (StatusCode::OK, r#"{"livescore":[{"idEvent":"1"}]}"#.to_string());
                    }
                    if path.starts_with("livescore") {
                        return (StatusCode::OK, r#"{"livescore":null}"#.to_string());
                    }
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, r#"{"table":[{"strTeam":"Arsenal","intRank":"1"}]}"#.to_string())
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Upstream { base: format!("http://{addr}/api"), table_hits, failing }
    }

    fn board(upstream: &str, clock: Arc<ManualClock>) -> Arc<TableBoard> {
        let cfg = test_config(upstream);
        let cache = ResponseCache::new(clock.clone(), 16);
        let edge = EdgeProxy::new(&cfg, cache, Arc::new(LatencyStats::new())).unwrap();
        TableBoard::new(edge, cfg.leagues.clone(), clock)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn unknown_league_is_rejected() {
        let clock = ManualClock::at(start());
        let board = board("http://127.0.0.1:9/api", clock);
        let err = board.serve(Some("l=9999")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(board.serve(None).await.is_err());
    }

    #[tokio::test]
    async fn live_refresh_then_hit_then_stale() {
        let upstream = spawn_upstream().await;
        let clock = ManualClock::at(start());
        let board = board(&upstream.base, clock.clone());

        let first = board.serve(Some("l=4328")).await.unwrap();
        assert_eq!(first.cache_status(), Some("MISS"));
        assert_eq!(first.headers.get("x-tables-live").unwrap(), "1");
        assert_eq!(first.headers.get("x-tables-refresh-ms").unwrap(), "60000");
        assert_eq!(upstream.table_hits.load(Ordering::SeqCst), 2, "both leagues refresh together");

        let second = board.serve(Some("l=4329")).await.unwrap();
        assert_eq!(second.cache_status(), Some("HIT"));

        clock.advance(chrono::Duration::seconds(61));
        upstream.failing.store(true, Ordering::SeqCst);
        let third = board.serve(Some("l=4328")).await.unwrap();
        assert_eq!(third.cache_status(), Some("STALE"));
        assert_eq!(third.body, first.body);
    }

    #[tokio::test]
    async fn refresh_failure_without_cache_is_bad_gateway() {
        let upstream = spawn_upstream().await;
        upstream.failing.store(true, Ordering::SeqCst);
        let clock = ManualClock::at(start());
        let board = board(&upstream.base, clock);
        let err = board.serve(Some("l=4328")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn ensure_fresh_skips_until_due() {
        let upstream = spawn_upstream().await;
        let clock = ManualClock::at(start());
        let board = board(&upstream.base, clock.clone());

        assert!(board.ensure_fresh().await.unwrap());
        assert!(!board.ensure_fresh().await.unwrap());
        clock.advance(chrono::Duration::seconds(60));
        assert!(board.ensure_fresh().await.unwrap());
        assert!(board.meta().await.unwrap().live_now);
    }
}
