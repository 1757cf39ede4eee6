use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::config::{Config, CACHE_STATUS_HEADER};
use crate::error::{AppError, ProxyError};
use crate::proxy::route::ApiRoute;
use crate::state::response_cache::{CacheEntry, ResponseCache};
use crate::types::ApiVersion;

/// Upstream headers worth keeping on a cached response.
fn forwarded_headers() -> [HeaderName; 3] {
    [header::CONTENT_TYPE, header::ETAG, header::LAST_MODIFIED]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Stale,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Stale => "STALE",
        }
    }
}

// ---------------------------------------------------------------------------
// ProxyResponse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn from_entry(entry: &CacheEntry, cache_status: CacheStatus) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &entry.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(n, v);
            }
        }
        set_cache_status(&mut headers, cache_status);
        Self {
            status: StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK),
            headers,
            body: entry.body.clone(),
        }
    }

    pub fn cache_status(&self) -> Option<&str> {
        self.headers.get(CACHE_STATUS_HEADER).and_then(|v| v.to_str().ok())
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

pub fn set_cache_status(headers: &mut HeaderMap, status: CacheStatus) {
    headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(status.as_str()),
    );
}

pub fn cache_control_value(ttl_secs: u64) -> String {
    format!("public, max-age={ttl_secs}, s-maxage={ttl_secs}")
}

/// Raw upstream reply, before any cache decision.
pub struct UpstreamReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

// ---------------------------------------------------------------------------
// EdgeProxy
// ---------------------------------------------------------------------------

/// Caching front for the upstream sports data API.
///
/// Fresh cache entries are served as `HIT`. Otherwise the request goes
/// upstream: failures pass straight through uncached, successes are tagged
/// `MISS`, given a TTL by path category and written back to the cache on a
/// spawned task so the caller never waits on the write.
pub struct EdgeProxy {
    client: reqwest::Client,
    cache: Arc<ResponseCache>,
    upstream_base_url: String,
    api_key: String,
    latency: Arc<LatencyStats>,
}

impl EdgeProxy {
    pub fn new(
        cfg: &Config,
        cache: Arc<ResponseCache>,
        latency: Arc<LatencyStats>,
    ) -> crate::error::Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
            .build()?;
        Ok(Arc::new(Self {
            client,
            cache,
            upstream_base_url: cfg.upstream_base_url.clone(),
            api_key: cfg.api_key.clone(),
            latency,
        }))
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn upstream_url(&self, version: ApiVersion, path_and_query: &str) -> String {
        format!(
            "{}/{}/json/{}/{}",
            self.upstream_base_url, version, self.api_key, path_and_query
        )
    }

    /// Serve one API request through the cache.
    pub async fn serve(&self, route: &ApiRoute) -> Result<ProxyResponse, ProxyError> {
        let key = route.cache_key();

        if let Some(entry) = self.cache.get(&key) {
            debug!(key = %key, "[PROXY] cache hit");
            return Ok(ProxyResponse::from_entry(&entry, CacheStatus::Hit));
        }

        let reply = self.fetch_upstream(route.version, &route.path_and_query()).await?;

        if !reply.status.is_success() {
            warn!(
                key = %key,
                status = reply.status.as_u16(),
                "[PROXY] upstream error passed through (not cached)"
            );
            return Ok(passthrough_error(reply, "Upstream error"));
        }

        let ttl = route.ttl_secs();
        let mut stored_headers: Vec<(String, String)> = forwarded_headers()
            .iter()
            .filter_map(|name| {
                reply
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        stored_headers.push((header::CACHE_CONTROL.as_str().to_string(), cache_control_value(ttl)));

        let entry = CacheEntry::new(
            reply.status.as_u16(),
            stored_headers,
            reply.body,
            self.cache.now(),
            ttl,
        );
        let response = ProxyResponse::from_entry(&entry, CacheStatus::Miss);

        let cache = Arc::clone(&self.cache);
        let write_key = key.clone();
        tokio::spawn(async move {
            cache.insert(write_key, entry);
        });

        debug!(key = %key, ttl, "[PROXY] cache miss, stored");
        Ok(response)
    }

    /// Fetch straight from upstream, bypassing the cache. Records latency.
    pub async fn fetch_upstream(
        &self,
        version: ApiVersion,
        path_and_query: &str,
    ) -> Result<UpstreamReply, ProxyError> {
        let url = self.upstream_url(version, path_and_query);
        let mut req = self.client.get(&url);
        if version == ApiVersion::V2 {
            req = req.header("X-API-KEY", &self.api_key);
        }

        let started = Instant::now();
        let resp = req.send().await.map_err(|e| {
            warn!(path = path_and_query, "[PROXY] upstream request failed: {e}");
            ProxyError::from(e)
        })?;
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = convert_headers(resp.headers());
        let body = resp.bytes().await?;
        self.latency.record(started.elapsed());

        Ok(UpstreamReply { status, headers, body })
    }

    /// Upstream JSON, uncached. Non-2xx becomes [`AppError::Upstream`].
    pub async fn fetch_upstream_json(
        &self,
        version: ApiVersion,
        path_and_query: &str,
    ) -> crate::error::Result<serde_json::Value> {
        let reply = self.fetch_upstream(version, path_and_query).await.map_err(|e| {
            AppError::Upstream { status: e.status().as_u16(), body: e.to_string() }
        })?;
        if !reply.status.is_success() {
            return Err(AppError::Upstream {
                status: reply.status.as_u16(),
                body: String::from_utf8_lossy(&reply.body).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&reply.body)?)
    }
}

/// Non-2xx upstream reply forwarded with its status and body.
pub fn passthrough_error(reply: UpstreamReply, label: &str) -> ProxyResponse {
    let body = if reply.body.is_empty() {
        Bytes::from(format!("{label} ({})", reply.status.as_u16()))
    } else {
        reply.body
    };
    let content_type = reply
        .headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("text/plain"));
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    ProxyResponse { status: reply.status, headers, body }
}

/// reqwest and axum may sit on different `http` crate versions; copy by bytes.
pub fn convert_headers(src: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in src {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(n, v);
        }
    }
    out
}

pub fn log_startup(cfg: &Config) {
    info!(
        upstream = %cfg.upstream_base_url,
        image_hosts = %cfg.image_host_suffix,
        "[PROXY] edge proxy ready"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
