pub mod client;
pub mod parse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::proxy::{ApiRoute, EdgeProxy};
use crate::types::ApiVersion;

pub use client::FetchClient;

/// Where the fetch client sends its requests. Non-2xx replies are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, version: ApiVersion, path_and_query: &str) -> Result<Value>;
}

/// In-process: requests go through the edge proxy and share its cache.
#[async_trait]
impl Transport for EdgeProxy {
    async fn get_json(&self, version: ApiVersion, path_and_query: &str) -> Result<Value> {
        let route = ApiRoute::new(version, path_and_query).map_err(|e| AppError::Upstream {
            status: e.status().as_u16(),
            body: e.to_string(),
        })?;
        let resp = self.serve(&route).await.map_err(|e| AppError::Upstream {
            status: e.status().as_u16(),
            body: e.to_string(),
        })?;
        if !resp.status.is_success() {
            return Err(AppError::Upstream {
                status: resp.status.as_u16(),
                body: String::from_utf8_lossy(&resp.body).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&resp.body)?)
    }
}

/// Remote: requests go over HTTP to a proxy deployed elsewhere (`PROXY_BASE_URL`).
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn url_for(&self, version: ApiVersion, path_and_query: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, version, path_and_query)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, version: ApiVersion, path_and_query: &str) -> Result<Value> {
        let resp = self.client.get(self.url_for(version, path_and_query)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream { status: status.as_u16(), body });
        }
        Ok(resp.json().await?)
    }
}

/// One request in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVariant {
    pub version: ApiVersion,
    pub path_and_query: String,
}

impl RequestVariant {
    pub fn v1(path_and_query: impl Into<String>) -> Self {
        Self { version: ApiVersion::V1, path_and_query: path_and_query.into() }
    }

    pub fn v2(path_and_query: impl Into<String>) -> Self {
        Self { version: ApiVersion::V2, path_and_query: path_and_query.into() }
    }
}

/// Try each variant in order; the first one whose extracted list is non-empty
/// wins. Failures are logged and the chain moves on. Exhaustion is an empty
/// list, never an error.
pub async fn first_non_empty<T, F>(
    transport: &Arc<dyn Transport>,
    resource: &str,
    variants: &[RequestVariant],
    extract: F,
) -> Vec<T>
where
    F: Fn(&Value) -> Vec<T>,
{
    for variant in variants {
        match transport.get_json(variant.version, &variant.path_and_query).await {
            Ok(payload) => {
                let rows = extract(&payload);
                if !rows.is_empty() {
                    debug!(
                        resource,
                        version = %variant.version,
                        path = %variant.path_and_query,
                        rows = rows.len(),
                        "[FETCH] variant resolved"
                    );
                    return rows;
                }
            }
            Err(e) => warn!(
                resource,
                version = %variant.version,
                path = %variant.path_and_query,
                "[FETCH] variant failed: {e}"
            ),
        }
    }
    debug!(resource, variants = variants.len(), "[FETCH] chain exhausted, empty result");
    Vec::new()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted transport: each `(version, path)` maps to a canned reply.
    /// Unscripted requests fail. Every request is recorded.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        replies: Mutex<HashMap<String, std::result::Result<Value, u16>>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn ok(self, version: ApiVersion, path: &str, payload: Value) -> Self {
            self.set(version, path, payload);
            self
        }

        pub(crate) fn fail(self, version: ApiVersion, path: &str, status: u16) -> Self {
            self.replies.lock().unwrap().insert(format!("{version}/{path}"), Err(status));
            self
        }

        /// Replace a reply while the transport is in use.
        pub(crate) fn set(&self, version: ApiVersion, path: &str, payload: Value) {
            self.replies.lock().unwrap().insert(format!("{version}/{path}"), Ok(payload));
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get_json(&self, version: ApiVersion, path_and_query: &str) -> Result<Value> {
            let key = format!("{version}/{path_and_query}");
            self.calls.lock().unwrap().push(key.clone());
            let reply = self.replies.lock().unwrap().get(&key).cloned();
            match reply {
                Some(Ok(v)) => Ok(v),
                Some(Err(status)) => Err(AppError::Upstream { status, body: String::new() }),
                None => Err(AppError::Upstream { status: 404, body: format!("unscripted {key}") }),
            }
        }
    }

    fn events(payload: &Value) -> Vec<Value> {
        parse::extract_array(payload, "events")
    }

    #[tokio::test]
    async fn failing_variant_falls_through_to_next() {
        let transport: Arc<dyn Transport> = Arc::new(
            ScriptedTransport::default()
                .fail(ApiVersion::V1, "a.php", 500)
                .ok(ApiVersion::V1, "b.php", serde_json::json!({ "events": [{ "idEvent": "7" }] })),
        );
        let rows = first_non_empty(
            &transport,
            "test",
            &[RequestVariant::v1("a.php"), RequestVariant::v1("b.php")],
            events,
        )
        .await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["idEvent"], "7");
    }

    #[tokio::test]
    async fn exhausted_chain_is_empty_not_error() {
        let transport: Arc<dyn Transport> = Arc::new(
            ScriptedTransport::default()
                .ok(ApiVersion::V1, "a.php", serde_json::json!({ "events": null }))
                .ok(ApiVersion::V2, "b", serde_json::json!({ "events": [] })),
        );
        let rows = first_non_empty(
            &transport,
            "test",
            &[RequestVariant::v1("a.php"), RequestVariant::v2("b")],
            events,
        )
        .await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn first_non_empty_variant_stops_the_chain() {
        let scripted = Arc::new(
            ScriptedTransport::default()
                .ok(ApiVersion::V1, "a.php", serde_json::json!({ "events": [{}] }))
                .ok(ApiVersion::V1, "b.php", serde_json::json!({ "events": [{}, {}] })),
        );
        let transport: Arc<dyn Transport> = scripted.clone();
        let rows = first_non_empty(
            &transport,
            "test",
            &[RequestVariant::v1("a.php"), RequestVariant::v1("b.php")],
            events,
        )
        .await;
        assert_eq!(rows.len(), 1);
        assert_eq!(scripted.call_count(), 1);
    }

    #[tokio::test]
    async fn edge_transport_surfaces_upstream_errors() {
        use crate::api::latency::LatencyStats;
        use crate::clock::SystemClock;
        use crate::proxy::edge::tests::{spawn_upstream, test_config};
        use crate::state::ResponseCache;

        let (upstream, _) = spawn_upstream().await;
        let cfg = test_config(&upstream);
        let cache = ResponseCache::new(Arc::new(SystemClock), 16);
        let edge = EdgeProxy::new(&cfg, cache, Arc::new(LatencyStats::new())).unwrap();

        let ok = edge.get_json(ApiVersion::V1, "eventsday.php?d=2026-10-19").await.unwrap();
        assert_eq!(ok["path"], "eventsday.php");

        let err = edge.get_json(ApiVersion::V1, "broken.php").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 503, .. }));
    }

    #[test]
    fn http_transport_targets_proxy_route() {
        let transport = HttpTransport::new("https://edge.example/", 5).unwrap();
        assert_eq!(
            transport.url_for(ApiVersion::V2, "livescore/4328"),
            "https://edge.example/api/v2/livescore/4328"
        );
    }
}
