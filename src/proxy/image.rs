use std::sync::Arc;

use axum::http::{header, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::ttl;
use crate::error::ProxyError;
use crate::proxy::edge::{
    cache_control_value, convert_headers, passthrough_error, CacheStatus, EdgeProxy, ProxyResponse,
    UpstreamReply,
};
use crate::state::response_cache::CacheEntry;

/// Proxies badge/logo images from the upstream image host family only.
pub struct ImageProxy {
    edge: Arc<EdgeProxy>,
    host_suffix: String,
}

impl ImageProxy {
    pub fn new(edge: Arc<EdgeProxy>, host_suffix: impl Into<String>) -> Self {
        Self { edge, host_suffix: host_suffix.into().to_lowercase() }
    }

    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        host == self.host_suffix || host.ends_with(&format!(".{}", self.host_suffix))
    }

    /// Validate the `url` parameter. All rejections happen here, before any
    /// upstream call.
    pub fn validate(&self, raw_target: Option<&str>) -> Result<Url, ProxyError> {
        let raw = raw_target.map(str::trim).filter(|s| !s.is_empty()).ok_or(ProxyError::MissingImageUrl)?;
        let target = Url::parse(raw).map_err(|_| ProxyError::InvalidImageUrl)?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(ProxyError::UnsupportedProtocol);
        }
        let host = target.host_str().ok_or(ProxyError::InvalidImageUrl)?;
        if !self.is_allowed_host(host) {
            return Err(ProxyError::HostNotAllowed);
        }
        Ok(target)
    }

    /// `query` is the raw inbound query string; it doubles as the cache key.
    pub async fn serve(&self, query: Option<&str>) -> Result<ProxyResponse, ProxyError> {
        let raw_target = query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "url")
                .map(|(_, v)| v.into_owned())
        });
        let target = self.validate(raw_target.as_deref())?;

        let key = format!("/api/image?{}", query.unwrap_or_default());
        let cache = self.edge.cache();
        if let Some(entry) = cache.get(&key) {
            debug!(key = %key, "[IMAGE] cache hit");
            return Ok(ProxyResponse::from_entry(&entry, CacheStatus::Hit));
        }

        let resp = self.edge.client().get(target.as_str()).send().await?;
        let landed = resp.url().host_str().unwrap_or_default();
        if !self.is_allowed_host(landed) {
            warn!(target = %target, landed = %resp.url(), "[IMAGE] redirect left the allowed hosts");
            return Err(ProxyError::HostNotAllowed);
        }
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = convert_headers(resp.headers());
        let body = resp.bytes().await?;

        if !status.is_success() {
            warn!(target = %target, status = status.as_u16(), "[IMAGE] upstream image error");
            let reply = UpstreamReply { status, headers: Default::default(), body: Default::default() };
            return Ok(passthrough_error(reply, "Upstream image error"));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_lowercase().starts_with("image/") {
            warn!(target = %target, content_type = %content_type, "[IMAGE] rejected non-image content");
            return Err(ProxyError::UnsupportedContentType);
        }

        let entry = CacheEntry::new(
            status.as_u16(),
            vec![
                (header::CONTENT_TYPE.as_str().to_string(), content_type),
                (header::CACHE_CONTROL.as_str().to_string(), cache_control_value(ttl::IMAGE_SECS)),
            ],
            body,
            cache.now(),
            ttl::IMAGE_SECS,
        );
        let response = ProxyResponse::from_entry(&entry, CacheStatus::Miss);

        let cache = Arc::clone(cache);
        tokio::spawn(async move {
            cache.insert(key, entry);
        });

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::latency::LatencyStats;
    use crate::clock::SystemClock;
    use crate::proxy::edge::tests::test_config;
    use crate::state::ResponseCache;

    fn image_proxy() -> ImageProxy {
        let cfg = test_config("http://127.0.0.1:9/api");
        let cache = ResponseCache::new(Arc::new(SystemClock), 16);
        let edge = EdgeProxy::new(&cfg, cache, Arc::new(LatencyStats::new())).unwrap();
        ImageProxy::new(edge, "thesportsdb.com")
    }

    #[test]
    fn host_family_is_allow_listed() {
        let proxy = image_proxy();
        assert!(proxy.is_allowed_host("thesportsdb.com"));
        assert!(proxy.is_allowed_host("www.thesportsdb.com"));
        assert!(proxy.is_allowed_host("R2.TheSportsDB.com"));
        assert!(!proxy.is_allowed_host("evilthesportsdb.com"));
        assert!(!proxy.is_allowed_host("thesportsdb.com.evil.net"));
    }

    #[test]
    fn validation_rejections() {
        let proxy = image_proxy();
        assert!(matches!(proxy.validate(None), Err(ProxyError::MissingImageUrl)));
        assert!(matches!(proxy.validate(Some("not a url")), Err(ProxyError::InvalidImageUrl)));
        assert!(matches!(
            proxy.validate(Some("ftp://www.thesportsdb.com/badge.png")),
            Err(ProxyError::UnsupportedProtocol)
        ));
        assert!(matches!(
            proxy.validate(Some("https://example.com/badge.png")),
            Err(ProxyError::HostNotAllowed)
        ));
        assert!(proxy
            .validate(Some("https://www.thesportsdb.com/images/media/team/badge/x.png"))
            .is_ok());
    }

    async fn spawn_image_host() -> String {
        use axum::routing::get;
        let app = axum::Router::new()
            .route(
                "/badge.png",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![0x89u8, b'P', b'N', b'G']) }),
            )
            .route(
                "/page",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let offsite = format!("http://localhost:{}/badge.png", addr.port());
        let app = app.route(
            "/hop",
            get(move || async move { axum::response::Redirect::temporary(&offsite) }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn local_image_proxy() -> ImageProxy {
        let cfg = test_config("http://127.0.0.1:9/api");
        let cache = ResponseCache::new(Arc::new(SystemClock), 16);
        let edge = EdgeProxy::new(&cfg, cache, Arc::new(LatencyStats::new())).unwrap();
        ImageProxy::new(edge, "127.0.0.1")
    }

    #[tokio::test]
    async fn image_is_served_with_hour_ttl() {
        let base = spawn_image_host().await;
        let proxy = local_image_proxy();
        let query = format!("url={}", urlencoding::encode(&format!("{base}/badge.png")));

        let resp = proxy.serve(Some(&query)).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.cache_status(), Some("MISS"));
        assert_eq!(resp.headers.get(header::CONTENT_TYPE).unwrap(), "image/png");
        assert_eq!(
            resp.headers.get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=3600, s-maxage=3600"
        );
    }

    #[tokio::test]
    async fn non_image_content_is_rejected_despite_2xx() {
        let base = spawn_image_host().await;
        let proxy = local_image_proxy();
        let query = format!("url={}", urlencoding::encode(&format!("{base}/page")));

        let err = proxy.serve(Some(&query)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(proxy.edge.cache().len(), 0);
    }

    #[tokio::test]
    async fn redirect_to_unlisted_host_is_refused() {
        let base = spawn_image_host().await;
        let proxy = local_image_proxy();
        let query = format!("url={}", urlencoding::encode(&format!("{base}/hop")));

        let err = proxy.serve(Some(&query)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(proxy.edge.cache().len(), 0);
    }

    #[tokio::test]
    async fn disallowed_host_never_reaches_network() {
        let proxy = image_proxy();
        let err = proxy
            .serve(Some("url=https%3A%2F%2Fexample.com%2Fa.png"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
