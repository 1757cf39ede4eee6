use crate::config::ttl;
use crate::error::ProxyError;
use crate::types::ApiVersion;

/// A parsed `/api/{version}/{upstream-path}?{query}` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRoute {
    pub version: ApiVersion,
    /// Upstream path without leading slashes, still percent-encoded.
    pub path: String,
    pub query: Option<String>,
}

impl ApiRoute {
    pub fn new(version: ApiVersion, path_and_query: &str) -> Result<Self, ProxyError> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        Self::from_parts(version, path, query)
    }

    /// Parse the raw request path (`/api/v1/eventsday.php`) and query string.
    pub fn from_request(path: &str, query: Option<&str>) -> Result<Self, ProxyError> {
        let trimmed = path.trim_start_matches('/');
        let rest = trimmed.strip_prefix("api/").ok_or(ProxyError::InvalidRoute)?;
        let (version, upstream_path) = match rest.split_once('/') {
            Some((v, p)) => (v, p),
            None => (rest, ""),
        };
        let version = ApiVersion::parse(version).ok_or(ProxyError::InvalidVersion)?;
        Self::from_parts(version, upstream_path, query)
    }

    fn from_parts(version: ApiVersion, path: &str, query: Option<&str>) -> Result<Self, ProxyError> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(ProxyError::MissingPath);
        }
        Ok(Self {
            version,
            path: path.to_string(),
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Cache key: the inbound request URL as the proxy sees it. Deterministic
    /// for a given version, path and query string.
    pub fn cache_key(&self) -> String {
        format!("/api/{}/{}", self.version, self.path_and_query())
    }

    pub fn ttl_secs(&self) -> u64 {
        ttl_for_path(&self.path)
    }
}

/// TTL tier for an upstream path: live scores are hottest, reference data coldest.
pub fn ttl_for_path(path: &str) -> u64 {
    let p = path.to_lowercase();
    if p.contains("livescore") {
        return ttl::LIVE_SECS;
    }
    if p.contains("eventsday") || p.contains("eventsnext") || p.contains("eventspast") {
        return ttl::DAY_EVENTS_SECS;
    }
    if p.contains("lookuptable")
        || p.contains("lookup_all_teams")
        || p.contains("search_all_teams")
        || p.contains("lookupleague")
    {
        return ttl::REFERENCE_SECS;
    }
    ttl::DEFAULT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_tiers() {
        assert_eq!(ttl_for_path("livescore/4328"), 20);
        assert_eq!(ttl_for_path("LiveScore.php"), 20);
        assert_eq!(ttl_for_path("eventsday.php"), 60);
        assert_eq!(ttl_for_path("eventsnextleague.php"), 60);
        assert_eq!(ttl_for_path("eventspastleague.php"), 60);
        assert_eq!(ttl_for_path("lookup_all_teams.php"), 300);
        assert_eq!(ttl_for_path("lookuptable.php"), 300);
        assert_eq!(ttl_for_path("lookupleague.php"), 300);
        assert_eq!(ttl_for_path("lookupteam.php"), 120);
        assert_eq!(ttl_for_path("searchplayers.php"), 120);
    }

    #[test]
    fn parses_request_path() {
        let route = ApiRoute::from_request("/api/v1/eventsday.php", Some("d=2026-10-19&l=4328")).unwrap();
        assert_eq!(route.version, ApiVersion::V1);
        assert_eq!(route.path, "eventsday.php");
        assert_eq!(route.cache_key(), "/api/v1/eventsday.php?d=2026-10-19&l=4328");
    }

    #[test]
    fn nested_upstream_path_is_kept() {
        let route = ApiRoute::from_request("/api/v2/livescore/4328", None).unwrap();
        assert_eq!(route.version, ApiVersion::V2);
        assert_eq!(route.path_and_query(), "livescore/4328");
        assert_eq!(route.cache_key(), "/api/v2/livescore/4328");
    }

    #[test]
    fn rejects_malformed_routes() {
        assert!(matches!(
            ApiRoute::from_request("/api/v3/eventsday.php", None),
            Err(ProxyError::InvalidVersion)
        ));
        assert!(matches!(ApiRoute::from_request("/api/v1", None), Err(ProxyError::MissingPath)));
        assert!(matches!(ApiRoute::from_request("/api/v1/", None), Err(ProxyError::MissingPath)));
        assert!(matches!(ApiRoute::from_request("/other/v1/x", None), Err(ProxyError::InvalidRoute)));
    }

    #[test]
    fn in_process_route_matches_inbound_key() {
        let inbound = ApiRoute::from_request("/api/v1/lookuptable.php", Some("l=4328")).unwrap();
        let local = ApiRoute::new(ApiVersion::V1, "lookuptable.php?l=4328").unwrap();
        assert_eq!(inbound.cache_key(), local.cache_key());
    }
}
