use crate::error::{AppError, Result};
use crate::types::League;

pub const UPSTREAM_BASE_URL: &str = "https://www.thesportsdb.com/api";
pub const DEFAULT_API_KEY: &str = "074910";
pub const DEFAULT_LEAGUES: &str = "4328:English Premier League,4329:English League Championship";
pub const DEFAULT_IMAGE_HOST_SUFFIX: &str = "thesportsdb.com";

/// Response header carrying the cache indicator (`HIT` / `MISS` / `STALE`).
pub const CACHE_STATUS_HEADER: &str = "x-proxy-cache";

/// Proxy TTL tiers (seconds), selected from the upstream path at write time.
pub mod ttl {
    pub const LIVE_SECS: u64 = 20;
    pub const DAY_EVENTS_SECS: u64 = 60;
    pub const REFERENCE_SECS: u64 = 300;
    pub const DEFAULT_SECS: u64 = 120;
    pub const IMAGE_SECS: u64 = 3600;
}

/// Scheduler cadence per mode (seconds).
pub mod cadence {
    pub const LIVE_DELAY_SECS: u64 = 20;
    pub const MATCHDAY_DELAY_SECS: u64 = 60;
    pub const IDLE_DELAY_SECS: u64 = 300;
}

/// Staleness windows for the per-category refetch predicates (seconds).
pub mod staleness {
    pub const STATIC_MAX_AGE_SECS: i64 = 30 * 60;
    pub const STANDINGS_LIVE_MAX_AGE_SECS: i64 = 60;
    pub const STANDINGS_IDLE_MAX_AGE_SECS: i64 = 15 * 60;
    pub const PROBE_MATCHDAY_INTERVAL_SECS: i64 = 60;
    pub const PROBE_IDLE_INTERVAL_SECS: i64 = 600;
    /// A kickoff closer than this makes live probing worthwhile outside matchday.
    pub const PROBE_KICKOFF_HORIZON_MINUTES: i64 = 120;
}

/// Goal flash visibility window (milliseconds).
pub const GOAL_FLASH_WINDOW_MS: i64 = 7_000;

/// Kickoff assumed for a scored fixture that carries no kickoff time (UTC).
pub const MISSING_KICKOFF_HOUR_UTC: u32 = 12;

/// A fixture with a score whose kickoff was less than this long ago is treated as live.
pub const LIVE_WINDOW_AFTER_KICKOFF_MINUTES: i64 = 180;

/// Server-side standings refresh cadence (milliseconds).
pub const TABLES_REFRESH_LIVE_MS: i64 = 60 * 1000;
pub const TABLES_REFRESH_IDLE_MS: i64 = 15 * 60 * 1000;
pub const TABLES_CACHE_MAX_AGE_SECS: u64 = 30;

/// How often the standings warmer re-checks freshness.
pub const TABLE_WARM_INTERVAL_SECS: u64 = 60;

/// How often expired cache entries are swept.
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    pub upstream_base_url: String,
    /// Upstream API key (SPORTSDB_KEY); sent in the path for v1 and as a header for v2.
    pub api_key: String,
    pub upstream_timeout_secs: u64,
    /// Images are only proxied from this host or its subdomains (IMAGE_HOST_SUFFIX).
    pub image_host_suffix: String,
    pub leagues: Vec<League>,
    pub favorite_team_id: Option<String>,
    pub favorite_team_name: Option<String>,
    /// When set, the fetch client talks to a remote proxy instead of the in-process one.
    pub proxy_base_url: Option<String>,
    pub cache_max_entries: usize,
    pub sync_enabled: bool,
    pub table_warm_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let leagues = parse_leagues(
            &std::env::var("LEAGUES").unwrap_or_else(|_| DEFAULT_LEAGUES.to_string()),
        );
        if leagues.is_empty() {
            return Err(AppError::Config(
                "LEAGUES must list at least one id:name pair".to_string(),
            ));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            upstream_base_url: std::env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| UPSTREAM_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: std::env::var("SPORTSDB_KEY").unwrap_or_else(|_| DEFAULT_API_KEY.to_string()),
            upstream_timeout_secs: std::env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse::<u64>()
                .unwrap_or(15),
            image_host_suffix: std::env::var("IMAGE_HOST_SUFFIX")
                .unwrap_or_else(|_| DEFAULT_IMAGE_HOST_SUFFIX.to_string())
                .to_lowercase(),
            leagues,
            favorite_team_id: non_empty_env("FAVORITE_TEAM_ID"),
            favorite_team_name: non_empty_env("FAVORITE_TEAM_NAME"),
            proxy_base_url: non_empty_env("PROXY_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
            cache_max_entries: std::env::var("CACHE_MAX_ENTRIES")
                .unwrap_or_else(|_| "2048".to_string())
                .parse::<usize>()
                .unwrap_or(2048),
            sync_enabled: env_flag("SYNC_ENABLED", true),
            table_warm_enabled: env_flag("TABLE_WARM_ENABLED", true),
        })
    }
}

/// Parse `id:name` pairs separated by commas. A bare id uses itself as the name.
pub fn parse_leagues(raw: &str) -> Vec<League> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((id, name)) => League::new(id.trim(), name.trim()),
            None => League::new(pair, pair),
        })
        .filter(|l| !l.id.is_empty())
        .collect()
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        Err(_) => default,
    }
}
