use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Deserialize;
use serde_json::json;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct ContextResponse {
    pub has_live_now: bool,
    pub has_today_fixtures: bool,
    pub favorite_team_plays_today: bool,
    pub viewing_today: bool,
    pub minutes_to_next_kickoff: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FavoriteResponse {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct StatusResponse {
    pub mode: String,
    pub context: Option<ContextResponse>,
    pub next_delay_secs: u64,
    pub last_refresh: Option<String>,
    pub in_flight: bool,
    pub selected_date: Option<NaiveDate>,
    pub selected_league: Option<String>,
    pub favorite: FavoriteResponse,
    pub active_flashes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct FlashResponse {
    pub team: String,
    pub score: String,
    pub expires_at: String,
    pub forced: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct FixtureRow {
    pub key: String,
    pub state: String,
    pub league_id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: Option<String>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: String,
    pub progress: String,
    pub flash: Option<FlashResponse>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FixturesResponse {
    pub date: Option<NaiveDate>,
    pub league: Option<String>,
    pub fixtures: Vec<FixtureRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct TableResponse {
    pub league: LeagueRef,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub sync: StatusResponse,
    pub fixtures: FixturesResponse,
    pub leagues: Vec<LeagueRef>,
    pub notice: Option<String>,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            sync: StatusResponse::default(),
            fixtures: FixturesResponse::default(),
            leagues: Vec::new(),
            notice: None,
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let status_url = format!("{}/sync/status", self.base_url);
        let fixtures_url = format!("{}/sync/fixtures", self.base_url);

        let (status_res, fixtures_res) =
            tokio::join!(client.get(&status_url).send(), client.get(&fixtures_url).send());

        let (status_resp, fixtures_resp) = match (status_res, fixtures_res) {
            (Ok(s), Ok(f)) => (s, f),
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        let (sync, fixtures) = tokio::join!(
            status_resp.json::<StatusResponse>(),
            fixtures_resp.json::<FixturesResponse>(),
        );

        match (sync, fixtures) {
            (Ok(s), Ok(f)) => {
                self.sync = s;
                self.fixtures = f;
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();
            }
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }

        if self.leagues.is_empty() {
            let tables_url = format!("{}/sync/tables", self.base_url);
            if let Ok(resp) = client.get(&tables_url).send().await {
                if let Ok(tables) = resp.json::<Vec<TableResponse>>().await {
                    self.leagues = tables.into_iter().map(|t| t.league).collect();
                }
            }
        }
    }

    /// Ask the engine for an immediate cycle.
    pub async fn request_refresh(&mut self, client: &reqwest::Client) {
        let url = format!("{}/sync/refresh", self.base_url);
        self.notice = match client.post(&url).send().await {
            Ok(resp) if resp.status().as_u16() == 202 => Some("refresh started".to_string()),
            Ok(_) => Some("refresh already running".to_string()),
            Err(e) => Some(format!("refresh failed: {e}")),
        };
    }

    pub async fn request_goal_test(&mut self, client: &reqwest::Client) {
        let url = format!("{}/sync/goal-test", self.base_url);
        self.notice = match client.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => Some("test flash injected".to_string()),
            Ok(resp) => Some(format!("goal test rejected: {}", resp.status())),
            Err(e) => Some(format!("goal test failed: {e}")),
        };
    }

    /// Move the viewed date by `days` relative to the current selection.
    pub async fn shift_date(&mut self, client: &reqwest::Client, days: i64) {
        let Some(current) = self.sync.selected_date.or(self.fixtures.date) else {
            return;
        };
        let target = current + ChronoDuration::days(days);
        self.select(client, json!({ "date": target })).await;
    }

    /// Step through ALL then each configured league.
    pub async fn cycle_league(&mut self, client: &reqwest::Client) {
        let next = next_league(&self.leagues, self.fixtures.league.as_deref());
        self.select(client, json!({ "league": next })).await;
    }

    async fn select(&mut self, client: &reqwest::Client, body: serde_json::Value) {
        let url = format!("{}/sync/selection", self.base_url);
        match client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.notice = None;
                self.refresh(client).await;
            }
            Ok(resp) => self.notice = Some(format!("selection rejected: {}", resp.status())),
            Err(e) => self.notice = Some(format!("selection failed: {e}")),
        }
    }

    pub fn league_label(&self) -> String {
        match self.fixtures.league.as_deref() {
            None => "All leagues".to_string(),
            Some(id) => self
                .leagues
                .iter()
                .find(|l| l.id == id)
                .map(|l| l.name.clone())
                .unwrap_or_else(|| id.to_string()),
        }
    }
}

pub fn next_league(leagues: &[LeagueRef], current: Option<&str>) -> String {
    let Some(current) = current else {
        return leagues.first().map(|l| l.id.clone()).unwrap_or_else(|| "ALL".to_string());
    };
    match leagues.iter().position(|l| l.id == current) {
        Some(i) if i + 1 < leagues.len() => leagues[i + 1].id.clone(),
        _ => "ALL".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_score(home: Option<i32>, away: Option<i32>) -> String {
    match (home, away) {
        (Some(h), Some(a)) => format!("{h} - {a}"),
        _ => "v".to_string(),
    }
}

/// `HH:MM:SS` kickoff trimmed to `HH:MM`.
pub fn format_kickoff(kickoff: Option<&str>) -> String {
    match kickoff {
        Some(k) if k.len() >= 5 => k[..5].to_string(),
        Some(k) => k.to_string(),
        None => "—".to_string(),
    }
}

pub fn format_minutes(minutes: Option<i64>) -> String {
    match minutes {
        Some(m) if m >= 60 => format!("{}h{:02}m", m / 60, m % 60),
        Some(m) => format!("{m}m"),
        None => "—".to_string(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn main() {
    // Board state lives here; the entry point is src/bin/board.rs
}
