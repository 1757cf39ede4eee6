use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::cadence;

// ---------------------------------------------------------------------------
// League
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    pub id: String,
    pub name: String,
}

impl League {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

// ---------------------------------------------------------------------------
// Upstream API version
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "v1" => Some(ApiVersion::V1),
            "v2" => Some(ApiVersion::V2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Fixture {
    pub id: Option<String>,
    pub league_id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub kickoff: Option<NaiveTime>,
    /// Upstream sent a kickoff time that could not be read.
    #[serde(default)]
    pub kickoff_unreadable: bool,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    /// Upstream status text (e.g. "FT", "2H", "Not Started").
    pub status: String,
    /// Upstream progress text, used when the status is empty (e.g. "67'").
    pub progress: String,
    pub venue: Option<String>,
}

impl Fixture {
    /// Identity shared by every endpoint that returns this match.
    pub fn key(&self) -> String {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return format!("id:{id}");
        }
        let date = self.date.map(|d| d.to_string()).unwrap_or_default();
        format!(
            "m:{date}|{}|{}",
            self.home_team.trim().to_lowercase(),
            self.away_team.trim().to_lowercase()
        )
    }

    pub fn score_pair(&self) -> Option<(i32, i32)> {
        Some((self.home_score?, self.away_score?))
    }

    pub fn has_score(&self) -> bool {
        self.score_pair().is_some()
    }

    /// Lower-cased status text, falling back to progress.
    pub fn status_text(&self) -> String {
        let s = if self.status.trim().is_empty() { &self.progress } else { &self.status };
        s.trim().to_lowercase()
    }

    /// Kickoff as a UTC instant. Upstream times are UTC.
    pub fn kickoff_at(&self) -> Option<DateTime<Utc>> {
        let date = self.date?;
        let time = self.kickoff?;
        Some(NaiveDateTime::new(date, time).and_utc())
    }

    /// Sort key used to order fixtures of equal state priority.
    pub fn kickoff_sort_key(&self) -> (Option<NaiveDate>, NaiveTime) {
        (self.date, self.kickoff.unwrap_or(NaiveTime::MIN))
    }

    pub fn involves(&self, team_id: Option<&str>, team_name: Option<&str>) -> bool {
        let id_match = team_id.is_some_and(|id| {
            self.home_team_id.as_deref() == Some(id) || self.away_team_id.as_deref() == Some(id)
        });
        let name_match = team_name.is_some_and(|name| {
            let name = name.trim().to_lowercase();
            !name.is_empty()
                && (self.home_team.trim().to_lowercase() == name
                    || self.away_team.trim().to_lowercase() == name)
        });
        id_match || name_match
    }

    /// Overlay `newer` onto this record: every field `newer` actually carries wins.
    pub fn overlay(&mut self, newer: &Fixture) {
        if newer.id.is_some() {
            self.id.clone_from(&newer.id);
        }
        if !newer.league_id.is_empty() {
            self.league_id.clone_from(&newer.league_id);
        }
        if !newer.home_team.is_empty() {
            self.home_team.clone_from(&newer.home_team);
        }
        if !newer.away_team.is_empty() {
            self.away_team.clone_from(&newer.away_team);
        }
        if newer.home_team_id.is_some() {
            self.home_team_id.clone_from(&newer.home_team_id);
        }
        if newer.away_team_id.is_some() {
            self.away_team_id.clone_from(&newer.away_team_id);
        }
        if newer.date.is_some() {
            self.date = newer.date;
        }
        if newer.kickoff.is_some() || newer.kickoff_unreadable {
            self.kickoff = newer.kickoff;
            self.kickoff_unreadable = newer.kickoff_unreadable;
        }
        if newer.home_score.is_some() {
            self.home_score = newer.home_score;
        }
        if newer.away_score.is_some() {
            self.away_score = newer.away_score;
        }
        if !newer.status.is_empty() {
            self.status.clone_from(&newer.status);
        }
        if !newer.progress.is_empty() {
            self.progress.clone_from(&newer.progress);
        }
        if newer.venue.is_some() {
            self.venue.clone_from(&newer.venue);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureState {
    Live,
    Upcoming,
    Final,
}

impl FixtureState {
    /// Display priority: live first, then upcoming, then final.
    pub fn priority(&self) -> u8 {
        match self {
            FixtureState::Live => 0,
            FixtureState::Upcoming => 1,
            FixtureState::Final => 2,
        }
    }
}

impl std::fmt::Display for FixtureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FixtureState::Live => "live",
            FixtureState::Upcoming => "upcoming",
            FixtureState::Final => "final",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Goal flash
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalFlash {
    /// Scoring team name, or "Goal Update" when both sides moved equally.
    pub team: String,
    /// "home - away" at the moment the change was seen.
    pub score: String,
    pub expires_at: DateTime<Utc>,
    /// Injected manually rather than detected.
    pub forced: bool,
}

impl GoalFlash {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Poll context & scheduler mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollContext {
    pub has_live_now: bool,
    pub has_today_fixtures: bool,
    pub favorite_team_plays_today: bool,
    pub viewing_today: bool,
    pub minutes_to_next_kickoff: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Live,
    Matchday,
    Idle,
}

impl SyncMode {
    pub fn delay(&self) -> Duration {
        let secs = match self {
            SyncMode::Live => cadence::LIVE_DELAY_SECS,
            SyncMode::Matchday => cadence::MATCHDAY_DELAY_SECS,
            SyncMode::Idle => cadence::IDLE_DELAY_SECS,
        };
        Duration::from_secs(secs)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncMode::Live => "live",
            SyncMode::Matchday => "matchday",
            SyncMode::Idle => "idle",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Reference records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Standing {
    pub rank: Option<u32>,
    pub team: String,
    pub team_id: Option<String>,
    pub played: Option<u32>,
    pub win: Option<u32>,
    pub draw: Option<u32>,
    pub loss: Option<u32>,
    pub goals_for: Option<i32>,
    pub goals_against: Option<i32>,
    pub goal_difference: Option<i32>,
    pub points: Option<i32>,
    pub form: Option<String>,
    pub badge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub league: Option<String>,
    pub badge: Option<String>,
    pub stadium: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LeagueMeta {
    pub id: String,
    pub name: String,
    pub badge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventStat {
    pub stat: String,
    pub home: Option<String>,
    pub away: Option<String>,
}

/// Team the viewer follows; matched against fixtures by id, then by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FavoriteTeam {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl FavoriteTeam {
    pub fn is_set(&self) -> bool {
        self.id.is_some() || self.name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(id: Option<&str>) -> Fixture {
        Fixture {
            id: id.map(str::to_string),
            league_id: "4328".to_string(),
            home_team: " Arsenal ".to_string(),
            away_team: "Chelsea".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19),
            ..Default::default()
        }
    }

    #[test]
    fn key_prefers_upstream_id() {
        assert_eq!(fixture(Some("123")).key(), "id:123");
    }

    #[test]
    fn key_falls_back_to_date_and_teams() {
        assert_eq!(fixture(None).key(), "m:2026-10-19|arsenal|chelsea");
        assert_eq!(fixture(Some("")).key(), "m:2026-10-19|arsenal|chelsea");
    }

    #[test]
    fn overlay_keeps_fields_the_newer_record_lacks() {
        let mut base = fixture(Some("1"));
        base.kickoff = NaiveTime::from_hms_opt(15, 0, 0);
        base.venue = Some("Emirates".to_string());

        let newer = Fixture {
            id: Some("1".to_string()),
            home_score: Some(2),
            away_score: Some(1),
            status: "2H".to_string(),
            ..Default::default()
        };
        base.overlay(&newer);

        assert_eq!(base.score_pair(), Some((2, 1)));
        assert_eq!(base.status, "2H");
        assert_eq!(base.venue.as_deref(), Some("Emirates"));
        assert_eq!(base.home_team, " Arsenal ");
    }

    #[test]
    fn involves_matches_id_or_name() {
        let mut f = fixture(Some("1"));
        f.away_team_id = Some("133610".to_string());
        assert!(f.involves(Some("133610"), None));
        assert!(f.involves(None, Some("arsenal")));
        assert!(!f.involves(Some("999"), Some("Spurs")));
    }
}
