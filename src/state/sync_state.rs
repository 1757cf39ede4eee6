use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::classify::sort_fixtures;
use crate::sync::diff::{merge_fixtures, GoalTracker};
use crate::sync::scheduler::{live_probe_due, standings_due, static_due, RefreshPlan};
use crate::types::{FavoriteTeam, Fixture, League, LeagueMeta, PollContext, Standing, SyncMode, Team};

/// Fixture buckets for one league.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeagueFixtures {
    /// Scheduled feed merged with the live feed.
    pub today: Vec<Fixture>,
    pub live: Vec<Fixture>,
    pub previous: Vec<Fixture>,
    pub next: Vec<Fixture>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FavoriteDetail {
    pub team: Option<Team>,
    pub next: Vec<Fixture>,
    pub previous: Vec<Fixture>,
}

/// Viewer selection pushed by collaborators. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Selection {
    pub date: Option<NaiveDate>,
    /// League id, or `ALL` for every configured league.
    pub league: Option<String>,
    pub favorite_team_id: Option<String>,
    pub favorite_team_name: Option<String>,
}

/// What one cycle fetched for one league. `None` means "not fetched this cycle".
#[derive(Debug, Default)]
pub struct LeagueFetch {
    pub league_id: String,
    pub today: Vec<Fixture>,
    pub live: Option<Vec<Fixture>>,
    pub previous: Option<Vec<Fixture>>,
    pub next: Option<Vec<Fixture>>,
    pub selected: Option<Vec<Fixture>>,
    pub standings: Option<Vec<Standing>>,
    pub teams: Option<Vec<Team>>,
    pub meta: Option<LeagueMeta>,
}

/// Canonical synchronization state, owned by the sync engine.
pub struct SyncState {
    pub leagues: Vec<League>,
    pub fixtures: HashMap<String, LeagueFixtures>,
    /// `None` follows today.
    pub selected_date: Option<NaiveDate>,
    /// `None` shows every league.
    pub selected_league: Option<String>,
    pub selected_date_fixtures: HashMap<String, Vec<Fixture>>,
    /// Date changed since the last cycle read it; another cycle is owed.
    pub selection_pending: bool,
    pub favorite: FavoriteTeam,
    pub favorite_detail: FavoriteDetail,
    pub standings: HashMap<String, Vec<Standing>>,
    pub teams: HashMap<String, Vec<Team>>,
    pub league_meta: HashMap<String, LeagueMeta>,
    pub goals: GoalTracker,
    pub last_static_refresh: Option<DateTime<Utc>>,
    pub last_standings_refresh: Option<DateTime<Utc>>,
    pub last_live_probe: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
    /// Day for which yesterday/tomorrow were last fetched.
    pub adjacent_day: Option<NaiveDate>,
    pub last_context: Option<PollContext>,
    pub mode: SyncMode,
}

impl SyncState {
    pub fn new(leagues: Vec<League>, favorite: FavoriteTeam) -> Self {
        Self {
            leagues,
            fixtures: HashMap::new(),
            selected_date: None,
            selected_league: None,
            selected_date_fixtures: HashMap::new(),
            selection_pending: false,
            favorite,
            favorite_detail: FavoriteDetail::default(),
            standings: HashMap::new(),
            teams: HashMap::new(),
            league_meta: HashMap::new(),
            goals: GoalTracker::new(),
            last_static_refresh: None,
            last_standings_refresh: None,
            last_live_probe: None,
            last_refresh: None,
            adjacent_day: None,
            last_context: None,
            mode: SyncMode::Idle,
        }
    }

    pub fn selected_date_or(&self, today: NaiveDate) -> NaiveDate {
        self.selected_date.unwrap_or(today)
    }

    pub fn plan(&self, now: DateTime<Utc>) -> RefreshPlan {
        let ctx = self.last_context.as_ref();
        let static_data = static_due(self.last_static_refresh, now);
        RefreshPlan {
            static_data,
            standings: standings_due(self.last_standings_refresh, ctx, now),
            live_probe: live_probe_due(self.last_live_probe, self.mode, ctx, now),
            adjacent_days: static_data || self.adjacent_day != Some(now.date_naive()),
        }
    }

    /// Apply a selection. Returns true when the viewed date changed.
    pub fn apply_selection(&mut self, selection: Selection) -> bool {
        let mut date_changed = false;
        if let Some(date) = selection.date {
            date_changed = self.selected_date != Some(date);
            self.selected_date = Some(date);
            if date_changed {
                self.selected_date_fixtures.clear();
                self.selection_pending = true;
            }
        }
        if let Some(league) = selection.league {
            let league = league.trim();
            self.selected_league = if league.is_empty() || league.eq_ignore_ascii_case("all") {
                None
            } else {
                Some(league.to_string())
            };
        }
        if selection.favorite_team_id.is_some() || selection.favorite_team_name.is_some() {
            let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
            self.favorite = FavoriteTeam {
                id: clean(selection.favorite_team_id),
                name: clean(selection.favorite_team_name),
            };
            self.favorite_detail = FavoriteDetail::default();
            // Force the favorite's detail to load on the next cycle.
            self.last_static_refresh = None;
        }
        date_changed
    }

    /// Fold one cycle's fetch results into the state.
    ///
    /// Reference data is only replaced by a non-empty result, so a cycle in
    /// which every variant failed keeps the last good copy.
    pub fn apply_fetch(
        &mut self,
        fetched: Vec<LeagueFetch>,
        plan: RefreshPlan,
        selected_date: NaiveDate,
        now: DateTime<Utc>,
    ) {
        let today = now.date_naive();
        let yesterday = today.pred_opt();
        let tomorrow = today.succ_opt();

        for fetch in fetched {
            let bucket = self.fixtures.entry(fetch.league_id.clone()).or_default();
            if let Some(mut live) = fetch.live {
                sort_fixtures(&mut live, now);
                bucket.live = live;
            }
            let mut merged = merge_fixtures(&fetch.today, &bucket.live);
            sort_fixtures(&mut merged, now);
            bucket.today = merged;
            if let Some(mut previous) = fetch.previous {
                sort_fixtures(&mut previous, now);
                bucket.previous = previous;
            }
            if let Some(mut next) = fetch.next {
                sort_fixtures(&mut next, now);
                bucket.next = next;
            }

            let mut selected = if selected_date == today {
                bucket.today.clone()
            } else if Some(selected_date) == yesterday {
                bucket.previous.clone()
            } else if Some(selected_date) == tomorrow {
                bucket.next.clone()
            } else {
                fetch.selected.unwrap_or_default()
            };
            // The viewer may have moved to another date while this cycle ran.
            if self.selected_date_or(today) == selected_date {
                sort_fixtures(&mut selected, now);
                self.selected_date_fixtures.insert(fetch.league_id.clone(), selected);
            }

            if let Some(table) = fetch.standings.filter(|t| !t.is_empty()) {
                self.standings.insert(fetch.league_id.clone(), table);
            }
            if let Some(teams) = fetch.teams.filter(|t| !t.is_empty()) {
                self.teams.insert(fetch.league_id.clone(), teams);
            }
            if let Some(meta) = fetch.meta {
                self.league_meta.insert(fetch.league_id, meta);
            }
        }

        if plan.static_data {
            self.last_static_refresh = Some(now);
        }
        if plan.standings {
            self.last_standings_refresh = Some(now);
        }
        if plan.live_probe {
            self.last_live_probe = Some(now);
        }
        if plan.adjacent_days {
            self.adjacent_day = Some(today);
        }
        self.last_refresh = Some(now);
    }

    /// Every league's merged today list, in league order.
    pub fn today_pool(&self) -> Vec<Fixture> {
        self.leagues
            .iter()
            .filter_map(|l| self.fixtures.get(&l.id))
            .flat_map(|b| b.today.iter().cloned())
            .collect()
    }

    /// Selected-date fixtures under the league filter, sorted.
    pub fn visible_fixtures(&self, now: DateTime<Utc>) -> Vec<Fixture> {
        let mut visible: Vec<Fixture> = self
            .leagues
            .iter()
            .filter(|l| self.selected_league.as_deref().map_or(true, |id| id == l.id))
            .filter_map(|l| self.selected_date_fixtures.get(&l.id))
            .flat_map(|list| list.iter().cloned())
            .collect();
        sort_fixtures(&mut visible, now);
        visible
    }

    /// The favorite's id, resolved by name against the loaded team lists if needed.
    pub fn favorite_team_id(&self) -> Option<String> {
        if let Some(id) = &self.favorite.id {
            return Some(id.clone());
        }
        let name = self.favorite.name.as_deref()?.trim().to_lowercase();
        self.teams
            .values()
            .flatten()
            .find(|t| t.name.to_lowercase() == name)
            .map(|t| t.id.clone())
    }
}
