use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::fetcher::FetchClient;
use crate::state::sync_state::{FavoriteDetail, LeagueFetch, Selection};
use crate::state::SyncState;
use crate::sync::classify::fixture_state;
use crate::sync::context::evaluate_context;
use crate::sync::scheduler::{mode_for, next_delay, RefreshPlan};
use crate::types::{
    EventStat, FavoriteTeam, Fixture, FixtureState, GoalFlash, League, PollContext, Player,
    Standing, SyncMode, Team,
};

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub context: Option<PollContext>,
    pub next_delay_secs: u64,
    pub last_refresh: Option<DateTime<Utc>>,
    pub in_flight: bool,
    pub selected_date: NaiveDate,
    pub selected_league: Option<String>,
    pub favorite: FavoriteTeam,
    pub active_flashes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureView {
    pub key: String,
    pub state: FixtureState,
    #[serde(flatten)]
    pub fixture: Fixture,
    pub flash: Option<GoalFlash>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixturesView {
    pub date: NaiveDate,
    pub league: Option<String>,
    pub fixtures: Vec<FixtureView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeagueTable {
    pub league: League,
    pub badge: Option<String>,
    pub standings: Vec<Standing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamReport {
    pub team: Option<Team>,
    pub next: Vec<Fixture>,
    pub previous: Vec<Fixture>,
    pub players: Vec<Player>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub event: Option<Fixture>,
    pub stats: Vec<EventStat>,
}

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

/// Resets the in-flight flag however the cycle ends, including by panic.
struct CycleGuard {
    engine: Arc<SyncEngine>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.engine.in_flight.store(false, Ordering::Release);
    }
}

/// Orchestrates synchronization cycles over [`SyncState`].
///
/// At most one cycle runs at a time: a trigger that arrives while a cycle is
/// in flight is dropped, except that a date selection made mid-cycle gets a
/// follow-up cycle once the current one ends. Each cycle runs on its own task so a panic in the
/// merge/diff path surfaces as [`AppError::Cycle`] instead of taking down
/// the scheduler.
pub struct SyncEngine {
    client: FetchClient,
    clock: Arc<dyn Clock>,
    state: Mutex<SyncState>,
    in_flight: AtomicBool,
    health: Arc<HealthState>,
}

impl SyncEngine {
    pub fn new(
        client: FetchClient,
        clock: Arc<dyn Clock>,
        leagues: Vec<League>,
        favorite: FavoriteTeam,
        health: Arc<HealthState>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            clock,
            state: Mutex::new(SyncState::new(leagues, favorite)),
            in_flight: AtomicBool::new(false),
            health,
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_begin(self: &Arc<Self>) -> Option<CycleGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { engine: Arc::clone(self) })
    }

    /// Run one cycle now and wait for it. `Ok(false)` if one was already running.
    pub async fn run_cycle(self: &Arc<Self>) -> Result<bool> {
        let Some(guard) = self.try_begin() else {
            return Ok(false);
        };
        Arc::clone(self).execute(guard).await.map(|_| true)
    }

    /// Start one cycle in the background. False if one was already running.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let Some(guard) = self.try_begin() else {
            return false;
        };
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.execute(guard).await {
                error!("[SYNC] triggered cycle failed: {e}");
            }
        });
        true
    }

    async fn execute(self: Arc<Self>, guard: CycleGuard) -> Result<()> {
        let engine = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            engine.cycle().await
        });

        let outcome = match handle.await {
            Ok(result) => result,
            Err(join) => Err(AppError::Cycle(join.to_string())),
        };
        let now = self.clock.now();
        self.health.record_cycle(outcome.is_ok(), now.timestamp_millis());
        let selection_pending = {
            let state = self.state.lock().await;
            if outcome.is_err() {
                // Reschedule from the last good context.
                self.health.set_mode(state.last_context.as_ref().map_or(SyncMode::Idle, mode_for));
            }
            state.selection_pending
        };
        if selection_pending && self.trigger() {
            debug!("[SYNC] re-running cycle for changed selection");
        }
        outcome
    }

    async fn cycle(&self) -> Result<()> {
        let now = self.clock.now();
        let today = now.date_naive();

        let (plan, leagues, selected_date, favorite_id) = {
            let mut state = self.state.lock().await;
            state.selection_pending = false;
            (
                state.plan(now),
                state.leagues.clone(),
                state.selected_date_or(today),
                state.favorite_team_id(),
            )
        };
        let fetch_selected = ![today.pred_opt(), Some(today), today.succ_opt()].contains(&Some(selected_date));

        let league_fetches = join_all(
            leagues
                .iter()
                .map(|league| self.fetch_league(league, today, plan, fetch_selected.then_some(selected_date))),
        );
        let favorite_fetch = async {
            match favorite_id.as_deref().filter(|_| plan.static_data) {
                Some(id) => Some(self.fetch_favorite(id).await),
                None => None,
            }
        };
        let (fetched, favorite_detail) = tokio::join!(league_fetches, favorite_fetch);

        let mut state = self.state.lock().await;
        state.apply_fetch(fetched, plan, selected_date, now);
        if let Some(detail) = favorite_detail {
            state.favorite_detail = detail;
        }

        let pool = state.today_pool();
        let flashed = state.goals.detect(&pool, now);
        let ctx = evaluate_context(&pool, &state.favorite, Some(selected_date), now);
        let mode = mode_for(&ctx);
        if mode != state.mode {
            info!(from = %state.mode, to = %mode, "[SYNC] mode change");
        }
        state.mode = mode;
        state.last_context = Some(ctx);
        self.health.set_mode(mode);

        info!(
            mode = %mode,
            today = pool.len(),
            goals = flashed.len(),
            static_data = plan.static_data,
            standings = plan.standings,
            live_probe = plan.live_probe,
            "[SYNC] cycle complete"
        );
        Ok(())
    }

    async fn fetch_league(
        &self,
        league: &League,
        today: NaiveDate,
        plan: RefreshPlan,
        selected: Option<NaiveDate>,
    ) -> LeagueFetch {
        let client = &self.client;
        let adjacent = |day: Option<NaiveDate>| async move {
            match day.filter(|_| plan.adjacent_days) {
                Some(d) => Some(client.day_fixtures(league, d).await),
                None => None,
            }
        };

        let (today_list, live, previous, next, selected, standings, teams, meta) = tokio::join!(
            client.day_fixtures(league, today),
            async { if plan.live_probe { Some(client.live_fixtures(league).await) } else { None } },
            adjacent(today.pred_opt()),
            adjacent(today.succ_opt()),
            async {
                match selected {
                    Some(d) => Some(client.day_fixtures(league, d).await),
                    None => None,
                }
            },
            async { if plan.standings { Some(client.standings(league).await) } else { None } },
            async { if plan.static_data { Some(client.teams(league).await) } else { None } },
            async { if plan.static_data { client.league_meta(league).await } else { None } },
        );

        if today_list.is_empty() && live.as_ref().is_some_and(|l| !l.is_empty()) {
            warn!(league = %league.id, "[SYNC] live feed has fixtures the day feed lacks");
        }

        LeagueFetch {
            league_id: league.id.clone(),
            today: today_list,
            live,
            previous,
            next,
            selected,
            standings,
            teams,
            meta,
        }
    }

    async fn fetch_favorite(&self, team_id: &str) -> FavoriteDetail {
        let (team, next, previous) = tokio::join!(
            self.client.team_detail(team_id),
            self.client.team_next_events(team_id),
            self.client.team_previous_events(team_id),
        );
        FavoriteDetail { team, next, previous }
    }

    /// Current mode and the delay until the next scheduled cycle.
    pub async fn schedule(&self) -> (SyncMode, Duration) {
        let state = self.state.lock().await;
        let ctx = state.last_context.as_ref();
        (ctx.map_or(SyncMode::Idle, mode_for), next_delay(ctx))
    }

    pub async fn status(&self) -> SyncStatus {
        let now = self.clock.now();
        let state = self.state.lock().await;
        SyncStatus {
            mode: state.mode,
            context: state.last_context.clone(),
            next_delay_secs: next_delay(state.last_context.as_ref()).as_secs(),
            last_refresh: state.last_refresh,
            in_flight: self.is_in_flight(),
            selected_date: state.selected_date_or(now.date_naive()),
            selected_league: state.selected_league.clone(),
            favorite: state.favorite.clone(),
            active_flashes: state.goals.active_count(now),
        }
    }

    pub async fn fixtures(&self) -> FixturesView {
        let now = self.clock.now();
        let state = self.state.lock().await;
        let fixtures = state
            .visible_fixtures(now)
            .into_iter()
            .map(|fixture| {
                let key = fixture.key();
                FixtureView {
                    state: fixture_state(&fixture, now),
                    flash: state.goals.active(&key, now).cloned(),
                    key,
                    fixture,
                }
            })
            .collect();
        FixturesView {
            date: state.selected_date_or(now.date_naive()),
            league: state.selected_league.clone(),
            fixtures,
        }
    }

    pub async fn tables(&self) -> Vec<LeagueTable> {
        let state = self.state.lock().await;
        state
            .leagues
            .iter()
            .filter(|l| state.selected_league.as_deref().map_or(true, |id| id == l.id))
            .map(|league| LeagueTable {
                league: league.clone(),
                badge: state.league_meta.get(&league.id).and_then(|m| m.badge.clone()),
                standings: state.standings.get(&league.id).cloned().unwrap_or_default(),
            })
            .collect()
    }

    pub async fn favorite(&self) -> (FavoriteTeam, FavoriteDetail) {
        let state = self.state.lock().await;
        (state.favorite.clone(), state.favorite_detail.clone())
    }

    /// Apply a viewer selection and start a cycle so it takes effect now.
    /// Returns whether a cycle was started.
    pub async fn select(self: &Arc<Self>, selection: Selection) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.apply_selection(selection) {
                info!(date = ?state.selected_date, "[SYNC] selected date changed");
            }
        }
        self.trigger()
    }

    /// Force a goal flash on the visible pool, bypassing score detection.
    pub async fn trigger_test_flash(&self) -> Option<GoalFlash> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let pool = state.visible_fixtures(now);
        let (key, flash) = state.goals.force(&pool, now)?;
        info!(key = %key, team = %flash.team, "[SYNC] test goal flash");
        Some(flash)
    }

    pub async fn team_report(&self, team_id: &str) -> TeamReport {
        let team = self.client.team_detail(team_id).await;
        let team_name = team.as_ref().map(|t| t.name.clone());
        let (next, previous, players) = tokio::join!(
            self.client.team_next_events(team_id),
            self.client.team_previous_events(team_id),
            self.client.players(Some(team_id), team_name.as_deref()),
        );
        TeamReport { team, next, previous, players }
    }

    pub async fn event_report(&self, event_id: &str) -> EventReport {
        let (event, stats) = tokio::join!(
            self.client.event_detail(event_id),
            self.client.event_stats(event_id),
        );
        EventReport { event, stats }
    }
}
