use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::staleness;
use crate::sync::engine::SyncEngine;
use crate::types::{PollContext, SyncMode};

/// Mode transition, evaluated once per cycle.
pub fn mode_for(ctx: &PollContext) -> SyncMode {
    if ctx.has_live_now {
        SyncMode::Live
    } else if ctx.has_today_fixtures || ctx.favorite_team_plays_today {
        SyncMode::Matchday
    } else {
        SyncMode::Idle
    }
}

/// Delay before the next cycle. Without any context yet, assume idle.
pub fn next_delay(last_ctx: Option<&PollContext>) -> Duration {
    last_ctx.map_or(SyncMode::Idle, mode_for).delay()
}

fn older_than(last: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age_secs: i64) -> bool {
    last.map_or(true, |at| (now - at).num_seconds() >= max_age_secs)
}

/// Teams and league metadata: absent or older than the static window.
pub fn static_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    older_than(last, now, staleness::STATIC_MAX_AGE_SECS)
}

pub fn standings_due(last: Option<DateTime<Utc>>, ctx: Option<&PollContext>, now: DateTime<Utc>) -> bool {
    let max_age = if ctx.is_some_and(|c| c.has_live_now) {
        staleness::STANDINGS_LIVE_MAX_AGE_SECS
    } else {
        staleness::STANDINGS_IDLE_MAX_AGE_SECS
    };
    older_than(last, now, max_age)
}

/// Live probing: always while live; otherwise gated by how close the action is.
pub fn live_probe_due(
    last_probe: Option<DateTime<Utc>>,
    mode: SyncMode,
    ctx: Option<&PollContext>,
    now: DateTime<Utc>,
) -> bool {
    if mode == SyncMode::Live {
        return true;
    }
    let Some(ctx) = ctx else {
        return true;
    };
    let kickoff_soon = ctx
        .minutes_to_next_kickoff
        .is_some_and(|m| m <= staleness::PROBE_KICKOFF_HORIZON_MINUTES);
    let interval = if kickoff_soon || ctx.has_today_fixtures || ctx.favorite_team_plays_today {
        staleness::PROBE_MATCHDAY_INTERVAL_SECS
    } else {
        staleness::PROBE_IDLE_INTERVAL_SECS
    };
    older_than(last_probe, now, interval)
}

/// What one cycle should refetch, beyond today's fixtures which are always fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshPlan {
    pub static_data: bool,
    pub standings: bool,
    pub live_probe: bool,
    /// Yesterday's and tomorrow's fixtures.
    pub adjacent_days: bool,
}

/// Scheduler loop: run a cycle, then sleep for the delay the resulting
/// context calls for. The sleep is re-armed every iteration, so a mode change
/// takes effect on the very next wait. A failed cycle reschedules from the
/// last good context.
pub async fn run(engine: Arc<SyncEngine>) {
    info!("[SCHED] scheduler started");
    loop {
        match engine.run_cycle().await {
            Ok(true) => {}
            Ok(false) => info!("[SCHED] cycle already in flight, skipping tick"),
            Err(e) => error!("[SCHED] cycle failed: {e}"),
        }

        let (mode, delay) = engine.schedule().await;
        info!(mode = %mode, delay_secs = delay.as_secs(), "[SCHED] next cycle armed");
        tokio::time::sleep(delay).await;
    }
}
