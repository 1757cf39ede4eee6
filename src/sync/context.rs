use chrono::{DateTime, NaiveDate, Utc};

use crate::sync::classify::fixture_state;
use crate::types::{FavoriteTeam, Fixture, FixtureState, PollContext};

/// Classify the moment from today's fixture pool. Pure: same inputs, same context.
pub fn evaluate_context(
    today_pool: &[Fixture],
    favorite: &FavoriteTeam,
    viewing_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> PollContext {
    let today = now.date_naive();
    let todays: Vec<&Fixture> = today_pool.iter().filter(|f| f.date == Some(today)).collect();

    let has_live_now = todays
        .iter()
        .any(|f| fixture_state(f, now) == FixtureState::Live);

    let favorite_team_plays_today = favorite.is_set()
        && todays
            .iter()
            .any(|f| f.involves(favorite.id.as_deref(), favorite.name.as_deref()));

    let minutes_to_next_kickoff = todays
        .iter()
        .filter(|f| fixture_state(f, now) == FixtureState::Upcoming)
        .filter_map(|f| f.kickoff_at())
        .map(|kickoff| (kickoff - now).num_minutes())
        .filter(|minutes| *minutes >= 0)
        .min();

    PollContext {
        has_live_now,
        has_today_fixtures: !todays.is_empty(),
        favorite_team_plays_today,
        viewing_today: viewing_date.map_or(true, |d| d == today),
        minutes_to_next_kickoff,
    }
}
