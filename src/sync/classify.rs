use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

use crate::config::{LIVE_WINDOW_AFTER_KICKOFF_MINUTES, MISSING_KICKOFF_HOUR_UTC};
use crate::types::{Fixture, FixtureState};

static FINAL_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(ft|full time|match finished|finished|aet|after pen|final)\b")
        .expect("static regex")
});
static LIVE_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(ht|1h|2h|live|in play|playing|et|pen)\b").expect("static regex")
});
static MINUTE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}\s*'").expect("static regex"));

/// Derive live/upcoming/final from status text, scores and kickoff.
///
/// Status text wins when it says anything recognisable; final markers are
/// checked first so "after pen" is not read as live. Without a usable status,
/// a scored fixture from an earlier day is final, and a scored fixture today
/// is live for three hours after kickoff. A missing kickoff counts as noon UTC;
/// an unreadable one leaves the fixture live.
pub fn fixture_state(fixture: &Fixture, now: DateTime<Utc>) -> FixtureState {
    let status = fixture.status_text();
    if !status.is_empty() {
        if FINAL_STATUS.is_match(&status) {
            return FixtureState::Final;
        }
        if LIVE_STATUS.is_match(&status) || MINUTE_MARKER.is_match(&status) {
            return FixtureState::Live;
        }
    }

    if fixture.has_score() {
        let today = now.date_naive();
        match fixture.date {
            Some(date) if date < today => return FixtureState::Final,
            Some(date) if date == today => {
                if fixture.kickoff.is_none() && fixture.kickoff_unreadable {
                    return FixtureState::Live;
                }
                let time = fixture
                    .kickoff
                    .or_else(|| NaiveTime::from_hms_opt(MISSING_KICKOFF_HOUR_UTC, 0, 0))
                    .unwrap_or(NaiveTime::MIN);
                let elapsed = now - NaiveDateTime::new(date, time).and_utc();
                if elapsed < Duration::zero() {
                    return FixtureState::Upcoming;
                }
                if elapsed <= Duration::minutes(LIVE_WINDOW_AFTER_KICKOFF_MINUTES) {
                    return FixtureState::Live;
                }
                return FixtureState::Final;
            }
            _ => {}
        }
    }

    FixtureState::Upcoming
}

/// Live first, then upcoming, then final; ties by kickoff ascending.
pub fn sort_fixtures(fixtures: &mut [Fixture], now: DateTime<Utc>) {
    fixtures.sort_by_cached_key(|f| (fixture_state(f, now).priority(), f.kickoff_sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 16, 0, 0).unwrap()
    }

    fn fixture(status: &str, date: (i32, u32, u32), kickoff: Option<(u32, u32)>, score: Option<(i32, i32)>) -> Fixture {
        Fixture {
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            status: status.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            kickoff: kickoff.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            ..Default::default()
        }
    }

    #[test]
    fn status_text_decides_first() {
        let today = (2026, 10, 19);
        assert_eq!(fixture_state(&fixture("FT", today, None, None), now()), FixtureState::Final);
        assert_eq!(fixture_state(&fixture("Match Finished", today, None, None), now()), FixtureState::Final);
        assert_eq!(fixture_state(&fixture("2H", today, None, None), now()), FixtureState::Live);
        assert_eq!(fixture_state(&fixture("HT", today, None, None), now()), FixtureState::Live);
        assert_eq!(fixture_state(&fixture("Not Started", today, None, None), now()), FixtureState::Upcoming);
    }

    #[test]
    fn after_penalties_is_final_not_live() {
        let f = fixture("After Pen.", (2026, 10, 19), Some((13, 0)), Some((1, 1)));
        assert_eq!(fixture_state(&f, now()), FixtureState::Final);
    }

    #[test]
    fn minute_marker_in_progress_is_live() {
        let mut f = fixture("", (2026, 10, 19), Some((15, 0)), Some((0, 0)));
        f.progress = "67'".to_string();
        assert_eq!(fixture_state(&f, now()), FixtureState::Live);
    }

    #[test]
    fn scored_fixture_from_earlier_day_is_final() {
        let f = fixture("", (2026, 10, 18), Some((15, 0)), Some((2, 0)));
        assert_eq!(fixture_state(&f, now()), FixtureState::Final);
    }

    #[test]
    fn scored_fixture_today_follows_kickoff_window() {
        let today = (2026, 10, 19);
        assert_eq!(fixture_state(&fixture("", today, Some((17, 0)), Some((0, 0))), now()), FixtureState::Upcoming);
        assert_eq!(fixture_state(&fixture("", today, Some((13, 0)), Some((1, 0))), now()), FixtureState::Live);
        assert_eq!(fixture_state(&fixture("", today, Some((12, 59)), Some((1, 0))), now()), FixtureState::Final);
    }

    #[test]
    fn missing_kickoff_counts_from_noon() {
        let today = (2026, 10, 19);
        let f = fixture("", today, None, Some((2, 1)));
        let at = |h| Utc.with_ymd_and_hms(2026, 10, 19, h, 0, 0).unwrap();
        assert_eq!(fixture_state(&f, at(11)), FixtureState::Upcoming);
        assert_eq!(fixture_state(&f, at(14)), FixtureState::Live);
        assert_eq!(fixture_state(&f, at(20)), FixtureState::Final);

        let mut unreadable = f.clone();
        unreadable.kickoff_unreadable = true;
        assert_eq!(fixture_state(&unreadable, at(20)), FixtureState::Live);
    }

    #[test]
    fn unscored_without_status_is_upcoming() {
        let f = fixture("", (2026, 10, 18), Some((15, 0)), None);
        assert_eq!(fixture_state(&f, now()), FixtureState::Upcoming);
    }

    #[test]
    fn sort_orders_by_state_then_kickoff() {
        let today = (2026, 10, 19);
        let mut list = vec![
            fixture("FT", today, Some((12, 0)), Some((1, 0))),
            fixture("", today, Some((20, 0)), None),
            fixture("", today, Some((18, 0)), None),
            fixture("2H", today, Some((15, 0)), Some((0, 0))),
        ];
        sort_fixtures(&mut list, now());
        let order: Vec<_> = list.iter().map(|f| (f.status.as_str(), f.kickoff)).collect();
        assert_eq!(order[0].0, "2H");
        assert_eq!(order[1].1, NaiveTime::from_hms_opt(18, 0, 0));
        assert_eq!(order[2].1, NaiveTime::from_hms_opt(20, 0, 0));
        assert_eq!(order[3].0, "FT");
    }
}
