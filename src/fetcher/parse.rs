//! Upstream JSON → typed records.
//!
//! The upstream sends numbers both as JSON numbers and as strings, and uses
//! `null` instead of an empty array when a query has no rows. Everything here
//! is lenient: a field that cannot be read is `None`, a row that cannot be
//! identified is dropped.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::types::{EventStat, Fixture, LeagueMeta, Player, Standing, Team};

/// Rows under `field`, or an empty list when the field is missing or `null`.
pub fn extract_array(payload: &Value, field: &str) -> Vec<Value> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// The payload itself if it is an array, else its first array-valued field.
pub fn first_array(payload: &Value) -> Vec<Value> {
    if let Some(rows) = payload.as_array() {
        return rows.clone();
    }
    payload
        .as_object()
        .and_then(|obj| obj.values().find_map(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// Live payloads: `events` if present, else the first array field.
pub fn live_rows(payload: &Value) -> Vec<Value> {
    let events = extract_array(payload, "events");
    if events.is_empty() {
        first_array(payload)
    } else {
        events
    }
}

fn text(row: &Value, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number<T: FromStr>(row: &Value, field: &str) -> Option<T> {
    text(row, field)?.parse().ok()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

/// `15:00:00`, `15:00:00+00:00` and `15:00` all read as 15:00.
pub fn parse_kickoff(raw: &str) -> Option<NaiveTime> {
    raw.get(..8)
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
        .or_else(|| raw.get(..5).and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok()))
}

pub fn fixture(row: &Value) -> Option<Fixture> {
    let raw_time = text(row, "strTime");
    let kickoff = raw_time.as_deref().and_then(parse_kickoff);
    let home_team = text(row, "strHomeTeam").unwrap_or_default();
    let away_team = text(row, "strAwayTeam").unwrap_or_default();
    let id = text(row, "idEvent");
    if id.is_none() && (home_team.is_empty() || away_team.is_empty()) {
        return None;
    }
    Some(Fixture {
        id,
        league_id: text(row, "idLeague").unwrap_or_default(),
        home_team,
        away_team,
        home_team_id: text(row, "idHomeTeam"),
        away_team_id: text(row, "idAwayTeam"),
        date: text(row, "dateEvent").as_deref().and_then(parse_date),
        kickoff,
        kickoff_unreadable: raw_time.is_some() && kickoff.is_none(),
        home_score: number(row, "intHomeScore"),
        away_score: number(row, "intAwayScore"),
        status: text(row, "strStatus").unwrap_or_default(),
        progress: text(row, "strProgress").unwrap_or_default(),
        venue: text(row, "strVenue"),
    })
}

pub fn fixtures(rows: &[Value]) -> Vec<Fixture> {
    rows.iter().filter_map(fixture).collect()
}

pub fn standings(rows: &[Value]) -> Vec<Standing> {
    rows.iter()
        .filter_map(|row| {
            Some(Standing {
                rank: number(row, "intRank"),
                team: text(row, "strTeam")?,
                team_id: text(row, "idTeam"),
                played: number(row, "intPlayed"),
                win: number(row, "intWin"),
                draw: number(row, "intDraw"),
                loss: number(row, "intLoss"),
                goals_for: number(row, "intGoalsFor"),
                goals_against: number(row, "intGoalsAgainst"),
                goal_difference: number(row, "intGoalDifference"),
                points: number(row, "intPoints"),
                form: text(row, "strForm"),
                badge: text(row, "strBadge").or_else(|| text(row, "strTeamBadge")),
            })
        })
        .collect()
}

pub fn teams(rows: &[Value]) -> Vec<Team> {
    rows.iter()
        .filter_map(|row| {
            Some(Team {
                id: text(row, "idTeam")?,
                name: text(row, "strTeam")?,
                short_name: text(row, "strTeamShort"),
                league: text(row, "strLeague"),
                badge: text(row, "strBadge").or_else(|| text(row, "strTeamBadge")),
                stadium: text(row, "strStadium"),
            })
        })
        .collect()
}

pub fn league_meta(row: &Value) -> Option<LeagueMeta> {
    Some(LeagueMeta {
        id: text(row, "idLeague")?,
        name: text(row, "strLeague").unwrap_or_default(),
        badge: text(row, "strBadge").or_else(|| text(row, "strLogo")),
    })
}

pub fn players(rows: &[Value]) -> Vec<Player> {
    rows.iter()
        .filter_map(|row| {
            Some(Player {
                id: text(row, "idPlayer")?,
                name: text(row, "strPlayer")?,
                team: text(row, "strTeam"),
                position: text(row, "strPosition"),
                nationality: text(row, "strNationality"),
            })
        })
        .collect()
}

pub fn event_stats(rows: &[Value]) -> Vec<EventStat> {
    rows.iter()
        .filter_map(|row| {
            Some(EventStat {
                stat: text(row, "strStat")?,
                home: text(row, "intHome"),
                away: text(row, "intAway"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_rows_read_as_empty() {
        assert!(extract_array(&json!({ "events": null }), "events").is_empty());
        assert!(first_array(&json!({ "livescore": null })).is_empty());
    }

    #[test]
    fn live_rows_fall_back_to_first_array_field() {
        let payload = json!({ "livescore": [{ "idEvent": "1" }] });
        assert_eq!(live_rows(&payload).len(), 1);
        assert_eq!(first_array(&json!([1, 2])).len(), 2);
    }

    #[test]
    fn fixture_reads_string_and_numeric_scores() {
        let row = json!({
            "idEvent": "2052711",
            "idLeague": "4328",
            "strHomeTeam": "Arsenal",
            "strAwayTeam": "Chelsea",
            "intHomeScore": "2",
            "intAwayScore": 1,
            "dateEvent": "2026-10-19",
            "strTime": "15:00:00+00:00",
            "strStatus": "2H",
        });
        let f = fixture(&row).unwrap();
        assert_eq!(f.key(), "id:2052711");
        assert_eq!(f.score_pair(), Some((2, 1)));
        assert_eq!(f.kickoff, NaiveTime::from_hms_opt(15, 0, 0));
        assert_eq!(f.date, NaiveDate::from_ymd_opt(2026, 10, 19));
    }

    #[test]
    fn unscored_fixture_has_no_score_pair() {
        let row = json!({
            "strHomeTeam": "Leeds",
            "strAwayTeam": "Hull",
            "intHomeScore": null,
            "intAwayScore": "",
            "dateEvent": "2026-10-19",
            "strTime": "19:45",
        });
        let f = fixture(&row).unwrap();
        assert!(!f.has_score());
        assert_eq!(f.kickoff, NaiveTime::from_hms_opt(19, 45, 0));
        assert_eq!(f.key(), "m:2026-10-19|leeds|hull");
    }

    #[test]
    fn unreadable_kickoff_is_flagged() {
        let row = json!({ "idEvent": "4", "strHomeTeam": "A", "strAwayTeam": "B", "strTime": "TBD" });
        let f = fixture(&row).unwrap();
        assert!(f.kickoff.is_none());
        assert!(f.kickoff_unreadable);

        let missing = fixture(&json!({ "idEvent": "5", "strHomeTeam": "A", "strAwayTeam": "B" })).unwrap();
        assert!(!missing.kickoff_unreadable);
    }

    #[test]
    fn anonymous_rows_are_dropped() {
        assert!(fixture(&json!({ "strHomeTeam": "Arsenal" })).is_none());
        assert!(teams(&[json!({ "strTeam": "No Id" })]).is_empty());
    }

    #[test]
    fn standings_rows() {
        let rows = vec![json!({
            "intRank": "1", "strTeam": "Arsenal", "idTeam": "133604",
            "intPlayed": "8", "intPoints": "20", "intGoalDifference": "-3",
            "strTeamBadge": "https://r2.thesportsdb.com/badge.png"
        })];
        let table = standings(&rows);
        assert_eq!(table[0].rank, Some(1));
        assert_eq!(table[0].points, Some(20));
        assert_eq!(table[0].goal_difference, Some(-3));
        assert!(table[0].badge.is_some());
    }
}
