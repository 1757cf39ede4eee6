use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use urlencoding::encode;

use crate::clock::Clock;
use crate::fetcher::parse;
use crate::fetcher::{first_non_empty, RequestVariant, Transport};
use crate::types::{EventStat, Fixture, League, LeagueMeta, Player, Standing, Team};

/// Typed accessors over the upstream API, one per resource.
///
/// Every accessor runs a fallback chain and returns whatever the first
/// productive variant yielded. None of them return errors: an empty list (or
/// `None`) means every variant failed or came back empty.
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl FetchClient {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Fixtures for one league on one day.
    pub async fn day_fixtures(&self, league: &League, date: NaiveDate) -> Vec<Fixture> {
        let today = self.clock.now().date_naive();
        let season_feed = if date < today {
            RequestVariant::v1(format!("eventspastleague.php?id={}", encode(&league.id)))
        } else {
            RequestVariant::v1(format!("eventsnextleague.php?id={}", encode(&league.id)))
        };
        let variants = [
            RequestVariant::v1(format!("eventsday.php?d={date}&l={}", encode(&league.id))),
            RequestVariant::v1(format!("eventsday.php?d={date}&l={}", encode(&league.name))),
            season_feed,
        ];
        let fixtures = first_non_empty(&self.transport, "day_fixtures", &variants, |payload| {
            let rows = parse::fixtures(&parse::extract_array(payload, "events"));
            // The season feeds span many days; only the requested one counts.
            rows.into_iter().filter(|f| f.date == Some(date)).collect()
        })
        .await;
        with_league(fixtures, league)
    }

    /// Fixtures currently in play for one league.
    pub async fn live_fixtures(&self, league: &League) -> Vec<Fixture> {
        let variants = [
            RequestVariant::v2(format!("livescore/{}", encode(&league.id))),
            RequestVariant::v2(format!("livescore.php?l={}", encode(&league.id))),
            RequestVariant::v1(format!("livescore.php?l={}", encode(&league.name))),
            RequestVariant::v1(format!("livescore.php?l={}", encode(&league.id))),
        ];
        let fixtures = first_non_empty(&self.transport, "live_fixtures", &variants, |payload| {
            parse::fixtures(&parse::live_rows(payload))
        })
        .await;
        with_league(fixtures, league)
    }

    pub async fn standings(&self, league: &League) -> Vec<Standing> {
        let variants = [RequestVariant::v1(format!("lookuptable.php?l={}", encode(&league.id)))];
        first_non_empty(&self.transport, "standings", &variants, |payload| {
            parse::standings(&parse::extract_array(payload, "table"))
        })
        .await
    }

    pub async fn teams(&self, league: &League) -> Vec<Team> {
        let variants = [
            RequestVariant::v1(format!("lookup_all_teams.php?id={}", encode(&league.id))),
            RequestVariant::v1(format!("search_all_teams.php?l={}", encode(&league.name))),
        ];
        first_non_empty(&self.transport, "teams", &variants, |payload| {
            parse::teams(&parse::extract_array(payload, "teams"))
        })
        .await
    }

    pub async fn league_meta(&self, league: &League) -> Option<LeagueMeta> {
        let variants = [RequestVariant::v1(format!("lookupleague.php?id={}", encode(&league.id)))];
        first_non_empty(&self.transport, "league_meta", &variants, |payload| {
            first_row(payload, "leagues").and_then(parse::league_meta).into_iter().collect()
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn team_detail(&self, team_id: &str) -> Option<Team> {
        let variants = [RequestVariant::v1(format!("lookupteam.php?id={}", encode(team_id)))];
        first_non_empty(&self.transport, "team_detail", &variants, |payload| {
            parse::teams(&parse::extract_array(payload, "teams"))
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn team_next_events(&self, team_id: &str) -> Vec<Fixture> {
        let variants = [RequestVariant::v1(format!("eventsnext.php?id={}", encode(team_id)))];
        first_non_empty(&self.transport, "team_next_events", &variants, |payload| {
            parse::fixtures(&parse::extract_array(payload, "events"))
        })
        .await
    }

    pub async fn team_previous_events(&self, team_id: &str) -> Vec<Fixture> {
        let variants = [RequestVariant::v1(format!("eventslast.php?id={}", encode(team_id)))];
        first_non_empty(&self.transport, "team_previous_events", &variants, |payload| {
            let results = parse::extract_array(payload, "results");
            if results.is_empty() {
                parse::fixtures(&parse::extract_array(payload, "events"))
            } else {
                parse::fixtures(&results)
            }
        })
        .await
    }

    pub async fn event_detail(&self, event_id: &str) -> Option<Fixture> {
        let variants = [RequestVariant::v1(format!("lookupevent.php?id={}", encode(event_id)))];
        first_non_empty(&self.transport, "event_detail", &variants, |payload| {
            first_row(payload, "events").and_then(parse::fixture).into_iter().collect()
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn event_stats(&self, event_id: &str) -> Vec<EventStat> {
        let variants =
            [RequestVariant::v1(format!("lookupeventstats.php?id={}", encode(event_id)))];
        first_non_empty(&self.transport, "event_stats", &variants, |payload| {
            parse::event_stats(&parse::extract_array(payload, "eventstats"))
        })
        .await
    }

    /// Squad for a team: search by name first, then the id lookup.
    pub async fn players(&self, team_id: Option<&str>, team_name: Option<&str>) -> Vec<Player> {
        let mut variants = Vec::with_capacity(2);
        if let Some(name) = team_name.filter(|n| !n.trim().is_empty()) {
            variants.push(RequestVariant::v1(format!("searchplayers.php?t={}", encode(name.trim()))));
        }
        if let Some(id) = team_id.filter(|id| !id.trim().is_empty()) {
            variants.push(RequestVariant::v1(format!("lookup_all_players.php?id={}", encode(id.trim()))));
        }
        first_non_empty(&self.transport, "players", &variants, |payload| {
            parse::players(&parse::extract_array(payload, "player"))
        })
        .await
    }
}

fn first_row<'a>(payload: &'a Value, field: &str) -> Option<&'a Value> {
    payload.get(field)?.as_array()?.first()
}

/// Live feeds often omit the league id; the league queried is authoritative.
fn with_league(mut fixtures: Vec<Fixture>, league: &League) -> Vec<Fixture> {
    for f in &mut fixtures {
        if f.league_id.is_empty() {
            f.league_id.clone_from(&league.id);
        }
    }
    fixtures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fetcher::tests::ScriptedTransport;
    use crate::types::ApiVersion;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn epl() -> League {
        League::new("4328", "English Premier League")
    }

    fn client(transport: ScriptedTransport) -> (FetchClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap());
        (FetchClient::new(transport.clone(), clock), transport)
    }

    fn event(id: &str, date: &str) -> Value {
        json!({ "idEvent": id, "strHomeTeam": "A", "strAwayTeam": "B", "dateEvent": date })
    }

    #[tokio::test]
    async fn day_fixtures_fall_back_to_league_name() {
        let (client, transport) = client(
            ScriptedTransport::default()
                .ok(ApiVersion::V1, "eventsday.php?d=2026-10-19&l=4328", json!({ "events": null }))
                .ok(
                    ApiVersion::V1,
                    "eventsday.php?d=2026-10-19&l=English%20Premier%20League",
                    json!({ "events": [event("1", "2026-10-19")] }),
                ),
        );
        let fixtures = client.day_fixtures(&epl(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()).await;
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].league_id, "4328");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn past_day_uses_season_feed_filtered_to_the_date() {
        let (client, _) = client(ScriptedTransport::default().ok(
            ApiVersion::V1,
            "eventspastleague.php?id=4328",
            json!({ "events": [event("1", "2026-10-18"), event("2", "2026-10-11")] }),
        ));
        let fixtures = client.day_fixtures(&epl(), NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()).await;
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn future_day_uses_next_league_feed() {
        let (client, transport) = client(ScriptedTransport::default().ok(
            ApiVersion::V1,
            "eventsnextleague.php?id=4328",
            json!({ "events": [event("9", "2026-10-20")] }),
        ));
        let fixtures = client.day_fixtures(&epl(), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()).await;
        assert_eq!(fixtures.len(), 1);
        assert!(transport.calls.lock().unwrap().iter().all(|c| !c.contains("eventspastleague")));
    }

    #[tokio::test]
    async fn live_fixtures_read_first_array_field() {
        let (client, _) = client(
            ScriptedTransport::default()
                .fail(ApiVersion::V2, "livescore/4328", 401)
                .ok(
                    ApiVersion::V2,
                    "livescore.php?l=4328",
                    json!({ "livescore": [{ "idEvent": "5", "intHomeScore": "1", "intAwayScore": "0", "strProgress": "34'" }] }),
                ),
        );
        let live = client.live_fixtures(&epl()).await;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].score_pair(), Some((1, 0)));
    }

    #[tokio::test]
    async fn live_chain_exhaustion_is_empty() {
        let (client, transport) = client(ScriptedTransport::default());
        assert!(client.live_fixtures(&epl()).await.is_empty());
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn previous_events_prefer_results_field() {
        let (client, _) = client(ScriptedTransport::default().ok(
            ApiVersion::V1,
            "eventslast.php?id=133604",
            json!({ "results": [event("3", "2026-10-12")], "events": [] }),
        ));
        let prev = client.team_previous_events("133604").await;
        assert_eq!(prev[0].id.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn single_record_lookups_take_the_first_row() {
        let (client, _) = client(
            ScriptedTransport::default()
                .ok(ApiVersion::V1, "lookupleague.php?id=4328", json!({ "leagues": [{ "idLeague": "4328", "strLeague": "EPL", "strLogo": "l.png" }] }))
                .ok(ApiVersion::V1, "lookupevent.php?id=5", json!({ "events": [event("5", "2026-10-19")] })),
        );
        let meta = client.league_meta(&epl()).await.unwrap();
        assert_eq!(meta.badge.as_deref(), Some("l.png"));
        assert_eq!(client.event_detail("5").await.unwrap().id.as_deref(), Some("5"));
        assert!(client.team_detail("1").await.is_none());
    }

    #[tokio::test]
    async fn players_fall_back_to_team_id() {
        let (client, _) = client(
            ScriptedTransport::default()
                .ok(ApiVersion::V1, "searchplayers.php?t=Arsenal", json!({ "player": null }))
                .ok(
                    ApiVersion::V1,
                    "lookup_all_players.php?id=133604",
                    json!({ "player": [{ "idPlayer": "1", "strPlayer": "B. Saka", "strPosition": "Winger" }] }),
                ),
        );
        let squad = client.players(Some("133604"), Some("Arsenal")).await;
        assert_eq!(squad.len(), 1);
        assert_eq!(squad[0].position.as_deref(), Some("Winger"));
    }
}
