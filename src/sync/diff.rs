use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::config::GOAL_FLASH_WINDOW_MS;
use crate::sync::classify::fixture_state;
use crate::types::{Fixture, FixtureState, GoalFlash};

/// Reconcile the scheduled feed with the live feed for the same day.
///
/// One record per fixture key. Where both feeds carry a fixture, the live
/// record is overlaid onto the scheduled one; fixtures in only one feed pass
/// through. Order is first appearance, scheduled feed first. Callers sort.
pub fn merge_fixtures(scheduled: &[Fixture], live: &[Fixture]) -> Vec<Fixture> {
    let mut merged: Vec<Fixture> = Vec::with_capacity(scheduled.len() + live.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(merged.capacity());

    for fixture in scheduled {
        match index.get(&fixture.key()) {
            Some(&i) => merged[i] = fixture.clone(),
            None => {
                index.insert(fixture.key(), merged.len());
                merged.push(fixture.clone());
            }
        }
    }

    for fixture in live {
        match index.get(&fixture.key()) {
            Some(&i) => merged[i].overlay(fixture),
            None => {
                index.insert(fixture.key(), merged.len());
                merged.push(fixture.clone());
            }
        }
    }

    merged
}

/// Score snapshots and the goal flashes derived from them.
#[derive(Debug, Default)]
pub struct GoalTracker {
    snapshot: HashMap<String, (i32, i32)>,
    flashes: HashMap<String, GoalFlash>,
}

impl GoalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// One detection pass over the current today-pool. Returns the keys that
    /// got a new flash.
    pub fn detect(&mut self, pool: &[Fixture], now: DateTime<Utc>) -> Vec<String> {
        self.flashes.retain(|_, flash| flash.is_active(now));

        let mut next_snapshot = HashMap::with_capacity(pool.len());
        let mut flashed = Vec::new();

        for fixture in pool {
            let Some((home, away)) = fixture.score_pair() else {
                continue;
            };
            let key = fixture.key();
            next_snapshot.insert(key.clone(), (home, away));

            let Some(&(prev_home, prev_away)) = self.snapshot.get(&key) else {
                continue;
            };
            if fixture_state(fixture, now) != FixtureState::Live {
                continue;
            }

            let home_delta = home - prev_home;
            let away_delta = away - prev_away;
            if home_delta + away_delta <= 0 {
                continue;
            }

            let team = if home_delta > away_delta {
                team_label(&fixture.home_team, "Home")
            } else if away_delta > home_delta {
                team_label(&fixture.away_team, "Away")
            } else {
                "Goal Update".to_string()
            };
            info!(key = %key, team = %team, score = %format!("{home} - {away}"), "[SYNC] goal detected");
            self.flashes.insert(
                key.clone(),
                GoalFlash {
                    team,
                    score: format!("{home} - {away}"),
                    expires_at: now + Duration::milliseconds(GOAL_FLASH_WINDOW_MS),
                    forced: false,
                },
            );
            flashed.push(key);
        }

        self.snapshot = next_snapshot;
        flashed
    }

    /// Inject a flash without any score change: prefers a live fixture in
    /// `pool`, then one with a score, then the first. Returns the flash set.
    pub fn force(&mut self, pool: &[Fixture], now: DateTime<Utc>) -> Option<(String, GoalFlash)> {
        let target = pool
            .iter()
            .find(|f| fixture_state(f, now) == FixtureState::Live)
            .or_else(|| pool.iter().find(|f| f.has_score()))
            .or_else(|| pool.first())?;

        let (home, away) = target.score_pair().unwrap_or((1, 0));
        let team = if home >= away {
            team_label(&target.home_team, "Home Team")
        } else {
            team_label(&target.away_team, "Away Team")
        };
        let flash = GoalFlash {
            team,
            score: format!("{home} - {away}"),
            expires_at: now + Duration::milliseconds(GOAL_FLASH_WINDOW_MS),
            forced: true,
        };
        let key = target.key();
        self.flashes.insert(key.clone(), flash.clone());
        Some((key, flash))
    }

    /// Flash for `key` if it is still within its window.
    pub fn active(&self, key: &str, now: DateTime<Utc>) -> Option<&GoalFlash> {
        self.flashes.get(key).filter(|f| f.is_active(now))
    }

    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.flashes.values().filter(|f| f.is_active(now)).count()
    }

    pub fn snapshot(&self) -> &HashMap<String, (i32, i32)> {
        &self.snapshot
    }
}

fn team_label(name: &str, fallback: &str) -> String {
    match name.trim() {
        "" => fallback.to_string(),
        name => name.to_string(),
    }
}
