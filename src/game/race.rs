//! Race state machine: status, positions, tick advancement, winner detection.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::horse::{Horse, HorseId};

/// Race lifecycle status. Exactly one holds at any instant; `running` is
/// the only status with an active tick timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    Idle,
    Ready,
    Running,
    Finished,
}

/// Tunable race parameters, exposed verbatim in the public snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceConfig {
    /// Roster size; changing it rebuilds horses and clears bets.
    pub horse_count: usize,
    /// Distance a horse must cover to finish. Must exceed 10.
    pub track_length: f64,
    /// Tick period in milliseconds. Must be at least 100.
    pub tick_ms: u64,
    /// Base per-tick progress before odds weighting.
    pub base_step: f64,
}

impl RaceConfig {
    pub fn new(horse_count: usize) -> Self {
        Self {
            horse_count,
            track_length: 100.0,
            tick_ms: 600,
            base_step: 6.0,
        }
    }
}

/// Mutable race state.
///
/// Positions are keyed by horse id in an ordered map so winner detection
/// scans ids in ascending order; when several horses cross the line on the
/// same tick, the lowest id wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub status: RaceStatus,
    #[serde(deserialize_with = "deserialize_positions")]
    pub positions: BTreeMap<HorseId, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<HorseId>,
    pub tick: u64,
}

/// JSON map keys are always strings; parse them back into horse ids. The
/// derived deserializer handles this only through serde_json's native key
/// handling, which is bypassed when `Race` sits inside an internally tagged
/// enum, so do the conversion explicitly.
fn deserialize_positions<'de, D>(deserializer: D) -> Result<BTreeMap<HorseId, f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            key.parse::<HorseId>()
                .map(|id| (id, value))
                .map_err(D::Error::custom)
        })
        .collect()
}

impl Race {
    pub fn new() -> Self {
        Self {
            status: RaceStatus::Idle,
            positions: BTreeMap::new(),
            winner: None,
            tick: 0,
        }
    }

    /// Zero a position slot for every horse in the roster.
    pub fn reset_positions(&mut self, horses: &[Horse]) {
        self.positions = horses.iter().map(|h| (h.id, 0.0)).collect();
    }

    /// Advance every horse by one tick of progress.
    ///
    /// Favorites (low odds) get a higher weight and thus faster expected
    /// progress; an occasional burst keeps outcomes noisy. Every horse
    /// moves at least 1 unit and never past the finish line.
    pub fn advance(&mut self, horses: &[Horse], config: &RaceConfig) {
        let mut rng = rand::thread_rng();
        self.tick += 1;
        for horse in horses {
            let current = self.positions.get(&horse.id).copied().unwrap_or(0.0);
            let volatility = rng.gen_range(-2.0..2.0);
            let odds_weight = (2.4 - horse.odds * 0.2).max(0.6);
            let burst = if rng.gen::<f64>() > 0.7 {
                4.0 + rng.gen::<f64>() * 5.0
            } else {
                0.0
            };
            let step = (config.base_step * odds_weight + volatility + burst).max(1.0);
            self.positions
                .insert(horse.id, (current + step).min(config.track_length));
        }
    }

    /// First horse (ascending id) at or past the finish line, if any.
    pub fn leader(&self, track_length: f64) -> Option<HorseId> {
        self.positions
            .iter()
            .find(|(_, pos)| **pos >= track_length)
            .map(|(id, _)| *id)
    }
}

impl Default for Race {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::horse::build_roster;

    fn running_race(horses: &[Horse]) -> Race {
        let mut race = Race::new();
        race.reset_positions(horses);
        race.status = RaceStatus::Running;
        race
    }

    #[test]
    fn test_reset_positions_zeroes_every_horse() {
        let horses = build_roster(5);
        let mut race = Race::new();
        race.reset_positions(&horses);
        assert_eq!(race.positions.len(), 5);
        assert!(race.positions.values().all(|p| *p == 0.0));
    }

    #[test]
    fn test_advance_is_monotone_and_bounded() {
        let horses = build_roster(6);
        let config = RaceConfig::new(6);
        let mut race = running_race(&horses);

        let mut previous = race.positions.clone();
        for _ in 0..50 {
            race.advance(&horses, &config);
            for (id, pos) in &race.positions {
                assert!(*pos >= previous[id], "position regressed for horse {}", id);
                assert!(*pos <= config.track_length);
            }
            previous = race.positions.clone();
        }
    }

    #[test]
    fn test_advance_minimum_step() {
        let horses = build_roster(4);
        // base_step 0 makes the raw delta negative whenever volatility is;
        // the floor of 1 unit per tick must still hold.
        let config = RaceConfig {
            base_step: 0.0,
            ..RaceConfig::new(4)
        };
        let mut race = running_race(&horses);
        race.advance(&horses, &config);
        assert!(race.positions.values().all(|p| *p >= 1.0));
        assert_eq!(race.tick, 1);
    }

    #[test]
    fn test_huge_base_step_finishes_in_one_tick_lowest_id_wins() {
        let horses = build_roster(3);
        let config = RaceConfig {
            base_step: 100.0,
            ..RaceConfig::new(3)
        };
        let mut race = running_race(&horses);
        race.advance(&horses, &config);

        // Every horse crossed and was clamped to the line, so the
        // ascending scan picks horse 1.
        assert!(race.positions.values().all(|p| *p == config.track_length));
        assert_eq!(race.leader(config.track_length), Some(1));
    }

    #[test]
    fn test_leader_none_before_finish() {
        let horses = build_roster(3);
        let mut race = running_race(&horses);
        assert_eq!(race.leader(100.0), None);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&RaceStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::from_str::<RaceStatus>("\"finished\"").unwrap(),
            RaceStatus::Finished
        );
    }

    #[test]
    fn test_winner_omitted_when_unset() {
        let race = Race::new();
        let json = serde_json::to_value(&race).unwrap();
        assert!(json.get("winner").is_none());
        assert_eq!(json["status"], "idle");
    }
}
