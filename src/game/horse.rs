//! Horse roster generation.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::util::money::round2;

/// Identifier of a horse within the current roster.
///
/// Ids are exactly `1..=horse_count`; a roster rebuild invalidates every
/// id from the previous roster.
pub type HorseId = u32;

const PALETTE: [&str; 12] = [
    "#1C7C54", "#E36414", "#3A86FF", "#8338EC", "#EF476F", "#FFBA08",
    "#06D6A0", "#118AB2", "#9B2226", "#E29578", "#588157", "#7F5539",
];

const STABLE_NAMES: [&str; 12] = [
    "Comet Trail",
    "Midnight Copper",
    "Blue Nova",
    "Royal Dynamo",
    "Wildfire",
    "Golden Hour",
    "Mint Sprint",
    "Steel Arrow",
    "Crimson Dash",
    "Amber Storm",
    "Shadow Leap",
    "Velvet Rocket",
];

/// One roster entry. Immutable for the lifetime of a roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Horse {
    pub id: HorseId,
    pub name: String,
    /// Payout multiplier, in [1.4, 6.6] with two decimals.
    pub odds: f64,
    pub color: String,
    pub icon: String,
    /// Display-only flavor text, e.g. "72% burst / 45 stamina".
    pub stats: String,
}

/// Build a fresh roster of `count` horses with randomized odds and stats.
///
/// Names and colors cycle through fixed pools, so rosters larger than the
/// pools repeat entries rather than failing.
pub fn build_roster(count: usize) -> Vec<Horse> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|index| {
            let odds = round2(1.4 + rng.gen::<f64>() * 5.2);
            Horse {
                id: (index + 1) as HorseId,
                name: STABLE_NAMES[index % STABLE_NAMES.len()].to_string(),
                odds,
                color: PALETTE[index % PALETTE.len()].to_string(),
                icon: "🐎".to_string(),
                stats: format!(
                    "{:.0}% burst / {:.0} stamina",
                    50.0 + rng.gen::<f64>() * 45.0,
                    20.0 + rng.gen::<f64>() * 60.0
                ),
            }
        })
        .collect()
}
