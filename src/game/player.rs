//! Player identity and bet records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::horse::HorseId;

/// Unique player identifier, generated once per identity
pub type PlayerId = Uuid;

/// Balance granted to a newly created player.
pub const STARTING_BALANCE: f64 = 100.0;

/// Identity record for a bettor.
///
/// Created on first join under a name; survives ordinary disconnects so a
/// later join with the same name (case-insensitive) reattaches to it.
/// Removed only by logout or an admin kick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Derived from the connection table at snapshot time, never stored
    /// as ground truth.
    pub connected: bool,
    /// Non-negative, two-decimal.
    pub balance: f64,
}

impl Player {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            connected: true,
            balance: STARTING_BALANCE,
        }
    }
}

/// A player's single active wager. Placing a new bet replaces the old one
/// wholesale (horse and amount both).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub player_id: PlayerId,
    pub horse_id: HorseId,
    pub amount: f64,
}
