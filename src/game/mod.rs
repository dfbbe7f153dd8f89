//! Race domain: roster generation, race state machine, settlement.

pub mod horse;
pub mod player;
pub mod race;
pub mod settlement;
