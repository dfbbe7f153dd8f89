//! Derby Server Library
//!
//! A real-time multiplayer race-betting server over WebSocket.
//!
//! One authoritative [`net::session::RaceSession`] owns the horse roster,
//! player registry, bet ledger, and race state. Client commands and the
//! periodic race tick both mutate it behind a single lock, and every state
//! change is pushed to all open connections as a full JSON snapshot.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
