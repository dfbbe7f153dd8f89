//! Authoritative session state: roster, players, bets, connections, race.
//!
//! All mutation goes through one `RaceSession` behind a single
//! `tokio::sync::RwLock` owned by the server. The ticker task and every
//! connection task take the write lock for their whole read-modify-write,
//! so a tick can never interleave with a command.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::horse::{build_roster, Horse, HorseId};
use crate::game::player::{Bet, Player, PlayerId};
use crate::game::race::{Race, RaceConfig, RaceStatus};
use crate::game::settlement;
use crate::net::protocol::{ConfigUpdate, PublicState, ServerMessage, WinningBet};
use crate::util::money::round2;

/// Fallback wager when the client sends a non-finite or non-positive
/// amount.
pub const DEFAULT_BET: f64 = 10.0;

/// Bound on each connection's outbound queue. A peer that cannot drain
/// this many frames gets snapshots dropped rather than stalling anyone
/// else.
pub const OUTBOUND_QUEUE: usize = 32;

/// Identifier for one live WebSocket connection
pub type ConnId = u64;

/// Frames queued to one connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON-encoded server message
    Text(String),
    /// Ask the writer task to close the socket
    Close,
}

/// Per-connection bookkeeping: which player (if any) this socket speaks
/// for, plus the sending half of its outbound queue.
///
/// This is a lookup-only side table. A connection never owns the player
/// record; removing a connection must never remove the player except on
/// the explicit logout path.
#[derive(Debug)]
struct Connection {
    player_id: Option<PlayerId>,
    tx: mpsc::Sender<Outbound>,
}

/// Rejections reported to a single client as a private notice. The
/// `Display` strings are the exact notice text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Name is required")]
    NameRequired,
    #[error("Join before betting")]
    NotJoined,
    #[error("Player not found")]
    UnknownPlayer,
    #[error("Betting closed during a race")]
    BettingClosed,
    #[error("Horse not found")]
    UnknownHorse,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Race already running")]
    AlreadyRunning,
    #[error("Select a valid horse to mark as winner")]
    InvalidWinner,
    #[error("Balance must be zero or positive")]
    InvalidBalance,
}

/// The single authoritative state slot.
pub struct RaceSession {
    pub config: RaceConfig,
    pub horses: Vec<Horse>,
    pub players: HashMap<PlayerId, Player>,
    /// One active bet per player, replaceable until the race locks.
    pub bets: HashMap<PlayerId, Bet>,
    pub race: Race,
    pub show_qr_overlay: bool,
    connections: HashMap<ConnId, Connection>,
    /// Handle of the active ticker task. At most one exists; every start,
    /// stop, and interval change aborts the old handle first.
    ticker: Option<JoinHandle<()>>,
}

impl RaceSession {
    pub fn new(horse_count: usize) -> Self {
        let horses = build_roster(horse_count);
        let mut race = Race::new();
        race.reset_positions(&horses);
        Self {
            config: RaceConfig::new(horse_count),
            horses,
            players: HashMap::new(),
            bets: HashMap::new(),
            race,
            show_qr_overlay: true,
            connections: HashMap::new(),
            ticker: None,
        }
    }

    // === Connection lifecycle ===

    /// Track a new connection. The caller sends the initial snapshot.
    pub fn register_connection(&mut self, conn: ConnId, tx: mpsc::Sender<Outbound>) {
        self.connections.insert(
            conn,
            Connection {
                player_id: None,
                tx,
            },
        );
    }

    /// Ordinary disconnect: unmap the connection only. The player record
    /// persists so the same name can reattach later.
    pub fn disconnect(&mut self, conn: ConnId) {
        self.connections.remove(&conn);
    }

    /// Resolve an identity for `name` and attach this connection to it.
    ///
    /// Case-insensitive matches reattach to the existing record (same id,
    /// same balance); uniqueness is thereby enforced at creation, so two
    /// names differing only by case can never coexist.
    pub fn join(&mut self, conn: ConnId, name: &str) -> Result<(PlayerId, String), CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::NameRequired);
        }

        let wanted = name.to_lowercase();
        let existing = self
            .players
            .values()
            .find(|p| p.name.to_lowercase() == wanted)
            .map(|p| (p.id, p.name.clone()));

        let (player_id, resolved) = match existing {
            Some(found) => found,
            None => {
                let player = Player::new(name.to_string());
                let created = (player.id, player.name.clone());
                info!("New player '{}' ({})", player.name, player.id);
                self.players.insert(player.id, player);
                created
            }
        };

        if let Some(connection) = self.connections.get_mut(&conn) {
            connection.player_id = Some(player_id);
        }
        Ok((player_id, resolved))
    }

    /// Permanent exit: unmap the connection, delete the player record and
    /// their bets, and ask the writer to close the socket.
    pub fn logout(&mut self, conn: ConnId) {
        if let Some(connection) = self.connections.remove(&conn) {
            if let Some(player_id) = connection.player_id {
                self.players.remove(&player_id);
                self.bets.remove(&player_id);
                info!("Player {} logged out", player_id);
            }
            let _ = connection.tx.try_send(Outbound::Close);
        }
    }

    /// Admin eviction: delete the player and their bets and force-close
    /// every connection mapped to them.
    pub fn kick(&mut self, player_id: PlayerId) -> Result<(), CommandError> {
        if self.players.remove(&player_id).is_none() {
            return Err(CommandError::UnknownPlayer);
        }
        self.bets.remove(&player_id);
        self.connections.retain(|_, connection| {
            if connection.player_id == Some(player_id) {
                let _ = connection.tx.try_send(Outbound::Close);
                false
            } else {
                true
            }
        });
        info!("Player {} kicked", player_id);
        Ok(())
    }

    // === Betting ===

    /// Place or replace this connection's player's single bet.
    pub fn place_bet(
        &mut self,
        conn: ConnId,
        horse_id: HorseId,
        amount: f64,
    ) -> Result<(), CommandError> {
        let player_id = self
            .connections
            .get(&conn)
            .and_then(|c| c.player_id)
            .ok_or(CommandError::NotJoined)?;
        let balance = self
            .players
            .get(&player_id)
            .ok_or(CommandError::UnknownPlayer)?
            .balance;

        if self.race.status == RaceStatus::Running {
            return Err(CommandError::BettingClosed);
        }
        if !self.horses.iter().any(|h| h.id == horse_id) {
            return Err(CommandError::UnknownHorse);
        }
        if balance <= 0.0 {
            return Err(CommandError::InsufficientBalance);
        }

        let amount = if amount.is_finite() && amount > 0.0 {
            amount.min(balance)
        } else {
            DEFAULT_BET
        };
        self.bets.insert(
            player_id,
            Bet {
                player_id,
                horse_id,
                amount,
            },
        );

        // A fresh bet after a finished race stages the next one; the
        // winner goes with the finished status.
        if self.race.status == RaceStatus::Finished {
            self.race.status = RaceStatus::Idle;
            self.race.winner = None;
        }
        Ok(())
    }

    /// Drop one player's bet without touching anything else.
    pub fn clear_player_bets(&mut self, player_id: PlayerId) -> Result<(), CommandError> {
        if !self.players.contains_key(&player_id) {
            return Err(CommandError::UnknownPlayer);
        }
        self.bets.remove(&player_id);
        Ok(())
    }

    /// Admin override of a player's balance. Must be finite and >= 0.
    pub fn set_balance(&mut self, player_id: PlayerId, amount: f64) -> Result<(), CommandError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(CommandError::InvalidBalance);
        }
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(CommandError::UnknownPlayer)?;
        player.balance = round2(amount);
        Ok(())
    }

    // === Race lifecycle ===

    /// Reset race state and enter `running`. The caller installs a fresh
    /// ticker handle via [`RaceSession::install_ticker`].
    pub fn begin_race(&mut self) -> Result<(), CommandError> {
        if self.race.status == RaceStatus::Running {
            return Err(CommandError::AlreadyRunning);
        }
        self.stop_ticker();
        self.race = Race::new();
        self.race.reset_positions(&self.horses);
        self.race.status = RaceStatus::Running;
        info!("Race started ({} horses)", self.horses.len());
        Ok(())
    }

    /// Halt the race without clearing bets.
    pub fn stop_race(&mut self) {
        self.stop_ticker();
        self.race.status = RaceStatus::Idle;
        self.race.winner = None;
        self.race.positions.clear();
        info!("Race stopped");
    }

    /// Full reset to `idle` or staging reset to `ready`: ticker cancelled,
    /// bets cleared, positions zeroed, winner cleared.
    pub fn reset_race(&mut self, next_status: RaceStatus) {
        self.stop_ticker();
        self.race = Race::new();
        self.race.reset_positions(&self.horses);
        self.race.status = next_status;
        self.bets.clear();
        info!("Race reset (status {:?})", next_status);
    }

    /// Finish transition, shared by the automatic and `manual_win` paths:
    /// winner set, settlement applied exactly once, ticker cancelled, and
    /// every horse cosmetically brought up to the finish line.
    pub fn finish_race(&mut self, winner: HorseId) {
        self.race.winner = Some(winner);
        self.race.status = RaceStatus::Finished;
        settlement::settle(&mut self.players, &self.bets, &self.horses, winner);
        self.stop_ticker();
        for horse in &self.horses {
            let position = self.race.positions.entry(horse.id).or_insert(0.0);
            *position = position.max(self.config.track_length);
        }
        info!("Race finished, winner horse {}", winner);
    }

    /// One timer tick: advance positions, finish if a horse crossed the
    /// line (settlement before the broadcast), then broadcast either way.
    pub fn run_tick(&mut self) {
        if self.race.status != RaceStatus::Running {
            return;
        }
        self.race.advance(&self.horses, &self.config);
        if let Some(winner) = self.race.leader(self.config.track_length) {
            self.finish_race(winner);
        }
        self.broadcast_state();
    }

    /// Swap in a new ticker handle, aborting any previous one so at most
    /// one timer is ever active.
    pub fn install_ticker(&mut self, handle: JoinHandle<()>) {
        self.stop_ticker();
        self.ticker = Some(handle);
    }

    pub fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    pub fn ticker_active(&self) -> bool {
        self.ticker.is_some()
    }

    // === Configuration ===

    /// Apply a partial config update. Returns true when the tick interval
    /// changed under a live ticker, in which case the caller must respawn
    /// it (positions and tick count are kept).
    pub fn apply_config(&mut self, update: &ConfigUpdate) -> bool {
        if let Some(count) = update.horse_count {
            if count >= 1 {
                self.config.horse_count = count;
                self.horses = build_roster(count);
                self.race.reset_positions(&self.horses);
                self.bets.clear();
                info!("Roster rebuilt with {} horses", count);
            }
        }

        if let Some(length) = update.track_length {
            if length > 10.0 {
                self.config.track_length = length;
            }
        }

        let mut restart_ticker = false;
        if let Some(tick_ms) = update.tick_ms {
            if tick_ms >= 100 {
                self.config.tick_ms = tick_ms;
                restart_ticker = self.ticker_active();
            }
        }
        restart_ticker
    }

    // === Snapshot & delivery ===

    /// Player ids with at least one live connection.
    fn connected_ids(&self) -> HashSet<PlayerId> {
        self.connections
            .values()
            .filter_map(|c| c.player_id)
            .collect()
    }

    /// Build the full public snapshot. The connected flag is derived live
    /// from the connection table.
    pub fn public_state(&self) -> PublicState {
        let online = self.connected_ids();
        let players = self
            .players
            .iter()
            .map(|(id, player)| {
                let mut player = player.clone();
                player.connected = online.contains(id);
                (*id, player)
            })
            .collect();

        let winning_bets = match self.race.winner {
            Some(winner) => self
                .bets
                .values()
                .filter(|bet| bet.horse_id == winner)
                .map(|bet| WinningBet {
                    player_id: bet.player_id,
                    player_name: self
                        .players
                        .get(&bet.player_id)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    amount: bet.amount,
                })
                .collect(),
            None => Vec::new(),
        };

        PublicState {
            horses: self.horses.clone(),
            players,
            bets: self.bets.values().cloned().collect(),
            race: self.race.clone(),
            config: self.config.clone(),
            winning_bets,
            show_qr_overlay: self.show_qr_overlay,
        }
    }

    /// Push the current snapshot to every open connection, fire-and-forget.
    /// Peers with a full or closed queue are skipped, never waited on.
    pub fn broadcast_state(&self) {
        let message = ServerMessage::State {
            payload: self.public_state(),
        };
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode snapshot for broadcast: {}", e);
                return;
            }
        };
        for (conn, connection) in &self.connections {
            if connection.tx.try_send(Outbound::Text(text.clone())).is_err() {
                debug!("Broadcast to conn {} skipped (queue full or closed)", conn);
            }
        }
    }

    /// Send one message to a single connection.
    pub fn send_to(&self, conn: ConnId, message: &ServerMessage) {
        let Some(connection) = self.connections.get(&conn) else {
            return;
        };
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode message for conn {}: {}", conn, e);
                return;
            }
        };
        if connection.tx.try_send(Outbound::Text(text)).is_err() {
            debug!("Send to conn {} skipped (queue full or closed)", conn);
        }
    }

    /// Private notice with the error's display text.
    pub fn notice(&self, conn: ConnId, error: CommandError) {
        self.send_to(
            conn,
            &ServerMessage::Notice {
                message: error.to_string(),
            },
        );
    }

    /// The player a connection is attached to, if it has joined.
    pub fn player_for_conn(&self, conn: ConnId) -> Option<PlayerId> {
        self.connections.get(&conn).and_then(|c| c.player_id)
    }
}
