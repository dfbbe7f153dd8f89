//! Command router: validates inbound client messages and applies them to
//! the shared session.
//!
//! Every accepted command ends in a state broadcast; every rejected one
//! ends in a private notice. The ticker task lives here too, since
//! (re)starting it needs the shared handle to the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::game::horse::HorseId;
use crate::game::player::PlayerId;
use crate::game::race::RaceStatus;
use crate::net::protocol::{AdminAction, ClientMessage, ConfigUpdate, ServerMessage};
use crate::net::session::{CommandError, ConnId, RaceSession};

/// The single mutable state slot, shared by the transport, the router,
/// and the ticker.
pub type SharedSession = Arc<RwLock<RaceSession>>;

/// Apply one inbound message from `conn`.
pub async fn dispatch(session: &SharedSession, conn: ConnId, message: ClientMessage) {
    match message {
        ClientMessage::Join { name } => handle_join(session, conn, &name).await,
        ClientMessage::PlaceBet { horse_id, amount } => {
            handle_place_bet(session, conn, horse_id, amount).await
        }
        ClientMessage::Logout => handle_logout(session, conn).await,
        ClientMessage::AdminAction {
            action,
            horse_id,
            player_id,
            amount,
        } => handle_admin(session, conn, action, horse_id, player_id, amount).await,
        ClientMessage::UpdateConfig { config } => handle_update_config(session, &config).await,
    }
}

async fn handle_join(session: &SharedSession, conn: ConnId, name: &str) {
    let mut guard = session.write().await;
    match guard.join(conn, name) {
        Ok((player_id, name)) => {
            guard.send_to(conn, &ServerMessage::Joined { player_id, name });
            guard.broadcast_state();
        }
        Err(e) => guard.notice(conn, e),
    }
}

async fn handle_place_bet(session: &SharedSession, conn: ConnId, horse_id: HorseId, amount: f64) {
    let mut guard = session.write().await;
    match guard.place_bet(conn, horse_id, amount) {
        Ok(()) => guard.broadcast_state(),
        Err(e) => guard.notice(conn, e),
    }
}

async fn handle_logout(session: &SharedSession, conn: ConnId) {
    let mut guard = session.write().await;
    guard.logout(conn);
    guard.broadcast_state();
}

async fn handle_admin(
    session: &SharedSession,
    conn: ConnId,
    action: AdminAction,
    horse_id: Option<HorseId>,
    player_id: Option<PlayerId>,
    amount: Option<f64>,
) {
    debug!("Admin action {:?} from conn {}", action, conn);
    match action {
        AdminAction::Start => start_race(session, conn).await,
        AdminAction::Stop => {
            let mut guard = session.write().await;
            guard.stop_race();
            guard.broadcast_state();
        }
        AdminAction::Reset => {
            let mut guard = session.write().await;
            guard.reset_race(RaceStatus::Idle);
            guard.broadcast_state();
        }
        AdminAction::NextRace => {
            let mut guard = session.write().await;
            guard.reset_race(RaceStatus::Ready);
            guard.broadcast_state();
        }
        AdminAction::ManualWin => {
            let mut guard = session.write().await;
            match horse_id.filter(|id| guard.horses.iter().any(|h| h.id == *id)) {
                Some(winner) => {
                    guard.finish_race(winner);
                    guard.broadcast_state();
                }
                None => guard.notice(conn, CommandError::InvalidWinner),
            }
        }
        AdminAction::ToggleQr => {
            let mut guard = session.write().await;
            guard.show_qr_overlay = !guard.show_qr_overlay;
            guard.broadcast_state();
        }
        AdminAction::KickPlayer => {
            let mut guard = session.write().await;
            match player_id.ok_or(CommandError::UnknownPlayer).and_then(|id| guard.kick(id)) {
                Ok(()) => guard.broadcast_state(),
                Err(e) => guard.notice(conn, e),
            }
        }
        AdminAction::SetBalance => {
            let mut guard = session.write().await;
            let result = match (player_id, amount) {
                (Some(id), Some(amount)) => guard.set_balance(id, amount),
                (None, _) => Err(CommandError::UnknownPlayer),
                (_, None) => Err(CommandError::InvalidBalance),
            };
            match result {
                Ok(()) => guard.broadcast_state(),
                Err(e) => guard.notice(conn, e),
            }
        }
        AdminAction::ClearPlayerBets => {
            let mut guard = session.write().await;
            match player_id
                .ok_or(CommandError::UnknownPlayer)
                .and_then(|id| guard.clear_player_bets(id))
            {
                Ok(()) => guard.broadcast_state(),
                Err(e) => guard.notice(conn, e),
            }
        }
    }
}

/// Begin a race and install a fresh ticker under the same write lock, so
/// no command can slip in between the status flip and the timer start.
async fn start_race(session: &SharedSession, conn: ConnId) {
    let mut guard = session.write().await;
    match guard.begin_race() {
        Ok(()) => {
            let handle = spawn_ticker(session.clone(), guard.config.tick_ms);
            guard.install_ticker(handle);
            guard.broadcast_state();
        }
        Err(e) => guard.notice(conn, e),
    }
}

async fn handle_update_config(session: &SharedSession, update: &ConfigUpdate) {
    let mut guard = session.write().await;
    let restart_ticker = guard.apply_config(update);
    if restart_ticker {
        // New period, same race: positions and tick count are kept.
        let handle = spawn_ticker(session.clone(), guard.config.tick_ms);
        guard.install_ticker(handle);
    }
    guard.broadcast_state();
}

/// Spawn the periodic race tick. The session keeps the returned handle
/// and aborts it on stop, reset, finish, or interval change; the loop
/// also exits on its own once the race is no longer running.
fn spawn_ticker(session: SharedSession, tick_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_millis(tick_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let mut guard = session.write().await;
            if guard.race.status != RaceStatus::Running {
                break;
            }
            guard.run_tick();
        }
    })
}
