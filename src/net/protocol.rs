//! Wire protocol: JSON messages exchanged with clients.
//!
//! The `type` field selects the variant; struct fields are camelCase and
//! tags are snake_case, matching what the browser clients send.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::horse::{Horse, HorseId};
use crate::game::player::{Bet, Player, PlayerId};
use crate::game::race::{Race, RaceConfig};

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Claim (or reattach to) a player identity by display name
    Join { name: String },
    /// Place or replace this player's single active bet
    PlaceBet { horse_id: HorseId, amount: f64 },
    /// Permanently remove this player and close the connection
    Logout,
    /// Admin controls. Unauthenticated here; access control is an
    /// external concern, but referenced ids are still validated.
    AdminAction {
        action: AdminAction,
        #[serde(default)]
        horse_id: Option<HorseId>,
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default)]
        amount: Option<f64>,
    },
    /// Partial config update; omitted fields keep their current value
    UpdateConfig { config: ConfigUpdate },
}

/// Admin sub-commands carried by `admin_action`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    Start,
    Stop,
    Reset,
    NextRace,
    ManualWin,
    ToggleQr,
    KickPlayer,
    SetBalance,
    ClearPlayerBets,
}

/// Optional overrides for the live race configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default)]
    pub horse_count: Option<usize>,
    #[serde(default)]
    pub track_length: Option<f64>,
    #[serde(default)]
    pub tick_ms: Option<u64>,
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full public snapshot, pushed to every connection on every state
    /// change and once immediately on connect
    State { payload: PublicState },
    /// Private acknowledgment of a join with the resolved identity
    Joined { player_id: PlayerId, name: String },
    /// Private, human-readable rejection or info message
    Notice { message: String },
}

/// A bet on the current winner, joined with the bettor's name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningBet {
    pub player_id: PlayerId,
    pub player_name: String,
    pub amount: f64,
}

/// The full public snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicState {
    pub horses: Vec<Horse>,
    pub players: HashMap<PlayerId, Player>,
    pub bets: Vec<Bet>,
    pub race: Race,
    pub config: RaceConfig,
    pub winning_bets: Vec<WinningBet>,
    pub show_qr_overlay: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join","name":"Ana"}"#).unwrap();
        match msg {
            ClientMessage::Join { name } => assert_eq!(name, "Ana"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_place_bet_camel_case() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"place_bet","horseId":3,"amount":25.5}"#).unwrap();
        match msg {
            ClientMessage::PlaceBet { horse_id, amount } => {
                assert_eq!(horse_id, 3);
                assert_eq!(amount, 25.5);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_admin_action_with_optional_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"admin_action","action":"manual_win","horseId":2}"#)
                .unwrap();
        match msg {
            ClientMessage::AdminAction {
                action,
                horse_id,
                player_id,
                amount,
            } => {
                assert_eq!(action, AdminAction::ManualWin);
                assert_eq!(horse_id, Some(2));
                assert_eq!(player_id, None);
                assert_eq!(amount, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_partial_config_update() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"update_config","config":{"tickMs":250}}"#).unwrap();
        match msg {
            ClientMessage::UpdateConfig { config } => {
                assert_eq!(config.tick_ms, Some(250));
                assert_eq!(config.horse_count, None);
                assert_eq!(config.track_length, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_notice_wire_format() {
        let json = serde_json::to_value(&ServerMessage::Notice {
            message: "Horse not found".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "notice");
        assert_eq!(json["message"], "Horse not found");
    }

    #[test]
    fn test_joined_wire_format() {
        let json = serde_json::to_value(&ServerMessage::Joined {
            player_id: uuid::Uuid::nil(),
            name: "Ana".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "joined");
        assert_eq!(json["playerId"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_state_wire_format() {
        let state = PublicState {
            horses: vec![],
            players: HashMap::new(),
            bets: vec![],
            race: Race::default(),
            config: RaceConfig::new(4),
            winning_bets: vec![],
            show_qr_overlay: true,
        };
        let json = serde_json::to_value(&ServerMessage::State { payload: state }).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["payload"]["showQrOverlay"], true);
        assert_eq!(json["payload"]["config"]["horseCount"], 4);
        assert_eq!(json["payload"]["config"]["tickMs"], 600);
        assert_eq!(json["payload"]["race"]["status"], "idle");
        assert!(json["payload"]["winningBets"].as_array().unwrap().is_empty());
    }
}
