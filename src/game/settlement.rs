//! One-time balance settlement applied when a race finishes.

use std::collections::HashMap;

use crate::game::horse::{Horse, HorseId};
use crate::game::player::{Bet, Player, PlayerId};
use crate::util::money::round2;

/// Apply the finish-time balance deltas for every current bet.
///
/// Bets on the winner credit `amount * odds` of the bet's horse; every
/// other bet debits its amount. Balances are clamped at zero and rounded
/// to two decimals. Bets are left in place so the result stays visible
/// until the next reset.
pub fn settle(
    players: &mut HashMap<PlayerId, Player>,
    bets: &HashMap<PlayerId, Bet>,
    horses: &[Horse],
    winner: HorseId,
) {
    for bet in bets.values() {
        let Some(player) = players.get_mut(&bet.player_id) else {
            continue;
        };
        let odds = horses
            .iter()
            .find(|h| h.id == bet.horse_id)
            .map(|h| h.odds)
            .unwrap_or(1.0);
        let delta = if bet.horse_id == winner {
            bet.amount * odds
        } else {
            -bet.amount
        };
        player.balance = round2(player.balance + delta).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::horse::Horse;

    fn horse(id: HorseId, odds: f64) -> Horse {
        Horse {
            id,
            name: format!("Horse {}", id),
            odds,
            color: "#000000".to_string(),
            icon: "🐎".to_string(),
            stats: String::new(),
        }
    }

    fn player(balance: f64) -> Player {
        Player {
            balance,
            ..Player::new("P".to_string())
        }
    }

    fn bet(player_id: PlayerId, horse_id: HorseId, amount: f64) -> Bet {
        Bet {
            player_id,
            horse_id,
            amount,
        }
    }

    #[test]
    fn test_winner_credited_at_odds() {
        let horses = vec![horse(1, 3.0), horse(2, 2.0)];
        let winner_player = player(100.0);
        let pid = winner_player.id;
        let mut players = HashMap::from([(pid, winner_player)]);
        let bets = HashMap::from([(pid, bet(pid, 2, 40.0))]);

        settle(&mut players, &bets, &horses, 2);
        assert_eq!(players[&pid].balance, 180.0);
    }

    #[test]
    fn test_loser_debited_by_amount() {
        let horses = vec![horse(1, 3.0), horse(2, 2.0)];
        let loser = player(100.0);
        let pid = loser.id;
        let mut players = HashMap::from([(pid, loser)]);
        let bets = HashMap::from([(pid, bet(pid, 1, 25.0))]);

        settle(&mut players, &bets, &horses, 2);
        assert_eq!(players[&pid].balance, 75.0);
    }

    #[test]
    fn test_balance_clamped_at_zero() {
        let horses = vec![horse(1, 3.0), horse(2, 2.0)];
        let broke = player(10.0);
        let pid = broke.id;
        let mut players = HashMap::from([(pid, broke)]);
        let bets = HashMap::from([(pid, bet(pid, 1, 50.0))]);

        settle(&mut players, &bets, &horses, 2);
        assert_eq!(players[&pid].balance, 0.0);
    }

    #[test]
    fn test_players_without_bets_untouched() {
        let horses = vec![horse(1, 2.5)];
        let bettor = player(100.0);
        let bystander = player(100.0);
        let (bettor_id, bystander_id) = (bettor.id, bystander.id);
        let mut players = HashMap::from([(bettor_id, bettor), (bystander_id, bystander)]);
        let bets = HashMap::from([(bettor_id, bet(bettor_id, 1, 20.0))]);

        settle(&mut players, &bets, &horses, 1);
        assert_eq!(players[&bettor_id].balance, 150.0);
        assert_eq!(players[&bystander_id].balance, 100.0);
    }

    #[test]
    fn test_stale_bet_for_removed_player_is_skipped() {
        let horses = vec![horse(1, 2.0)];
        let mut players: HashMap<PlayerId, Player> = HashMap::new();
        let ghost = uuid::Uuid::new_v4();
        let bets = HashMap::from([(ghost, bet(ghost, 1, 20.0))]);

        settle(&mut players, &bets, &horses, 1);
        assert!(players.is_empty());
    }

    #[test]
    fn test_result_rounded_to_two_decimals() {
        let horses = vec![horse(1, 1.57)];
        let p = player(100.0);
        let pid = p.id;
        let mut players = HashMap::from([(pid, p)]);
        let bets = HashMap::from([(pid, bet(pid, 1, 33.33))]);

        settle(&mut players, &bets, &horses, 1);
        // 100 + 33.33 * 1.57 = 152.3281 -> 152.33
        assert_eq!(players[&pid].balance, 152.33);
    }
}
