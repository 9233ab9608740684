// Wire protocol DTOs and conversions for public game server messages.
// The protocol is a closed set of tagged variants; unknown types or malformed
// payloads are rejected at the boundary, never passed into the domain.

use serde::{Deserialize, Serialize};

use crate::domain::{Phase, Player, RoundResult, Symbol};
use crate::use_cases::RoomEvent;

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    // Initial handshake naming the room and the player identity.
    JoinGame(JoinGamePayload),
    // Stake a bet on one symbol during the betting window.
    PlaceBet(PlaceBetPayload),
    // Dealer opens the betting window.
    StartRound,
    // Dealer rolls before the window expires.
    RollDice,
    // Dealer returns the room to waiting for a fresh round.
    StartNewGame,
    // Ask for the committed ledger balance.
    RefreshBalance,
}

/// Payload for the join handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinGamePayload {
    pub room_code: String,
    pub user_id: i64,
    pub username: String,
}

/// Payload for placing one bet.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBetPayload {
    pub symbol: SymbolDto,
    pub amount_cents: i64,
}

/// Messages the server sends to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    GameUpdated {
        players: Vec<PlayerDto>,
        dealer_id: Option<i64>,
        phase: PhaseDto,
    },
    RoundStarted {
        round_number: u32,
        phase: PhaseDto,
        betting_deadline_ms: u64,
    },
    BetPlaced {
        player_id: i64,
        symbol: SymbolDto,
        amount_cents: i64,
        players: Vec<PlayerDto>,
    },
    BetFailed {
        reason: String,
    },
    DiceRolled {
        dice: Vec<SymbolDto>,
        results: Vec<RoundResultDto>,
        players: Vec<PlayerDto>,
    },
    NewGameStarted {
        message: String,
    },
    BalanceUpdated {
        balance_cents: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    JoinFailed {
        reason: String,
    },
}

/// Dice symbol on the wire, matching the table layout labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolDto {
    Diamonds,
    Clubs,
    Hearts,
    Spades,
    Crown,
    Flag,
}

impl From<SymbolDto> for Symbol {
    fn from(symbol: SymbolDto) -> Self {
        match symbol {
            SymbolDto::Diamonds => Symbol::Diamonds,
            SymbolDto::Clubs => Symbol::Clubs,
            SymbolDto::Hearts => Symbol::Hearts,
            SymbolDto::Spades => Symbol::Spades,
            SymbolDto::Crown => Symbol::Crown,
            SymbolDto::Flag => Symbol::Flag,
        }
    }
}

impl From<Symbol> for SymbolDto {
    fn from(symbol: Symbol) -> Self {
        match symbol {
            Symbol::Diamonds => SymbolDto::Diamonds,
            Symbol::Clubs => SymbolDto::Clubs,
            Symbol::Hearts => SymbolDto::Hearts,
            Symbol::Spades => SymbolDto::Spades,
            Symbol::Crown => SymbolDto::Crown,
            Symbol::Flag => SymbolDto::Flag,
        }
    }
}

/// Room lifecycle phase sent to clients for UI flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseDto {
    Waiting,
    Betting,
    Rolling,
    Finished,
}

impl From<Phase> for PhaseDto {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Waiting => PhaseDto::Waiting,
            Phase::Betting => PhaseDto::Betting,
            Phase::Rolling => PhaseDto::Rolling,
            Phase::Finished => PhaseDto::Finished,
        }
    }
}

/// Seated player state for wire transmission.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerDto {
    pub id: i64,
    pub username: String,
    pub balance_cents: i64,
}

impl From<&Player> for PlayerDto {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            username: player.username.clone(),
            balance_cents: player.balance_cents,
        }
    }
}

/// One settled bet outcome for wire transmission.
#[derive(Debug, Clone, Serialize)]
pub struct RoundResultDto {
    pub player_id: i64,
    pub won: bool,
    pub symbol: SymbolDto,
    pub count: u32,
    pub amount_cents: i64,
    pub new_balance_cents: i64,
}

impl From<&RoundResult> for RoundResultDto {
    fn from(result: &RoundResult) -> Self {
        Self {
            player_id: result.player_id,
            won: result.won,
            symbol: result.symbol.into(),
            count: result.count,
            amount_cents: result.amount_cents,
            new_balance_cents: result.new_balance_cents,
        }
    }
}

fn player_dtos(players: &[Player]) -> Vec<PlayerDto> {
    players.iter().map(PlayerDto::from).collect()
}

impl From<RoomEvent> for ServerMessage {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::GameUpdated {
                players,
                dealer_id,
                phase,
            } => ServerMessage::GameUpdated {
                players: player_dtos(&players),
                dealer_id,
                phase: phase.into(),
            },
            RoomEvent::RoundStarted {
                round_number,
                betting_deadline_ms,
            } => ServerMessage::RoundStarted {
                round_number,
                phase: PhaseDto::Betting,
                betting_deadline_ms,
            },
            RoomEvent::BetPlaced {
                player_id,
                symbol,
                amount_cents,
                players,
            } => ServerMessage::BetPlaced {
                player_id,
                symbol: symbol.into(),
                amount_cents,
                players: player_dtos(&players),
            },
            RoomEvent::BetFailed { reason } => ServerMessage::BetFailed { reason },
            RoomEvent::DiceRolled {
                dice,
                results,
                players,
            } => ServerMessage::DiceRolled {
                dice: dice.iter().copied().map(SymbolDto::from).collect(),
                results: results.iter().map(RoundResultDto::from).collect(),
                players: player_dtos(&players),
            },
            RoomEvent::NewGameStarted { message } => ServerMessage::NewGameStarted { message },
            RoomEvent::BalanceUpdated {
                balance_cents,
                message,
            } => ServerMessage::BalanceUpdated {
                balance_cents,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_game_payload_deserializes_from_tagged_json() {
        let text = r#"{"type":"join_game","data":{"room_code":"ABCDEF","user_id":7,"username":"laxman"}}"#;
        let msg: ClientMessage = serde_json::from_str(text).expect("join_game should parse");
        let ClientMessage::JoinGame(payload) = msg else {
            panic!("expected JoinGame");
        };
        assert_eq!(payload.room_code, "ABCDEF");
        assert_eq!(payload.user_id, 7);
        assert_eq!(payload.username, "laxman");
    }

    #[test]
    fn place_bet_accepts_screaming_snake_case_symbols() {
        let text = r#"{"type":"place_bet","data":{"symbol":"HEARTS","amount_cents":5000}}"#;
        let msg: ClientMessage = serde_json::from_str(text).expect("place_bet should parse");
        let ClientMessage::PlaceBet(payload) = msg else {
            panic!("expected PlaceBet");
        };
        assert_eq!(Symbol::from(payload.symbol), Symbol::Hearts);
        assert_eq!(payload.amount_cents, 5000);
    }

    #[test]
    fn dealer_actions_parse_without_a_data_field() {
        for (text, expect_roll) in [
            (r#"{"type":"start_round"}"#, false),
            (r#"{"type":"roll_dice"}"#, true),
        ] {
            let msg: ClientMessage = serde_json::from_str(text).expect("should parse");
            match msg {
                ClientMessage::RollDice => assert!(expect_roll),
                ClientMessage::StartRound => assert!(!expect_roll),
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let text = r#"{"type":"shutdown_server","data":{}}"#;
        assert!(serde_json::from_str::<ClientMessage>(text).is_err());
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let text = r#"{"type":"place_bet","data":{"symbol":"JOKER","amount_cents":100}}"#;
        assert!(serde_json::from_str::<ClientMessage>(text).is_err());
    }

    #[test]
    fn round_started_serializes_with_snake_case_tag_and_phase() {
        let msg = ServerMessage::from(RoomEvent::RoundStarted {
            round_number: 3,
            betting_deadline_ms: 1_700_000_030_000,
        });
        let value = serde_json::to_value(&msg).expect("should serialize");
        assert_eq!(value["type"], "round_started");
        assert_eq!(value["data"]["round_number"], 3);
        assert_eq!(value["data"]["phase"], "betting");
        assert_eq!(value["data"]["betting_deadline_ms"], 1_700_000_030_000u64);
    }

    #[test]
    fn dice_rolled_serializes_six_symbols() {
        let msg = ServerMessage::from(RoomEvent::DiceRolled {
            dice: [
                Symbol::Hearts,
                Symbol::Hearts,
                Symbol::Clubs,
                Symbol::Flag,
                Symbol::Crown,
                Symbol::Spades,
            ],
            results: vec![],
            players: vec![],
        });
        let value = serde_json::to_value(&msg).expect("should serialize");
        assert_eq!(value["type"], "dice_rolled");
        let dice = value["data"]["dice"].as_array().expect("dice array");
        assert_eq!(dice.len(), 6);
        assert_eq!(dice[0], "HEARTS");
        assert_eq!(dice[5], "SPADES");
    }

    #[test]
    fn balance_updated_omits_absent_message() {
        let msg = ServerMessage::from(RoomEvent::BalanceUpdated {
            balance_cents: 100_000,
            message: None,
        });
        let value = serde_json::to_value(&msg).expect("should serialize");
        assert_eq!(value["type"], "balance_updated");
        assert!(value["data"].get("message").is_none());
    }
}
