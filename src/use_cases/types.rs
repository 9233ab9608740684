// Use-case level inputs/outputs for the room task.

use tokio::sync::{mpsc, oneshot};

use crate::domain::{DICE_COUNT, Phase, Player, RoundResult, Symbol};

/// Channel used to target events at one connected session.
pub type SessionSender = mpsc::Sender<RoomEvent>;

/// One-shot reply telling the joining connection whether its seat was
/// granted. The transport must not act on behalf of the player (presence,
/// leave-on-disconnect) until this resolves to `Ok`.
pub type JoinAck = oneshot::Sender<Result<(), String>>;

/// Commands flowing from the transport into a room task, processed strictly
/// in receipt order.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player: Player,
        session: SessionSender,
        ack: JoinAck,
    },
    Leave {
        player_id: i64,
    },
    PlaceBet {
        player_id: i64,
        symbol: Symbol,
        amount_cents: i64,
    },
    StartRound {
        player_id: i64,
    },
    RollDice {
        player_id: i64,
    },
    StartNewGame {
        player_id: i64,
    },
    RefreshBalance {
        player_id: i64,
    },
}

/// Events produced by a room task. Broadcast variants go to every session in
/// the room; `BetFailed` and `BalanceUpdated` are targeted at the
/// originating session only.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    GameUpdated {
        players: Vec<Player>,
        dealer_id: Option<i64>,
        phase: Phase,
    },
    RoundStarted {
        round_number: u32,
        betting_deadline_ms: u64,
    },
    BetPlaced {
        player_id: i64,
        symbol: Symbol,
        amount_cents: i64,
        players: Vec<Player>,
    },
    BetFailed {
        reason: String,
    },
    DiceRolled {
        dice: [Symbol; DICE_COUNT],
        results: Vec<RoundResult>,
        players: Vec<Player>,
    },
    NewGameStarted {
        message: String,
    },
    BalanceUpdated {
        balance_cents: i64,
        message: Option<String>,
    },
}
