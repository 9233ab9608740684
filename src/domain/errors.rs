// Domain-level error taxonomies, mapped to wire reasons at the boundary.

/// Declined game operations. Every variant is a precondition failure; the
/// room state is unchanged when one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    RoomFull,
    AlreadyJoined,
    UnknownPlayer,
    NotDealer,
    NotEnoughPlayers,
    BettingClosed,
    BetAlreadyPlaced,
    InvalidAmount,
    InsufficientBalance,
    RoundInProgress,
    NothingToResolve,
}

impl GameError {
    /// Stable human-readable reason sent to the originating session.
    pub fn reason(&self) -> &'static str {
        match self {
            GameError::RoomFull => "room is full",
            GameError::AlreadyJoined => "already in this room",
            GameError::UnknownPlayer => "player is not in this room",
            GameError::NotDealer => "only the dealer can do that",
            GameError::NotEnoughPlayers => "at least two players are required",
            GameError::BettingClosed => "betting is not open",
            GameError::BetAlreadyPlaced => "bet already placed this round",
            GameError::InvalidAmount => "bet amount must be positive",
            GameError::InsufficientBalance => "insufficient balance",
            GameError::RoundInProgress => "a round is already in progress",
            GameError::NothingToResolve => "no betting round to resolve",
        }
    }
}

/// Failures from the durable balance store. A failed write rolls back as one
/// unit; callers treat the balance as unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    UserNotFound,
    InvalidBalance,
    Storage,
}
