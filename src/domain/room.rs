// The per-room game state machine. Pure and synchronous: every operation is
// a precondition check followed by an in-memory mutation, so the owning task
// can never observe a partially applied transition.

use std::collections::HashMap;

use crate::domain::errors::GameError;
use crate::domain::symbols::Symbol;

/// Seat capacity of a room.
pub const MAX_PLAYERS: usize = 6;

/// Minimum players required to start a round.
pub const MIN_PLAYERS_TO_START: usize = 2;

/// Lifecycle phase governing which operations are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Betting,
    Rolling,
    Finished,
}

/// A seated player. Balance is a snapshot of the ledger value and is only
/// mutated after the corresponding ledger write commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: i64,
    pub username: String,
    pub balance_cents: i64,
}

/// One active stake on a symbol, at most one per player per round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub player_id: i64,
    pub symbol: Symbol,
    pub amount_cents: i64,
}

/// Outcome of one bet at resolution. Produced fresh per round; the ledger's
/// transaction log is the durable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    pub player_id: i64,
    pub won: bool,
    pub symbol: Symbol,
    pub count: u32,
    /// Winnings credited on a win, forfeited stake on a loss.
    pub amount_cents: i64,
    pub new_balance_cents: i64,
}

/// A player removed from the room, with any pending bet owed a refund.
#[derive(Debug, Clone)]
pub struct Departure {
    pub player: Player,
    pub pending_bet: Option<Bet>,
}

pub struct GameRoom {
    room_code: String,
    // Insertion order is join order; the dealer is always the first entry.
    players: Vec<Player>,
    current_round: u32,
    bets: HashMap<i64, Bet>,
    phase: Phase,
}

impl GameRoom {
    pub fn new(room_code: impl Into<String>) -> Self {
        Self {
            room_code: room_code.into(),
            players: Vec::new(),
            current_round: 0,
            bets: HashMap::new(),
            phase: Phase::Waiting,
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, player_id: i64) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    /// The earliest-joined remaining player, if any.
    pub fn dealer(&self) -> Option<&Player> {
        self.players.first()
    }

    pub fn is_dealer(&self, player_id: i64) -> bool {
        self.dealer().is_some_and(|d| d.id == player_id)
    }

    /// Seats a player. Valid in any phase; the first player becomes dealer by
    /// virtue of join order.
    pub fn join(&mut self, player: Player) -> Result<(), GameError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::RoomFull);
        }
        if self.player(player.id).is_some() {
            return Err(GameError::AlreadyJoined);
        }
        self.players.push(player);
        Ok(())
    }

    /// Removes a player in any phase. Dealer reassignment is implicit: the
    /// new earliest member takes over. A pending bet is detached and returned
    /// so the caller can refund its stake.
    pub fn leave(&mut self, player_id: i64) -> Option<Departure> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(index);
        let pending_bet = self.bets.remove(&player_id);
        Some(Departure {
            player,
            pending_bet,
        })
    }

    /// Validates a bet without applying it. The caller commits the stake to
    /// the ledger between this check and `commit_bet`; the room task never
    /// interleaves another operation on this room in between.
    pub fn check_bet(&self, player_id: i64, amount_cents: i64) -> Result<&Player, GameError> {
        if self.phase != Phase::Betting {
            return Err(GameError::BettingClosed);
        }
        let player = self.player(player_id).ok_or(GameError::UnknownPlayer)?;
        if self.bets.contains_key(&player_id) {
            return Err(GameError::BetAlreadyPlaced);
        }
        if amount_cents <= 0 {
            return Err(GameError::InvalidAmount);
        }
        if amount_cents > player.balance_cents {
            return Err(GameError::InsufficientBalance);
        }
        Ok(player)
    }

    /// Records a bet whose stake debit has already committed to the ledger.
    /// `confirmed_balance_cents` is the ledger's post-debit balance.
    pub fn commit_bet(
        &mut self,
        player_id: i64,
        symbol: Symbol,
        amount_cents: i64,
        confirmed_balance_cents: i64,
    ) {
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.balance_cents = confirmed_balance_cents;
            self.bets.insert(
                player_id,
                Bet {
                    player_id,
                    symbol,
                    amount_cents,
                },
            );
        }
    }

    /// Opens the betting window. Dealer only, `waiting` phase only, and at
    /// least two players must be seated.
    pub fn start_round(&mut self, actor_id: i64) -> Result<u32, GameError> {
        if self.phase != Phase::Waiting {
            return Err(GameError::RoundInProgress);
        }
        if !self.is_dealer(actor_id) {
            return Err(GameError::NotDealer);
        }
        if self.players.len() < MIN_PLAYERS_TO_START {
            return Err(GameError::NotEnoughPlayers);
        }
        self.current_round += 1;
        self.bets.clear();
        self.phase = Phase::Betting;
        Ok(self.current_round)
    }

    /// Closes the betting window and enters `rolling`. `actor_id` is `None`
    /// when the window timer fires; a manual roll must come from the dealer.
    /// Returns the outstanding bets in join order for settlement.
    pub fn begin_roll(&mut self, actor_id: Option<i64>) -> Result<Vec<Bet>, GameError> {
        if self.phase != Phase::Betting {
            return Err(GameError::NothingToResolve);
        }
        if let Some(actor_id) = actor_id {
            if !self.is_dealer(actor_id) {
                return Err(GameError::NotDealer);
            }
        }
        self.phase = Phase::Rolling;
        let mut bets = std::mem::take(&mut self.bets);
        Ok(self
            .players
            .iter()
            .filter_map(|p| bets.remove(&p.id))
            .collect())
    }

    /// Applies one settled outcome to the in-memory snapshot. Called once per
    /// bet after the corresponding ledger write commits.
    pub fn apply_settlement(&mut self, player_id: i64, confirmed_balance_cents: i64) {
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.balance_cents = confirmed_balance_cents;
        }
    }

    /// Marks the round resolved.
    pub fn finish_roll(&mut self) {
        self.phase = Phase::Finished;
    }

    /// Returns to `waiting` for a fresh round. Dealer only, valid from any
    /// phase. Outstanding bets are detached and returned for refund; the
    /// round counter is preserved.
    pub fn reset(&mut self, actor_id: i64) -> Result<Vec<Bet>, GameError> {
        if !self.is_dealer(actor_id) {
            return Err(GameError::NotDealer);
        }
        let mut bets = std::mem::take(&mut self.bets);
        let refunds = self
            .players
            .iter()
            .filter_map(|p| bets.remove(&p.id))
            .collect();
        self.phase = Phase::Waiting;
        Ok(refunds)
    }

    /// Reconciles a player's snapshot with a freshly read ledger balance.
    pub fn reconcile_balance(&mut self, player_id: i64, balance_cents: i64) {
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.balance_cents = balance_cents;
        }
    }
}
