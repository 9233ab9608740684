// The authoritative loop for one room. All state mutation for a room happens
// inside this task, so commands never interleave and the check-then-act
// sequences in the domain stay atomic. Ledger writes and the betting-window
// deadline are the only suspension points.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::ports::{BalanceLedger, Clock, DiceRoller, LedgerUpdate, TransactionKind};
use crate::domain::{GameRoom, RoundResult, Symbol, symbols};
use crate::use_cases::types::{JoinAck, RoomCommand, RoomEvent, SessionSender};

/// Shared collaborators injected into every room task.
#[derive(Clone)]
pub struct RoomDeps {
    pub ledger: Arc<dyn BalanceLedger>,
    pub clock: Arc<dyn Clock>,
    pub dice: Arc<dyn DiceRoller>,
    /// Duration of the betting window before the roll auto-resolves.
    pub betting_window: Duration,
}

/// Runs one room until its last player leaves or the command channel closes.
pub async fn room_task(
    room_code: String,
    mut command_rx: mpsc::Receiver<RoomCommand>,
    events_tx: broadcast::Sender<RoomEvent>,
    deps: RoomDeps,
) {
    let mut worker = RoomWorker {
        room: GameRoom::new(room_code),
        sessions: HashMap::new(),
        betting_deadline: None,
        events_tx,
        deps,
    };
    // Only evict once somebody has actually been seated; a freshly created
    // room is allowed to sit empty while its first join is in flight.
    let mut seated_anyone = false;

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                let Some(cmd) = cmd else { break };
                if matches!(cmd, RoomCommand::Join { .. }) {
                    seated_anyone = true;
                }
                worker.handle(cmd).await;
            }
            _ = deadline_expiry(worker.betting_deadline) => {
                // Betting window elapsed without a manual roll.
                worker.resolve_round(None).await;
            }
        }

        if seated_anyone && worker.room.is_empty() {
            info!(room_code = worker.room.room_code(), "room empty; shutting down");
            break;
        }
    }
}

/// Resolves when the deadline passes; parks forever while no window is armed.
async fn deadline_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

struct RoomWorker {
    room: GameRoom,
    // Per-player targeted channels, registered at join time.
    sessions: HashMap<i64, SessionSender>,
    betting_deadline: Option<Instant>,
    events_tx: broadcast::Sender<RoomEvent>,
    deps: RoomDeps,
}

impl RoomWorker {
    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                player,
                session,
                ack,
            } => self.join(player, session, ack),
            RoomCommand::Leave { player_id } => self.leave(player_id).await,
            RoomCommand::PlaceBet {
                player_id,
                symbol,
                amount_cents,
            } => self.place_bet(player_id, symbol, amount_cents).await,
            RoomCommand::StartRound { player_id } => self.start_round(player_id).await,
            RoomCommand::RollDice { player_id } => self.resolve_round(Some(player_id)).await,
            RoomCommand::StartNewGame { player_id } => self.start_new_game(player_id).await,
            RoomCommand::RefreshBalance { player_id } => self.refresh_balance(player_id).await,
        }
    }

    fn broadcast(&self, event: RoomEvent) {
        // Send failures only mean no receiver is currently subscribed.
        let _ = self.events_tx.send(event);
    }

    async fn notify(&self, player_id: i64, event: RoomEvent) {
        if let Some(session) = self.sessions.get(&player_id) {
            let _ = session.send(event).await;
        }
    }

    fn game_updated(&self) -> RoomEvent {
        RoomEvent::GameUpdated {
            players: self.room.players().to_vec(),
            dealer_id: self.room.dealer().map(|d| d.id),
            phase: self.room.phase(),
        }
    }

    fn join(&mut self, player: crate::domain::Player, session: SessionSender, ack: JoinAck) {
        let player_id = player.id;
        match self.room.join(player) {
            Ok(()) => {
                self.sessions.insert(player_id, session);
                info!(
                    room_code = self.room.room_code(),
                    player_id,
                    players = self.room.players().len(),
                    "player joined"
                );
                let _ = ack.send(Ok(()));
                self.broadcast(self.game_updated());
            }
            Err(e) => {
                info!(
                    room_code = self.room.room_code(),
                    player_id,
                    reason = e.reason(),
                    "join declined"
                );
                // The declined connection must not touch the seat or its
                // session entry; an earlier connection may own both.
                let _ = ack.send(Err(e.reason().to_string()));
            }
        }
    }

    async fn leave(&mut self, player_id: i64) {
        self.sessions.remove(&player_id);
        let Some(departure) = self.room.leave(player_id) else {
            return;
        };
        info!(
            room_code = self.room.room_code(),
            player_id,
            players = self.room.players().len(),
            "player left"
        );

        // Refund policy for a disconnect with a bet in flight: the stake goes
        // back through the ledger rather than being forfeited.
        if let Some(bet) = departure.pending_bet {
            let update = LedgerUpdate {
                user_id: player_id,
                new_balance_cents: departure.player.balance_cents + bet.amount_cents,
                kind: TransactionKind::Deposit,
                amount_cents: bet.amount_cents,
                description: format!(
                    "bet refund on leave, room {} round {}",
                    self.room.room_code(),
                    self.room.current_round()
                ),
            };
            if let Err(e) = self.deps.ledger.apply_transaction(update).await {
                warn!(
                    room_code = self.room.room_code(),
                    player_id,
                    error = ?e,
                    "bet refund failed; stake remains debited in the ledger"
                );
            }
        }

        self.broadcast(self.game_updated());
    }

    async fn place_bet(&mut self, player_id: i64, symbol: Symbol, amount_cents: i64) {
        let balance_cents = match self.room.check_bet(player_id, amount_cents) {
            Ok(player) => player.balance_cents,
            Err(e) => {
                self.notify(
                    player_id,
                    RoomEvent::BetFailed {
                        reason: e.reason().to_string(),
                    },
                )
                .await;
                return;
            }
        };

        // Ledger first: the stake debit must commit before the in-memory
        // balance moves, so memory can never run ahead of durable state.
        let update = LedgerUpdate {
            user_id: player_id,
            new_balance_cents: balance_cents - amount_cents,
            kind: TransactionKind::Withdrawal,
            amount_cents,
            description: format!(
                "stake on {}, room {} round {}",
                symbol.as_str(),
                self.room.room_code(),
                self.room.current_round()
            ),
        };
        match self.deps.ledger.apply_transaction(update).await {
            Ok(confirmed) => {
                self.room.commit_bet(player_id, symbol, amount_cents, confirmed);
                info!(
                    room_code = self.room.room_code(),
                    player_id,
                    symbol = symbol.as_str(),
                    amount_cents,
                    "bet placed"
                );
                self.broadcast(RoomEvent::BetPlaced {
                    player_id,
                    symbol,
                    amount_cents,
                    players: self.room.players().to_vec(),
                });
            }
            Err(e) => {
                warn!(
                    room_code = self.room.room_code(),
                    player_id,
                    error = ?e,
                    "stake debit failed; bet declined"
                );
                self.notify(
                    player_id,
                    RoomEvent::BetFailed {
                        reason: "balance update failed".to_string(),
                    },
                )
                .await;
            }
        }
    }

    async fn start_round(&mut self, player_id: i64) {
        match self.room.start_round(player_id) {
            Ok(round_number) => {
                let window = self.deps.betting_window;
                self.betting_deadline = Some(Instant::now() + window);
                let betting_deadline_ms =
                    self.deps.clock.now_epoch_millis() + window.as_millis() as u64;
                info!(
                    room_code = self.room.room_code(),
                    round_number, "round started"
                );
                self.broadcast(RoomEvent::RoundStarted {
                    round_number,
                    betting_deadline_ms,
                });
                self.broadcast(self.game_updated());
            }
            Err(e) => {
                self.notify(
                    player_id,
                    RoomEvent::BetFailed {
                        reason: e.reason().to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Closes the betting window and settles every outstanding bet. `actor`
    /// is `None` for the window timer; the phase guard in `begin_roll` makes
    /// resolution exactly-once even when the timer and a manual roll land in
    /// the same tick, and a stale timer fire is a silent no-op.
    async fn resolve_round(&mut self, actor: Option<i64>) {
        let bets = match self.room.begin_roll(actor) {
            Ok(bets) => bets,
            Err(e) => {
                if let Some(player_id) = actor {
                    self.notify(
                        player_id,
                        RoomEvent::BetFailed {
                            reason: e.reason().to_string(),
                        },
                    )
                    .await;
                }
                return;
            }
        };
        self.betting_deadline = None;

        let dice = self.deps.dice.roll();
        let mut results: Vec<RoundResult> = Vec::with_capacity(bets.len());
        for bet in bets {
            let Some(balance_cents) = self.room.player(bet.player_id).map(|p| p.balance_cents)
            else {
                continue;
            };
            let count = symbols::count_matches(&dice, bet.symbol);
            let won = count > 0;
            let (amount_cents, update) = if won {
                let winnings = symbols::payout_cents(bet.amount_cents, count);
                (
                    winnings,
                    LedgerUpdate {
                        user_id: bet.player_id,
                        new_balance_cents: balance_cents + winnings,
                        kind: TransactionKind::BetWin,
                        amount_cents: winnings,
                        description: format!(
                            "won on {} x{}, room {} round {}",
                            bet.symbol.as_str(),
                            count,
                            self.room.room_code(),
                            self.room.current_round()
                        ),
                    },
                )
            } else {
                // The stake was debited at bet time; this row is the audit
                // record of the forfeit and leaves the balance untouched.
                (
                    bet.amount_cents,
                    LedgerUpdate {
                        user_id: bet.player_id,
                        new_balance_cents: balance_cents,
                        kind: TransactionKind::BetLoss,
                        amount_cents: bet.amount_cents,
                        description: format!(
                            "lost on {}, room {} round {}",
                            bet.symbol.as_str(),
                            self.room.room_code(),
                            self.room.current_round()
                        ),
                    },
                )
            };

            match self.deps.ledger.apply_transaction(update).await {
                Ok(confirmed) => {
                    self.room.apply_settlement(bet.player_id, confirmed);
                    results.push(RoundResult {
                        player_id: bet.player_id,
                        won,
                        symbol: bet.symbol,
                        count,
                        amount_cents,
                        new_balance_cents: confirmed,
                    });
                }
                Err(e) => {
                    warn!(
                        room_code = self.room.room_code(),
                        player_id = bet.player_id,
                        error = ?e,
                        "settlement write failed; outcome not applied"
                    );
                }
            }
        }

        self.room.finish_roll();
        info!(
            room_code = self.room.room_code(),
            round_number = self.room.current_round(),
            settled = results.len(),
            "round resolved"
        );
        self.broadcast(RoomEvent::DiceRolled {
            dice,
            results,
            players: self.room.players().to_vec(),
        });
        self.broadcast(self.game_updated());
    }

    async fn start_new_game(&mut self, player_id: i64) {
        match self.room.reset(player_id) {
            Ok(refunds) => {
                self.betting_deadline = None;
                for bet in refunds {
                    let Some(balance_cents) =
                        self.room.player(bet.player_id).map(|p| p.balance_cents)
                    else {
                        continue;
                    };
                    let update = LedgerUpdate {
                        user_id: bet.player_id,
                        new_balance_cents: balance_cents + bet.amount_cents,
                        kind: TransactionKind::Deposit,
                        amount_cents: bet.amount_cents,
                        description: format!(
                            "bet refund on reset, room {} round {}",
                            self.room.room_code(),
                            self.room.current_round()
                        ),
                    };
                    match self.deps.ledger.apply_transaction(update).await {
                        Ok(confirmed) => self.room.apply_settlement(bet.player_id, confirmed),
                        Err(e) => warn!(
                            room_code = self.room.room_code(),
                            player_id = bet.player_id,
                            error = ?e,
                            "bet refund failed on reset"
                        ),
                    }
                }
                info!(room_code = self.room.room_code(), "new game started");
                self.broadcast(RoomEvent::NewGameStarted {
                    message: "New game started! Waiting for the dealer to open betting."
                        .to_string(),
                });
                self.broadcast(self.game_updated());
            }
            Err(e) => {
                self.notify(
                    player_id,
                    RoomEvent::BetFailed {
                        reason: e.reason().to_string(),
                    },
                )
                .await;
            }
        }
    }

    async fn refresh_balance(&mut self, player_id: i64) {
        match self.deps.ledger.fetch_balance(player_id).await {
            Ok(balance_cents) => {
                // Opportunistic reconciliation with out-of-band deposits.
                self.room.reconcile_balance(player_id, balance_cents);
                self.notify(
                    player_id,
                    RoomEvent::BalanceUpdated {
                        balance_cents,
                        message: None,
                    },
                )
                .await;
            }
            Err(e) => {
                warn!(
                    room_code = self.room.room_code(),
                    player_id,
                    error = ?e,
                    "balance refresh failed"
                );
            }
        }
    }
}
