// Shared primitives for driving a live room through its public channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use langur_server::domain::errors::LedgerError;
use langur_server::domain::ports::{BalanceLedger, Clock, DiceRoller, LedgerUpdate};
use langur_server::domain::{DICE_COUNT, Player, Symbol};
use langur_server::use_cases::{
    RoomCommand, RoomDeps, RoomEvent, RoomRegistry, RoomSettings,
};

/// In-memory ledger shared by every player in a test run.
pub struct TestLedger {
    balances: Mutex<HashMap<i64, i64>>,
    log: Mutex<Vec<LedgerUpdate>>,
}

impl TestLedger {
    pub fn with_balances(entries: &[(i64, i64)]) -> Arc<Self> {
        Arc::new(Self {
            balances: Mutex::new(entries.iter().copied().collect()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn balance(&self, user_id: i64) -> i64 {
        *self
            .balances
            .lock()
            .expect("balances mutex poisoned")
            .get(&user_id)
            .expect("user should exist")
    }

    pub fn kinds_for(&self, user_id: i64) -> Vec<String> {
        self.log
            .lock()
            .expect("log mutex poisoned")
            .iter()
            .filter(|u| u.user_id == user_id)
            .map(|u| u.kind.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl BalanceLedger for TestLedger {
    async fn fetch_balance(&self, user_id: i64) -> Result<i64, LedgerError> {
        self.balances
            .lock()
            .expect("balances mutex poisoned")
            .get(&user_id)
            .copied()
            .ok_or(LedgerError::UserNotFound)
    }

    async fn apply_transaction(&self, update: LedgerUpdate) -> Result<i64, LedgerError> {
        let mut balances = self.balances.lock().expect("balances mutex poisoned");
        if !balances.contains_key(&update.user_id) {
            return Err(LedgerError::UserNotFound);
        }
        if update.new_balance_cents < 0 {
            return Err(LedgerError::InvalidBalance);
        }
        balances.insert(update.user_id, update.new_balance_cents);
        self.log
            .lock()
            .expect("log mutex poisoned")
            .push(update.clone());
        Ok(update.new_balance_cents)
    }
}

pub struct TestClock;

impl Clock for TestClock {
    fn now_epoch_millis(&self) -> u64 {
        1_700_000_000_000
    }
}

pub struct ScriptedDice {
    pub dice: [Symbol; DICE_COUNT],
}

impl DiceRoller for ScriptedDice {
    fn roll(&self) -> [Symbol; DICE_COUNT] {
        self.dice
    }
}

pub struct TestRoom {
    pub registry: Arc<RoomRegistry>,
    pub command_tx: mpsc::Sender<RoomCommand>,
    pub events_rx: broadcast::Receiver<RoomEvent>,
    pub ledger: Arc<TestLedger>,
}

pub async fn spawn_room(
    ledger: Arc<TestLedger>,
    dice: [Symbol; DICE_COUNT],
) -> TestRoom {
    let registry = Arc::new(RoomRegistry::new(
        RoomSettings {
            command_channel_capacity: 64,
            events_broadcast_capacity: 128,
        },
        RoomDeps {
            ledger: ledger.clone(),
            clock: Arc::new(TestClock),
            dice: Arc::new(ScriptedDice { dice }),
            betting_window: Duration::from_secs(30),
        },
    ));
    let (handle, created) = registry.get_or_create("LANGUR").await;
    assert!(created, "fresh registry should create the room");
    TestRoom {
        registry,
        command_tx: handle.command_tx,
        events_rx: handle.events_tx.subscribe(),
        ledger,
    }
}

impl TestRoom {
    pub async fn join(&self, id: i64, balance_cents: i64) -> mpsc::Receiver<RoomEvent> {
        let (session_tx, session_rx) = mpsc::channel(32);
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        self.command_tx
            .send(RoomCommand::Join {
                player: Player {
                    id,
                    username: format!("player{id}"),
                    balance_cents,
                },
                session: session_tx,
                ack: ack_tx,
            })
            .await
            .expect("join command should send");
        ack_rx
            .await
            .expect("room should answer the join")
            .expect("seat should be granted");
        session_rx
    }

    pub async fn send(&self, command: RoomCommand) {
        self.command_tx
            .send(command)
            .await
            .expect("command should send");
    }

    pub async fn next_matching(
        &mut self,
        mut pred: impl FnMut(&RoomEvent) -> bool,
    ) -> RoomEvent {
        loop {
            let event = self
                .events_rx
                .recv()
                .await
                .expect("events channel should stay open");
            if pred(&event) {
                return event;
            }
        }
    }
}
