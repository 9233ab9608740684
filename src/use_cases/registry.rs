// Room registry: create-on-demand room tasks with eviction when a room
// empties, so idle rooms do not leak for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::info;

use crate::use_cases::room_task::{RoomDeps, room_task};
use crate::use_cases::types::{RoomCommand, RoomEvent};

/// Shared configuration applied to newly created rooms.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Capacity for inbound room commands.
    pub command_channel_capacity: usize,
    /// Capacity for broadcast room events.
    pub events_broadcast_capacity: usize,
}

/// Per-room channels handed to connections.
#[derive(Clone)]
pub struct RoomHandle {
    /// Identifier clients use to target this room.
    pub room_code: Arc<str>,
    /// Sender for commands into the room task.
    pub command_tx: mpsc::Sender<RoomCommand>,
    /// Broadcast sender for room events.
    pub events_tx: broadcast::Sender<RoomEvent>,
}

/// Thread-safe registry for active rooms.
pub struct RoomRegistry {
    settings: RoomSettings,
    deps: RoomDeps,
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, deps: RoomDeps) -> Self {
        Self {
            settings,
            deps,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the handle for `room_code`, spawning the room task on first
    /// use. The second tuple element is true when this call created the room.
    pub async fn get_or_create(self: &Arc<Self>, room_code: &str) -> (RoomHandle, bool) {
        if let Some(handle) = self.lookup(room_code).await {
            return (handle, false);
        }

        let mut rooms = self.rooms.write().await;
        // Re-check under the write lock; another connection may have raced us.
        if let Some(handle) = rooms.get(room_code) {
            return (handle.clone(), false);
        }

        let (command_tx, command_rx) =
            mpsc::channel::<RoomCommand>(self.settings.command_channel_capacity);
        let (events_tx, _events_rx) =
            broadcast::channel::<RoomEvent>(self.settings.events_broadcast_capacity);

        let handle = RoomHandle {
            room_code: Arc::from(room_code),
            command_tx,
            events_tx: events_tx.clone(),
        };
        rooms.insert(room_code.to_string(), handle.clone());
        info!(room_code, "room created");

        // The task owns the room state; the registry entry is removed when
        // the task exits so empty rooms are reclaimed.
        let registry = Arc::clone(self);
        let code = room_code.to_string();
        let deps = self.deps.clone();
        tokio::spawn(async move {
            room_task(code.clone(), command_rx, events_tx, deps).await;
            registry.remove(&code).await;
        });

        (handle, true)
    }

    /// Returns the handle for `room_code`, if the room is live.
    pub async fn lookup(&self, room_code: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(room_code).cloned()
    }

    async fn remove(&self, room_code: &str) {
        let mut rooms = self.rooms.write().await;
        if rooms.remove(room_code).is_some() {
            info!(room_code, "room removed");
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DICE_COUNT;
    use crate::domain::errors::LedgerError;
    use crate::domain::ports::{BalanceLedger, Clock, DiceRoller, LedgerUpdate};
    use crate::domain::{Player, Symbol};
    use async_trait::async_trait;

    struct StaticLedger;

    #[async_trait]
    impl BalanceLedger for StaticLedger {
        async fn fetch_balance(&self, _user_id: i64) -> Result<i64, LedgerError> {
            Ok(100_000)
        }

        async fn apply_transaction(&self, update: LedgerUpdate) -> Result<i64, LedgerError> {
            Ok(update.new_balance_cents)
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now_epoch_millis(&self) -> u64 {
            0
        }
    }

    struct FixedDice;

    impl DiceRoller for FixedDice {
        fn roll(&self) -> [Symbol; DICE_COUNT] {
            [Symbol::Crown; DICE_COUNT]
        }
    }

    fn registry() -> Arc<RoomRegistry> {
        Arc::new(RoomRegistry::new(
            RoomSettings {
                command_channel_capacity: 16,
                events_broadcast_capacity: 64,
            },
            RoomDeps {
                ledger: Arc::new(StaticLedger),
                clock: Arc::new(FixedClock),
                dice: Arc::new(FixedDice),
                betting_window: Duration::from_secs(30),
            },
        ))
    }

    #[tokio::test]
    async fn when_room_code_is_new_then_room_is_created_once() {
        let registry = registry();
        let (first, created_first) = registry.get_or_create("ABCDEF").await;
        let (second, created_second) = registry.get_or_create("ABCDEF").await;

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.room_code, second.room_code);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn when_room_was_never_created_then_lookup_returns_none() {
        let registry = registry();
        assert!(registry.lookup("NOSUCH").await.is_none());
    }

    #[tokio::test]
    async fn when_last_player_leaves_then_room_is_evicted() {
        let registry = registry();
        let (handle, _) = registry.get_or_create("ABCDEF").await;

        let (session_tx, _session_rx) = tokio::sync::mpsc::channel(8);
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        handle
            .command_tx
            .send(RoomCommand::Join {
                player: Player {
                    id: 1,
                    username: "player1".to_string(),
                    balance_cents: 100_000,
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
        handle
            .command_tx
            .send(RoomCommand::Leave { player_id: 1 })
            .await
            .expect("leave command should send");

        // The room task exits after its last player leaves and the registry
        // drops the entry shortly after.
        for _ in 0..100 {
            if registry.lookup("ABCDEF").await.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room was not evicted after its last player left");
    }
}
