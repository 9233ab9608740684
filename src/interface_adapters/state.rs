use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::domain::ports::{BalanceLedger, Clock, DiceRoller};
use crate::domain::{DICE_COUNT, Symbol};
use crate::use_cases::{PresenceMap, RoomRegistry};

/// Application state shared across connections and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    // Owns the set of active room tasks.
    pub registry: Arc<RoomRegistry>,
    // Routes balance notifications to the user's most recent session.
    pub presence: Arc<PresenceMap>,
    // Durable balance store, also used for join-time snapshots.
    pub ledger: Arc<dyn BalanceLedger>,
}

/// System clock adapter used for betting-deadline publication.
#[derive(Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Thread-local RNG dice adapter.
#[derive(Clone)]
pub struct ThreadRngDice;

impl DiceRoller for ThreadRngDice {
    fn roll(&self) -> [Symbol; DICE_COUNT] {
        let mut rng = rand::thread_rng();
        std::array::from_fn(|_| Symbol::ALL[rng.gen_range(0..Symbol::ALL.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dice_roller_only_produces_symbols_from_the_alphabet() {
        let roller = ThreadRngDice;
        for _ in 0..64 {
            let dice = roller.roll();
            assert_eq!(dice.len(), DICE_COUNT);
            for die in dice {
                assert!(Symbol::ALL.contains(&die));
            }
        }
    }
}
