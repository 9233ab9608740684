// Domain layer: game rules and the ports they depend on.

pub mod errors;
pub mod ports;
pub mod room;
pub mod symbols;

pub use errors::{GameError, LedgerError};
pub use room::{Bet, GameRoom, Phase, Player, RoundResult, MAX_PLAYERS};
pub use symbols::{DICE_COUNT, Symbol};
