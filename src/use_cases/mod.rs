// Use cases layer: application workflows for the game server.

pub mod presence;
pub mod registry;
pub mod room_task;
pub mod types;

pub use presence::PresenceMap;
pub use registry::{RoomHandle, RoomRegistry, RoomSettings};
pub use room_task::{RoomDeps, room_task};
pub use types::{RoomCommand, RoomEvent, SessionSender};
