// Interface adapters layer: wire protocol, transport, and persistence glue.

pub mod handlers;
pub mod http;
pub mod ledger;
pub mod net;
pub mod protocol;
pub mod routes;
pub mod state;
