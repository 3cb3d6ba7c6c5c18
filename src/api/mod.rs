//! REST API module
//!
//! Exposes the engine over HTTP for the dashboard.
//!
//! # Endpoints
//!
//! ## Dashboard
//! - `GET /balances` - Balance of every address
//! - `GET /chain` - Canonical blocks, genesis first
//! - `POST /transaction?sender=&recipient=&amount=` - Queue a transfer
//! - `POST /mine?miner_name=` - Mine pending transfers into a block
//! - `POST /attack?attacker=` - Run the 51% attack
//!
//! ## Inspection
//! - `GET /pending` - Pending transactions
//! - `GET /chain/validate` - Re-validate the chain
//! - `GET /stats` - Chain statistics
//! - `GET /health` - Health check
//!
//! ## WebSocket
//! - `GET /ws` - Real-time updates (BlockMined, TransactionAdded, ChainReplaced)

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::{WsBroadcaster, WsEvent};
