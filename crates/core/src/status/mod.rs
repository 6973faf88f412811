//! Status protocol - snapshot types, client commands and the board that
//! assembles snapshots for the status server.
//!
//! # Wire format
//!
//! ```text
//! client -> server  {"provider": "RoyalMail", "action": "start" | "cancel" | "status"}
//! server -> client  {"SmartMatch": {"status": "Ready", "progress": 0,
//!                                   "currentBuild": "", "availableBuilds": [...]}, ...}
//! server -> client  {"error": "unknown action: bogus"}
//! ```

mod board;
mod protocol;
mod types;

pub use board::StatusBoard;
pub use protocol::{
    parse_command, Action, ClientCommand, Command, CommandError, ErrorReply, ServerMessage,
};
pub use types::{ProviderStatus, StatusSnapshot};
