//! Component task state - the per-provider build state machine and the
//! change feed the status server listens on.

mod feed;
mod state;
mod types;

pub use feed::ChangeFeed;
pub use state::ComponentTaskState;
pub use types::{TaskError, TaskSnapshot, TaskStatus};
