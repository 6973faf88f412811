//! Build orchestrator and process lifecycle.
//!
//! The orchestrator owns the per-provider state and builders:
//! - **Commands**: start/cancel/status routed to the provider's builder
//! - **Auto-build**: optional per-provider polling for ready bundles
//! - **Shutdown**: cancel builds, wait a bounded time, sweep leftover tools
//!
//! [`InstanceLock`] enforces a single running instance and is taken before
//! anything else starts.

mod config;
mod lock;
mod runner;
mod types;

pub use config::LifecycleConfig;
pub use lock::InstanceLock;
pub use runner::Orchestrator;
pub use types::{CommandOutcome, DispatchError, LifecycleError};
