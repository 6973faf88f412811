pub mod builder;
pub mod bundle;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod process;
pub mod provider;
pub mod status;
pub mod task;
pub mod testing;

pub use builder::{BuildError, BuildOutcome, Builder, StartOutcome};
pub use bundle::{Bundle, BundleError, BundleStore, Period, SqliteBundleStore};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use orchestrator::{InstanceLock, LifecycleError, Orchestrator};
pub use process::{ProcessError, ProcessRunner, ToolInvoker};
pub use provider::Provider;
pub use status::{StatusBoard, StatusSnapshot};
pub use task::{ChangeFeed, ComponentTaskState, TaskStatus};
