//! Process runner - spawns, monitors and terminates the external
//! directory-compiling and data-conversion tools.
//!
//! # Example
//!
//! ```ignore
//! use dirforge_core::process::{LaunchSpec, ProcessRunner};
//! use tokio_util::sync::CancellationToken;
//!
//! let runner = ProcessRunner::with_defaults();
//! let spec = LaunchSpec::new("/opt/tools/dircompile")
//!     .with_arg_string("--in input --out output")?;
//!
//! let cancel = CancellationToken::new();
//! let output = runner.run(&spec, &cancel, None).await?;
//! println!("compiled in {} ms", output.duration_ms);
//! ```

mod config;
mod error;
mod runner;
mod traits;
mod types;

pub use config::ProcessConfig;
pub use error::ProcessError;
pub use runner::{tool_names, ProcessRunner, ToolHandle};
pub use traits::ToolInvoker;
pub use types::{parse_progress_line, split_args, LaunchSpec, ToolOutput, ToolProgress};
