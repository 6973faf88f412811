//! Builder - drives one provider's directory build from a ready bundle to a
//! deployed, completed directory.
//!
//! # Pipeline
//!
//! ```text
//! start -> select oldest ready bundle -> hold -> stage files
//!       -> convert (optional) -> compile -> deploy (optional)
//!       -> cleanup -> mark complete -> Ready
//! ```
//!
//! Failures end in Error with the bundle left incomplete for retry;
//! cancellation ends in Ready.

mod config;
mod deploy;
mod error;
mod pipeline;
mod recipe;
mod types;
mod workspace;

pub use config::{BuilderConfig, DeployConfig, ProviderConfig};
pub use deploy::{deploy_dir, deploy_output};
pub use error::BuildError;
pub use pipeline::Builder;
pub use recipe::{
    recipe_for, BuildRecipe, BuildStep, ParascriptRecipe, Phase, RoyalMailRecipe,
    SmartMatchRecipe,
};
pub use types::{split_budget, BuildOutcome, PhaseProgress, StartOutcome};
pub use workspace::BuildWorkspace;
