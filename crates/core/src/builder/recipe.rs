//! Provider-specific build recipes.
//!
//! A recipe turns a bundle and a workspace into the list of tool invocations
//! that build its directory:
//!
//! ```text
//! SmartMatch  => convert (cycle-aware) -> compile
//! Parascript  => compile raw files
//! RoyalMail   => convert -> compile
//! ```

use std::path::Path;

use crate::bundle::{Bundle, Period};
use crate::process::{split_args, LaunchSpec};
use crate::provider::Provider;

use super::config::ProviderConfig;
use super::error::BuildError;
use super::workspace::BuildWorkspace;

/// Which part of the pipeline a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Convert,
    Compile,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Compile => "compile",
        }
    }
}

/// One tool invocation with its share of the tool progress budget.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub phase: Phase,
    pub spec: LaunchSpec,
    pub weight: u32,
}

/// Knows how one provider's directories are built.
pub trait BuildRecipe: Send + Sync {
    fn provider(&self) -> Provider;

    /// Relative weight of the convert step; 0 means the provider compiles
    /// raw files directly.
    fn convert_weight(&self) -> u32;

    fn compile_weight(&self) -> u32 {
        100u32.saturating_sub(self.convert_weight()).max(1)
    }

    fn converts(&self) -> bool {
        self.convert_weight() > 0
    }

    /// Directory name of the bundle's files under the download root.
    fn period_dir(&self, period: &Period) -> String {
        period.dir_name()
    }

    /// Tool invocations for a bundle, in order.
    fn plan(
        &self,
        bundle: &Bundle,
        workspace: &BuildWorkspace,
        config: &ProviderConfig,
    ) -> Result<Vec<BuildStep>, BuildError> {
        let mut steps = Vec::with_capacity(2);
        let vars = TemplateVars::new(&bundle.period);

        let compile_input = if self.converts() {
            let converter = config.converter_path.as_ref().ok_or_else(|| {
                BuildError::Recipe(format!("{} requires converter_path", self.provider()))
            })?;
            steps.push(BuildStep {
                phase: Phase::Convert,
                spec: tool_spec(
                    converter,
                    &config.converter_args,
                    &vars.with_dirs(&workspace.input(), &workspace.converted()),
                    workspace,
                    config,
                )?,
                weight: self.convert_weight(),
            });
            workspace.converted()
        } else {
            workspace.input()
        };

        steps.push(BuildStep {
            phase: Phase::Compile,
            spec: tool_spec(
                &config.compiler_path,
                &config.compiler_args,
                &vars.with_dirs(&compile_input, &workspace.output()),
                workspace,
                config,
            )?,
            weight: self.compile_weight(),
        });

        Ok(steps)
    }
}

pub struct SmartMatchRecipe;

impl BuildRecipe for SmartMatchRecipe {
    fn provider(&self) -> Provider {
        Provider::SmartMatch
    }

    fn convert_weight(&self) -> u32 {
        40
    }
}

pub struct ParascriptRecipe;

impl BuildRecipe for ParascriptRecipe {
    fn provider(&self) -> Provider {
        Provider::Parascript
    }

    fn convert_weight(&self) -> u32 {
        0
    }
}

pub struct RoyalMailRecipe;

impl BuildRecipe for RoyalMailRecipe {
    fn provider(&self) -> Provider {
        Provider::RoyalMail
    }

    fn convert_weight(&self) -> u32 {
        25
    }
}

/// The recipe for a provider.
pub fn recipe_for(provider: Provider) -> Box<dyn BuildRecipe> {
    match provider {
        Provider::SmartMatch => Box::new(SmartMatchRecipe),
        Provider::Parascript => Box::new(ParascriptRecipe),
        Provider::RoyalMail => Box::new(RoyalMailRecipe),
    }
}

/// Values substituted into argument templates.
#[derive(Debug, Clone, Default)]
struct TemplateVars {
    input: String,
    output: String,
    period: String,
    month: String,
    year: String,
    cycle: String,
}

impl TemplateVars {
    fn new(period: &Period) -> Self {
        Self {
            period: period.dir_name(),
            month: format!("{:02}", period.month),
            year: format!("{:04}", period.year),
            cycle: period.cycle.clone().unwrap_or_default(),
            ..Default::default()
        }
    }

    fn with_dirs(&self, input: &Path, output: &Path) -> Self {
        Self {
            input: input.to_string_lossy().to_string(),
            output: output.to_string_lossy().to_string(),
            ..self.clone()
        }
    }

    fn expand(&self, arg: &str) -> String {
        arg.replace("{input}", &self.input)
            .replace("{output}", &self.output)
            .replace("{period}", &self.period)
            .replace("{month}", &self.month)
            .replace("{year}", &self.year)
            .replace("{cycle}", &self.cycle)
    }
}

/// Split the template first so substituted paths stay single arguments.
fn tool_spec(
    program: &Path,
    template: &str,
    vars: &TemplateVars,
    workspace: &BuildWorkspace,
    config: &ProviderConfig,
) -> Result<LaunchSpec, BuildError> {
    let args = split_args(template).map_err(|e| BuildError::Recipe(e.to_string()))?;
    Ok(LaunchSpec::new(program)
        .with_args(args.iter().map(|a| vars.expand(a)))
        .in_dir(workspace.root())
        .with_timeout(config.tool_timeout()))
}
