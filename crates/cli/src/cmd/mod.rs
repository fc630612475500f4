mod generate;
mod machines;
mod plan;
mod recipes;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use hpcstack_lib::config::ResolvePolicy;
use hpcstack_lib::recipe::params::UserArgs;
use hpcstack_lib::recipe::{Recipe, RecipeKind, assemble};
use hpcstack_lib::render::Format;

pub use generate::cmd_generate;
pub use machines::cmd_machines;
pub use plan::cmd_plan;
pub use recipes::cmd_recipes;

/// Flags that select the machine configuration and build knobs.
#[derive(Debug, Args)]
pub struct SelectArgs {
  /// Built-in machine (see `hpcstack machines`)
  #[arg(short, long)]
  pub machine: Option<String>,

  /// JSON machine configuration file
  #[arg(short = 'c', long, value_name = "PATH")]
  pub config_file: Option<PathBuf>,

  /// Parallel build jobs inside the image (default: all cores)
  #[arg(short, long, env = "HPCSTACK_JOBS")]
  pub jobs: Option<u32>,

  /// Extra KEY=VALUE argument (machine, config-file, llvm-build-par, jobs, format)
  #[arg(long = "userarg", value_name = "KEY=VALUE")]
  pub userargs: Vec<String>,
}

impl SelectArgs {
  /// Combine the dedicated flags with `--userarg` pairs.
  pub fn user_args(&self, format: Option<Format>) -> Result<UserArgs> {
    let flags = UserArgs {
      machine: self.machine.clone(),
      config_file: self.config_file.clone(),
      jobs: self.jobs,
      format,
    };
    let extra = UserArgs::parse(&self.userargs).context("Invalid --userarg")?;
    flags.merge(extra).context("Invalid arguments")
  }
}

fn assemble_recipe(kind: RecipeKind, args: &UserArgs) -> Result<Recipe> {
  assemble(kind, args, &ResolvePolicy::strict()).with_context(|| format!("Failed to assemble recipe {kind}"))
}
