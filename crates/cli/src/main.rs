mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hpcstack_lib::recipe::RecipeKind;
use hpcstack_lib::render::Format;

use cmd::SelectArgs;
use output::print_error;

/// hpcstack - container recipes for HPC software stacks
#[derive(Parser)]
#[command(name = "hpcstack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overrides RUST_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Generate a container recipe for a machine
  Generate {
    /// Recipe to generate (see `hpcstack recipes`)
    recipe: RecipeKind,

    #[command(flatten)]
    select: SelectArgs,

    /// Output format: docker, singularity or json (default: docker)
    #[arg(short, long)]
    format: Option<Format>,

    /// Write the recipe to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Show the build steps of both stages without rendering them
  Plan {
    /// Recipe to plan (see `hpcstack recipes`)
    recipe: RecipeKind,

    #[command(flatten)]
    select: SelectArgs,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// List the built-in machines
  Machines {
    /// Output the full configurations as JSON
    #[arg(long)]
    json: bool,
  },

  /// List the available recipes
  Recipes {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli.command) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(command: Commands) -> Result<()> {
  match command {
    Commands::Generate {
      recipe,
      select,
      format,
      output,
    } => cmd::cmd_generate(recipe, &select, format, output.as_deref()),
    Commands::Plan { recipe, select, json } => cmd::cmd_plan(recipe, &select, json),
    Commands::Machines { json } => cmd::cmd_machines(json),
    Commands::Recipes { json } => cmd::cmd_recipes(json),
  }
}
