//! The container recipes and how they are assembled.
//!
//! Every recipe is a devel plan built from the shared [`blocks`], a
//! [`CopyList`] naming what the runtime image takes from it, and a few extra
//! runtime steps. [`build`] runs the whole pipeline:
//!
//! ```text
//! Config -> devel BuildPlan -> StageCopier -> runtime BuildPlan
//! ```
//!
//! Assembly fails fast: the first error stops construction and no partial
//! recipe is returned.

pub mod blocks;
pub mod params;

mod base_mpi;
mod exahype;
mod openmpi;
mod seissol;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{self, Config, ConfigError, ResolvePolicy};
use crate::plan::{BuildPlan, PlanError, PlanOptions};
use crate::platform::PlatformError;
use crate::source::SourceError;
use crate::stage::{CopyList, StageCopier, StageError};
use crate::util::hash::{HashError, Hashable, ObjectHash};

use params::{ParamError, UserArgs};

#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("unknown recipe '{name}' (available: {})", .known.join(", "))]
  UnknownRecipe { name: String, known: Vec<String> },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Platform(#[from] PlatformError),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Stage(#[from] StageError),

  #[error(transparent)]
  Source(#[from] SourceError),

  #[error(transparent)]
  Params(#[from] ParamError),

  #[error("failed to fingerprint recipe: {0}")]
  Fingerprint(#[from] HashError),
}

/// The recipes this crate knows how to assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecipeKind {
  BaseMpi,
  Openmpi,
  Seissol,
  Exahype,
}

impl RecipeKind {
  pub const ALL: [RecipeKind; 4] = [
    RecipeKind::BaseMpi,
    RecipeKind::Openmpi,
    RecipeKind::Seissol,
    RecipeKind::Exahype,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      RecipeKind::BaseMpi => "base-mpi",
      RecipeKind::Openmpi => "openmpi",
      RecipeKind::Seissol => "seissol",
      RecipeKind::Exahype => "exahype",
    }
  }

  pub fn description(&self) -> &'static str {
    match self {
      RecipeKind::BaseMpi => "Python and a minimal network stack with OpenMPI",
      RecipeKind::Openmpi => "Full network stack, OpenMPI and the MPI benchmarks",
      RecipeKind::Seissol => "SeisSol (orders 4, 5 and 6) with its I/O, math and code generation stack",
      RecipeKind::Exahype => "ExaHyPE applications on Peano with a bootstrapped LLVM",
    }
  }

  fn devel(&self, plan: &mut BuildPlan, config: &Config) -> Result<CopyList, RecipeError> {
    match self {
      RecipeKind::BaseMpi => base_mpi::devel(plan, config),
      RecipeKind::Openmpi => openmpi::devel(plan, config),
      RecipeKind::Seissol => seissol::devel(plan, config),
      RecipeKind::Exahype => exahype::devel(plan, config),
    }
  }

  fn runtime(&self, plan: &mut BuildPlan, devel: &BuildPlan) -> Result<(), RecipeError> {
    match self {
      RecipeKind::BaseMpi => base_mpi::runtime(plan),
      RecipeKind::Openmpi => openmpi::runtime(plan),
      RecipeKind::Seissol => seissol::runtime(plan, devel),
      RecipeKind::Exahype => exahype::runtime(plan, devel),
    }
  }
}

impl fmt::Display for RecipeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for RecipeKind {
  type Err = RecipeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.replace('_', "-");
    RecipeKind::ALL
      .into_iter()
      .find(|k| k.name() == normalized)
      .ok_or_else(|| RecipeError::UnknownRecipe {
        name: s.to_string(),
        known: RecipeKind::ALL.iter().map(|k| k.name().to_string()).collect(),
      })
  }
}

/// A fully assembled two-stage recipe.
#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
  pub kind: RecipeKind,
  /// Machine name or configuration file the recipe was built for.
  pub origin: String,
  pub config: Config,
  pub devel: BuildPlan,
  pub copy_list: CopyList,
  pub runtime: BuildPlan,
}

/// What the fingerprint covers: everything but where the configuration came from.
#[derive(Serialize)]
struct FingerprintInput<'a> {
  kind: RecipeKind,
  config: &'a Config,
  devel: &'a BuildPlan,
  copy_list: &'a CopyList,
  runtime: &'a BuildPlan,
}

impl Hashable for FingerprintInput<'_> {}

impl Recipe {
  pub fn fingerprint(&self) -> Result<ObjectHash, RecipeError> {
    let input = FingerprintInput {
      kind: self.kind,
      config: &self.config,
      devel: &self.devel,
      copy_list: &self.copy_list,
      runtime: &self.runtime,
    };
    Ok(input.compute_hash()?)
  }
}

/// Assemble `kind` for an already resolved configuration.
pub fn build(kind: RecipeKind, config: &Config, origin: &str, options: PlanOptions) -> Result<Recipe, RecipeError> {
  let mut devel = BuildPlan::devel(config, options)?;
  let copy_list = kind.devel(&mut devel, config)?;

  let seed = StageCopier::copy(&devel, &copy_list)?;
  let mut runtime = BuildPlan::runtime(config, seed, options)?;
  kind.runtime(&mut runtime, &devel)?;

  info!(
    recipe = %kind,
    origin = %origin,
    devel_steps = devel.len(),
    runtime_steps = runtime.len(),
    "assembled recipe"
  );

  Ok(Recipe {
    kind,
    origin: origin.to_string(),
    config: config.clone(),
    devel,
    copy_list,
    runtime,
  })
}

/// Resolve the configuration selected by `args` and assemble `kind`.
pub fn assemble(kind: RecipeKind, args: &UserArgs, policy: &ResolvePolicy) -> Result<Recipe, RecipeError> {
  let source = args.source();
  let config = config::resolve(source.as_ref(), policy)?;
  let origin = match (&source, &policy.default_machine) {
    (Some(config::ConfigSource::Machine(name)), _) => name.clone(),
    (Some(config::ConfigSource::File(path)), _) => path.display().to_string(),
    (None, Some(name)) => name.clone(),
    (None, None) => String::new(),
  };
  build(kind, &config, &origin, args.plan_options())
}
