use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::{EnvError, EnvVar};
use crate::placeholder::PlaceholderError;
use crate::platform::PlatformError;
use crate::step::{BuildStep, Dependency};
use crate::toolchain::Toolchain;

/// Image stage a plan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Devel,
  Runtime,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Devel => "devel",
      Stage::Runtime => "runtime",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Knobs that apply to every step of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
  /// Parallel build jobs; `None` lets the build use every core.
  pub jobs: Option<u32>,
}

impl PlanOptions {
  /// How `$${jobs}` renders.
  pub fn jobs_hint(&self) -> String {
    self.jobs.map(|j| j.to_string()).unwrap_or_else(|| "$(nproc)".to_string())
  }
}

/// A step after it was appended: placeholders resolved, commands expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
  pub index: usize,
  #[serde(flatten)]
  pub step: BuildStep,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub commands: Vec<String>,
}

/// What later construction code sees of an appended step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepHandle {
  pub index: usize,
  pub stage: Stage,
  pub name: Option<String>,
  pub prefix: Option<String>,
  /// Resolved environment contributions.
  pub env: Vec<EnvVar>,
  /// Resolved toolchain the step provides.
  pub toolchain: Option<Toolchain>,
}

impl StepHandle {
  pub(crate) fn new(stage: Stage, planned: &PlannedStep) -> Self {
    Self {
      index: planned.index,
      stage,
      name: planned.step.name.clone(),
      prefix: planned.step.prefix.clone(),
      env: planned.step.env.clone(),
      toolchain: planned.step.provides.clone(),
    }
  }

  pub fn prefix(&self) -> Option<&str> {
    self.prefix.as_deref()
  }

  /// The step as a dependency of a later step.
  pub fn dependency(&self) -> Dependency {
    match &self.prefix {
      Some(prefix) => Dependency::Prefix(prefix.clone()),
      None => Dependency::Absent,
    }
  }

  /// Toolchain the step provides, or the default one.
  pub fn toolchain(&self) -> Toolchain {
    self.toolchain.clone().unwrap_or_default()
  }
}

#[derive(Debug, Error)]
pub enum PlanError {
  #[error("duplicate step name '{name}' in the {stage} stage")]
  DuplicateStep { name: String, stage: Stage },

  #[error("prefix {prefix} of step '{step}' is already the prefix of step '{existing}'")]
  DuplicatePrefix {
    prefix: String,
    step: String,
    existing: String,
  },

  #[error("no earlier step named '{name}' in the {stage} stage{}", required_by(.step))]
  UnknownDependency {
    name: String,
    stage: Stage,
    step: Option<String>,
  },

  #[error("step '{name}' has no install prefix{}", required_by(.step))]
  NoPrefix { name: String, step: Option<String> },

  #[error("invalid template in step '{step}': {source}")]
  Placeholder {
    step: String,
    #[source]
    source: PlaceholderError,
  },

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error(transparent)]
  Platform(#[from] PlatformError),
}

fn required_by(step: &Option<String>) -> String {
  match step {
    Some(step) => format!(" (required by '{step}')"),
    None => String::new(),
  }
}
