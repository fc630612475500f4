//! Build steps: the atomic units of a build plan.
//!
//! A [`BuildStep`] installs packages, builds a source tree, runs shell
//! commands or only sets environment. It declares what it produces (an
//! install prefix, environment contributions, a toolchain for later steps)
//! and what it consumes (a toolchain, variables it reads, other steps'
//! prefixes through `$${step:NAME}`).
//!
//! # Submodules
//!
//! - `types` - [`BuildStep`], [`StepKind`] and [`BuildSystem`]
//! - `commands` - the shell commands a step expands to

mod commands;
mod types;

pub use types::*;

use serde::{Deserialize, Serialize};

/// What a downstream step sees of an optional dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
  /// The step was gated off; flags referring to it are omitted.
  Absent,
  /// Provided by the consumer itself (OpenMPI's bundled PMIx).
  Internal,
  Prefix(String),
}

impl Dependency {
  /// `--with-<name>=<value>`, or `None` when the dependency is absent.
  pub fn flag(&self, name: &str) -> Option<String> {
    self.value().map(|v| format!("--with-{name}={v}"))
  }

  /// The value a consumer passes: the prefix, or `internal`.
  pub fn value(&self) -> Option<&str> {
    match self {
      Dependency::Absent => None,
      Dependency::Internal => Some("internal"),
      Dependency::Prefix(prefix) => Some(prefix),
    }
  }

  pub fn prefix(&self) -> Option<&str> {
    match self {
      Dependency::Prefix(prefix) => Some(prefix),
      _ => None,
    }
  }

  pub fn is_present(&self) -> bool {
    !matches!(self, Dependency::Absent)
  }
}
