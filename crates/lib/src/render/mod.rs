//! Turning an assembled recipe into something an image builder consumes.
//!
//! - [`Format::Docker`]: a multi-stage Dockerfile
//! - [`Format::Singularity`]: a multi-stage Singularity/Apptainer definition
//! - [`Format::Json`]: the whole [`Recipe`] value
//!
//! Both text formats walk the steps of each stage in order and emit the
//! environment the way the stage overlay recorded it: a contribution that was
//! a no-op when appended is not emitted again.

mod docker;
mod singularity;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::env::{EnvError, EnvOverlay, EnvVar};
use crate::platform::{Arch, PlatformError};
use crate::recipe::{Recipe, RecipeError};
use crate::step::BuildStep;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
  #[default]
  Docker,
  Singularity,
  Json,
}

impl Format {
  pub const ALL: [Format; 3] = [Format::Docker, Format::Singularity, Format::Json];

  pub fn as_str(&self) -> &'static str {
    match self {
      Format::Docker => "docker",
      Format::Singularity => "singularity",
      Format::Json => "json",
    }
  }
}

impl fmt::Display for Format {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Format {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Format::ALL
      .into_iter()
      .find(|f| f.as_str() == s.to_ascii_lowercase())
      .ok_or_else(|| {
        format!(
          "unknown format, expected one of: {}",
          Format::ALL.map(|f| f.as_str()).join(", ")
        )
      })
  }
}

#[derive(Debug, Error)]
pub enum RenderError {
  #[error("failed to serialize recipe: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error(transparent)]
  Platform(#[from] PlatformError),

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error(transparent)]
  Recipe(#[from] RecipeError),
}

/// Render `recipe` in `format`.
pub fn render(recipe: &Recipe, format: Format) -> Result<String, RenderError> {
  let out = match format {
    Format::Docker => docker::render(recipe)?,
    Format::Singularity => singularity::render(recipe)?,
    Format::Json => {
      let mut json = serde_json::to_string_pretty(recipe)?;
      json.push('\n');
      json
    }
  };
  debug!(format = %format, bytes = out.len(), "rendered recipe");
  Ok(out)
}

/// Image labels: recipe name, origin and fingerprint.
fn labels(recipe: &Recipe) -> Result<Vec<(&'static str, String)>, RenderError> {
  Ok(vec![
    ("org.hpcstack.recipe", recipe.kind.name().to_string()),
    ("org.hpcstack.machine", recipe.origin.clone()),
    ("org.hpcstack.fingerprint", recipe.fingerprint()?.to_string()),
  ])
}

fn platform(recipe: &Recipe) -> Result<&'static str, RenderError> {
  Ok(recipe.config.arch.parse::<Arch>()?.oci_platform())
}

/// Double-quote values a shell or Dockerfile would otherwise split.
fn quote(value: &str) -> String {
  if value.is_empty() || value.contains(char::is_whitespace) || value.contains('"') {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
  } else {
    value.to_string()
  }
}

/// Replays a stage's environment so each effective assignment is emitted once.
#[derive(Default)]
struct EnvReplay {
  overlay: EnvOverlay,
}

impl EnvReplay {
  /// The contributions of `step` that changed the environment.
  fn effective<'a>(&mut self, step: &'a BuildStep) -> Result<Vec<&'a EnvVar>, EnvError> {
    let mut vars = Vec::new();
    for var in &step.env {
      if self.overlay.apply(step.label(), var)? {
        vars.push(var);
      }
    }
    Ok(vars)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{machines, resolve_machine};
  use crate::plan::PlanOptions;
  use crate::recipe::{RecipeKind, build};

  pub(super) fn recipe(kind: RecipeKind, machine: &str) -> Recipe {
    let config = resolve_machine(machine).unwrap();
    build(kind, &config, machine, PlanOptions::default()).unwrap()
  }

  #[test]
  fn format_parses_case_insensitively() {
    assert_eq!("Docker".parse::<Format>().unwrap(), Format::Docker);
    assert_eq!("singularity".parse::<Format>().unwrap(), Format::Singularity);
    assert!("podman".parse::<Format>().unwrap_err().contains("docker, singularity, json"));
  }

  #[test]
  fn every_recipe_renders_in_every_format() {
    for machine in machines() {
      for kind in RecipeKind::ALL {
        let recipe = recipe(kind, machine);
        for format in Format::ALL {
          let out = render(&recipe, format).unwrap();
          assert!(!out.is_empty(), "{kind} on {machine} as {format}");
        }
      }
    }
  }

  #[test]
  fn dnf_recipes_render_in_every_format() {
    let mut config = resolve_machine("thea").unwrap();
    config.base_os = "rockylinux9".to_string();

    for kind in [RecipeKind::BaseMpi, RecipeKind::Openmpi, RecipeKind::Exahype] {
      let recipe = build(kind, &config, "rocky", PlanOptions::default()).unwrap();
      for format in Format::ALL {
        let out = render(&recipe, format).unwrap();
        assert!(out.contains("dnf install -y"), "{kind} as {format}");
        assert!(!out.contains("apt-get"), "{kind} as {format}");
        assert!(!out.contains("libnuma1"), "{kind} as {format}");
      }
    }
  }

  #[test]
  fn json_is_the_recipe_value() {
    let recipe = recipe(RecipeKind::BaseMpi, "leonardo");
    let json: serde_json::Value = serde_json::from_str(&render(&recipe, Format::Json).unwrap()).unwrap();

    assert_eq!(json["kind"], "base-mpi");
    assert_eq!(json["config"]["march"], "skylake");
    assert_eq!(json["devel"]["stage"], "devel");
    assert!(json["runtime"]["steps"].as_array().unwrap().iter().any(|s| s["kind"] == "copy"));
  }

  #[test]
  fn env_replay_reports_overwrites() {
    let mut replay = EnvReplay::default();
    let venv = BuildStep::environment(vec![EnvVar::new("VIRTUAL_ENV", "/usr/local/codegen")]);
    assert_eq!(replay.effective(&venv).unwrap().len(), 1);
    assert!(replay.effective(&venv).unwrap().is_empty());

    replay.overlay.consume("seissol", "VIRTUAL_ENV").unwrap();
    let other = BuildStep::environment(vec![EnvVar::new("VIRTUAL_ENV", "/opt/venv")]);
    assert!(matches!(
      replay.effective(&other),
      Err(EnvError::Overwrite { ref read_by, .. }) if read_by == "seissol"
    ));
  }

  #[test]
  fn unsupported_arch_cannot_render() {
    let mut recipe = recipe(RecipeKind::BaseMpi, "thea");
    recipe.config.arch = "riscv64".to_string();
    assert!(matches!(
      render(&recipe, Format::Docker),
      Err(RenderError::Platform(PlatformError::UnsupportedArch { .. }))
    ));
  }
}
