//! Carrying devel-stage results into the runtime stage.
//!
//! The runtime image only receives what is listed: install prefixes of devel
//! steps, a few variables, and (with `runtime_defaults`) every step that
//! declared runtime environment. Package installs, comments and build tools
//! without runtime environment stay behind.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::env::{EnvError, EnvOverlay, EnvVar};
use crate::plan::{BuildPlan, Stage};
use crate::step::BuildStep;

/// What to take from the devel stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyList {
  /// Paths to copy; each must be, or lie under, the prefix of a devel step.
  pub prefixes: Vec<String>,
  /// Variables whose composed devel value is carried over.
  pub variables: Vec<String>,
  /// Copy every step that declares runtime environment or packages.
  pub runtime_defaults: bool,
}

impl CopyList {
  /// Only the default runtimes.
  pub fn defaults() -> Self {
    Self {
      runtime_defaults: true,
      ..Self::default()
    }
  }

  pub fn prefix(mut self, path: &str) -> Self {
    self.prefixes.push(path.to_string());
    self
  }

  pub fn variable(mut self, name: &str) -> Self {
    self.variables.push(name.to_string());
    self
  }
}

/// A path copied across the stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageCopy {
  pub from: Stage,
  pub path: String,
}

/// Initial content of a runtime stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSeed {
  pub copies: Vec<StageCopy>,
  /// OS packages copied steps need at runtime.
  pub packages: Vec<String>,
  pub overlay: EnvOverlay,
}

#[derive(Debug, Error)]
pub enum StageError {
  #[error("can only copy from the devel stage, not from the {0} stage")]
  NotDevel(Stage),

  #[error("no devel step produces {path} (known prefixes: {})", .known.join(", "))]
  UnknownPrefix { path: String, known: Vec<String> },

  #[error("variable {0} is not set in the devel stage")]
  UnknownVariable(String),

  #[error(transparent)]
  Env(#[from] EnvError),
}

pub struct StageCopier;

impl StageCopier {
  /// Validate `list` against the finished devel plan and build the runtime seed.
  ///
  /// Copies keep devel order: default runtimes first, then listed prefixes.
  /// A path already copied is not copied twice.
  pub fn copy(devel: &BuildPlan, list: &CopyList) -> Result<RuntimeSeed, StageError> {
    if devel.stage() != Stage::Devel {
      return Err(StageError::NotDevel(devel.stage()));
    }

    let mut seed = RuntimeSeed::default();

    if list.runtime_defaults {
      for planned in devel.iter().filter(|s| has_runtime(&s.step)) {
        let step = &planned.step;
        if let Some(prefix) = &step.prefix
          && !step.runtime_env.is_empty()
        {
          push_copy(&mut seed, prefix);
        }
        for package in &step.runtime_packages {
          if !seed.packages.contains(package) {
            seed.packages.push(package.clone());
          }
        }
        for var in &step.runtime_env {
          seed.overlay.apply(step.label(), var)?;
        }
      }
    }

    for path in &list.prefixes {
      let known = devel.prefixes();
      if !known.iter().any(|prefix| is_under(path, prefix)) {
        return Err(StageError::UnknownPrefix {
          path: path.clone(),
          known: known.iter().map(|p| p.to_string()).collect(),
        });
      }
      push_copy(&mut seed, path);
    }

    for name in &list.variables {
      let value = devel
        .overlay()
        .value(name)
        .ok_or_else(|| StageError::UnknownVariable(name.clone()))?;
      seed.overlay.apply(Stage::Devel.as_str(), &EnvVar::new(name, &value))?;
    }

    info!(
      copies = seed.copies.len(),
      packages = seed.packages.len(),
      variables = seed.overlay.len(),
      "selected devel artifacts for runtime stage"
    );
    Ok(seed)
  }
}

/// Whether the step declares anything for the runtime stage.
fn has_runtime(step: &BuildStep) -> bool {
  !step.runtime_env.is_empty() || !step.runtime_packages.is_empty()
}

fn push_copy(seed: &mut RuntimeSeed, path: &str) {
  if seed.copies.iter().any(|c| c.path == path) {
    debug!(path = %path, "already copied");
    return;
  }
  seed.copies.push(StageCopy {
    from: Stage::Devel,
    path: path.to_string(),
  });
}

/// Whether `path` is `prefix` or a path below it.
fn is_under(path: &str, prefix: &str) -> bool {
  let path = path.trim_end_matches('/');
  let prefix = prefix.trim_end_matches('/');
  path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::env::PrefixEnv;
  use crate::plan::PlanOptions;
  use crate::platform::PackageManager;

  fn devel() -> BuildPlan {
    let mut plan = BuildPlan::new(Stage::Devel, "devel", PackageManager::Apt, PlanOptions::default());
    plan.append(BuildStep::packages(&["git", "pkgconf"])).unwrap();
    plan
      .append(BuildStep::shell("cmake", &["install cmake"]).with_env(vec![EnvVar::new("CMAKE_ROOT", "/usr/local")]))
      .unwrap();
    plan
      .append(
        BuildStep::shell("ucx", &["make install"])
          .prefix("/usr/local/ucx")
          .with_env_both(PrefixEnv::new().bin().lib().build())
          .with_runtime_packages(&["libnuma1"]),
      )
      .unwrap();
    plan
      .append(
        BuildStep::shell("peano", &["cmake --build /root/Peano/build"])
          .prefix("/root/Peano")
          .with_env(vec![EnvVar::new("VIRTUAL_ENV", "/root/Peano/codegen")]),
      )
      .unwrap();
    plan
  }

  #[test]
  fn defaults_copy_steps_with_runtime_environment() {
    let seed = StageCopier::copy(&devel(), &CopyList::defaults()).unwrap();

    assert_eq!(
      seed.copies,
      vec![StageCopy {
        from: Stage::Devel,
        path: "/usr/local/ucx".to_string()
      }]
    );
    assert_eq!(seed.packages, vec!["libnuma1".to_string()]);
    assert_eq!(seed.overlay.value("PATH").unwrap(), "/usr/local/ucx/bin:$PATH");
    assert!(!seed.overlay.contains("CMAKE_ROOT"));
  }

  #[test]
  fn unknown_prefix_is_rejected() {
    let list = CopyList::defaults().prefix("/usr/local/codegen");
    let err = StageCopier::copy(&devel(), &list).unwrap_err();

    match err {
      StageError::UnknownPrefix { path, known } => {
        assert_eq!(path, "/usr/local/codegen");
        assert_eq!(known, vec!["/usr/local/ucx".to_string(), "/root/Peano".to_string()]);
      }
      other => panic!("expected UnknownPrefix, got {other:?}"),
    }
  }

  #[test]
  fn path_under_a_prefix_is_accepted() {
    let list = CopyList::default()
      .prefix("/root/Peano")
      .prefix("/root/Peano/applications/exahype2");
    let seed = StageCopier::copy(&devel(), &list).unwrap();

    assert_eq!(seed.copies.len(), 2);
  }

  #[test]
  fn sibling_with_common_prefix_is_not_under() {
    assert!(is_under("/usr/local/ucx/lib", "/usr/local/ucx"));
    assert!(is_under("/usr/local/ucx/", "/usr/local/ucx"));
    assert!(!is_under("/usr/local/ucx-tools", "/usr/local/ucx"));
  }

  #[test]
  fn variables_carry_composed_devel_value() {
    let list = CopyList::default().prefix("/root/Peano").variable("VIRTUAL_ENV");
    let seed = StageCopier::copy(&devel(), &list).unwrap();

    assert_eq!(seed.overlay.value("VIRTUAL_ENV").unwrap(), "/root/Peano/codegen");
  }

  #[test]
  fn unknown_variable_is_rejected() {
    let list = CopyList::default().variable("LUA_PATH");
    assert!(matches!(
      StageCopier::copy(&devel(), &list),
      Err(StageError::UnknownVariable(name)) if name == "LUA_PATH"
    ));
  }

  #[test]
  fn duplicate_paths_are_copied_once() {
    let list = CopyList::defaults().prefix("/usr/local/ucx");
    let seed = StageCopier::copy(&devel(), &list).unwrap();

    assert_eq!(seed.copies.len(), 1);
  }

  #[test]
  fn packages_and_build_tools_never_reach_runtime() {
    let seed = StageCopier::copy(&devel(), &CopyList::defaults()).unwrap();
    let runtime = BuildPlan::runtime(&crate::config::resolve_machine("thea").unwrap(), seed, PlanOptions::default())
      .unwrap();

    for planned in runtime.iter() {
      for command in &planned.commands {
        assert!(!command.contains("git"), "{command}");
        assert!(!command.contains("cmake"), "{command}");
      }
    }
    assert_eq!(runtime.copies(), vec!["/usr/local/ucx"]);
  }

  #[test]
  fn runtime_plan_cannot_be_copied_from() {
    let seed = StageCopier::copy(&devel(), &CopyList::defaults()).unwrap();
    let runtime = BuildPlan::runtime(&crate::config::resolve_machine("thea").unwrap(), seed, PlanOptions::default())
      .unwrap();

    assert!(matches!(
      StageCopier::copy(&runtime, &CopyList::defaults()),
      Err(StageError::NotDevel(Stage::Runtime))
    ));
  }
}
