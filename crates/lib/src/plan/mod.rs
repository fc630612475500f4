//! Ordered, per-stage build plans.
//!
//! A [`BuildPlan`] is the sequence of steps of one image stage. Construction
//! is a single linear pass: each appended step may read what earlier steps
//! produced (prefixes, environment, toolchains) and is resolved and frozen
//! on the spot. The plan never reorders or rewrites a step.
//!
//! ```
//! use hpcstack_lib::env::PrefixEnv;
//! use hpcstack_lib::plan::{BuildPlan, PlanOptions, Stage};
//! use hpcstack_lib::platform::PackageManager;
//! use hpcstack_lib::step::BuildStep;
//!
//! let mut plan = BuildPlan::new(Stage::Devel, "docker.io/library/ubuntu:22.04", PackageManager::Apt, PlanOptions::default());
//! let a = plan.append(BuildStep::shell("a", &["true"]).prefix("/usr/local/a").with_env(PrefixEnv::new().bin().build())).unwrap();
//! plan.append(BuildStep::shell("b", &["true"]).prefix("/usr/local/b").with_env(PrefixEnv::new().bin().build())).unwrap();
//!
//! assert_eq!(a.prefix(), Some("/usr/local/a"));
//! assert_eq!(plan.overlay().value("PATH").unwrap(), "/usr/local/b/bin:/usr/local/a/bin:$PATH");
//! ```

mod types;

pub use types::*;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::Config;
use crate::env::{EnvOverlay, EnvVar};
use crate::placeholder::{self, PlaceholderError, Resolver};
use crate::platform::PackageManager;
use crate::stage::RuntimeSeed;
use crate::step::{BuildStep, Dependency, StepKind};
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
  stage: Stage,
  /// Base image reference; the implicit first element of the stage.
  image: String,
  package_manager: PackageManager,
  jobs: String,
  steps: Vec<PlannedStep>,
  overlay: EnvOverlay,
}

impl BuildPlan {
  pub fn new(stage: Stage, image: &str, package_manager: PackageManager, options: PlanOptions) -> Self {
    Self {
      stage,
      image: image.to_string(),
      package_manager,
      jobs: options.jobs_hint(),
      steps: Vec::new(),
      overlay: EnvOverlay::new(),
    }
  }

  /// An empty devel stage on the configuration's devel image.
  pub fn devel(config: &Config, options: PlanOptions) -> Result<Self, PlanError> {
    let distro = config.distro()?;
    Ok(Self::new(
      Stage::Devel,
      &config.devel_image(),
      distro.package_manager(),
      options,
    ))
  }

  /// A runtime stage seeded with what was copied out of the devel stage.
  ///
  /// The copies come first, then the runtime packages of copied steps, then
  /// the carried environment.
  pub fn runtime(config: &Config, seed: RuntimeSeed, options: PlanOptions) -> Result<Self, PlanError> {
    let distro = config.distro()?;
    let mut plan = Self::new(
      Stage::Runtime,
      &config.runtime_image(),
      distro.package_manager(),
      options,
    );

    for copy in &seed.copies {
      plan.append(BuildStep::copy(copy.from, &copy.path))?;
    }
    if !seed.packages.is_empty() {
      plan.append(BuildStep::packages(&seed.packages))?;
    }
    if !seed.overlay.is_empty() {
      let vars = seed
        .overlay
        .assignments()
        .iter()
        .map(|a| EnvVar::new(&a.name, &a.value))
        .collect();
      plan.append(BuildStep::environment(vars))?;
    }

    debug!(
      copies = seed.copies.len(),
      variables = seed.overlay.len(),
      "seeded runtime stage"
    );
    Ok(plan)
  }

  /// Append `step` at the end of the stage.
  ///
  /// Resolves the step's templates against its own prefix and the steps
  /// appended so far, marks the variables it reads as consumed and applies
  /// its environment contributions. Nothing is changed when this fails.
  ///
  /// # Errors
  ///
  /// - [`PlanError::DuplicateStep`] / [`PlanError::DuplicatePrefix`]
  /// - [`PlanError::UnknownDependency`] for `$${step:NAME}` without an earlier `NAME`
  /// - [`PlanError::Env`] when the step overwrites a variable an earlier step read
  pub fn append(&mut self, step: BuildStep) -> Result<StepHandle, PlanError> {
    let label = step.label().to_string();

    if let Some(name) = &step.name
      && self.find(name).is_some()
    {
      return Err(PlanError::DuplicateStep {
        name: name.clone(),
        stage: self.stage,
      });
    }

    let planned = self.resolve(step)?;

    if let Some(prefix) = &planned.step.prefix
      && let Some(existing) = self.steps.iter().find(|s| s.step.prefix.as_ref() == Some(prefix))
    {
      return Err(PlanError::DuplicatePrefix {
        prefix: prefix.clone(),
        step: label,
        existing: existing.step.label().to_string(),
      });
    }

    let mut overlay = self.overlay.clone();
    for name in &planned.step.reads {
      overlay.consume(&label, name)?;
    }
    for var in &planned.step.env {
      if !overlay.apply(&label, var)? {
        trace!(step = %label, variable = %var.name, "contribution already present");
      }
    }
    self.overlay = overlay;

    debug!(
      stage = %self.stage,
      index = planned.index,
      step = %label,
      kind = planned.step.kind.as_str(),
      prefix = ?planned.step.prefix,
      "appended step"
    );

    let handle = StepHandle::new(self.stage, &planned);
    self.steps.push(planned);
    Ok(handle)
  }

  /// Append the step built by `make` only when `condition` holds.
  ///
  /// Returns the step as a [`Dependency`]: [`Dependency::Absent`] when it was
  /// skipped, so consumers can drop the flags that would refer to it.
  pub fn append_if<F>(&mut self, condition: bool, make: F) -> Result<Dependency, PlanError>
  where
    F: FnOnce() -> BuildStep,
  {
    if !condition {
      return Ok(Dependency::Absent);
    }
    let step = make();
    if step.prefix.is_none() {
      return Err(PlanError::NoPrefix {
        name: step.label().to_string(),
        step: None,
      });
    }
    Ok(self.append(step)?.dependency())
  }

  /// Append one step per value.
  pub fn instantiate<T, I, F>(&mut self, values: I, mut make: F) -> Result<Vec<StepHandle>, PlanError>
  where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> BuildStep,
  {
    values.into_iter().map(|value| self.append(make(value))).collect()
  }

  /// Append a comment.
  pub fn comment(&mut self, text: &str) -> Result<StepHandle, PlanError> {
    self.append(BuildStep::comment(text))
  }

  /// Install prefix of the earlier step called `name`.
  pub fn prefix_of(&self, name: &str) -> Result<&str, PlanError> {
    let planned = self.find(name).ok_or_else(|| PlanError::UnknownDependency {
      name: name.to_string(),
      stage: self.stage,
      step: None,
    })?;
    planned.step.prefix.as_deref().ok_or_else(|| PlanError::NoPrefix {
      name: name.to_string(),
      step: None,
    })
  }

  pub fn handle(&self, name: &str) -> Option<StepHandle> {
    self.find(name).map(|s| StepHandle::new(self.stage, s))
  }

  fn find(&self, name: &str) -> Option<&PlannedStep> {
    self.steps.iter().find(|s| s.step.name.as_deref() == Some(name))
  }

  fn resolve(&self, mut step: BuildStep) -> Result<PlannedStep, PlanError> {
    let label = step.label().to_string();
    let wrap = |e: PlaceholderError| self.placeholder_error(&label, e);

    let base = AppendResolver {
      steps: &self.steps,
      step: &label,
      prefix: None,
      jobs: &self.jobs,
    };
    let prefix = step
      .prefix
      .as_deref()
      .map(|p| placeholder::substitute(p, &base))
      .transpose()
      .map_err(wrap)?;

    let resolver = AppendResolver {
      prefix: prefix.as_deref(),
      ..base
    };
    let subst = |s: &str| placeholder::substitute(s, &resolver).map_err(wrap);
    let subst_all = |items: &[String]| items.iter().map(|s| subst(s)).collect::<Result<Vec<_>, _>>();
    let subst_env = |vars: &[EnvVar]| {
      vars
        .iter()
        .map(|v| Ok(EnvVar::new(&v.name, &subst(&v.value)?)))
        .collect::<Result<Vec<_>, PlanError>>()
    };

    let commands = subst_all(&step.commands(self.package_manager))?;
    match &mut step.kind {
      StepKind::Source { args, .. } => *args = subst_all(args)?,
      StepKind::Shell { commands } | StepKind::Runscript { commands } => *commands = subst_all(commands)?,
      _ => {}
    }
    step.env = subst_env(&step.env)?;
    step.runtime_env = subst_env(&step.runtime_env)?;
    step.toolchain = step.toolchain.as_ref().map(|t| resolve_toolchain(t, &subst)).transpose()?;
    step.provides = step.provides.as_ref().map(|t| resolve_toolchain(t, &subst)).transpose()?;
    step.prefix = prefix.clone();

    Ok(PlannedStep {
      index: self.steps.len(),
      step,
      commands,
    })
  }

  fn placeholder_error(&self, step: &str, error: PlaceholderError) -> PlanError {
    match error {
      PlaceholderError::UnresolvedStep(name) => PlanError::UnknownDependency {
        name,
        stage: self.stage,
        step: Some(step.to_string()),
      },
      PlaceholderError::NoPrefix(name) => PlanError::NoPrefix {
        name,
        step: Some(step.to_string()),
      },
      source => PlanError::Placeholder {
        step: step.to_string(),
        source,
      },
    }
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn image(&self) -> &str {
    &self.image
  }

  pub fn package_manager(&self) -> PackageManager {
    self.package_manager
  }

  /// How `$${jobs}` was rendered.
  pub fn jobs(&self) -> &str {
    &self.jobs
  }

  pub fn steps(&self) -> &[PlannedStep] {
    &self.steps
  }

  pub fn iter(&self) -> impl Iterator<Item = &PlannedStep> {
    self.steps.iter()
  }

  pub fn overlay(&self) -> &EnvOverlay {
    &self.overlay
  }

  /// Install prefixes in append order.
  pub fn prefixes(&self) -> Vec<&str> {
    self.steps.iter().filter_map(|s| s.step.prefix.as_deref()).collect()
  }

  /// Paths copied in from other stages.
  pub fn copies(&self) -> Vec<&str> {
    self
      .steps
      .iter()
      .filter_map(|s| match &s.step.kind {
        StepKind::Copy { path, .. } => Some(path.as_str()),
        _ => None,
      })
      .collect()
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}

fn resolve_toolchain<F>(toolchain: &Toolchain, subst: &F) -> Result<Toolchain, PlanError>
where
  F: Fn(&str) -> Result<String, PlanError>,
{
  let field = |v: &Option<String>| v.as_deref().map(subst).transpose();
  Ok(Toolchain {
    cc: field(&toolchain.cc)?,
    cxx: field(&toolchain.cxx)?,
    fc: field(&toolchain.fc)?,
    f77: field(&toolchain.f77)?,
    f90: field(&toolchain.f90)?,
    cflags: field(&toolchain.cflags)?,
    cxxflags: field(&toolchain.cxxflags)?,
    fflags: field(&toolchain.fflags)?,
    ldflags: field(&toolchain.ldflags)?,
    cppflags: field(&toolchain.cppflags)?,
  })
}

/// Resolves placeholders for the step being appended.
#[derive(Clone, Copy)]
struct AppendResolver<'a> {
  steps: &'a [PlannedStep],
  step: &'a str,
  prefix: Option<&'a str>,
  jobs: &'a str,
}

impl Resolver for AppendResolver<'_> {
  fn resolve_prefix(&self) -> Result<&str, PlaceholderError> {
    self
      .prefix
      .ok_or_else(|| PlaceholderError::NoPrefix(self.step.to_string()))
  }

  fn resolve_step(&self, name: &str) -> Result<&str, PlaceholderError> {
    let planned = self
      .steps
      .iter()
      .find(|s| s.step.name.as_deref() == Some(name))
      .ok_or_else(|| PlaceholderError::UnresolvedStep(name.to_string()))?;
    planned
      .step
      .prefix
      .as_deref()
      .ok_or_else(|| PlaceholderError::NoPrefix(name.to_string()))
  }

  fn resolve_jobs(&self) -> &str {
    self.jobs
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::env::PrefixEnv;
  use crate::source::SourceLocator;

  fn plan() -> BuildPlan {
    BuildPlan::new(
      Stage::Devel,
      "docker.io/nvidia/cuda@sha256:0",
      PackageManager::Apt,
      PlanOptions::default(),
    )
  }

  fn tool(name: &str) -> BuildStep {
    BuildStep::shell(name, &["make install"])
      .prefix(&format!("/usr/local/{name}"))
      .with_env(PrefixEnv::new().bin().lib().build())
  }

  mod ordering {
    use super::*;

    #[test]
    fn append_preserves_order() {
      let mut plan = plan();
      plan.append(tool("a")).unwrap();
      plan.append(tool("b")).unwrap();
      plan.comment("between").unwrap();
      plan.append(tool("c")).unwrap();

      let labels: Vec<_> = plan.iter().map(|s| s.step.label()).collect();
      assert_eq!(labels, vec!["a", "b", "comment", "c"]);
      let indices: Vec<_> = plan.iter().map(|s| s.index).collect();
      assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn path_composes_across_steps() {
      let mut plan = plan();
      let names = ["ucx", "openmpi", "hdf5", "netcdf", "llvm"];
      for name in names {
        plan.append(tool(name)).unwrap();
      }

      let expected: Vec<String> = names.iter().map(|n| format!("/usr/local/{n}/bin")).collect();
      assert_eq!(plan.overlay().contributions("PATH"), expected);

      let value = plan.overlay().value("PATH").unwrap();
      for dir in &expected {
        assert_eq!(value.matches(dir.as_str()).count(), 1);
      }
      assert!(value.ends_with(":$PATH"));
    }

    #[test]
    fn handle_exposes_resolved_environment() {
      let mut plan = plan();
      let handle = plan.append(tool("ucx")).unwrap();

      assert_eq!(handle.index, 0);
      assert_eq!(handle.prefix(), Some("/usr/local/ucx"));
      assert_eq!(handle.env[0], EnvVar::new("PATH", "/usr/local/ucx/bin:$PATH"));
      assert_eq!(handle.dependency(), Dependency::Prefix("/usr/local/ucx".to_string()));
    }
  }

  mod uniqueness {
    use super::*;

    #[test]
    fn duplicate_prefix_is_rejected() {
      let mut plan = plan();
      plan.append(tool("a")).unwrap();
      let err = plan
        .append(BuildStep::shell("b", &["true"]).prefix("/usr/local/a"))
        .unwrap_err();

      assert!(matches!(err, PlanError::DuplicatePrefix { ref existing, .. } if existing == "a"));
      assert_eq!(plan.len(), 1);
    }

    #[test]
    fn duplicate_name_is_rejected() {
      let mut plan = plan();
      plan.append(tool("a")).unwrap();
      let err = plan.append(BuildStep::shell("a", &["true"])).unwrap_err();

      assert!(matches!(err, PlanError::DuplicateStep { .. }));
    }

    #[test]
    fn anonymous_steps_may_repeat() {
      let mut plan = plan();
      plan.append(BuildStep::packages(&["git"])).unwrap();
      plan.append(BuildStep::packages(&["libnuma1"])).unwrap();
      plan.comment("x").unwrap();
      plan.comment("x").unwrap();

      assert_eq!(plan.len(), 4);
    }
  }

  mod dependencies {
    use super::*;

    #[test]
    fn step_placeholder_resolves_earlier_prefix() {
      let mut plan = plan();
      plan.append(tool("hdf5")).unwrap();
      plan
        .append(
          BuildStep::configure("netcdf", SourceLocator::url("https://example.org/netcdf-c-4.9.2.tar.gz"))
            .prefix("/usr/local/netcdf")
            .toolchain(Toolchain::new().with_cc("$${step:hdf5}/bin/h5pcc")),
        )
        .unwrap();

      let netcdf = plan.steps().last().unwrap();
      assert_eq!(
        netcdf.step.toolchain.as_ref().unwrap().cc.as_deref(),
        Some("/usr/local/hdf5/bin/h5pcc")
      );
      assert!(netcdf.commands.iter().any(|c| c.starts_with("CC=/usr/local/hdf5/bin/h5pcc ./configure")));
    }

    #[test]
    fn missing_step_is_a_wiring_error() {
      let mut plan = plan();
      let err = plan
        .append(
          BuildStep::configure("openmpi", SourceLocator::url("https://example.org/openmpi-5.0.3.tar.bz2"))
            .prefix("/usr/local/openmpi")
            .arg("--with-pmix=$${step:pmix}"),
        )
        .unwrap_err();

      match err {
        PlanError::UnknownDependency { name, step, .. } => {
          assert_eq!(name, "pmix");
          assert_eq!(step.as_deref(), Some("openmpi"));
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
      }
      assert!(plan.is_empty());
    }

    #[test]
    fn prefix_of_unknown_step_fails() {
      let mut plan = plan();
      plan.append(tool("ucx")).unwrap();

      assert_eq!(plan.prefix_of("ucx").unwrap(), "/usr/local/ucx");
      assert!(matches!(
        plan.prefix_of("pmix"),
        Err(PlanError::UnknownDependency { step: None, .. })
      ));
    }

    #[test]
    fn gated_off_step_yields_absent_and_no_flag() {
      let mut plan = plan();
      let gdrcopy = plan.append_if(false, || tool("gdrcopy")).unwrap();
      let knem = plan.append_if(true, || tool("knem")).unwrap();

      plan
        .append(
          BuildStep::configure("ucx", SourceLocator::git("https://github.com/openucx/ucx.git"))
            .prefix("/usr/local/ucx")
            .arg_opt(knem.flag("knem"))
            .arg_opt(gdrcopy.flag("gdrcopy")),
        )
        .unwrap();

      assert_eq!(gdrcopy, Dependency::Absent);
      let ucx = plan.steps().last().unwrap();
      assert_eq!(ucx.step.build_args(), &["--with-knem=/usr/local/knem".to_string()]);
      assert!(plan.handle("gdrcopy").is_none());
    }

    #[test]
    fn gated_step_without_prefix_is_not_appended() {
      let mut plan = plan();
      let err = plan.append_if(true, || BuildStep::shell("knem", &["true"])).unwrap_err();

      assert!(matches!(err, PlanError::NoPrefix { ref name, .. } if name == "knem"));
      assert!(plan.is_empty());
      assert!(plan.handle("knem").is_none());
    }

    #[test]
    fn prefix_placeholder_without_prefix_fails() {
      let mut plan = plan();
      let err = plan
        .append(BuildStep::shell("x", &["true"]).with_env(PrefixEnv::new().bin().build()))
        .unwrap_err();

      assert!(matches!(err, PlanError::NoPrefix { .. }));
    }
  }

  mod environment {
    use super::*;

    #[test]
    fn overwriting_a_read_variable_fails_and_leaves_plan_unchanged() {
      let mut plan = plan();
      plan
        .append(BuildStep::environment(vec![EnvVar::new("VIRTUAL_ENV", "/usr/local/codegen")]))
        .unwrap();
      plan.append(BuildStep::shell("seissol", &["true"]).reads("VIRTUAL_ENV")).unwrap();

      let err = plan
        .append(BuildStep::environment(vec![EnvVar::new("VIRTUAL_ENV", "/opt/other")]))
        .unwrap_err();

      assert!(matches!(err, PlanError::Env(_)));
      assert_eq!(plan.len(), 2);
      assert_eq!(plan.overlay().value("VIRTUAL_ENV").unwrap(), "/usr/local/codegen");
    }

    #[test]
    fn reading_unset_variable_fails() {
      let mut plan = plan();
      let err = plan.append(BuildStep::shell("app", &["true"]).reads("VIRTUAL_ENV")).unwrap_err();
      assert!(matches!(err, PlanError::Env(_)));
    }
  }

  mod instantiation {
    use super::*;

    #[test]
    fn each_instance_gets_its_own_prefix() {
      let mut plan = plan();
      let handles = plan
        .instantiate([4, 5, 6], |order| {
          BuildStep::cmake(
            &format!("seissol-o{order}"),
            SourceLocator::git_branch("https://github.com/SeisSol/SeisSol.git", "v1.3.0"),
          )
          .directory(&format!("seissol-o{order}"))
          .prefix(&format!("/usr/local/seissol_O{order}"))
          .arg(format!("-DORDER={order}"))
        })
        .unwrap();

      let prefixes: Vec<_> = handles.iter().map(|h| h.prefix().unwrap()).collect();
      assert_eq!(
        prefixes,
        vec!["/usr/local/seissol_O4", "/usr/local/seissol_O5", "/usr/local/seissol_O6"]
      );
    }

    #[test]
    fn repeated_prefix_fails() {
      let mut plan = plan();
      let result = plan.instantiate([1, 2], |i| BuildStep::shell(&format!("s{i}"), &["true"]).prefix("/usr/local/same"));

      assert!(matches!(result, Err(PlanError::DuplicatePrefix { .. })));
    }
  }

  #[test]
  fn jobs_hint_is_rendered_into_commands() {
    let mut plan = BuildPlan::new(
      Stage::Devel,
      "img",
      PackageManager::Apt,
      PlanOptions { jobs: Some(8) },
    );
    plan
      .append(
        BuildStep::configure("ucx", SourceLocator::git("https://github.com/openucx/ucx.git")).prefix("/usr/local/ucx"),
      )
      .unwrap();

    let step = &plan.steps()[0];
    assert!(step.commands.contains(&"make -j8".to_string()));
    assert!(step.commands.iter().any(|c| c.contains("--prefix=/usr/local/ucx")));
  }
}
