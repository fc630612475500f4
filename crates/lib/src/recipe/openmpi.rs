//! OpenMPI with the full network stack and the MPI benchmark suite.

use crate::config::Config;
use crate::env::PrefixEnv;
use crate::plan::BuildPlan;
use crate::source::SourceLocator;
use crate::stage::CopyList;
use crate::step::BuildStep;

use super::RecipeError;
use super::blocks::{NetworkOptions, build_tools, network_stack, os_packages, tools::CMAKE_VERSION};

pub(super) fn devel(plan: &mut BuildPlan, config: &Config) -> Result<CopyList, RecipeError> {
  build_tools(plan, config, CMAKE_VERSION)?;
  network_stack(plan, config, NetworkOptions::full())?;

  plan.comment("step3: start")?;
  plan.comment("Compile and install OpenMPI benchmarks")?;
  plan.append(
    BuildStep::cmake(
      "benchmarks",
      SourceLocator::git("https://github.com/amasini0/mpi-benchmarks.git"),
    )
    .prefix("/usr/local/benchmarks")
    .arg("-DCMAKE_BUILD_TYPE=Release")
    .reads("PATH")
    .with_env_both(PrefixEnv::new().bin().lib().build()),
  )?;

  Ok(CopyList::defaults())
}

pub(super) fn runtime(plan: &mut BuildPlan) -> Result<(), RecipeError> {
  plan.comment("Libraries missing from CUDA runtime image")?;
  let packages = os_packages(plan.package_manager(), &["libnuma1"], &["numactl-libs"]);
  plan.append(BuildStep::packages(&packages))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::super::{RecipeKind, build};
  use crate::config::resolve_machine;
  use crate::plan::PlanOptions;

  #[test]
  fn benchmarks_come_after_openmpi() {
    let config = resolve_machine("leonardo").unwrap();
    let recipe = build(RecipeKind::Openmpi, &config, "leonardo", PlanOptions::default()).unwrap();

    let openmpi = recipe.devel.handle("openmpi").unwrap();
    let benchmarks = recipe.devel.handle("benchmarks").unwrap();
    assert!(openmpi.index < benchmarks.index);
    assert!(recipe.runtime.copies().contains(&"/usr/local/benchmarks"));
    assert!(
      recipe
        .runtime
        .overlay()
        .value("PATH")
        .unwrap()
        .starts_with("/usr/local/benchmarks/bin:/usr/local/openmpi/bin")
    );
  }

  #[test]
  fn full_stack_enables_ucx_threads() {
    let config = resolve_machine("thea").unwrap();
    let recipe = build(RecipeKind::Openmpi, &config, "thea", PlanOptions::default()).unwrap();

    let ucx = recipe.devel.handle("ucx").unwrap();
    let args = recipe.devel.steps()[ucx.index].step.build_args();
    assert!(args.contains(&"--enable-mt".to_string()));
    assert!(args.contains(&"--with-gdrcopy=/usr/local/gdrcopy".to_string()));
  }
}
