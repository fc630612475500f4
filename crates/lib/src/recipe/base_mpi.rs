use crate::config::Config;
use crate::plan::BuildPlan;
use crate::stage::CopyList;
use crate::step::BuildStep;

use super::RecipeError;
use super::blocks::{NetworkOptions, network_stack, os_packages, python};

pub(super) fn devel(plan: &mut BuildPlan, config: &Config) -> Result<CopyList, RecipeError> {
  plan.comment("Install Python over base image")?;
  python(plan)?;
  network_stack(plan, config, NetworkOptions::minimal())?;
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
  fn minimal_stack_without_gdrcopy() {
    let config = resolve_machine("thea").unwrap();
    let recipe = build(RecipeKind::BaseMpi, &config, "thea", PlanOptions::default()).unwrap();

    assert!(recipe.devel.handle("gdrcopy").is_none());
    assert!(recipe.devel.handle("cmake").is_none());
    assert!(recipe.devel.handle("openmpi").is_some());
    assert!(recipe.runtime.copies().contains(&"/usr/local/openmpi"));
  }
}
