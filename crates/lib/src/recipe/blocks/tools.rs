use crate::config::Config;
use crate::env::EnvVar;
use crate::plan::{BuildPlan, StepHandle};
use crate::platform::select_by_arch;
use crate::recipe::RecipeError;
use crate::step::BuildStep;

use super::os_packages;

pub const CMAKE_VERSION: &str = "3.27.8";

/// Python 3 with virtual environment support.
pub fn python(plan: &mut BuildPlan) -> Result<StepHandle, RecipeError> {
  let packages = os_packages(
    plan.package_manager(),
    &["python3", "python3-pip", "python3-venv", "python3-wheel", "python3-setuptools"],
    &["python3", "python3-pip", "python3-wheel", "python3-setuptools"],
  );
  Ok(plan.append(BuildStep::packages(&packages))?)
}

/// A CMake release installed into `/usr/local` from the upstream installer.
pub fn cmake(plan: &mut BuildPlan, config: &Config, version: &str) -> Result<StepHandle, RecipeError> {
  let arch = select_by_arch(&config.arch, &[("x86_64", "x86_64"), ("aarch64", "aarch64")])?;
  let installer = format!("cmake-{version}-linux-{arch}.sh");

  let step = BuildStep::shell(
    "cmake",
    &[
      format!(
        "mkdir -p /var/tmp && wget -q -nc --no-check-certificate -P /var/tmp https://github.com/Kitware/CMake/releases/download/v{version}/{installer}"
      ),
      "mkdir -p /usr/local".to_string(),
      format!("/bin/sh /var/tmp/{installer} --prefix=/usr/local --skip-license"),
      format!("rm -rf /var/tmp/{installer}"),
    ],
  )
  .with_env(vec![EnvVar::new("PATH", "/usr/local/bin:$PATH")]);

  Ok(plan.append(step)?)
}

pub fn git_pkgconf(plan: &mut BuildPlan) -> Result<StepHandle, RecipeError> {
  plan.comment("Git, Pkgconf")?;
  let packages = os_packages(plan.package_manager(), &["git", "pkgconf"], &["git", "pkgconf-pkg-config"]);
  Ok(plan.append(BuildStep::packages(&packages))?)
}

/// Python, CMake, git and pkgconf over the base image.
pub fn build_tools(plan: &mut BuildPlan, config: &Config, cmake_version: &str) -> Result<(), RecipeError> {
  plan.comment("step1: start")?;
  plan.comment("Install Python and build tools over base image")?;
  python(plan)?;
  cmake(plan, config, cmake_version)?;
  git_pkgconf(plan)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::resolve_machine;
  use crate::plan::PlanOptions;
  use crate::platform::PlatformError;

  #[test]
  fn cmake_installer_matches_arch() {
    let config = resolve_machine("thea").unwrap();
    let mut plan = BuildPlan::devel(&config, PlanOptions::default()).unwrap();
    cmake(&mut plan, &config, "3.27.8").unwrap();

    let step = &plan.steps()[0];
    assert!(step.commands[0].ends_with("v3.27.8/cmake-3.27.8-linux-aarch64.sh"));
    assert!(step.step.prefix.is_none());
  }

  #[test]
  fn cmake_rejects_unsupported_arch() {
    let mut config = resolve_machine("leonardo").unwrap();
    config.arch = "ppc64le".to_string();
    let mut plan = BuildPlan::devel(&config, PlanOptions::default()).unwrap();

    let err = cmake(&mut plan, &config, "3.27.8").unwrap_err();
    assert!(matches!(
      err,
      RecipeError::Platform(PlatformError::UnsupportedArch { ref value, .. }) if value == "ppc64le"
    ));
    assert!(plan.is_empty());
  }

  #[test]
  fn build_tools_are_devel_only() {
    let config = resolve_machine("leonardo").unwrap();
    let mut plan = BuildPlan::devel(&config, PlanOptions::default()).unwrap();
    build_tools(&mut plan, &config, CMAKE_VERSION).unwrap();

    assert!(plan.iter().all(|s| s.step.runtime_env.is_empty()));
    assert!(plan.iter().any(|s| s.commands.iter().any(|c| c.contains("python3-venv"))));
  }
}
