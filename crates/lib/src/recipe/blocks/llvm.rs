//! LLVM/Clang, either from the apt.llvm.org packages or built from source.

use tracing::info;

use crate::config::Config;
use crate::env::PrefixEnv;
use crate::plan::{BuildPlan, StepHandle};
use crate::platform::{Distro, PlatformError, select_by_arch};
use crate::recipe::RecipeError;
use crate::source::SourceLocator;
use crate::step::BuildStep;
use crate::toolchain::Toolchain;

pub const LLVM_PREFIX: &str = "/usr/local/llvm";

/// How LLVM gets into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlvmStrategy {
  /// Install the upstream apt packages of this major version.
  Packages { version: String },
  /// Two-stage bootstrap of a release tag with the NVPTX backend and OpenMP offload.
  Bootstrap { release: String },
}

pub fn llvm(plan: &mut BuildPlan, config: &Config, strategy: &LlvmStrategy) -> Result<StepHandle, RecipeError> {
  let handle = match strategy {
    LlvmStrategy::Packages { version } => packages(plan, config, version)?,
    LlvmStrategy::Bootstrap { release } => bootstrap(plan, config, release)?,
  };
  info!(strategy = ?strategy, jobs = %plan.jobs(), "llvm planned");
  Ok(handle)
}

fn packages(plan: &mut BuildPlan, config: &Config, version: &str) -> Result<StepHandle, RecipeError> {
  let distro = config.distro()?;
  let codename = match distro {
    Distro::Ubuntu20 => "focal",
    Distro::Ubuntu22 => "jammy",
    Distro::Ubuntu24 => "noble",
    Distro::RockyLinux8 | Distro::RockyLinux9 => {
      return Err(
        PlatformError::UnsupportedDistro {
          value: distro.to_string(),
          supported: vec!["ubuntu20".into(), "ubuntu22".into(), "ubuntu24".into()],
        }
        .into(),
      );
    }
  };

  let pm = plan.package_manager();
  let tools: Vec<String> = ["clang", "clang-format", "clang-tidy", "clang-tools", "lld", "llvm"]
    .iter()
    .map(|tool| format!("{tool}-{version}"))
    .chain([format!("libomp-{version}-dev")])
    .collect();

  let step = BuildStep::shell(
    "llvm",
    &[
      pm.install_command(&["ca-certificates".to_string(), "gnupg".to_string(), "wget".to_string()]),
      "wget -qO - https://apt.llvm.org/llvm-snapshot.gpg.key | apt-key add -".to_string(),
      format!(
        "echo \"deb http://apt.llvm.org/{codename}/ llvm-toolchain-{codename}-{version} main\" >> /etc/apt/sources.list.d/llvm.list"
      ),
      pm.install_command(&tools),
      format!("update-alternatives --install /usr/bin/clang clang $(which clang-{version}) 30"),
      format!("update-alternatives --install /usr/bin/clang++ clang++ $(which clang++-{version}) 30"),
    ],
  )
  .provides(Toolchain::new().with_cc("clang").with_cxx("clang++"));

  Ok(plan.append(step)?)
}

fn bootstrap(plan: &mut BuildPlan, config: &Config, release: &str) -> Result<StepHandle, RecipeError> {
  let host_target = select_by_arch(&config.arch, &[("x86_64", "X86"), ("aarch64", "AArch64")])?;
  let device_arch = config.sm_arch();

  let common = [
    "-DCMAKE_BUILD_TYPE=Release".to_string(),
    "-DLLVM_ENABLE_PROJECTS=\"clang;lld;polly\"".to_string(),
    "-DLLVM_ENABLE_RUNTIMES=\"compiler-rt;openmp\"".to_string(),
    format!("-DLLVM_TARGETS_TO_BUILD=\"{host_target};NVPTX\""),
    "-DLLVM_BUILD_LLVM_DYLIB=ON".to_string(),
    "-DLLVM_ENABLE_ASSERTIONS=OFF".to_string(),
    "-DLLVM_ENABLE_OCAMLDOC=OFF".to_string(),
    "-DLLVM_ENABLE_BINDINGS=OFF".to_string(),
    "-DLLVM_ENABLE_DUMP=OFF".to_string(),
    "-DLLVM_INCLUDE_BENCHMARKS=OFF".to_string(),
    "-DLLVM_INCLUDE_EXAMPLES=OFF".to_string(),
    "-DLLVM_INCLUDE_TESTS=OFF".to_string(),
    "-DLLVM_TEMPORARILY_ALLOW_OLD_TOOLCHAIN=OFF".to_string(),
    format!("-DLIBOMPTARGET_DEVICE_ARCHITECTURES={device_arch}"),
  ]
  .join(" ");

  let src = "/var/tmp/llvm-project";
  let stage1 = format!("{src}/stage1-build");
  let stage2 = format!("{src}/stage2-build");

  let step = BuildStep::custom(
    "llvm",
    SourceLocator::git_branch("https://github.com/llvm/llvm-project.git", release),
    &[
      "echo 'Start stage 1 build ...'".to_string(),
      format!("cmake -S {src}/llvm -B {stage1} {common}"),
      format!("cmake --build {stage1} --parallel $${{jobs}}"),
      "echo 'Start stage 2 build ...'".to_string(),
      format!(
        "cmake -S {src}/llvm -B {stage2} -DCMAKE_C_COMPILER={stage1}/bin/clang -DCMAKE_CXX_COMPILER={stage1}/bin/clang++ -DCMAKE_INSTALL_PREFIX=$${{prefix}} {common}"
      ),
      format!("cmake --build {stage2} --parallel $${{jobs}} --target install"),
    ],
  )
  .prefix(LLVM_PREFIX)
  .provides(
    Toolchain::new()
      .with_cc("$${prefix}/bin/clang")
      .with_cxx("$${prefix}/bin/clang++"),
  )
  .with_env_both(PrefixEnv::new().bin().include().lib().cmake("lib/cmake").build());

  Ok(plan.append(step)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::resolve_machine;
  use crate::plan::PlanOptions;

  fn bootstrap_plan(machine: &str, jobs: Option<u32>) -> (BuildPlan, StepHandle) {
    let config = resolve_machine(machine).unwrap();
    let mut plan = BuildPlan::devel(&config, PlanOptions { jobs }).unwrap();
    let handle = llvm(
      &mut plan,
      &config,
      &LlvmStrategy::Bootstrap {
        release: "llvmorg-18.1.8".to_string(),
      },
    )
    .unwrap();
    (plan, handle)
  }

  #[test]
  fn bootstrap_targets_host_and_device() {
    let (plan, _) = bootstrap_plan("leonardo", None);
    let commands = plan.steps()[0].commands.join("\n");

    assert!(commands.contains("-DLLVM_TARGETS_TO_BUILD=\"X86;NVPTX\""));
    assert!(commands.contains("-DLIBOMPTARGET_DEVICE_ARCHITECTURES=sm_80"));
    assert!(commands.contains("-DCMAKE_INSTALL_PREFIX=/usr/local/llvm"));
  }

  #[test]
  fn bootstrap_parallelism_follows_plan_jobs() {
    let (with_jobs, _) = bootstrap_plan("thea", Some(8));
    let (without, _) = bootstrap_plan("thea", None);

    assert!(with_jobs.steps()[0].commands.iter().any(|c| c.ends_with("--parallel 8 --target install")));
    assert!(
      without.steps()[0]
        .commands
        .iter()
        .any(|c| c.contains("--parallel $(nproc)"))
    );
  }

  #[test]
  fn bootstrap_provides_clang_from_prefix() {
    let (_, handle) = bootstrap_plan("thea", None);
    assert_eq!(handle.toolchain().cc.as_deref(), Some("/usr/local/llvm/bin/clang"));
    assert_eq!(handle.prefix(), Some(LLVM_PREFIX));
  }

  #[test]
  fn packages_use_distro_codename() {
    let config = resolve_machine("leonardo").unwrap();
    let mut plan = BuildPlan::devel(&config, PlanOptions::default()).unwrap();
    let handle = llvm(
      &mut plan,
      &config,
      &LlvmStrategy::Packages {
        version: "18".to_string(),
      },
    )
    .unwrap();

    let commands = plan.steps()[0].commands.join("\n");
    assert!(commands.contains("llvm-toolchain-jammy-18 main"));
    assert!(commands.contains("clang-18"));
    assert_eq!(handle.prefix(), None);
  }

  #[test]
  fn packages_reject_dnf_distros() {
    let mut config = resolve_machine("leonardo").unwrap();
    config.base_os = "rockylinux9".to_string();
    let mut plan = BuildPlan::devel(&config, PlanOptions::default()).unwrap();

    let err = llvm(
      &mut plan,
      &config,
      &LlvmStrategy::Packages {
        version: "18".to_string(),
      },
    )
    .unwrap_err();
    assert!(err.to_string().contains("rockylinux9"));
    assert!(plan.is_empty());
  }

  #[test]
  fn bootstrap_rejects_unknown_arch() {
    let mut config = resolve_machine("thea").unwrap();
    config.arch = "riscv64".to_string();
    let mut plan = BuildPlan::devel(&config, PlanOptions::default()).unwrap();

    let err = llvm(
      &mut plan,
      &config,
      &LlvmStrategy::Bootstrap {
        release: "llvmorg-18.1.8".to_string(),
      },
    )
    .unwrap_err();
    assert!(err.to_string().contains("riscv64"));
  }
}
