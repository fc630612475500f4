//! Interconnect libraries and OpenMPI.
//!
//! The stack is built in dependency order: Mellanox OFED userspace, the
//! optional KNEM, XPMEM and GDRCopy helpers, UCX, PMIx (unless OpenMPI uses
//! its bundled copy) and finally OpenMPI. Helpers that are disabled in the
//! configuration or by [`NetworkOptions`] are skipped, and so are the UCX
//! flags that would point at them.

use tracing::info;

use crate::config::{Config, Pmix};
use crate::env::PrefixEnv;
use crate::plan::{BuildPlan, StepHandle};
use crate::platform::{Distro, select_by_arch};
use crate::recipe::RecipeError;
use crate::source::SourceLocator;
use crate::step::{BuildStep, Dependency};
use crate::toolchain::Toolchain;

use super::os_packages;

pub const KNEM_VERSION: &str = "1.1.4";
pub const GDRCOPY_VERSION: &str = "2.4.1";
pub const CUDA_HOME: &str = "/usr/local/cuda";

/// Per-recipe choices on top of the machine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOptions {
  /// Build GDRCopy when the configuration enables it.
  pub gdrcopy: bool,
  /// Build UCX with `--enable-mt`.
  pub ucx_multithreading: bool,
}

impl NetworkOptions {
  pub fn full() -> Self {
    Self {
      gdrcopy: true,
      ucx_multithreading: true,
    }
  }

  /// Without GDRCopy and thread support in UCX.
  pub fn minimal() -> Self {
    Self {
      gdrcopy: false,
      ucx_multithreading: false,
    }
  }
}

/// Handles of the network stack steps later blocks depend on.
#[derive(Debug, Clone)]
pub struct NetworkStack {
  pub knem: Dependency,
  pub xpmem: Dependency,
  pub gdrcopy: Dependency,
  pub ucx: StepHandle,
  pub pmix: Dependency,
  pub openmpi: StepHandle,
}

/// Append the whole network stack.
pub fn network_stack(plan: &mut BuildPlan, config: &Config, options: NetworkOptions) -> Result<NetworkStack, RecipeError> {
  let net = &config.network_stack;
  let distro = config.distro()?;
  let ofed_arch = select_by_arch(&config.arch, &[("x86_64", "x86_64"), ("aarch64", "aarch64")])?;

  plan.comment("step2: start")?;
  plan.comment("Install network stack packages and OpenMPI")?;

  mlnx_ofed(plan, distro, ofed_arch, &net.mlnx_ofed)?;

  let knem_version = net.knem.version_or(KNEM_VERSION);
  let knem = plan.append_if(knem_version.is_some(), || knem_step(knem_version.unwrap_or_default()))?;
  let xpmem_version = net.xpmem.version_or("master");
  let xpmem = plan.append_if(xpmem_version.is_some(), || xpmem_step(xpmem_version.unwrap_or_default()))?;
  let gdrcopy_version = net.gdrcopy.version_or(GDRCOPY_VERSION).filter(|_| options.gdrcopy);
  let gdrcopy = plan.append_if(gdrcopy_version.is_some(), || {
    gdrcopy_step(gdrcopy_version.unwrap_or_default())
  })?;

  let ucx = plan.append(
    BuildStep::configure(
      "ucx",
      SourceLocator::git_branch("https://github.com/openucx/ucx.git", &format!("v{}", net.ucx)),
    )
    .prefix("/usr/local/ucx")
    .preconfigure(&["./autogen.sh"])
    .args([
      "--enable-optimizations",
      "--disable-logging",
      "--disable-debug",
      "--disable-assertions",
      "--disable-params-check",
      "--disable-doxygen-doc",
    ])
    .arg(format!("--with-cuda={CUDA_HOME}"))
    .args(["--with-verbs", "--with-rdmacm"])
    .arg_opt(knem.flag("knem"))
    .arg_opt(xpmem.flag("xpmem"))
    .arg_opt(gdrcopy.flag("gdrcopy"))
    .arg_opt(options.ucx_multithreading.then(|| "--enable-mt".to_string()))
    .with_env(PrefixEnv::new().bin().include().lib().build())
    .with_env_runtime_lib(),
  )?;

  let pmix = match &net.pmix {
    Pmix::Internal => Dependency::Internal,
    Pmix::Version(version) => {
      let pm = plan.package_manager();
      plan.append(BuildStep::packages(&os_packages(
        pm,
        &["file", "hwloc", "libevent-dev", "make", "tar", "wget"],
        &["file", "hwloc", "libevent-devel", "make", "tar", "wget"],
      )))?;
      let handle = plan.append(
        BuildStep::configure(
          "pmix",
          SourceLocator::url(&format!(
            "https://github.com/openpmix/openpmix/releases/download/v{version}/pmix-{version}.tar.gz"
          )),
        )
        .prefix("/usr/local/pmix")
        .with_env(PrefixEnv::new().bin().include().lib().build())
        .with_env_runtime_lib()
        .with_runtime_packages(&os_packages(pm, &["libevent-2.1-7", "libevent-pthreads-2.1-7"], &["libevent"])),
      )?;
      handle.dependency()
    }
  };

  let pm = plan.package_manager();
  plan.append(BuildStep::packages(&os_packages(
    pm,
    &["bzip2", "file", "hwloc", "libnuma-dev", "make", "openssh-client", "perl", "tar", "wget"],
    &["bzip2", "file", "hwloc", "make", "numactl-devel", "openssh-clients", "perl", "tar", "wget"],
  )))?;
  let openmpi = plan.append(
    BuildStep::configure("openmpi", SourceLocator::url(&openmpi_url(&net.ompi)))
      .prefix("/usr/local/openmpi")
      .args(["--disable-getpwuid", "--enable-orterun-prefix-by-default"])
      .arg(format!("--with-cuda={CUDA_HOME}"))
      .arg("--with-verbs")
      .arg_opt(ucx.dependency().flag("ucx"))
      .arg_opt(pmix.flag("pmix"))
      .provides(Toolchain::mpi())
      .with_env_both(PrefixEnv::new().bin().lib().build())
      .with_runtime_packages(&os_packages(pm, &["hwloc", "libnuma1", "openssh-client"], &["hwloc", "numactl-libs", "openssh-clients"])),
  )?;

  info!(
    ucx = %net.ucx,
    ompi = %net.ompi,
    knem = knem.is_present(),
    xpmem = xpmem.is_present(),
    gdrcopy = gdrcopy.is_present(),
    pmix = ?pmix.value(),
    "network stack planned"
  );

  Ok(NetworkStack {
    knem,
    xpmem,
    gdrcopy,
    ucx,
    pmix,
    openmpi,
  })
}

fn mlnx_ofed(plan: &mut BuildPlan, distro: Distro, arch: &str, version: &str) -> Result<StepHandle, RecipeError> {
  let pm = plan.package_manager();
  let os = match distro {
    Distro::Ubuntu20 => "ubuntu20.04",
    Distro::Ubuntu22 => "ubuntu22.04",
    Distro::Ubuntu24 => "ubuntu24.04",
    Distro::RockyLinux8 => "rhel8.10",
    Distro::RockyLinux9 => "rhel9.4",
  };
  let bundle = format!("MLNX_OFED_LINUX-{version}-{os}-{arch}");
  let prerequisites = os_packages(pm, &["libnl-3-200", "libnl-route-3-200", "libnuma1", "wget"], &["libnl3", "numactl-libs", "wget"]);
  let install = match distro.package_manager() {
    crate::platform::PackageManager::Apt => format!(
      "find /var/tmp/{bundle} -regextype posix-extended -type f -regex '.*(ibverbs-providers|ibverbs-utils|libibmad-dev|libibmad5|libibumad-dev|libibumad3|libibverbs-dev|libibverbs1|librdmacm-dev|librdmacm1)_.*\\.deb' -exec dpkg --install {{}} +"
    ),
    crate::platform::PackageManager::Dnf => format!(
      "find /var/tmp/{bundle} -regextype posix-extended -type f -regex '.*(libibumad|libibverbs|libibverbs-utils|librdmacm|rdma-core|rdma-core-devel)-[0-9].*\\.rpm' -exec rpm --install --nodeps {{}} +"
    ),
  };

  let step = BuildStep::shell(
    "mlnx-ofed",
    &[
      pm.install_command(&prerequisites.iter().map(|p| p.to_string()).collect::<Vec<_>>()),
      format!(
        "mkdir -p /var/tmp && wget -q -nc --no-check-certificate -P /var/tmp https://content.mellanox.com/ofed/MLNX_OFED-{version}/{bundle}.tgz"
      ),
      format!("tar -x -f /var/tmp/{bundle}.tgz -C /var/tmp -z"),
      install,
      format!("rm -rf /var/tmp/{bundle}.tgz /var/tmp/{bundle}"),
    ],
  )
  .with_runtime_packages(&os_packages(
    pm,
    &["ibverbs-providers", "libibumad3", "libibverbs1", "libnl-3-200", "libnl-route-3-200", "librdmacm1"],
    &["libibumad", "libibverbs", "libnl3", "librdmacm"],
  ));

  Ok(plan.append(step)?)
}

fn knem_step(version: &str) -> BuildStep {
  BuildStep::custom(
    "knem",
    SourceLocator::git_branch("https://gitlab.inria.fr/knem/knem.git", &format!("knem-{version}")),
    &["mkdir -p $${prefix}/include", "cp common/*.h $${prefix}/include"],
  )
  .prefix("/usr/local/knem")
  .with_env(PrefixEnv::new().include().build())
}

fn xpmem_step(version: &str) -> BuildStep {
  let reference = if version == "master" {
    version.to_string()
  } else {
    format!("v{version}")
  };
  BuildStep::configure("xpmem", SourceLocator::git_branch("https://github.com/hpc/xpmem.git", &reference))
    .prefix("/usr/local/xpmem")
    .preconfigure(&["./autogen.sh"])
    .arg("--disable-kernel-module")
    .with_env(PrefixEnv::new().include().lib().build())
    .with_env_runtime_lib()
}

fn gdrcopy_step(version: &str) -> BuildStep {
  BuildStep::custom(
    "gdrcopy",
    SourceLocator::url(&format!("https://github.com/NVIDIA/gdrcopy/archive/v{version}.tar.gz")),
    &[
      "mkdir -p $${prefix}/include $${prefix}/lib",
      "make prefix=$${prefix} lib lib_install",
    ],
  )
  .directory(&format!("gdrcopy-{version}"))
  .prefix("/usr/local/gdrcopy")
  .with_env(PrefixEnv::new().include().lib().build())
  .with_env_runtime_lib()
}

/// Release tarball on open-mpi.org, filed under `vMAJOR.MINOR`.
fn openmpi_url(version: &str) -> String {
  let series: Vec<&str> = version.splitn(3, '.').take(2).collect();
  format!(
    "https://www.open-mpi.org/software/ompi/v{}/downloads/openmpi-{version}.tar.bz2",
    series.join(".")
  )
}

trait RuntimeLib {
  /// `LD_LIBRARY_PATH` under `<prefix>/lib` in the runtime stage.
  fn with_env_runtime_lib(self) -> Self;
}

impl RuntimeLib for BuildStep {
  fn with_env_runtime_lib(self) -> Self {
    self.with_runtime_env(vec![crate::env::EnvVar::prepend("LD_LIBRARY_PATH", "lib")])
  }
}
