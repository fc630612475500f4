//! SeisSol in three convergence orders, with everything it links against.
//!
//! The devel stage builds, in order: build tools, a minimal network stack,
//! LLVM from packages, Boost and AdaptiveCpp for SYCL, the I/O and math
//! libraries, the geospatial readers, the CPU/GPU code generators and finally
//! one SeisSol install per order.

use crate::config::Config;
use crate::env::{EnvVar, PrefixEnv};
use crate::plan::BuildPlan;
use crate::platform::{select_by_arch, select_by_march};
use crate::source::{Hdf5Release, NetcdfRelease, SourceLocator};
use crate::stage::CopyList;
use crate::step::BuildStep;
use crate::toolchain::Toolchain;

use super::RecipeError;
use super::blocks::libs::{BOOST_VERSION, HDF5_VERSION, NETCDF_VERSION};
use super::blocks::tools::CMAKE_VERSION;
use super::blocks::{
  AcppProfile, LlvmStrategy, NetworkOptions, adaptive_cpp, boost, build_tools, hdf5, llvm, netcdf, network_stack,
  os_packages,
};

pub const ORDERS: [u32; 3] = [4, 5, 6];
const CODEGEN: &str = "/usr/local/codegen";

pub(super) fn devel(plan: &mut BuildPlan, config: &Config) -> Result<CopyList, RecipeError> {
  // Closed selections first so an unsupported target fails before anything is planned.
  let host_arch = select_by_march(&config.march, &[("skylake", "skx"), ("neoverse_v2", "neon")])?;
  let libxsmm_extra = select_by_arch(
    &config.arch,
    &[("x86_64", ""), ("aarch64", "PLATFORM=1 AR=aarch64-linux-gnu-ar JIT=1")],
  )?;

  build_tools(plan, config, CMAKE_VERSION)?;
  let net = network_stack(plan, config, NetworkOptions::minimal())?;

  plan.comment("step3: start")?;
  plan.comment("Install AdaptiveCpp for SYCL compilation support")?;
  llvm(
    plan,
    config,
    &LlvmStrategy::Packages {
      version: "18".to_string(),
    },
  )?;
  boost(plan, config, BOOST_VERSION)?;
  adaptive_cpp(plan, config, "v24.06.0", AcppProfile::Minimal)?;

  plan.comment("step4: start")?;
  plan.comment("Install I/O, meshing and math libraries required by SeisSol")?;
  let mpi = net.openmpi.toolchain();
  hdf5(
    plan,
    &Hdf5Release::default(),
    HDF5_VERSION,
    mpi.with_cflags("-fPIC"),
    &["--enable-parallel", "--disable-shared", "--with-zlib"],
  )?;
  netcdf(
    plan,
    &NetcdfRelease,
    NETCDF_VERSION,
    Toolchain::new().with_cc("$${step:hdf5}/bin/h5pcc").with_cflags("-fPIC"),
    &["--disable-shared", "--disable-dap", "--disable-libxml2", "--disable-byterange"],
  )?;

  plan.append(
    BuildStep::custom(
      "parmetis",
      SourceLocator::url("https://ftp.mcs.anl.gov/pub/pdetools/spack-pkgs/parmetis-4.0.3.tar.gz"),
      &[
        "sed -i 's/IDXTYPEWIDTH 32/IDXTYPEWIDTH 64/g' ./metis/include/metis.h".to_string(),
        format!("{} make config prefix=$${{prefix}}", mpi.env_prefix()),
        "make -j$${jobs}".to_string(),
        "make -j$${jobs} install".to_string(),
        "cp ./build/Linux-*/libmetis/libmetis.a $${prefix}/lib".to_string(),
        "cp ./metis/include/metis.h $${prefix}/include".to_string(),
      ],
    )
    .prefix("/usr/local/parmetis")
    .with_env_both(PrefixEnv::new().bin().include().lib().cmake("").build()),
  )?;

  let gfortran = os_packages(plan.package_manager(), &["libgfortran5"], &["libgfortran"]);
  plan.append(
    BuildStep::custom(
      "openblas",
      SourceLocator::url("https://github.com/OpenMathLib/OpenBLAS/releases/download/v0.3.27/OpenBLAS-0.3.27.tar.gz"),
      &["make -j$${jobs} USE_OPENMP=1", "make install PREFIX=$${prefix}"],
    )
    .prefix("/usr/local/openblas")
    .with_env_both(
      PrefixEnv::new()
        .bin()
        .include()
        .lib()
        .pkgconfig("lib/pkgconfig")
        .cmake("lib/cmake")
        .build(),
    )
    .with_runtime_packages(&gfortran),
  )?;

  plan.append(
    BuildStep::cmake(
      "eigen",
      SourceLocator::url("https://gitlab.com/libeigen/eigen/-/archive/3.4.0/eigen-3.4.0.tar.gz"),
    )
    .prefix("/usr/local/eigen")
    .with_env_both(
      PrefixEnv::new()
        .include()
        .cmake("share/eigen3/cmake")
        .pkgconfig("share/pkgconfig")
        .build(),
    ),
  )?;

  plan.comment("step5: start")?;
  plan.comment("Install geospatial data acquisition tools")?;

  plan.append(
    BuildStep::custom(
      "lua",
      SourceLocator::url("https://www.lua.org/ftp/lua-5.4.7.tar.gz"),
      &["make all install INSTALL_TOP=$${prefix}"],
    )
    .prefix("/usr/local/lua")
    .with_env_both(PrefixEnv::new().bin().include().lib().cmake("").build()),
  )?;

  plan.append(
    BuildStep::cmake(
      "asagi",
      SourceLocator::git_commit(
        "https://github.com/TUM-I5/ASAGI.git",
        "4a29bb8c54904431ac4032ebfcf3512c8659a2f3",
      )
      .recursive(),
    )
    .prefix("/usr/local/asagi")
    .toolchain(mpi.clone())
    .args([
      "-DCMAKE_BUILD_TYPE=Release",
      "-DSHARED_LIB=OFF",
      "-DSTATIC_LIB=ON",
      "-DFORTRAN_SUPPORT=OFF",
    ])
    .with_env_both(library_env("lib/pkgconfig", "")),
  )?;

  plan.append(
    BuildStep::cmake(
      "impalajit",
      SourceLocator::git_commit(
        "https://github.com/manuel-fasching/ImpalaJIT.git",
        "b439466c1d7c2b336b8fc2dde5acc77a698361ff",
      ),
    )
    .prefix("/usr/local/impalajit")
    .toolchain(Toolchain::new().with_cxxflags("-fPIE"))
    .arg("-DCMAKE_BUILD_TYPE=Release")
    .with_env_both(library_env("lib/pkgconfig", "lib/cmake")),
  )?;

  plan.append(
    BuildStep::cmake(
      "yaml-cpp",
      SourceLocator::git_branch("https://github.com/jbeder/yaml-cpp.git", "0.8.0"),
    )
    .prefix("/usr/local/yaml-cpp")
    .arg("-DCMAKE_BUILD_TYPE=Release")
    .with_env_both(library_env("lib/pkgconfig", "lib/cmake")),
  )?;

  plan.append(
    BuildStep::cmake(
      "easi",
      SourceLocator::git_commit(
        "https://github.com/SeisSol/easi.git",
        "17200158e485fb3294f65f6abfb12470209cda61",
      )
      .recursive(),
    )
    .prefix("/usr/local/easi")
    .args(["-DCMAKE_BUILD_TYPE=Release", "-DEASICUBE=OFF", "-DIMPALAJIT=ON", "-DASAGI=ON"])
    .reads("CMAKE_PREFIX_PATH")
    .with_env_both(PrefixEnv::new().include().lib().cmake("lib/cmake").build()),
  )?;

  plan.comment("step6: start")?;
  plan.comment("Install CPU and GPU code generators")?;

  let install = ["make PREFIX=$${prefix}", libxsmm_extra, "-j$${jobs} install-minimal"]
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join(" ");
  plan.append(
    BuildStep::custom(
      "libxsmm",
      SourceLocator::git_commit(
        "https://github.com/libxsmm/libxsmm.git",
        "419f7ec32d5bb2004f8a4ff1cf3b93c32d4e1227",
      ),
      &[install],
    )
    .prefix("/usr/local/libxsmm")
    .with_env_both(
      PrefixEnv::new()
        .bin()
        .include()
        .lib()
        .pkgconfig("lib")
        .cmake("")
        .build(),
    ),
  )?;

  plan.comment("PSpaMM, gemmforge, chainforge")?;
  plan.append(
    BuildStep::shell(
      "codegen",
      &[
        "python3 -m venv $${prefix}",
        ". $${prefix}/bin/activate",
        "pip install --upgrade pip",
        "pip install git+https://github.com/SeisSol/PSpaMM.git@v0.3.0",
        "pip install git+https://github.com/SeisSol/gemmforge.git@00d2101e32069267ecd4067133fdb0d34e9ae807",
        "pip install git+https://github.com/SeisSol/chainforge.git@f9d053e811d4410f78964d8a9eae7e1a632aa1fb",
      ],
    )
    .prefix(CODEGEN)
    .with_env(vec![
      EnvVar::prepend("PATH", "bin"),
      EnvVar::new("VIRTUAL_ENV", "$${prefix}"),
    ]),
  )?;

  plan.comment("step7: start")?;
  plan.comment("Install SeisSol (order 4/5/6, single precision)")?;

  let device_arch = config.sm_arch();
  let seissol_toolchain = Toolchain::new().with_ldflags("-lcurl");
  plan.instantiate(ORDERS, |order| {
    BuildStep::cmake(
      &format!("seissol-o{order}"),
      SourceLocator::git_branch("https://github.com/SeisSol/SeisSol.git", "v1.3.0").recursive(),
    )
    .directory(&format!("SeisSol-o{order}"))
    .prefix(&format!("/usr/local/seissol_O{order}"))
    .toolchain(seissol_toolchain.clone())
    .args([
      "-DCMAKE_BUILD_TYPE=Release".to_string(),
      "-DDEVICE_BACKEND=cuda".to_string(),
      format!("-DDEVICE_ARCH={device_arch}"),
      format!("-DHOST_ARCH={host_arch}"),
      "-DPRECISION=single".to_string(),
      format!("-DORDER={order}"),
    ])
    .reads("VIRTUAL_ENV")
    .with_runtime_env(PrefixEnv::new().bin().lib().build())
  })?;

  Ok(CopyList::defaults().prefix(CODEGEN).variable("VIRTUAL_ENV"))
}

pub(super) fn runtime(plan: &mut BuildPlan, devel: &BuildPlan) -> Result<(), RecipeError> {
  let codegen = devel.prefix_of("codegen")?;
  plan.append(
    BuildStep::environment(vec![EnvVar::new("PATH", &format!("{codegen}/bin:$PATH"))]).named("codegen-env"),
  )?;

  plan.comment("Libraries missing from CUDA runtime image")?;
  let packages = os_packages(
    plan.package_manager(),
    &["libgomp1", "libnuma1", "libcurl4"],
    &["libgomp", "numactl-libs", "libcurl"],
  );
  plan.append(BuildStep::packages(&packages))?;
  Ok(())
}

/// Include, library, pkg-config and CMake paths of a library install.
fn library_env(pkgconfig: &str, cmake: &str) -> Vec<EnvVar> {
  PrefixEnv::new()
    .include()
    .lib()
    .pkgconfig(pkgconfig)
    .cmake(cmake)
    .build()
}

#[cfg(test)]
mod tests {
  use super::super::{Recipe, RecipeError, RecipeKind, build};
  use super::*;
  use crate::config::resolve_machine;
  use crate::plan::PlanOptions;
  use crate::platform::PlatformError;

  fn seissol(machine: &str) -> Recipe {
    let config = resolve_machine(machine).unwrap();
    build(RecipeKind::Seissol, &config, machine, PlanOptions::default()).unwrap()
  }

  mod orders {
    use super::*;

    #[test]
    fn one_install_per_order() {
      let recipe = seissol("leonardo");
      let prefixes: Vec<&str> = recipe
        .devel
        .prefixes()
        .into_iter()
        .filter(|p| p.starts_with("/usr/local/seissol"))
        .collect();

      assert_eq!(
        prefixes,
        vec!["/usr/local/seissol_O4", "/usr/local/seissol_O5", "/usr/local/seissol_O6"]
      );
    }

    #[test]
    fn host_arch_follows_march() {
      let leonardo = seissol("leonardo");
      let thea = seissol("thea");

      let args = |r: &Recipe| r.devel.steps()[r.devel.handle("seissol-o5").unwrap().index].step.build_args().to_vec();
      assert!(args(&leonardo).contains(&"-DHOST_ARCH=skx".to_string()));
      assert!(args(&thea).contains(&"-DHOST_ARCH=neon".to_string()));
      assert!(args(&thea).contains(&"-DORDER=5".to_string()));
      assert!(args(&thea).contains(&"-DDEVICE_ARCH=sm_90".to_string()));
    }

    #[test]
    fn unknown_march_fails() {
      let mut config = resolve_machine("leonardo").unwrap();
      config.march = "zen4".to_string();

      let err = build(RecipeKind::Seissol, &config, "leonardo", PlanOptions::default()).unwrap_err();
      assert!(matches!(
        err,
        RecipeError::Platform(PlatformError::UnsupportedMicroarch { ref value, .. }) if value == "zen4"
      ));
    }
  }

  mod wiring {
    use super::*;

    #[test]
    fn netcdf_compiles_with_planned_hdf5() {
      let recipe = seissol("thea");
      let netcdf = recipe.devel.handle("netcdf").unwrap();
      let toolchain = recipe.devel.steps()[netcdf.index].step.toolchain.clone().unwrap();

      assert_eq!(toolchain.cc.as_deref(), Some("/usr/local/hdf5/bin/h5pcc"));
      assert_eq!(toolchain.cflags.as_deref(), Some("-fPIC"));
    }

    #[test]
    fn hdf5_toolchain_derivation_keeps_mpi_wrappers_clean() {
      let recipe = seissol("thea");
      let openmpi = recipe.devel.handle("openmpi").unwrap();
      let hdf5 = recipe.devel.handle("hdf5").unwrap();

      assert_eq!(openmpi.toolchain().cflags, None);
      let hdf5_toolchain = recipe.devel.steps()[hdf5.index].step.toolchain.clone().unwrap();
      assert_eq!(hdf5_toolchain.cc.as_deref(), Some("mpicc"));
      assert_eq!(hdf5_toolchain.cflags.as_deref(), Some("-fPIC"));
    }

    #[test]
    fn libxsmm_extras_only_on_aarch64() {
      let command = |r: &Recipe| {
        let handle = r.devel.handle("libxsmm").unwrap();
        r.devel.steps()[handle.index].commands.join("\n")
      };
      assert!(command(&seissol("thea")).contains("PLATFORM=1 AR=aarch64-linux-gnu-ar JIT=1"));
      assert!(!command(&seissol("leonardo")).contains("PLATFORM=1"));
    }
  }

  mod runtime {
    use super::*;

    #[test]
    fn carries_code_generators() {
      let recipe = seissol("thea");

      assert!(recipe.runtime.copies().contains(&"/usr/local/codegen"));
      assert_eq!(recipe.runtime.overlay().value("VIRTUAL_ENV").unwrap(), "/usr/local/codegen");
      assert!(
        recipe
          .runtime
          .overlay()
          .value("PATH")
          .unwrap()
          .starts_with("/usr/local/codegen/bin:")
      );
    }

    #[test]
    fn copies_every_order() {
      let recipe = seissol("leonardo");
      for order in ORDERS {
        let prefix = format!("/usr/local/seissol_O{order}");
        assert!(recipe.runtime.copies().contains(&prefix.as_str()), "{prefix}");
      }
    }
  }
}
