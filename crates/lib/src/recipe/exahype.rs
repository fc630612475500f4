//! ExaHyPE 2 applications on Peano, compiled with OpenMP offload.

use crate::config::Config;
use crate::env::EnvVar;
use crate::plan::BuildPlan;
use crate::source::{Hdf5Release, NetcdfRelease};
use crate::stage::CopyList;
use crate::step::BuildStep;

use super::RecipeError;
use super::blocks::libs::{BOOST_VERSION, HDF5_VERSION, NETCDF_VERSION};
use super::blocks::{
  AcppProfile, LlvmStrategy, NetworkOptions, adaptive_cpp, boost, build_tools, hdf5, llvm, netcdf, network_stack,
  os_packages,
};

const CMAKE_VERSION: &str = "3.31.4";
const WORKSPACE: &str = "/root";
const PEANO: &str = "/root/Peano";
const PEANO_BRANCH: &str = "muc/exahype-enclave-tasking";
/// Applications directory relative to the Peano checkout.
const APPS: &str = "applications/exahype2";

/// An ExaHyPE application: directory under [`APPS`] and build commands run there.
struct App {
  name: &'static str,
  dir: &'static str,
  build: &'static [&'static str],
}

const APPLICATIONS: [App; 3] = [
  App {
    name: "elastic-point-explosion",
    dir: "elastic/point-explosion",
    build: &["python point-explosion.py -md 8 -ns 0"],
  },
  App {
    name: "euler-point-explosion",
    dir: "euler/point-explosion",
    build: &["python point-explosion.py -md 8 -ns 0"],
  },
  App {
    name: "tafjord-landslide",
    dir: "shallow-water/tafjord-landslide",
    build: &[
      "sed -i 's/end_time=50.0,/end_time=6.0,/' tafjord-landslide.py",
      "python tafjord-landslide.py -md 8 -ns 0",
    ],
  },
];

pub(super) fn devel(plan: &mut BuildPlan, config: &Config) -> Result<CopyList, RecipeError> {
  build_tools(plan, config, CMAKE_VERSION)?;
  let net = network_stack(plan, config, NetworkOptions::full())?;

  plan.comment("step3: start")?;
  plan.comment("Enable OpenMP offload and SYCL support")?;
  llvm(
    plan,
    config,
    &LlvmStrategy::Bootstrap {
      release: "llvmorg-18.1.8".to_string(),
    },
  )?;
  boost(plan, config, BOOST_VERSION)?;
  adaptive_cpp(plan, config, "v24.10.0", AcppProfile::Full)?;

  plan.comment("step4: start")?;
  plan.comment("Install optional dependencies")?;
  let mpi = net.openmpi.toolchain();
  hdf5(
    plan,
    &Hdf5Release::default(),
    HDF5_VERSION,
    mpi.clone(),
    &[
      "--enable-unsupported",
      "--enable-threadsafe",
      "--enable-parallel",
      "--enable-shared",
      "--disable-fortran",
      "--disable-java",
      "--disable-cxx",
    ],
  )?;
  netcdf(
    plan,
    &NetcdfRelease,
    NETCDF_VERSION,
    mpi,
    &["--enable-shared", "--disable-libxml2"],
  )?;

  plan.comment("step5: start")?;
  plan.comment("Build Peano")?;
  plan.append(BuildStep::packages(&["git-lfs"]))?;

  let peano_build = [
    "cmake -S $${prefix} -B $${prefix}/build".to_string(),
    "-DCMAKE_C_COMPILER=$${step:llvm}/bin/clang".to_string(),
    "-DCMAKE_CXX_COMPILER=$${step:llvm}/bin/clang++".to_string(),
    "-DCMAKE_CXX_STANDARD=17".to_string(),
    "-DCMAKE_BUILD_TYPE=Release".to_string(),
    "-DENABLE_EXAHYPE=ON".to_string(),
    "-DENABLE_LOADBALANCING=ON".to_string(),
    "-DENABLE_BLOCKSTRUCTURED=ON".to_string(),
    "-DUSE_CCACHE=OFF".to_string(),
    "-DWITH_NETCDF=ON".to_string(),
    "-DWITH_MPI=ON".to_string(),
    "-DWITH_MULTITHREADING=omp".to_string(),
    "-DWITH_GPU=omp".to_string(),
    "-DWITH_USM=ON".to_string(),
    format!("-DWITH_GPU_ARCH={}", config.sm_arch()),
  ]
  .join(" ");

  plan.append(
    BuildStep::shell(
      "peano",
      &[
        "git lfs install".to_string(),
        format!(
          "mkdir -p {WORKSPACE} && cd {WORKSPACE} && git clone --branch {PEANO_BRANCH} --depth 1 https://gitlab.lrz.de/hpcsoftware/Peano.git $${{prefix}}"
        ),
        peano_build,
        "cmake --build $${prefix}/build --parallel $${jobs}".to_string(),
        // vtk and friends are not needed by the applications
        "sed -i '8,10 D' $${prefix}/requirements.txt".to_string(),
        "python3 -m venv $${prefix}/codegen && . $${prefix}/codegen/bin/activate && pip install -e $${prefix}".to_string(),
      ],
    )
    .prefix(PEANO)
    .reads("CMAKE_PREFIX_PATH")
    .with_env_both(vec![
      EnvVar::prepend("PATH", "codegen/bin"),
      EnvVar::prepend("LIBRARY_PATH", "build/lib"),
      EnvVar::prepend("LD_LIBRARY_PATH", "build/lib"),
    ]),
  )?;

  plan.comment("step6: start")?;
  plan.comment("Build ExaHyPE Apps")?;
  for app in &APPLICATIONS {
    let command = std::iter::once(format!("cd $${{step:peano}}/{APPS}/{}", app.dir))
      .chain(app.build.iter().map(|c| c.to_string()))
      .collect::<Vec<_>>()
      .join(" && ");
    // The generators are the Python scripts installed into Peano's venv.
    plan.append(BuildStep::shell(app.name, &[command]).reads("PATH"))?;
  }

  Ok(CopyList::defaults().prefix(PEANO))
}

pub(super) fn runtime(plan: &mut BuildPlan, devel: &BuildPlan) -> Result<(), RecipeError> {
  let peano = devel.prefix_of("peano")?;
  let apps = APPLICATIONS
    .iter()
    .map(|app| format!("{peano}/{APPS}/{}", app.dir))
    .collect::<Vec<_>>()
    .join(":");

  plan.comment("Copy ExaHyPE build files and setup environment")?;
  plan.append(BuildStep::environment(vec![EnvVar::new("PATH", &format!("{apps}:$PATH"))]).named("exahype-env"))?;

  plan.comment("Libraries missing from CUDA runtime image")?;
  let packages = os_packages(plan.package_manager(), &["libcurl4", "libnuma1"], &["libcurl", "numactl-libs"]);
  plan.append(BuildStep::packages(&packages))?;

  plan.comment("Set workdir and entrypoint")?;
  let script = format!("{WORKSPACE}/runscript.sh");
  plan.append(BuildStep::shell(
    "runscript",
    &[
      format!("echo '#!/bin/bash' > {script}"),
      format!("echo 'cd {peano}/{APPS}/shallow-water/tafjord-landslide' >> {script}"),
      format!("echo './TafjordLandslide.Release' >> {script}"),
      format!("chmod +x {script}"),
    ],
  ))?;
  plan.append(BuildStep::runscript(&[script]))?;
  Ok(())
}
