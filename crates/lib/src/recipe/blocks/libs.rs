//! Libraries shared by the application recipes: Boost, AdaptiveCpp, HDF5 and NetCDF.
//!
//! HDF5 and NetCDF take the archive location strategy as a parameter, so a
//! recipe can point them at a mirror or a differently laid out release tree
//! without touching this module.

use crate::config::Config;
use crate::env::{EnvVar, PrefixEnv};
use crate::plan::{BuildPlan, StepHandle};
use crate::platform::select_by_arch;
use crate::recipe::RecipeError;
use crate::source::{SourceLocator, TemplateUrl, UrlResolver};
use crate::step::BuildStep;
use crate::toolchain::Toolchain;

use super::os_packages;

pub const BOOST_VERSION: &str = "1.86.0";
pub const HDF5_VERSION: &str = "1.14.5";
pub const NETCDF_VERSION: &str = "4.9.2";

/// Boost with the fiber, context, atomic and filesystem libraries.
pub fn boost(plan: &mut BuildPlan, config: &Config, version: &str) -> Result<StepHandle, RecipeError> {
  let arch = select_by_arch(&config.arch, &[("x86_64", "x86"), ("aarch64", "arm")])?;
  let resolved = TemplateUrl::new("https://archives.boost.io/release/{version}/source/boost_{version_}.tar.bz2")
    .resolve(version)?;

  let pm = plan.package_manager();
  plan.append(BuildStep::packages(&os_packages(
    pm,
    &["bzip2", "libbz2-dev", "tar", "wget", "zlib1g-dev"],
    &["bzip2", "bzip2-devel", "tar", "wget", "which", "zlib-devel"],
  )))?;

  let b2 = [
    "variant=release",
    "threading=multi",
    "link=shared",
    "visibility=hidden",
    "cxxflags=\"-std=c++17\"",
    "address-model=64",
    &format!("architecture={arch}"),
    "--with-fiber",
    "--with-context",
    "--with-atomic",
    "--with-filesystem",
    "--prefix=$${prefix}",
  ]
  .join(" ");

  let step = BuildStep::custom(
    "boost",
    resolved.locator(),
    &[
      "./bootstrap.sh --prefix=$${prefix} --with-libraries=fiber,context,atomic,filesystem --show-libraries".to_string(),
      format!("./b2 -j$${{jobs}} -q install {b2}"),
    ],
  )
  .directory(&resolved.directory)
  .prefix("/usr/local/boost")
  .with_env_both(PrefixEnv::new().include().lib().cmake("lib/cmake").build());

  Ok(plan.append(step)?)
}

/// Which compiler features AdaptiveCpp is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcppProfile {
  /// Ahead-of-time CUDA compilation for the configured GPU only.
  Minimal,
  /// The generic single-pass compiler.
  Full,
}

impl AcppProfile {
  pub fn as_str(&self) -> &'static str {
    match self {
      AcppProfile::Minimal => "minimal",
      AcppProfile::Full => "full",
    }
  }
}

/// AdaptiveCpp (SYCL) on top of LLVM and Boost.
pub fn adaptive_cpp(
  plan: &mut BuildPlan,
  config: &Config,
  release: &str,
  profile: AcppProfile,
) -> Result<StepHandle, RecipeError> {
  let step = BuildStep::cmake(
    "adaptivecpp",
    SourceLocator::git_branch("https://github.com/AdaptiveCpp/AdaptiveCpp.git", release),
  )
  .prefix("/usr/local/acpp")
  .arg("-DCMAKE_BUILD_TYPE=Release")
  .arg(format!("-DACPP_COMPILER_FEATURE_PROFILE={}", profile.as_str()))
  .arg_opt((profile == AcppProfile::Minimal).then(|| format!("-DDEFAULT_TARGETS=cuda:{}", config.sm_arch())))
  .reads("CMAKE_PREFIX_PATH")
  .with_env_both(PrefixEnv::new().bin().include().lib().cmake("lib/cmake").build());

  Ok(plan.append(step)?)
}

/// HDF5 built with `toolchain` and the given configure arguments.
pub fn hdf5(
  plan: &mut BuildPlan,
  resolver: &dyn UrlResolver,
  version: &str,
  toolchain: Toolchain,
  args: &[&str],
) -> Result<StepHandle, RecipeError> {
  let resolved = resolver.resolve(version)?;

  let pm = plan.package_manager();
  plan.append(BuildStep::packages(&os_packages(
    pm,
    &["bzip2", "file", "make", "wget", "zlib1g-dev"],
    &["bzip2", "file", "make", "wget", "zlib-devel"],
  )))?;

  let step = BuildStep::configure("hdf5", resolved.locator())
    .directory(&resolved.directory)
    .prefix("/usr/local/hdf5")
    .toolchain(toolchain)
    .args(args.iter().copied())
    .with_env_both(
      PrefixEnv::new()
        .bin()
        .include()
        .lib()
        .with(EnvVar::new("HDF5_DIR", "$${prefix}"))
        .build(),
    )
    .with_runtime_packages(&os_packages(pm, &["zlib1g"], &["zlib"]));

  Ok(plan.append(step)?)
}

/// NetCDF-C, configured against the HDF5 already in the plan.
pub fn netcdf(
  plan: &mut BuildPlan,
  resolver: &dyn UrlResolver,
  version: &str,
  toolchain: Toolchain,
  args: &[&str],
) -> Result<StepHandle, RecipeError> {
  let resolved = resolver.resolve(version)?;

  let pm = plan.package_manager();
  plan.append(BuildStep::packages(&os_packages(
    pm,
    &["ca-certificates", "file", "libcurl4-openssl-dev", "m4", "make", "wget", "zlib1g-dev"],
    &["ca-certificates", "file", "libcurl-devel", "m4", "make", "wget", "zlib-devel"],
  )))?;

  let step = BuildStep::configure("netcdf", resolved.locator())
    .directory(&resolved.directory)
    .prefix("/usr/local/netcdf")
    .toolchain(
      toolchain
        .with_cppflags("-I$${step:hdf5}/include")
        .with_ldflags("-L$${step:hdf5}/lib"),
    )
    .args(args.iter().copied())
    .with_env_both(
      PrefixEnv::new()
        .bin()
        .include()
        .lib()
        .pkgconfig("lib/pkgconfig")
        .cmake("")
        .build(),
    )
    .with_runtime_packages(&os_packages(pm, &["libcurl4"], &["libcurl"]));

  Ok(plan.append(step)?)
}
