//! Building blocks shared by the recipes.
//!
//! Each block appends one or more steps to a devel plan and returns handles
//! for the steps later blocks depend on. Blocks receive the configuration
//! explicitly and fail before appending anything when the target platform is
//! outside the set they support.

pub mod libs;
pub mod llvm;
pub mod network;
pub mod tools;

pub use libs::{AcppProfile, adaptive_cpp, boost, hdf5, netcdf};
pub use llvm::{LlvmStrategy, llvm};
pub use network::{NetworkOptions, NetworkStack, network_stack};
pub use tools::{build_tools, cmake, git_pkgconf, python};

use crate::platform::PackageManager;

/// Pick the package list for the plan's package manager.
pub(crate) fn os_packages<'a>(pm: PackageManager, apt: &[&'a str], dnf: &[&'a str]) -> Vec<&'a str> {
  match pm {
    PackageManager::Apt => apt.to_vec(),
    PackageManager::Dnf => dnf.to_vec(),
  }
}
