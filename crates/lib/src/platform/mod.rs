//! Target platform vocabulary and closed-enumeration selection.
//!
//! Recipes often pick a build parameter by CPU family or microarchitecture
//! (Boost's `architecture=`, SeisSol's `HOST_ARCH`, LLVM's host target). The
//! set of choices is closed: a value missing from the table is an error, never
//! a silent default.

pub mod arch;
pub mod distro;

use thiserror::Error;

pub use arch::Arch;
pub use distro::{Distro, PackageManager};

/// Errors raised when a platform value is outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
  #[error("invalid or unsupported architecture: {value} (supported: {})", .supported.join(", "))]
  UnsupportedArch { value: String, supported: Vec<String> },

  #[error("invalid or unsupported microarchitecture: {value} (supported: {})", .supported.join(", "))]
  UnsupportedMicroarch { value: String, supported: Vec<String> },

  #[error("invalid or unsupported distribution: {value} (supported: {})", .supported.join(", "))]
  UnsupportedDistro { value: String, supported: Vec<String> },
}

/// Pick the entry of `table` keyed by `arch`.
///
/// # Errors
///
/// Returns [`PlatformError::UnsupportedArch`] naming `arch` and the keys of
/// `table` when there is no entry for it.
pub fn select_by_arch<T: Clone>(arch: &str, table: &[(&str, T)]) -> Result<T, PlatformError> {
  lookup(arch, table).ok_or_else(|| PlatformError::UnsupportedArch {
    value: arch.to_string(),
    supported: keys(table),
  })
}

/// Pick the entry of `table` keyed by microarchitecture `march`.
pub fn select_by_march<T: Clone>(march: &str, table: &[(&str, T)]) -> Result<T, PlatformError> {
  lookup(march, table).ok_or_else(|| PlatformError::UnsupportedMicroarch {
    value: march.to_string(),
    supported: keys(table),
  })
}

fn lookup<T: Clone>(key: &str, table: &[(&str, T)]) -> Option<T> {
  table.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
}

fn keys<T>(table: &[(&str, T)]) -> Vec<String> {
  table.iter().map(|(k, _)| k.to_string()).collect()
}
