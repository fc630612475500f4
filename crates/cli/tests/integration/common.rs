//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Isolated test environment with its own output directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Path inside the temp directory.
  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  /// Copy a fixture into the temp directory, returning the new path.
  pub fn fixture(&self, name: &str) -> PathBuf {
    let dest = self.path(name);
    std::fs::copy(fixture_path(name), &dest).unwrap_or_else(|e| panic!("Failed to copy fixture {}: {}", name, e));
    dest
  }

  /// Read a file relative to the temp directory.
  pub fn read(&self, path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
  }

  /// Command running in the temp directory with a clean environment.
  pub fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("hpcstack");
    cmd
      .current_dir(self.temp.path())
      .env_remove("HPCSTACK_JOBS")
      .env_remove("RUST_LOG");
    cmd
  }
}
