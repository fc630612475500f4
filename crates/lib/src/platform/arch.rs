use std::fmt;
use std::str::FromStr;

use super::PlatformError;

/// CPU architecture variants an image can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
}

impl Arch {
  /// All supported architectures, in a stable order.
  pub const ALL: [Arch; 2] = [Arch::X86_64, Arch::Aarch64];

  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
    }
  }

  /// Returns the OCI platform string used by `FROM --platform=...`
  pub fn oci_platform(&self) -> &'static str {
    match self {
      Self::X86_64 => "linux/amd64",
      Self::Aarch64 => "linux/arm64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Arch {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "x86_64" => Ok(Self::X86_64),
      "aarch64" => Ok(Self::Aarch64),
      other => Err(PlatformError::UnsupportedArch {
        value: other.to_string(),
        supported: Arch::ALL.iter().map(|a| a.as_str().to_string()).collect(),
      }),
    }
  }
}
