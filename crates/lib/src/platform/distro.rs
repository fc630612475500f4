use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::PlatformError;

/// Linux distributions a base image can be built on.
///
/// The distribution decides which package manager installs OS packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distro {
  Ubuntu20,
  Ubuntu22,
  Ubuntu24,
  RockyLinux8,
  RockyLinux9,
}

/// Package managers used to install OS packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
  Apt,
  Dnf,
}

impl Distro {
  pub const ALL: [Distro; 5] = [
    Distro::Ubuntu20,
    Distro::Ubuntu22,
    Distro::Ubuntu24,
    Distro::RockyLinux8,
    Distro::RockyLinux9,
  ];

  /// Returns the short distribution tag used in configuration files
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Ubuntu20 => "ubuntu20",
      Self::Ubuntu22 => "ubuntu22",
      Self::Ubuntu24 => "ubuntu24",
      Self::RockyLinux8 => "rockylinux8",
      Self::RockyLinux9 => "rockylinux9",
    }
  }

  pub fn package_manager(&self) -> PackageManager {
    match self {
      Self::Ubuntu20 | Self::Ubuntu22 | Self::Ubuntu24 => PackageManager::Apt,
      Self::RockyLinux8 | Self::RockyLinux9 => PackageManager::Dnf,
    }
  }
}

impl PackageManager {
  /// Shell command installing `packages` and cleaning the package cache.
  pub fn install_command(&self, packages: &[String]) -> String {
    let list = packages.join(" ");
    match self {
      Self::Apt => format!(
        "apt-get update -y && DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends {list} && rm -rf /var/lib/apt/lists/*"
      ),
      Self::Dnf => format!("dnf install -y {list} && rm -rf /var/cache/dnf/*"),
    }
  }
}

impl fmt::Display for Distro {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Distro {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Distro::ALL
      .into_iter()
      .find(|d| d.as_str() == s)
      .ok_or_else(|| PlatformError::UnsupportedDistro {
        value: s.to_string(),
        supported: Distro::ALL.iter().map(|d| d.as_str().to_string()).collect(),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ubuntu_uses_apt() {
    let cmd = Distro::Ubuntu22
      .package_manager()
      .install_command(&["git".to_string(), "pkgconf".to_string()]);
    assert!(cmd.contains("apt-get install -y --no-install-recommends git pkgconf"));
  }

  #[test]
  fn rocky_uses_dnf() {
    assert_eq!(Distro::RockyLinux9.package_manager(), PackageManager::Dnf);
  }

  #[test]
  fn unknown_distro_is_rejected() {
    assert!("debian12".parse::<Distro>().is_err());
  }
}
