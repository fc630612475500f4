//! Compiler and linker descriptors handed to downstream build steps.
//!
//! A [`Toolchain`] is a plain value. Deriving a variant (say, the MPI
//! wrappers with `-fPIC`) produces a new descriptor and leaves the original
//! untouched, so one step's flags never leak into another step's build.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Toolchain {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cc: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cxx: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fc: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub f77: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub f90: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cflags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cxxflags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fflags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ldflags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cppflags: Option<String>,
}

macro_rules! with_field {
  ($($method:ident => $field:ident),* $(,)?) => {
    $(
      pub fn $method(&self, value: &str) -> Self {
        Self {
          $field: Some(value.to_string()),
          ..self.clone()
        }
      }
    )*
  };
}

impl Toolchain {
  pub fn new() -> Self {
    Self::default()
  }

  /// The MPI compiler wrappers, resolved through `PATH`.
  pub fn mpi() -> Self {
    Self {
      cc: Some("mpicc".to_string()),
      cxx: Some("mpicxx".to_string()),
      fc: Some("mpifort".to_string()),
      f77: Some("mpif77".to_string()),
      f90: Some("mpif90".to_string()),
      ..Self::default()
    }
  }

  /// The MPI compiler wrappers of an installation under `prefix`.
  pub fn mpi_at(prefix: &str) -> Self {
    Self {
      cc: Some(format!("{prefix}/bin/mpicc")),
      cxx: Some(format!("{prefix}/bin/mpicxx")),
      fc: Some(format!("{prefix}/bin/mpifort")),
      f77: Some(format!("{prefix}/bin/mpif77")),
      f90: Some(format!("{prefix}/bin/mpif90")),
      ..Self::default()
    }
  }

  with_field! {
    with_cc => cc,
    with_cxx => cxx,
    with_fc => fc,
    with_f77 => f77,
    with_f90 => f90,
    with_cflags => cflags,
    with_cxxflags => cxxflags,
    with_fflags => fflags,
    with_ldflags => ldflags,
    with_cppflags => cppflags,
  }

  /// `(variable, value)` pairs for every field that is set, in a fixed order.
  pub fn variables(&self) -> Vec<(&'static str, &str)> {
    [
      ("CC", &self.cc),
      ("CXX", &self.cxx),
      ("FC", &self.fc),
      ("F77", &self.f77),
      ("F90", &self.f90),
      ("CFLAGS", &self.cflags),
      ("CXXFLAGS", &self.cxxflags),
      ("FFLAGS", &self.fflags),
      ("LDFLAGS", &self.ldflags),
      ("CPPFLAGS", &self.cppflags),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
    .collect()
  }

  /// Assignments to put in front of a configure or cmake invocation.
  ///
  /// Values containing whitespace are quoted. Empty for an empty toolchain.
  pub fn env_prefix(&self) -> String {
    self
      .variables()
      .into_iter()
      .map(|(name, value)| {
        if value.contains(char::is_whitespace) {
          format!("{name}='{value}'")
        } else {
          format!("{name}={value}")
        }
      })
      .collect::<Vec<_>>()
      .join(" ")
  }

  pub fn is_empty(&self) -> bool {
    self.variables().is_empty()
  }
}

impl fmt::Display for Toolchain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      write!(f, "(default)")
    } else {
      write!(f, "{}", self.env_prefix())
    }
  }
}
