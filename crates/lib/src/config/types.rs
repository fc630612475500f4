use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::{Distro, PlatformError};

/// Image reference prefix for all base images.
pub const REGISTRY: &str = "docker.io";

/// Identifier of the bundled PMIx shipped inside OpenMPI.
pub const PMIX_INTERNAL: &str = "internal";

/// A resolved machine configuration.
///
/// Resolved once per invocation and then only read: every step-construction
/// call receives `&Config`, nothing consults process-wide state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
  /// Target CPU architecture (`x86_64`, `aarch64`).
  pub arch: String,
  /// CPU microarchitecture tag (`skylake`, `neoverse_v2`).
  pub march: String,
  /// CUDA compute capability without the `sm_` prefix (`80`, `90`).
  pub cuda_arch: String,
  /// Base image repository (`nvidia/cuda`).
  pub base_image: String,
  /// Distribution tag of the base image (`ubuntu22`).
  pub base_os: String,
  pub cuda_version: String,
  pub tag_devel: String,
  pub digest_devel: String,
  pub tag_runtime: String,
  pub digest_runtime: String,
  pub network_stack: NetworkStack,
}

/// Versions and switches of the interconnect libraries and MPI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStack {
  pub mlnx_ofed: String,
  pub knem: Component,
  pub xpmem: Component,
  pub gdrcopy: Component,
  pub ucx: String,
  pub pmix: Pmix,
  pub ompi: String,
}

/// An optional helper library of the network stack.
///
/// In configuration documents `false` disables it, `true` enables the
/// default version, and a string pins a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ComponentRepr", into = "ComponentRepr")]
pub enum Component {
  Disabled,
  Default,
  Version(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ComponentRepr {
  Flag(bool),
  Version(String),
}

impl From<ComponentRepr> for Component {
  fn from(repr: ComponentRepr) -> Self {
    match repr {
      ComponentRepr::Flag(false) => Component::Disabled,
      ComponentRepr::Flag(true) => Component::Default,
      ComponentRepr::Version(v) => Component::Version(v),
    }
  }
}

impl From<Component> for ComponentRepr {
  fn from(component: Component) -> Self {
    match component {
      Component::Disabled => ComponentRepr::Flag(false),
      Component::Default => ComponentRepr::Flag(true),
      Component::Version(v) => ComponentRepr::Version(v),
    }
  }
}

impl Component {
  pub fn is_enabled(&self) -> bool {
    !matches!(self, Component::Disabled)
  }

  /// The pinned version, or `default` when enabled without a pin.
  pub fn version_or<'a>(&'a self, default: &'a str) -> Option<&'a str> {
    match self {
      Component::Disabled => None,
      Component::Default => Some(default),
      Component::Version(v) => Some(v),
    }
  }
}

/// Where OpenMPI gets its PMIx from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Pmix {
  /// The copy bundled with OpenMPI; no standalone install.
  Internal,
  /// A standalone PMIx of this version.
  Version(String),
}

impl From<String> for Pmix {
  fn from(value: String) -> Self {
    if value == PMIX_INTERNAL {
      Pmix::Internal
    } else {
      Pmix::Version(value)
    }
  }
}

impl From<Pmix> for String {
  fn from(pmix: Pmix) -> Self {
    match pmix {
      Pmix::Internal => PMIX_INTERNAL.to_string(),
      Pmix::Version(v) => v,
    }
  }
}

/// Where a configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
  /// A name from the built-in machine table.
  Machine(String),
  /// A JSON configuration document.
  File(PathBuf),
}

/// What to do when no configuration source is supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvePolicy {
  /// Machine used when the caller supplies no source at all.
  pub default_machine: Option<String>,
}

impl ResolvePolicy {
  /// A policy that fails when no source is supplied.
  pub fn strict() -> Self {
    Self { default_machine: None }
  }

  pub fn with_default(machine: &str) -> Self {
    Self {
      default_machine: Some(machine.to_string()),
    }
  }
}

/// Errors that can occur while resolving a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// Neither a machine nor a file was given and the policy has no default.
  #[error("no machine specified: pass a machine name or a configuration file")]
  MissingIdentifier,

  #[error("invalid machine name: {name} (known machines: {})", .known.join(", "))]
  UnknownMachine { name: String, known: Vec<String> },

  #[error("cannot access {}: No such file or directory", .0.display())]
  FileNotFound(PathBuf),

  #[error("failed to read configuration {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed configuration {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("malformed configuration: missing required field '{0}'")]
  MissingField(String),

  #[error("malformed configuration: field '{0}' must not be empty")]
  EmptyField(String),

  #[error("malformed configuration: field '{field}' must be a sha256 digest, got '{value}'")]
  InvalidDigest { field: String, value: String },

  #[error(transparent)]
  Platform(#[from] PlatformError),
}

impl Config {
  /// Fully qualified devel base image, pinned by digest.
  pub fn devel_image(&self) -> String {
    format!("{}/{}@{}", REGISTRY, self.base_image, self.digest_devel)
  }

  /// Fully qualified runtime base image, pinned by digest.
  pub fn runtime_image(&self) -> String {
    format!("{}/{}@{}", REGISTRY, self.base_image, self.digest_runtime)
  }

  /// CUDA device architecture in compiler notation (`sm_90`).
  pub fn sm_arch(&self) -> String {
    format!("sm_{}", self.cuda_arch)
  }

  pub fn distro(&self) -> Result<Distro, PlatformError> {
    self.base_os.parse()
  }

  /// Check field contents that the document schema cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let fields = [
      ("arch", &self.arch),
      ("march", &self.march),
      ("cuda_arch", &self.cuda_arch),
      ("base_image", &self.base_image),
      ("base_os", &self.base_os),
      ("cuda_version", &self.cuda_version),
      ("tag_devel", &self.tag_devel),
      ("digest_devel", &self.digest_devel),
      ("tag_runtime", &self.tag_runtime),
      ("digest_runtime", &self.digest_runtime),
      ("network_stack.mlnx_ofed", &self.network_stack.mlnx_ofed),
      ("network_stack.ucx", &self.network_stack.ucx),
      ("network_stack.ompi", &self.network_stack.ompi),
    ];
    for (name, value) in fields {
      if value.trim().is_empty() {
        return Err(ConfigError::EmptyField(name.to_string()));
      }
    }

    let components = [
      ("network_stack.knem", &self.network_stack.knem),
      ("network_stack.xpmem", &self.network_stack.xpmem),
      ("network_stack.gdrcopy", &self.network_stack.gdrcopy),
    ];
    for (name, component) in components {
      if let Component::Version(v) = component
        && v.trim().is_empty()
      {
        return Err(ConfigError::EmptyField(name.to_string()));
      }
    }
    if let Pmix::Version(v) = &self.network_stack.pmix
      && v.trim().is_empty()
    {
      return Err(ConfigError::EmptyField("network_stack.pmix".to_string()));
    }

    for (name, value) in [("digest_devel", &self.digest_devel), ("digest_runtime", &self.digest_runtime)] {
      if !value.starts_with("sha256:") {
        return Err(ConfigError::InvalidDigest {
          field: name.to_string(),
          value: value.clone(),
        });
      }
    }

    self.distro()?;
    Ok(())
  }
}
