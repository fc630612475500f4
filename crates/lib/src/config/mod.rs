//! Machine configuration resolution.
//!
//! A configuration is selected either by a short machine name from the
//! built-in table or by a path to a JSON document. Resolution either produces
//! a fully validated [`Config`] or fails with a [`ConfigError`] naming the
//! offending value; there is no silent fallback apart from the explicit
//! default of a [`ResolvePolicy`].
//!
//! # Document format
//!
//! ```json
//! {
//!   "arch": "aarch64",
//!   "march": "neoverse_v2",
//!   "cuda_arch": "90",
//!   "base_image": "nvidia/cuda",
//!   "base_os": "ubuntu22",
//!   "cuda_version": "12.6",
//!   "tag_devel": "12.6.3-devel-ubuntu22.04",
//!   "digest_devel": "sha256:...",
//!   "tag_runtime": "12.6.3-runtime-ubuntu22.04",
//!   "digest_runtime": "sha256:...",
//!   "network_stack": {
//!     "mlnx_ofed": "24.04-0.7.0.0",
//!     "knem": true,
//!     "xpmem": true,
//!     "gdrcopy": true,
//!     "ucx": "1.18.0",
//!     "pmix": "internal",
//!     "ompi": "5.0.3"
//!   }
//! }
//! ```

mod machines;
mod types;

pub use machines::MACHINES;
pub use types::*;

use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

/// Top-level keys every configuration document must carry.
pub const REQUIRED_FIELDS: &[&str] = &[
  "arch",
  "march",
  "cuda_arch",
  "base_image",
  "base_os",
  "cuda_version",
  "tag_devel",
  "digest_devel",
  "tag_runtime",
  "digest_runtime",
  "network_stack",
];

/// Keys every `network_stack` table must carry.
pub const REQUIRED_NETWORK_FIELDS: &[&str] = &["mlnx_ofed", "knem", "xpmem", "gdrcopy", "ucx", "pmix", "ompi"];

/// Resolve a configuration from `source`, falling back to the policy default.
///
/// # Errors
///
/// - [`ConfigError::MissingIdentifier`] when `source` is `None` and the policy has no default
/// - [`ConfigError::UnknownMachine`] when the machine name is not built in
/// - [`ConfigError::FileNotFound`], [`ConfigError::Read`], [`ConfigError::Parse`] for file sources
/// - [`ConfigError::MissingField`] and friends when the configuration is malformed
pub fn resolve(source: Option<&ConfigSource>, policy: &ResolvePolicy) -> Result<Config, ConfigError> {
  match source {
    Some(ConfigSource::Machine(name)) => resolve_machine(name),
    Some(ConfigSource::File(path)) => load_file(path),
    None => match &policy.default_machine {
      Some(name) => {
        debug!(machine = %name, "no configuration given, using policy default");
        resolve_machine(name)
      }
      None => Err(ConfigError::MissingIdentifier),
    },
  }
}

/// Resolve a built-in machine by name.
pub fn resolve_machine(name: &str) -> Result<Config, ConfigError> {
  let config = machines::machine(name).ok_or_else(|| ConfigError::UnknownMachine {
    name: name.to_string(),
    known: machines().into_iter().map(str::to_string).collect(),
  })?;
  config.validate()?;
  info!(machine = %name, arch = %config.arch, march = %config.march, "resolved built-in machine configuration");
  Ok(config)
}

/// Names of all built-in machines, sorted.
pub fn machines() -> Vec<&'static str> {
  MACHINES.to_vec()
}

/// Load and validate a JSON configuration document.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ConfigError::FileNotFound(path.to_path_buf())),
    Err(e) => {
      return Err(ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
      });
    }
  };

  let value: Value = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
    path: path.to_path_buf(),
    source: e,
  })?;
  check_required(&value)?;

  let config: Config = serde_json::from_value(value).map_err(|e| ConfigError::Parse {
    path: path.to_path_buf(),
    source: e,
  })?;
  config.validate()?;

  info!(path = %path.display(), arch = %config.arch, march = %config.march, "loaded configuration file");
  Ok(config)
}

/// Report the first required key absent from the document, as a dotted path.
fn check_required(value: &Value) -> Result<(), ConfigError> {
  for field in REQUIRED_FIELDS {
    if value.get(field).is_none_or(Value::is_null) {
      return Err(ConfigError::MissingField(field.to_string()));
    }
  }
  let network = &value["network_stack"];
  for field in REQUIRED_NETWORK_FIELDS {
    if network.get(field).is_none_or(Value::is_null) {
      return Err(ConfigError::MissingField(format!("network_stack.{field}")));
    }
  }
  Ok(())
}
