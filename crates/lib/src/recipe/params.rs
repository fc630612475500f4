//! `key=value` user arguments selecting the configuration and build knobs.
//!
//! Arguments are validated as a whole before any step is built, so a typo in
//! a key never results in a half-generated recipe.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigSource;
use crate::plan::PlanOptions;
use crate::render::Format;

/// Keys accepted by [`UserArgs::parse`].
pub const KEYS: &[&str] = &["machine", "config-file", "llvm-build-par", "jobs", "format"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
  #[error("unknown argument '{key}' (known: {})", .known.join(", "))]
  UnknownKey { key: String, known: Vec<String> },

  #[error("malformed argument '{0}': expected KEY=VALUE")]
  Malformed(String),

  #[error("conflicting arguments: {first} and {second}")]
  Conflict { first: String, second: String },

  #[error("invalid value '{value}' for '{key}': {reason}")]
  InvalidValue { key: String, value: String, reason: String },
}

/// Parsed user arguments. Unset fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserArgs {
  pub machine: Option<String>,
  pub config_file: Option<PathBuf>,
  /// Parallel build jobs (`llvm-build-par`, alias `jobs`).
  pub jobs: Option<u32>,
  pub format: Option<Format>,
}

impl UserArgs {
  /// Parse `key=value` pairs.
  ///
  /// # Errors
  ///
  /// Fails on unknown keys, pairs without `=`, values that do not parse,
  /// the same key given twice with different values, and on `machine`
  /// combined with `config-file`.
  pub fn parse<I, S>(pairs: I) -> Result<Self, ParamError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut args = UserArgs::default();
    for pair in pairs {
      let pair = pair.as_ref();
      let (key, value) = pair
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| ParamError::Malformed(pair.to_string()))?;
      args.set(key.trim(), value.trim())?;
    }
    args.check_sources()?;
    Ok(args)
  }

  /// Combine two argument sets, e.g. dedicated flags and `--userarg` pairs.
  pub fn merge(self, other: UserArgs) -> Result<Self, ParamError> {
    let merged = UserArgs {
      machine: pick("machine", self.machine, other.machine)?,
      config_file: pick("config-file", self.config_file, other.config_file)?,
      jobs: pick("jobs", self.jobs, other.jobs)?,
      format: pick("format", self.format, other.format)?,
    };
    merged.check_sources()?;
    Ok(merged)
  }

  /// The configuration source, if one was given.
  pub fn source(&self) -> Option<ConfigSource> {
    match (&self.machine, &self.config_file) {
      (Some(machine), _) => Some(ConfigSource::Machine(machine.clone())),
      (None, Some(path)) => Some(ConfigSource::File(path.clone())),
      (None, None) => None,
    }
  }

  pub fn plan_options(&self) -> PlanOptions {
    PlanOptions { jobs: self.jobs }
  }

  fn set(&mut self, key: &str, value: &str) -> Result<(), ParamError> {
    match key {
      "machine" => {
        let value = non_empty(key, value)?;
        self.machine = pick(key, self.machine.take(), Some(value.to_string()))?;
      }
      "config-file" => {
        let value = non_empty(key, value)?;
        self.config_file = pick(key, self.config_file.take(), Some(PathBuf::from(value)))?;
      }
      "llvm-build-par" | "jobs" => {
        // An empty value leaves the choice to the build.
        if value.is_empty() {
          return Ok(());
        }
        let jobs = value
          .parse::<u32>()
          .ok()
          .filter(|j| *j > 0)
          .ok_or_else(|| ParamError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a positive integer".to_string(),
          })?;
        self.jobs = pick("jobs", self.jobs.take(), Some(jobs))?;
      }
      "format" => {
        let format = value.parse::<Format>().map_err(|reason| ParamError::InvalidValue {
          key: key.to_string(),
          value: value.to_string(),
          reason,
        })?;
        self.format = pick(key, self.format.take(), Some(format))?;
      }
      other => {
        return Err(ParamError::UnknownKey {
          key: other.to_string(),
          known: KEYS.iter().map(|k| k.to_string()).collect(),
        });
      }
    }
    Ok(())
  }

  fn check_sources(&self) -> Result<(), ParamError> {
    if let (Some(machine), Some(path)) = (&self.machine, &self.config_file) {
      return Err(ParamError::Conflict {
        first: format!("machine={machine}"),
        second: format!("config-file={}", path.display()),
      });
    }
    Ok(())
  }
}

fn non_empty<'a>(key: &str, value: &'a str) -> Result<&'a str, ParamError> {
  if value.is_empty() {
    return Err(ParamError::InvalidValue {
      key: key.to_string(),
      value: value.to_string(),
      reason: "must not be empty".to_string(),
    });
  }
  Ok(value)
}

/// Keep whichever side is set; both set to different values is a conflict.
fn pick<T: PartialEq + std::fmt::Debug>(key: &str, a: Option<T>, b: Option<T>) -> Result<Option<T>, ParamError> {
  match (a, b) {
    (Some(a), Some(b)) if a != b => Err(ParamError::Conflict {
      first: format!("{key}={a:?}"),
      second: format!("{key}={b:?}"),
    }),
    (Some(a), _) => Ok(Some(a)),
    (None, b) => Ok(b),
  }
}
