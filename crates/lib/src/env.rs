//! Environment contributions and the append-only environment overlay.
//!
//! Each step may declare variables it contributes. A contribution that
//! mentions its own variable (`$${prefix}/bin:$PATH`) composes onto whatever
//! came before it; one that does not replaces the previous value. The overlay
//! records assignments in append order and never rewrites an earlier one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A variable contributed by a step.
///
/// Before a step is appended `value` is a template (see
/// [`crate::placeholder`]); afterwards it is the resolved value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvVar {
  pub name: String,
  pub value: String,
}

impl EnvVar {
  pub fn new(name: &str, value: &str) -> Self {
    Self {
      name: name.to_string(),
      value: value.to_string(),
    }
  }

  /// `<prefix>/<subdir>:$NAME` (or `<prefix>:$NAME` for an empty subdir).
  pub fn prepend(name: &str, subdir: &str) -> Self {
    let path = if subdir.is_empty() {
      "$${prefix}".to_string()
    } else {
      format!("$${{prefix}}/{subdir}")
    };
    Self {
      name: name.to_string(),
      value: format!("{path}:${name}"),
    }
  }

  /// Whether the value refers to the variable's own previous value.
  pub fn composes(&self) -> bool {
    references(&self.value, &self.name)
  }
}

/// Builder for the usual install-prefix variables.
///
/// ```
/// use hpcstack_lib::env::PrefixEnv;
///
/// let vars = PrefixEnv::new().bin().include().lib().cmake("lib/cmake").build();
/// assert_eq!(vars[0].value, "$${prefix}/bin:$PATH");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PrefixEnv {
  vars: Vec<EnvVar>,
}

impl PrefixEnv {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn bin(self) -> Self {
    self.with(EnvVar::prepend("PATH", "bin"))
  }

  pub fn include(self) -> Self {
    self.with(EnvVar::prepend("CPATH", "include"))
  }

  /// `LIBRARY_PATH` and `LD_LIBRARY_PATH` under `<prefix>/lib`.
  pub fn lib(self) -> Self {
    self
      .with(EnvVar::prepend("LIBRARY_PATH", "lib"))
      .with(EnvVar::prepend("LD_LIBRARY_PATH", "lib"))
  }

  pub fn pkgconfig(self, subdir: &str) -> Self {
    self.with(EnvVar::prepend("PKG_CONFIG_PATH", subdir))
  }

  pub fn cmake(self, subdir: &str) -> Self {
    self.with(EnvVar::prepend("CMAKE_PREFIX_PATH", subdir))
  }

  pub fn with(mut self, var: EnvVar) -> Self {
    self.vars.push(var);
    self
  }

  pub fn build(self) -> Vec<EnvVar> {
    self.vars
  }
}

/// One assignment recorded in the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  pub name: String,
  pub value: String,
  /// Step that made the assignment.
  pub step: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
  /// A later step tried to replace a variable an earlier step already read.
  #[error("step '{step}' overwrites {name}, which step '{read_by}' already depends on")]
  Overwrite { name: String, step: String, read_by: String },

  #[error("step '{step}' reads {name}, which no earlier step sets")]
  Unset { name: String, step: String },
}

/// Ordered, append-only record of environment assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOverlay {
  assignments: Vec<Assignment>,
  /// Variables read by steps, with the first reader.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  consumed: BTreeMap<String, String>,
}

impl EnvOverlay {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append `var` on behalf of `step`.
  ///
  /// Returns `Ok(false)` when the assignment adds nothing: an identical
  /// replacement, or a composition whose segments are all already present.
  pub fn apply(&mut self, step: &str, var: &EnvVar) -> Result<bool, EnvError> {
    if var.composes() {
      let existing = self.contributions(&var.name);
      let added = segments(&var.value, &var.name);
      if !added.is_empty() && added.iter().all(|s| existing.contains(s)) {
        return Ok(false);
      }
    } else if let Some(current) = self.value(&var.name) {
      if current == var.value {
        return Ok(false);
      }
      if let Some(reader) = self.consumed.get(&var.name) {
        return Err(EnvError::Overwrite {
          name: var.name.clone(),
          step: step.to_string(),
          read_by: reader.clone(),
        });
      }
    }

    self.assignments.push(Assignment {
      name: var.name.clone(),
      value: var.value.clone(),
      step: step.to_string(),
    });
    Ok(true)
  }

  /// Record that `step` depends on the current value of `name`.
  pub fn consume(&mut self, step: &str, name: &str) -> Result<String, EnvError> {
    let value = self.value(name).ok_or_else(|| EnvError::Unset {
      name: name.to_string(),
      step: step.to_string(),
    })?;
    self
      .consumed
      .entry(name.to_string())
      .or_insert_with(|| step.to_string());
    Ok(value)
  }

  /// The effective value of `name` after all assignments.
  ///
  /// Compositions nest, so after three `$${prefix}/bin:$PATH` steps the value
  /// is `/c/bin:/b/bin:/a/bin:$PATH`; the trailing `$PATH` is whatever the
  /// base image provides.
  pub fn value(&self, name: &str) -> Option<String> {
    let mut current: Option<String> = None;
    for assignment in self.assignments.iter().filter(|a| a.name == name) {
      current = Some(match (&current, references(&assignment.value, name)) {
        (Some(prev), true) => replace_reference(&assignment.value, name, prev),
        _ => assignment.value.clone(),
      });
    }
    current
  }

  /// Segments contributed to `name`, in append order, each once.
  ///
  /// A replacing assignment discards the segments before it.
  pub fn contributions(&self, name: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for assignment in self.assignments.iter().filter(|a| a.name == name) {
      if !references(&assignment.value, name) {
        out.clear();
      }
      for segment in segments(&assignment.value, name) {
        if !out.contains(&segment) {
          out.push(segment);
        }
      }
    }
    out
  }

  pub fn contains(&self, name: &str) -> bool {
    self.assignments.iter().any(|a| a.name == name)
  }

  pub fn assignments(&self) -> &[Assignment] {
    &self.assignments
  }

  /// Variable names in first-assignment order.
  pub fn names(&self) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    self
      .assignments
      .iter()
      .filter(|a| seen.insert(a.name.as_str()))
      .map(|a| a.name.as_str())
      .collect()
  }

  pub fn is_empty(&self) -> bool {
    self.assignments.is_empty()
  }

  pub fn len(&self) -> usize {
    self.assignments.len()
  }
}

/// Whether `value` mentions `$name` or `${name}`.
fn references(value: &str, name: &str) -> bool {
  find_reference(value, name).is_some()
}

/// Byte range of the first `$name` / `${name}` in `value`.
fn find_reference(value: &str, name: &str) -> Option<(usize, usize)> {
  let braced = format!("${{{name}}}");
  if let Some(start) = value.find(&braced) {
    return Some((start, start + braced.len()));
  }

  let bare = format!("${name}");
  let mut offset = 0;
  while let Some(found) = value[offset..].find(&bare) {
    let start = offset + found;
    let end = start + bare.len();
    let boundary = value[end..]
      .chars()
      .next()
      .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
    if boundary {
      return Some((start, end));
    }
    offset = end;
  }
  None
}

fn replace_reference(value: &str, name: &str, previous: &str) -> String {
  match find_reference(value, name) {
    Some((start, end)) => format!("{}{}{}", &value[..start], previous, &value[end..]),
    None => value.to_string(),
  }
}

/// The `:`-separated parts of `value` other than the self reference.
fn segments(value: &str, name: &str) -> Vec<String> {
  value
    .split(':')
    .filter(|s| !s.is_empty() && !references(s, name))
    .map(str::to_string)
    .collect()
}
