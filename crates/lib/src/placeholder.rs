//! Placeholder parsing and substitution for step templates.
//!
//! Build arguments and environment values are written as templates and
//! resolved when the step is appended to a plan, because a step's own prefix
//! and the prefixes of earlier steps are known at that point.
//!
//! # Placeholder Formats
//!
//! - `$${prefix}` - install prefix of the step being appended
//! - `$${step:NAME}` - install prefix of an earlier step named `NAME`
//! - `$${jobs}` - the parallelism hint (`$(nproc)` when none was given)
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so `$PATH` in
//! `$${prefix}/bin:$PATH` stays a shell variable for the image builder.
//!
//! # Escaping
//!
//! `$$${` produces a literal `$${`.
//!
//! # Example
//!
//! ```
//! use hpcstack_lib::placeholder::{parse, Placeholder, Segment};
//!
//! let segments = parse("$${prefix}/bin:$PATH").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Placeholder(Placeholder::Prefix),
//!     Segment::Literal("/bin:$PATH".to_string()),
//! ]);
//! ```

use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `$${prefix}`
  Prefix,
  /// `$${step:NAME}`
  Step(String),
  /// `$${jobs}`
  Jobs,
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  /// `$${prefix}` used by a step that installs nowhere.
  #[error("step '{0}' has no install prefix")]
  NoPrefix(String),

  /// `$${step:NAME}` where no earlier step is called `NAME`.
  #[error("unresolved dependency: no earlier step named '{0}'")]
  UnresolvedStep(String),
}

/// Supplies values for placeholders while a step is appended.
pub trait Resolver {
  /// Prefix of the step being resolved.
  fn resolve_prefix(&self) -> Result<&str, PlaceholderError>;

  /// Prefix of an earlier step.
  fn resolve_step(&self, name: &str) -> Result<&str, PlaceholderError>;

  /// The parallelism hint as it should appear in a shell command.
  fn resolve_jobs(&self) -> &str;
}

/// Parse a template into literal and placeholder segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or of an unknown type.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' || !next_is(&mut chars, '$') {
      literal.push(ch);
      continue;
    }
    // "$$" consumed
    if next_is(&mut chars, '$') {
      if next_is(&mut chars, '{') {
        literal.push_str("$${");
      } else {
        literal.push_str("$$$");
      }
    } else if next_is(&mut chars, '{') {
      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      let content = read_until_close(&mut chars).ok_or(PlaceholderError::Unclosed(pos))?;
      segments.push(Segment::Placeholder(parse_content(&content)?));
    } else {
      literal.push_str("$$");
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Consume the next character if it is `expected`.
fn next_is(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
  chars.next_if(|(_, c)| *c == expected).is_some()
}

fn read_until_close(chars: &mut Peekable<CharIndices<'_>>) -> Option<String> {
  let mut content = String::new();
  for (_, c) in chars.by_ref() {
    if c == '}' {
      return Some(content);
    }
    content.push(c);
  }
  None
}

fn parse_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  match content {
    "prefix" => return Ok(Placeholder::Prefix),
    "jobs" => return Ok(Placeholder::Jobs),
    _ => {}
  }

  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::UnknownType(content.to_string()))?;

  match kind {
    "step" if rest.is_empty() => Err(PlaceholderError::Malformed(format!(
      "step placeholder missing name: '{content}'"
    ))),
    "step" => Ok(Placeholder::Step(rest.to_string())),
    _ => Err(PlaceholderError::UnknownType(kind.to_string())),
  }
}

/// Parse and substitute in one step.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(Placeholder::Prefix) => result.push_str(resolver.resolve_prefix()?),
      Segment::Placeholder(Placeholder::Step(name)) => result.push_str(resolver.resolve_step(name)?),
      Segment::Placeholder(Placeholder::Jobs) => result.push_str(resolver.resolve_jobs()),
    }
  }

  Ok(result)
}
