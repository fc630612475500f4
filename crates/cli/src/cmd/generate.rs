//! Implementation of the `hpcstack generate` command.
//!
//! Assembles a recipe for the selected machine and renders it as a
//! Dockerfile, a Singularity definition or JSON, to stdout or a file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use hpcstack_lib::recipe::RecipeKind;
use hpcstack_lib::render::{Format, render};
use hpcstack_lib::util::hash::hash_bytes;

use super::{SelectArgs, assemble_recipe};
use crate::output::{print_info, symbols, truncate_hash};

pub fn cmd_generate(kind: RecipeKind, select: &SelectArgs, format: Option<Format>, output: Option<&Path>) -> Result<()> {
  let args = select.user_args(format)?;
  let format = args.format.unwrap_or_default();

  let recipe = assemble_recipe(kind, &args)?;
  let text = render(&recipe, format).with_context(|| format!("Failed to render {kind} as {format}"))?;

  match output {
    Some(path) => {
      fs::write(path, &text).with_context(|| format!("Failed to write recipe: {}", path.display()))?;
      let fingerprint = recipe.fingerprint().context("Failed to compute recipe fingerprint")?;
      print_info(&format!(
        "{kind} ({format}) for {} {} {} [{}]",
        recipe.origin,
        symbols::ARROW,
        path.display(),
        truncate_hash(&fingerprint.0)
      ));
      print_info(&format!("sha256 {}", hash_bytes(text.as_bytes())));
    }
    None => print!("{text}"),
  }

  Ok(())
}
