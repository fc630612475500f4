//! Implementation of the `hpcstack plan` command.
//!
//! Shows the ordered steps of both stages, what the runtime stage copies and
//! the recipe fingerprint, without rendering anything.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use hpcstack_lib::plan::BuildPlan;
use hpcstack_lib::recipe::RecipeKind;
use hpcstack_lib::step::StepKind;

use super::{SelectArgs, assemble_recipe};
use crate::output::{print_heading, print_json, print_stat, print_success, symbols, truncate_hash};

#[derive(Serialize)]
struct StageSummary<'a> {
  image: &'a str,
  steps: Vec<StepSummary<'a>>,
}

#[derive(Serialize)]
struct StepSummary<'a> {
  index: usize,
  kind: &'static str,
  label: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  prefix: Option<&'a str>,
}

#[derive(Serialize)]
struct PlanSummary<'a> {
  recipe: RecipeKind,
  machine: &'a str,
  fingerprint: String,
  devel: StageSummary<'a>,
  copies: Vec<&'a str>,
  runtime: StageSummary<'a>,
}

fn summarize(plan: &BuildPlan) -> StageSummary<'_> {
  StageSummary {
    image: plan.image(),
    steps: plan
      .iter()
      .map(|planned| StepSummary {
        index: planned.index,
        kind: planned.step.kind.as_str(),
        label: match &planned.step.kind {
          StepKind::Comment { text } => text.as_str(),
          StepKind::Copy { path, .. } => path.as_str(),
          _ => planned.step.label(),
        },
        prefix: planned.step.prefix.as_deref(),
      })
      .collect(),
  }
}

pub fn cmd_plan(kind: RecipeKind, select: &SelectArgs, json: bool) -> Result<()> {
  let args = select.user_args(None)?;
  let recipe = assemble_recipe(kind, &args)?;
  let fingerprint = recipe.fingerprint().context("Failed to compute recipe fingerprint")?;

  let summary = PlanSummary {
    recipe: kind,
    machine: &recipe.origin,
    fingerprint: fingerprint.0,
    devel: summarize(&recipe.devel),
    copies: recipe.runtime.copies(),
    runtime: summarize(&recipe.runtime),
  };

  if json {
    return print_json(&summary);
  }

  print_success(&format!("Recipe {} for {}", kind, summary.machine));
  print_stat("Fingerprint", truncate_hash(&summary.fingerprint));
  print_stat("Devel image", summary.devel.image);
  print_stat("Runtime image", summary.runtime.image);
  print_stat("Build jobs", recipe.devel.jobs());

  for (title, stage) in [("Devel", &summary.devel), ("Runtime", &summary.runtime)] {
    println!();
    print_heading(&format!("{title} stage ({} steps)", stage.steps.len()));
    for step in &stage.steps {
      print_step(step);
    }
  }

  Ok(())
}

fn print_step(step: &StepSummary<'_>) {
  if step.kind == "comment" {
    let comment = format!("# {}", step.label);
    println!("  {:>3} {}", step.index, comment.if_supports_color(Stream::Stdout, |s| s.dimmed()));
    return;
  }
  match step.prefix {
    Some(prefix) => println!(
      "  {:>3} {:<12} {} {} {}",
      step.index,
      step.kind,
      step.label,
      symbols::ARROW,
      prefix
    ),
    None => println!("  {:>3} {:<12} {}", step.index, step.kind, step.label),
  }
}
