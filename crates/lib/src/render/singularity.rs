use std::fmt::Write as _;

use crate::plan::BuildPlan;
use crate::recipe::Recipe;
use crate::step::StepKind;

use super::{EnvReplay, RenderError, labels, quote};

const INDENT: &str = "    ";

pub(super) fn render(recipe: &Recipe) -> Result<String, RenderError> {
  let mut out = format!(
    "# {} for {}, generated by hpcstack\n# Multi-stage definitions need Singularity 3.2 or later.\n\n",
    recipe.kind, recipe.origin
  );

  stage(&mut out, &recipe.devel)?;
  out.push('\n');
  stage(&mut out, &recipe.runtime)?;

  out.push_str("%labels\n");
  for (key, value) in labels(recipe)? {
    let _ = writeln!(out, "{INDENT}{key} {value}");
  }

  Ok(out)
}

fn stage(out: &mut String, plan: &BuildPlan) -> Result<(), RenderError> {
  let _ = writeln!(out, "Bootstrap: docker\nFrom: {}\nStage: {}\n", plan.image(), plan.stage());
  // Docker images keep their ENV in a file Singularity does not source during %post
  let _ = writeln!(out, "%post\n{INDENT}. /.singularity.d/env/10-docker*.sh\n");

  let mut env = EnvReplay::default();
  for planned in plan.iter() {
    let step = &planned.step;
    match &step.kind {
      StepKind::Comment { text } => {
        let _ = writeln!(out, "# {text}");
      }
      StepKind::Copy { from, path } => {
        let _ = writeln!(out, "%files from {from}\n{INDENT}{path} {path}\n");
      }
      StepKind::Runscript { commands } => {
        let _ = writeln!(out, "%runscript\n{INDENT}exec {} \"$@\"\n", commands.join(" "));
      }
      _ => {
        if !planned.commands.is_empty() {
          out.push_str("%post\n");
          let _ = writeln!(out, "{INDENT}cd /");
          for command in &planned.commands {
            let _ = writeln!(out, "{INDENT}{command}");
          }
          out.push('\n');
        }
      }
    }

    let vars = env.effective(step)?;
    if !vars.is_empty() {
      let exports = vars
        .iter()
        .map(|var| format!("{INDENT}export {}={}\n", var.name, quote(&var.value)))
        .collect::<String>();
      // %environment applies when the container runs, %post to later build steps
      let _ = writeln!(out, "%environment\n{exports}%post\n{exports}");
    }
  }
  Ok(())
}
