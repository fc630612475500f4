use std::fmt::Write as _;

use crate::env::EnvVar;
use crate::plan::{BuildPlan, Stage};
use crate::recipe::Recipe;
use crate::step::StepKind;

use super::{EnvReplay, RenderError, labels, platform, quote};

const CONTINUATION: &str = " && \\\n    ";

pub(super) fn render(recipe: &Recipe) -> Result<String, RenderError> {
  let platform = platform(recipe)?;
  let mut out = format!(
    "# {} for {}, generated by hpcstack\n\n",
    recipe.kind, recipe.origin
  );

  stage(&mut out, &recipe.devel, platform)?;
  out.push('\n');
  stage(&mut out, &recipe.runtime, platform)?;

  let labels = labels(recipe)?
    .into_iter()
    .map(|(key, value)| format!("{key}={}", quote(&value)))
    .collect::<Vec<_>>();
  let _ = writeln!(out, "LABEL {}", labels.join(" \\\n      "));

  Ok(out)
}

fn stage(out: &mut String, plan: &BuildPlan, platform: &str) -> Result<(), RenderError> {
  let _ = write!(out, "FROM --platform={platform} {}", plan.image());
  if plan.stage() == Stage::Devel {
    let _ = write!(out, " AS {}", Stage::Devel);
  }
  out.push_str("\n\n");

  let mut env = EnvReplay::default();
  for planned in plan.iter() {
    let step = &planned.step;
    match &step.kind {
      StepKind::Comment { text } => {
        let _ = writeln!(out, "# {text}");
      }
      StepKind::Copy { from, path } => {
        let _ = writeln!(out, "COPY --from={from} {path} {path}");
      }
      StepKind::Runscript { commands } => {
        // exec form, so signals reach the command
        let _ = writeln!(
          out,
          "ENTRYPOINT {}",
          serde_json::to_string(commands).unwrap_or_else(|_| "[]".to_string())
        );
      }
      _ => {
        if !planned.commands.is_empty() {
          let _ = writeln!(out, "RUN {}", planned.commands.join(CONTINUATION));
        }
      }
    }

    let vars = env.effective(step)?;
    if !vars.is_empty() {
      let _ = writeln!(out, "ENV {}", env_lines(&vars));
    }
    if !matches!(step.kind, StepKind::Comment { .. }) {
      out.push('\n');
    }
  }
  Ok(())
}

fn env_lines(vars: &[&EnvVar]) -> String {
  vars
    .iter()
    .map(|var| format!("{}={}", var.name, quote(&var.value)))
    .collect::<Vec<_>>()
    .join(" \\\n    ")
}
