//! Shell commands a step stands for.
//!
//! Commands are produced as templates: the install prefix appears as
//! `$${prefix}` and the parallelism hint as `$${jobs}`, both filled in when
//! the step is appended to a plan.

use crate::platform::PackageManager;
use crate::source::WORKDIR;

use super::types::{BuildStep, BuildSystem, StepKind};

impl BuildStep {
  /// Template commands for this step, in execution order.
  ///
  /// Comments, environment, copies and runscripts have no commands; the
  /// renderers emit them as their own instructions.
  pub fn commands(&self, packages: PackageManager) -> Vec<String> {
    match &self.kind {
      StepKind::Packages { packages: list } if !list.is_empty() => vec![packages.install_command(list)],
      StepKind::Shell { commands } => commands.clone(),
      StepKind::Source {
        source,
        directory,
        build,
        args,
        preconfigure,
        postinstall,
      } => {
        let src = format!("{WORKDIR}/{directory}");
        let mut out = source.fetch_commands(directory);
        out.push(format!("cd {src}"));
        out.extend(preconfigure.iter().cloned());
        match build {
          BuildSystem::Configure => {
            out.push(join_words([
              self.toolchain_prefix(),
              "./configure".to_string(),
              self.prefix_option("--prefix="),
              args.join(" "),
            ]));
            out.push("make -j$${jobs}".to_string());
            out.push("make -j$${jobs} install".to_string());
          }
          BuildSystem::CMake => {
            out.push(format!("mkdir -p {src}/build && cd {src}/build"));
            out.push(join_words([
              self.toolchain_prefix(),
              "cmake".to_string(),
              self.prefix_option("-DCMAKE_INSTALL_PREFIX="),
              args.join(" "),
              src.clone(),
            ]));
            out.push(format!("cmake --build {src}/build --target all -- -j$${{jobs}}"));
            out.push(format!("cmake --build {src}/build --target install -- -j$${{jobs}}"));
          }
          BuildSystem::Custom(commands) => out.extend(commands.iter().cloned()),
        }
        out.extend(postinstall.iter().cloned());
        out.push(source.cleanup_command(directory));
        out
      }
      _ => Vec::new(),
    }
  }

  fn toolchain_prefix(&self) -> String {
    self.toolchain.as_ref().map(|t| t.env_prefix()).unwrap_or_default()
  }

  fn prefix_option(&self, option: &str) -> String {
    match self.prefix {
      Some(_) => format!("{option}$${{prefix}}"),
      None => String::new(),
    }
  }
}

/// Join the non-empty words with single spaces.
fn join_words<const N: usize>(words: [String; N]) -> String {
  words
    .into_iter()
    .filter(|w| !w.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}
