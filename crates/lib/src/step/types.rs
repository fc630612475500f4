use serde::{Deserialize, Serialize};

use crate::env::EnvVar;
use crate::plan::Stage;
use crate::source::SourceLocator;
use crate::toolchain::Toolchain;

/// How a source step is configured, built and installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
  /// `./configure --prefix=<prefix> <args>`, then `make` and `make install`.
  Configure,
  /// Out-of-tree `cmake -DCMAKE_INSTALL_PREFIX=<prefix> <args>`, then build
  /// and install targets.
  CMake,
  /// Arbitrary commands run inside the unpacked source directory.
  Custom(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
  Comment {
    text: String,
  },
  Packages {
    packages: Vec<String>,
  },
  Source {
    source: SourceLocator,
    /// Directory under the work directory the sources land in.
    directory: String,
    build: BuildSystem,
    args: Vec<String>,
    /// Run in the source directory before configuring (`./autogen.sh`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    preconfigure: Vec<String>,
    /// Run after installation, before the sources are removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    postinstall: Vec<String>,
  },
  Shell {
    commands: Vec<String>,
  },
  /// Only contributes environment.
  Environment,
  /// Files brought over from another stage.
  Copy {
    from: Stage,
    path: String,
  },
  /// Command the image runs by default.
  Runscript {
    commands: Vec<String>,
  },
}

impl StepKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      StepKind::Comment { .. } => "comment",
      StepKind::Packages { .. } => "packages",
      StepKind::Source { .. } => "source",
      StepKind::Shell { .. } => "shell",
      StepKind::Environment => "environment",
      StepKind::Copy { .. } => "copy",
      StepKind::Runscript { .. } => "runscript",
    }
  }
}

/// A unit of work in a build plan.
///
/// String fields may carry placeholders (`$${prefix}`, `$${step:NAME}`,
/// `$${jobs}`); they are resolved when the step is appended, after which the
/// step is never modified again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
  /// Key for dependency lookup. Comments and package lists are usually anonymous.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(flatten)]
  pub kind: StepKind,
  /// Install prefix, unique within a stage.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prefix: Option<String>,
  /// Compilers and flags used to build this step.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub toolchain: Option<Toolchain>,
  /// Compilers this step installs, for later steps to build with.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provides: Option<Toolchain>,
  /// Contributions to the environment of the stage the step is appended to.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub env: Vec<EnvVar>,
  /// Contributions carried into the runtime stage when the step is copied.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub runtime_env: Vec<EnvVar>,
  /// OS packages the runtime stage needs when the step is copied.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub runtime_packages: Vec<String>,
  /// Variables whose current value this step depends on.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub reads: Vec<String>,
}

impl BuildStep {
  fn with_kind(kind: StepKind) -> Self {
    Self {
      name: None,
      kind,
      prefix: None,
      toolchain: None,
      provides: None,
      env: Vec::new(),
      runtime_env: Vec::new(),
      runtime_packages: Vec::new(),
      reads: Vec::new(),
    }
  }

  pub fn comment(text: &str) -> Self {
    Self::with_kind(StepKind::Comment { text: text.to_string() })
  }

  pub fn packages<S: AsRef<str>>(packages: &[S]) -> Self {
    Self::with_kind(StepKind::Packages {
      packages: packages.iter().map(|p| p.as_ref().to_string()).collect(),
    })
  }

  /// Build `source` with the given build system.
  pub fn source(name: &str, source: SourceLocator, build: BuildSystem) -> Self {
    let directory = source.directory();
    Self::with_kind(StepKind::Source {
      source,
      directory,
      build,
      args: Vec::new(),
      preconfigure: Vec::new(),
      postinstall: Vec::new(),
    })
    .named(name)
  }

  pub fn configure(name: &str, source: SourceLocator) -> Self {
    Self::source(name, source, BuildSystem::Configure)
  }

  pub fn cmake(name: &str, source: SourceLocator) -> Self {
    Self::source(name, source, BuildSystem::CMake)
  }

  pub fn custom<S: AsRef<str>>(name: &str, source: SourceLocator, commands: &[S]) -> Self {
    let commands = commands.iter().map(|c| c.as_ref().to_string()).collect();
    Self::source(name, source, BuildSystem::Custom(commands))
  }

  pub fn shell<S: AsRef<str>>(name: &str, commands: &[S]) -> Self {
    Self::with_kind(StepKind::Shell {
      commands: commands.iter().map(|c| c.as_ref().to_string()).collect(),
    })
    .named(name)
  }

  pub fn environment(vars: Vec<EnvVar>) -> Self {
    Self::with_kind(StepKind::Environment).with_env(vars)
  }

  pub fn copy(from: Stage, path: &str) -> Self {
    Self::with_kind(StepKind::Copy {
      from,
      path: path.to_string(),
    })
  }

  pub fn runscript<S: AsRef<str>>(commands: &[S]) -> Self {
    Self::with_kind(StepKind::Runscript {
      commands: commands.iter().map(|c| c.as_ref().to_string()).collect(),
    })
  }

  pub fn named(mut self, name: &str) -> Self {
    self.name = Some(name.to_string());
    self
  }

  pub fn prefix(mut self, prefix: &str) -> Self {
    self.prefix = Some(prefix.to_string());
    self
  }

  /// Override the directory the sources unpack into.
  pub fn directory(mut self, dir: &str) -> Self {
    if let StepKind::Source { directory, .. } = &mut self.kind {
      *directory = dir.to_string();
    }
    self
  }

  /// Append one configure/cmake argument. No effect on other kinds.
  pub fn arg(self, arg: impl Into<String>) -> Self {
    self.args([arg.into()])
  }

  pub fn args<I, S>(mut self, new: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    if let StepKind::Source { args, .. } = &mut self.kind {
      args.extend(new.into_iter().map(Into::into));
    }
    self
  }

  /// Append `arg` when it is `Some`; pairs with [`super::Dependency::flag`].
  pub fn arg_opt(self, arg: Option<String>) -> Self {
    match arg {
      Some(arg) => self.arg(arg),
      None => self,
    }
  }

  pub fn preconfigure<S: AsRef<str>>(mut self, commands: &[S]) -> Self {
    if let StepKind::Source { preconfigure, .. } = &mut self.kind {
      preconfigure.extend(commands.iter().map(|c| c.as_ref().to_string()));
    }
    self
  }

  pub fn postinstall<S: AsRef<str>>(mut self, commands: &[S]) -> Self {
    if let StepKind::Source { postinstall, .. } = &mut self.kind {
      postinstall.extend(commands.iter().map(|c| c.as_ref().to_string()));
    }
    self
  }

  pub fn toolchain(mut self, toolchain: Toolchain) -> Self {
    self.toolchain = Some(toolchain);
    self
  }

  pub fn provides(mut self, toolchain: Toolchain) -> Self {
    self.provides = Some(toolchain);
    self
  }

  pub fn with_env(mut self, vars: Vec<EnvVar>) -> Self {
    self.env.extend(vars);
    self
  }

  pub fn with_runtime_env(mut self, vars: Vec<EnvVar>) -> Self {
    self.runtime_env.extend(vars);
    self
  }

  /// The same contributions in both stages.
  pub fn with_env_both(self, vars: Vec<EnvVar>) -> Self {
    self.with_env(vars.clone()).with_runtime_env(vars)
  }

  pub fn with_runtime_packages<S: AsRef<str>>(mut self, packages: &[S]) -> Self {
    self
      .runtime_packages
      .extend(packages.iter().map(|p| p.as_ref().to_string()));
    self
  }

  pub fn reads(mut self, name: &str) -> Self {
    self.reads.push(name.to_string());
    self
  }

  /// Name if the step has one, otherwise its kind.
  pub fn label(&self) -> &str {
    self.name.as_deref().unwrap_or_else(|| self.kind.as_str())
  }

  /// Configure/cmake arguments, empty for other kinds.
  pub fn build_args(&self) -> &[String] {
    match &self.kind {
      StepKind::Source { args, .. } => args,
      _ => &[],
    }
  }
}
