//! Where a step's sources come from.
//!
//! A [`SourceLocator`] is either an archive URL or a git repository. When the
//! archive location depends on the version in a non-trivial way, the caller
//! picks a [`UrlResolver`] and passes it to the building block explicitly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scratch directory sources are fetched into and built from.
pub const WORKDIR: &str = "/var/tmp";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitRef {
  Branch(String),
  Commit(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLocator {
  Url(String),
  Git {
    repository: String,
    /// `None` clones the default branch.
    reference: Option<GitRef>,
    recursive: bool,
  },
}

impl SourceLocator {
  pub fn url(url: &str) -> Self {
    SourceLocator::Url(url.to_string())
  }

  pub fn git(repository: &str) -> Self {
    SourceLocator::Git {
      repository: repository.to_string(),
      reference: None,
      recursive: false,
    }
  }

  pub fn git_branch(repository: &str, branch: &str) -> Self {
    SourceLocator::Git {
      repository: repository.to_string(),
      reference: Some(GitRef::Branch(branch.to_string())),
      recursive: false,
    }
  }

  pub fn git_commit(repository: &str, commit: &str) -> Self {
    SourceLocator::Git {
      repository: repository.to_string(),
      reference: Some(GitRef::Commit(commit.to_string())),
      recursive: false,
    }
  }

  /// Clone submodules too. No effect on archives.
  pub fn recursive(self) -> Self {
    match self {
      SourceLocator::Git {
        repository, reference, ..
      } => SourceLocator::Git {
        repository,
        reference,
        recursive: true,
      },
      url => url,
    }
  }

  /// Directory the sources unpack into, relative to [`WORKDIR`].
  pub fn directory(&self) -> String {
    match self {
      SourceLocator::Url(url) => archive_stem(file_name(url)).to_string(),
      SourceLocator::Git { repository, .. } => {
        let name = file_name(repository.trim_end_matches('/'));
        name.strip_suffix(".git").unwrap_or(name).to_string()
      }
    }
  }

  /// Shell commands that leave the sources in `WORKDIR/<directory>`.
  pub fn fetch_commands(&self, directory: &str) -> Vec<String> {
    match self {
      SourceLocator::Url(url) => {
        let file = file_name(url);
        let mut tar = format!("tar -x -f {WORKDIR}/{file} -C {WORKDIR}");
        if let Some(flag) = compression_flag(file) {
          tar.push(' ');
          tar.push_str(flag);
        }
        vec![
          format!("mkdir -p {WORKDIR} && wget -q -nc --no-check-certificate -P {WORKDIR} {url}"),
          tar,
        ]
      }
      SourceLocator::Git {
        repository,
        reference,
        recursive,
      } => {
        let recursive = if *recursive { " --recursive" } else { "" };
        let clone = match reference {
          Some(GitRef::Branch(branch)) => format!(
            "mkdir -p {WORKDIR} && cd {WORKDIR} && git clone --depth=1 --branch {branch}{recursive} {repository} {directory} && cd -"
          ),
          Some(GitRef::Commit(commit)) => format!(
            "mkdir -p {WORKDIR} && cd {WORKDIR} && git clone{recursive} {repository} {directory} && cd - && cd {WORKDIR}/{directory} && git checkout {commit} && cd -"
          ),
          None => format!(
            "mkdir -p {WORKDIR} && cd {WORKDIR} && git clone --depth=1{recursive} {repository} {directory} && cd -"
          ),
        };
        vec![clone]
      }
    }
  }

  /// Shell command removing everything `fetch_commands` left behind.
  pub fn cleanup_command(&self, directory: &str) -> String {
    match self {
      SourceLocator::Url(url) => format!("rm -rf {WORKDIR}/{directory} {WORKDIR}/{}", file_name(url)),
      SourceLocator::Git { .. } => format!("rm -rf {WORKDIR}/{directory}"),
    }
  }
}

fn file_name(url: &str) -> &str {
  url.rsplit('/').next().unwrap_or(url)
}

fn archive_stem(file: &str) -> &str {
  [".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".zip"]
    .iter()
    .find_map(|ext| file.strip_suffix(ext))
    .unwrap_or(file)
}

fn compression_flag(file: &str) -> Option<&'static str> {
  if file.ends_with(".tar.gz") || file.ends_with(".tgz") {
    Some("-z")
  } else if file.ends_with(".tar.bz2") {
    Some("-j")
  } else if file.ends_with(".tar.xz") {
    Some("-J")
  } else {
    None
  }
}

/// Archive location computed for one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
  pub url: String,
  /// Directory the archive unpacks into.
  pub directory: String,
}

impl ResolvedSource {
  pub fn locator(&self) -> SourceLocator {
    SourceLocator::Url(self.url.clone())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
  #[error("invalid version '{version}': {reason}")]
  InvalidVersion { version: String, reason: String },
}

/// Computes the archive location of a package for a given version.
pub trait UrlResolver {
  fn resolve(&self, version: &str) -> Result<ResolvedSource, SourceError>;
}

/// Substitutes `{version}` and `{version_}` (dots replaced by underscores).
///
/// ```
/// use hpcstack_lib::source::{TemplateUrl, UrlResolver};
///
/// let boost = TemplateUrl::new(
///   "https://archives.boost.io/release/{version}/source/boost_{version_}.tar.bz2",
/// );
/// let resolved = boost.resolve("1.86.0").unwrap();
/// assert_eq!(resolved.directory, "boost_1_86_0");
/// ```
#[derive(Debug, Clone)]
pub struct TemplateUrl {
  pub template: String,
}

impl TemplateUrl {
  pub fn new(template: &str) -> Self {
    Self {
      template: template.to_string(),
    }
  }
}

impl UrlResolver for TemplateUrl {
  fn resolve(&self, version: &str) -> Result<ResolvedSource, SourceError> {
    if version.trim().is_empty() || version.contains(char::is_whitespace) || version.contains('/') {
      return Err(SourceError::InvalidVersion {
        version: version.to_string(),
        reason: "must be a non-empty token without whitespace or '/'".to_string(),
      });
    }
    let url = self
      .template
      .replace("{version_}", &version.replace('.', "_"))
      .replace("{version}", version);
    let directory = archive_stem(file_name(&url)).to_string();
    Ok(ResolvedSource { url, directory })
  }
}

/// HDF Group release layout:
/// `<base>/vMAJOR_MINOR/vMAJOR_MINOR_PATCH/downloads/hdf5-MAJOR.MINOR.PATCH.tar.gz`.
#[derive(Debug, Clone)]
pub struct Hdf5Release {
  pub baseurl: String,
}

impl Default for Hdf5Release {
  fn default() -> Self {
    Self {
      baseurl: "https://support.hdfgroup.org/releases/hdf5".to_string(),
    }
  }
}

impl UrlResolver for Hdf5Release {
  fn resolve(&self, version: &str) -> Result<ResolvedSource, SourceError> {
    let parts = numeric_parts(version)?;
    if parts.len() < 2 {
      return Err(SourceError::InvalidVersion {
        version: version.to_string(),
        reason: "expected at least MAJOR.MINOR".to_string(),
      });
    }
    let major_minor = format!("v{}_{}", parts[0], parts[1]);
    let full = format!("v{}", version.replace('.', "_"));
    let directory = format!("hdf5-{version}");
    Ok(ResolvedSource {
      url: format!("{}/{major_minor}/{full}/downloads/{directory}.tar.gz", self.baseurl),
      directory,
    })
  }
}

/// Unidata layout: `downloads.unidata.ucar.edu/netcdf-c/<v>/netcdf-c-<v>.tar.gz`.
#[derive(Debug, Clone, Default)]
pub struct NetcdfRelease;

impl UrlResolver for NetcdfRelease {
  fn resolve(&self, version: &str) -> Result<ResolvedSource, SourceError> {
    numeric_parts(version)?;
    let directory = format!("netcdf-c-{version}");
    Ok(ResolvedSource {
      url: format!("https://downloads.unidata.ucar.edu/netcdf-c/{version}/{directory}.tar.gz"),
      directory,
    })
  }
}

/// Split a dotted numeric version, rejecting anything else.
fn numeric_parts(version: &str) -> Result<Vec<u32>, SourceError> {
  let invalid = |reason: &str| SourceError::InvalidVersion {
    version: version.to_string(),
    reason: reason.to_string(),
  };
  if version.is_empty() {
    return Err(invalid("empty version"));
  }
  version
    .split('.')
    .map(|part| part.parse::<u32>().map_err(|_| invalid("expected dot-separated numbers")))
    .collect()
}
