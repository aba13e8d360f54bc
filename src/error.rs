/// chainbuild error types and handling utilities
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the image definitions or the caller's request. Always
/// raised before the first build starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("repo {0} is defined more than once")]
    DuplicateRepo(String),

    #[error("repo {0} depends on itself")]
    SelfDependency(String),

    #[error("repo {repo} depends on unknown repo {dependency}")]
    UnknownDependency { repo: String, dependency: String },

    #[error("unknown repo(s) selected: {}", .0.join(", "))]
    UnknownSelection(Vec<String>),

    #[error("invalid manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("invalid pin '{0}': expected <repo>=<version>")]
    InvalidPin(String),

    #[error("no registry namespace given; set --namespace or CHAINBUILD_NAMESPACE")]
    MissingNamespace,

    #[error("no published version found for dependency {0}; pin it with --pin {0}=<version>")]
    MissingPublishedVersion(String),
}

/// Which step of an image build failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Render,
    Build,
    Publish,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render => write!(f, "render"),
            Self::Build => write!(f, "build"),
            Self::Publish => write!(f, "publish"),
        }
    }
}

/// Main error type for chainbuild runs
#[derive(Debug, Error)]
pub enum ChainBuildError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tag source failed while resolving the next version of a repo
    #[error("version resolution failed for {repo}: {reason}")]
    Resolution { repo: String, reason: String },

    #[error("{stage} step failed for {repo} ({tag}): {reason}")]
    Build {
        repo: String,
        tag: String,
        stage: BuildStage,
        reason: String,
    },

    /// Images that could never become ready (cycle or unsatisfied dependency)
    #[error("unable to build all images; never became ready: {}", .repos.join(", "))]
    Unreachable { repos: Vec<String> },

    #[error("run cancelled; not built: {}", .unbuilt.join(", "))]
    Cancelled { unbuilt: Vec<String> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = ChainBuildError> = std::result::Result<T, E>;

impl ChainBuildError {
    /// Process exit status for this error. Every kind maps to a distinct
    /// non-zero code so wrapper scripts can tell them apart.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Resolution { .. } => 3,
            Self::Build { .. } => 4,
            Self::Unreachable { .. } => 5,
            Self::Cancelled { .. } => 6,
            Self::Io(_) | Self::Other(_) => 1,
        }
    }

    /// Repo identifiers this error is about, for diagnostics.
    pub fn repos(&self) -> Vec<&str> {
        match self {
            Self::Config(ConfigError::DuplicateRepo(r))
            | Self::Config(ConfigError::SelfDependency(r))
            | Self::Config(ConfigError::MissingPublishedVersion(r)) => vec![r.as_str()],
            Self::Config(ConfigError::UnknownDependency { repo, dependency }) => {
                vec![repo.as_str(), dependency.as_str()]
            }
            Self::Config(ConfigError::UnknownSelection(repos)) => {
                repos.iter().map(String::as_str).collect()
            }
            Self::Resolution { repo, .. } | Self::Build { repo, .. } => vec![repo.as_str()],
            Self::Unreachable { repos } => repos.iter().map(String::as_str).collect(),
            Self::Cancelled { unbuilt } => unbuilt.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}
