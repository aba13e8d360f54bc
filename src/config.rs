use crate::constants::{
    DEFAULT_BUILD_DIR, DEFAULT_DOCKER_PROGRAM, DEFAULT_REGISTRY_URL, DEFAULT_TAG_PAGE_SIZE,
};
use crate::core::{CancelToken, PlanRequest};
use crate::error::ConfigError;
use crate::selector::SelectionPolicy;
use crate::version::VersionFormat;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Validated settings for one invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory whose subdirectories hold the images
    pub root: PathBuf,
    /// Where build contexts are staged
    pub build_dir: PathBuf,
    /// Registry namespace images are tagged and looked up under
    pub namespace: String,
    pub registry_url: String,
    pub page_size: u32,
    pub registry_token: Option<String>,
    pub version_format: VersionFormat,
    pub push: bool,
    pub only: Vec<String>,
    pub policy: SelectionPolicy,
    pub pins: BTreeMap<String, u32>,
    pub timeout: Option<Duration>,
    pub docker_program: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            namespace: String::new(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            page_size: DEFAULT_TAG_PAGE_SIZE,
            registry_token: None,
            version_format: VersionFormat::default(),
            push: true,
            only: Vec::new(),
            policy: SelectionPolicy::WithDependencies,
            pins: BTreeMap::new(),
            timeout: None,
            docker_program: DEFAULT_DOCKER_PROGRAM.to_string(),
        }
    }
}

impl RunConfig {
    /// Parse and record `repo=version` pins.
    pub fn with_pins<I, S>(mut self, pins: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pin in pins {
            let (repo, version) = parse_pin(pin.as_ref(), &self.version_format)?;
            self.pins.insert(repo, version);
        }
        Ok(self)
    }

    /// Reject settings no run can succeed with. Tags are looked up and pushed
    /// under the namespace, so it must not be blank.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::MissingNamespace);
        }
        Ok(self)
    }

    pub fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            only: self.only.clone(),
            policy: self.policy,
            pins: self.pins.clone(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        match self.timeout {
            Some(timeout) => CancelToken::with_timeout(timeout),
            None => CancelToken::new(),
        }
    }
}

/// Parse `repo=version`. The version may be written with the configured
/// prefix (`base=v004`) or as a bare number (`base=4`).
pub fn parse_pin(pin: &str, format: &VersionFormat) -> Result<(String, u32), ConfigError> {
    let bad = || ConfigError::InvalidPin(pin.to_string());
    let (repo, version) = pin.split_once('=').ok_or_else(bad)?;
    let repo = repo.trim();
    let version = version.trim();
    if repo.is_empty() {
        return Err(bad());
    }

    let digits = version.strip_prefix(format.prefix.as_str()).unwrap_or(version);
    let digits = digits.strip_prefix('v').unwrap_or(digits);
    let number = digits.parse::<u32>().map_err(|_| bad())?;
    Ok((repo.to_string(), number))
}
