use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Version of an image as known when the catalog is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageVersion {
    /// Next version is computed from the registry (highest tag + 1)
    Pending,
    /// Version declared in the manifest or already assigned by the resolver
    Resolved(u32),
}

impl ImageVersion {
    pub fn resolved(&self) -> Option<u32> {
        match self {
            Self::Pending => None,
            Self::Resolved(v) => Some(*v),
        }
    }
}

/// One buildable image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDefinition {
    pub repo: String,
    pub version: ImageVersion,
    pub dependencies: Vec<String>,
    /// Directory holding the template and the optional build context
    pub source: PathBuf,
}

impl ImageDefinition {
    pub fn new(repo: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            version: ImageVersion::Pending,
            dependencies: Vec::new(),
            source: source.into(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = ImageVersion::Resolved(version);
        self
    }

    /// Location of the build-instruction template.
    pub fn template_path(&self) -> PathBuf {
        self.source.join(crate::constants::TEMPLATE_FILE)
    }

    pub fn depends_on(&self, repo: &str) -> bool {
        self.dependencies.iter().any(|d| d == repo)
    }

    /// Drop repeated dependency names, keeping the first occurrence.
    fn dedup_dependencies(&mut self) {
        let mut seen = HashSet::new();
        self.dependencies.retain(|d| seen.insert(d.clone()));
    }
}

/// All known image definitions keyed by repo.
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    images: BTreeMap<String, ImageDefinition>,
}

impl ImageCatalog {
    /// Build and validate a catalog.
    ///
    /// Rejects duplicate repos, self-dependencies and dependencies on repos
    /// that are not part of the catalog. Cycles between different images are
    /// left for the scheduler to report.
    pub fn from_definitions<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = ImageDefinition>,
    {
        let mut images = BTreeMap::new();
        for mut def in definitions {
            def.dedup_dependencies();
            if def.depends_on(&def.repo) {
                return Err(ConfigError::SelfDependency(def.repo).into());
            }
            if images.contains_key(&def.repo) {
                return Err(ConfigError::DuplicateRepo(def.repo).into());
            }
            images.insert(def.repo.clone(), def);
        }

        for def in images.values() {
            if let Some(missing) = def.dependencies.iter().find(|d| !images.contains_key(*d)) {
                return Err(ConfigError::UnknownDependency {
                    repo: def.repo.clone(),
                    dependency: missing.clone(),
                }
                .into());
            }
        }

        Ok(Self { images })
    }

    pub fn get(&self, repo: &str) -> Option<&ImageDefinition> {
        self.images.get(repo)
    }

    pub fn contains(&self, repo: &str) -> bool {
        self.images.contains_key(repo)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Repo identifiers in lexical order.
    pub fn repos(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageDefinition> {
        self.images.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainBuildError;

    fn image(repo: &str, deps: &[&str]) -> ImageDefinition {
        ImageDefinition::new(repo, format!("images/{}", repo)).with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_catalog_indexes_by_repo() {
        let catalog = ImageCatalog::from_definitions(vec![
            image("worker", &["base"]),
            image("base", &[]),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.repos().collect::<Vec<_>>(), vec!["base", "worker"]);
        assert_eq!(catalog.get("worker").unwrap().dependencies, vec!["base"]);
    }

    #[test]
    fn test_duplicate_dependencies_are_collapsed() {
        let catalog = ImageCatalog::from_definitions(vec![
            image("base", &[]),
            image("tools", &[]),
            image("app", &["base", "tools", "base"]),
        ])
        .unwrap();

        assert_eq!(catalog.get("app").unwrap().dependencies, vec!["base", "tools"]);
    }

    #[test]
    fn test_self_dependency_is_rejected() {
        let err = ImageCatalog::from_definitions(vec![image("loop", &["loop"])]).unwrap_err();
        assert!(matches!(
            err,
            ChainBuildError::Config(ConfigError::SelfDependency(ref r)) if r == "loop"
        ));
    }

    #[test]
    fn test_duplicate_repo_is_rejected() {
        let err = ImageCatalog::from_definitions(vec![image("base", &[]), image("base", &[])])
            .unwrap_err();
        assert!(matches!(err, ChainBuildError::Config(ConfigError::DuplicateRepo(_))));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let err = ImageCatalog::from_definitions(vec![image("a", &["missing"])]).unwrap_err();
        match err {
            ChainBuildError::Config(ConfigError::UnknownDependency { repo, dependency }) => {
                assert_eq!(repo, "a");
                assert_eq!(dependency, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycles_are_accepted_at_load() {
        let catalog =
            ImageCatalog::from_definitions(vec![image("a", &["b"]), image("b", &["a"])]);
        assert!(catalog.is_ok());
    }

    #[test]
    fn test_template_path() {
        let def = image("base", &[]);
        assert_eq!(
            def.template_path(),
            PathBuf::from("images/base/Dockerfile.template")
        );
    }
}
