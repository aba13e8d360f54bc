//! Discovery of image definitions on disk.
//!
//! Every directory directly under the image root that contains a
//! `Dockerfile.template` is one image; the directory name is its repo. The
//! template's placeholders name the images it depends on. An optional
//! `container.yml` next to the template can declare a fixed version and
//! extra dependencies:
//!
//! ```yaml
//! version: 4
//! dependencies:
//!   - base
//! ```

use crate::catalog::{ImageCatalog, ImageDefinition};
use crate::constants::{MANIFEST_FILE, TEMPLATE_FILE};
use crate::docker::template;
use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageManifest {
    /// Version to build instead of incrementing the newest published tag
    #[serde(default)]
    pub version: Option<u32>,
    /// Dependencies in addition to those referenced by the template
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ImageManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| invalid(path, e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| invalid(path, e.to_string()))
    }
}

fn invalid(path: &Path, reason: String) -> crate::error::ChainBuildError {
    ConfigError::InvalidManifest {
        path: path.to_path_buf(),
        reason,
    }
    .into()
}

/// Load one image from its directory.
pub fn load_definition(dir: &Path) -> Result<ImageDefinition> {
    let template_path = dir.join(TEMPLATE_FILE);
    let repo = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid(dir, "directory name is not a valid repo".to_string()))?;

    let content = fs::read_to_string(&template_path).map_err(|e| invalid(&template_path, e.to_string()))?;
    let mut dependencies = template::variables(&content);

    let manifest_path = dir.join(MANIFEST_FILE);
    let mut definition = ImageDefinition::new(repo, dir);
    if manifest_path.is_file() {
        let manifest = ImageManifest::from_file(&manifest_path)?;
        dependencies.extend(manifest.dependencies);
        if let Some(version) = manifest.version {
            definition = definition.with_version(version);
        }
    }

    tracing::info!(
        repo,
        version = ?definition.version.resolved(),
        deps = ?dependencies,
        "Found image"
    );
    Ok(definition.with_dependencies(dependencies))
}

/// Every image definition under `root`, sorted by repo.
pub fn load_definitions(root: &Path) -> Result<Vec<ImageDefinition>> {
    tracing::info!(root = %root.display(), "Looking for images to build");
    let pattern = root.join("*").join(TEMPLATE_FILE);
    let pattern = pattern.to_string_lossy();

    let mut dirs = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| invalid(root, e.to_string()))? {
        let path = entry.map_err(|e| invalid(root, e.to_string()))?;
        if let Some(dir) = path.parent() {
            dirs.push(dir.to_path_buf());
        }
    }
    dirs.sort();

    dirs.iter().map(|dir| load_definition(dir)).collect()
}

/// Load and validate the catalog under `root`.
pub fn load_catalog(root: &Path) -> Result<ImageCatalog> {
    ImageCatalog::from_definitions(load_definitions(root)?)
}
