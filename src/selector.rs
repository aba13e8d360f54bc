use crate::catalog::{ImageCatalog, ImageDefinition};
use crate::error::{ConfigError, Result};
use std::collections::BTreeSet;

/// What to do with the dependencies of explicitly selected images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Build the selection plus everything it transitively depends on
    #[default]
    WithDependencies,
    /// Build only the selection; dependencies are assumed to be published
    WithoutDependencies,
}

/// The images a run will build.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Images to build, each with its full declared dependency list
    pub images: Vec<ImageDefinition>,
    /// Dependencies outside `images` that must already be published
    pub external: BTreeSet<String>,
}

impl Selection {
    pub fn repos(&self) -> Vec<&str> {
        self.images.iter().map(|i| i.repo.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Narrow `catalog` to the images the caller asked for.
///
/// An empty `wanted` list selects the whole catalog. Every unknown repo in
/// `wanted` is reported at once.
pub fn select(catalog: &ImageCatalog, wanted: &[String], policy: SelectionPolicy) -> Result<Selection> {
    if wanted.is_empty() {
        return Ok(Selection {
            images: catalog.iter().cloned().collect(),
            external: BTreeSet::new(),
        });
    }

    let unknown: BTreeSet<&String> = wanted.iter().filter(|r| !catalog.contains(r)).collect();
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownSelection(unknown.into_iter().cloned().collect()).into());
    }

    let roots: BTreeSet<String> = wanted.iter().cloned().collect();
    match policy {
        SelectionPolicy::WithDependencies => {
            let closure = dependency_closure(catalog, &roots);
            Ok(Selection {
                images: closure
                    .iter()
                    .filter_map(|repo| catalog.get(repo).cloned())
                    .collect(),
                external: BTreeSet::new(),
            })
        }
        SelectionPolicy::WithoutDependencies => {
            let images: Vec<ImageDefinition> = roots
                .iter()
                .filter_map(|repo| catalog.get(repo).cloned())
                .collect();
            let external = images
                .iter()
                .flat_map(|i| i.dependencies.iter())
                .filter(|d| !roots.contains(*d))
                .cloned()
                .collect();
            Ok(Selection { images, external })
        }
    }
}

/// `roots` plus every repo reachable by following dependency edges.
pub fn dependency_closure(catalog: &ImageCatalog, roots: &BTreeSet<String>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<String> = roots.iter().cloned().collect();
    while let Some(repo) = stack.pop() {
        if !seen.insert(repo.clone()) {
            continue;
        }
        if let Some(image) = catalog.get(&repo) {
            stack.extend(
                image
                    .dependencies
                    .iter()
                    .filter(|d| !seen.contains(*d))
                    .cloned(),
            );
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainBuildError;

    fn catalog() -> ImageCatalog {
        let image = |repo: &str, deps: &[&str]| {
            ImageDefinition::new(repo, repo).with_dependencies(deps.iter().copied())
        };
        ImageCatalog::from_definitions(vec![
            image("base", &[]),
            image("python", &["base"]),
            image("notebook", &["python"]),
            image("node", &["base"]),
            image("tools", &[]),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_selection_is_everything() {
        let selection = select(&catalog(), &[], SelectionPolicy::WithoutDependencies).unwrap();
        assert_eq!(selection.len(), 5);
        assert!(selection.external.is_empty());
    }

    #[test]
    fn test_closure_is_transitive() {
        let roots = ["notebook".to_string()].into_iter().collect();
        let closure = dependency_closure(&catalog(), &roots);
        assert_eq!(
            closure.into_iter().collect::<Vec<_>>(),
            vec!["base", "notebook", "python"]
        );
    }

    #[test]
    fn test_without_dependencies_reports_external() {
        let wanted = vec!["notebook".to_string(), "python".to_string()];
        let selection = select(&catalog(), &wanted, SelectionPolicy::WithoutDependencies).unwrap();
        assert_eq!(selection.repos(), vec!["notebook", "python"]);
        assert_eq!(selection.external.into_iter().collect::<Vec<_>>(), vec!["base"]);
    }

    #[test]
    fn test_unknown_selection_lists_all() {
        let wanted = vec!["ghost".to_string(), "base".to_string(), "phantom".to_string()];
        let err = select(&catalog(), &wanted, SelectionPolicy::WithDependencies).unwrap_err();
        match err {
            ChainBuildError::Config(ConfigError::UnknownSelection(repos)) => {
                assert_eq!(repos, vec!["ghost", "phantom"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
