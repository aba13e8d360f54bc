//! Dependency-ordered scheduling of image builds.
//!
//! The scheduler owns the [`BuildState`] of a run. Images wait in `pending`
//! until every dependency is in `built`, sit in `ready` until the executor
//! reports a successful build, then move to `built`. A run that empties
//! `ready` while `pending` still holds images is stuck: whatever is left
//! depends on a cycle or on something that will never be built.

use crate::catalog::ImageDefinition;
use crate::error::{ChainBuildError, Result};
use std::collections::{BTreeMap, HashMap};

/// Mutable bookkeeping for a single run.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    pub pending: BTreeMap<String, ImageDefinition>,
    pub ready: BTreeMap<String, ImageDefinition>,
    /// repo -> resolved version string
    pub built: BTreeMap<String, String>,
}

impl BuildState {
    /// Repos that have not been built yet, sorted.
    pub fn unbuilt(&self) -> Vec<String> {
        let mut repos: Vec<String> = self
            .pending
            .keys()
            .chain(self.ready.keys())
            .cloned()
            .collect();
        repos.sort();
        repos
    }
}

/// Where a run stands after the latest state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// At least one image is ready to build
    Running,
    /// Nothing left to build
    Complete,
    /// Nothing is ready but these repos were never built
    Stuck(Vec<String>),
}

/// Readiness engine using per-image counts of unbuilt dependencies.
///
/// Equivalent to rescanning every pending image after each build, without
/// the quadratic cost: a finished build only touches its own dependents.
pub struct BuildScheduler {
    state: BuildState,
    /// pending repo -> number of dependencies not yet built
    waiting_on: HashMap<String, usize>,
    /// repo -> pending repos that list it as a dependency
    dependents: HashMap<String, Vec<String>>,
    /// repos built during this run, in build order
    order: Vec<String>,
}

impl BuildScheduler {
    /// Schedule `images`. `prebuilt` holds versions of images that are
    /// already available and are never built by this run.
    pub fn new<I>(images: I, prebuilt: BTreeMap<String, String>) -> Self
    where
        I: IntoIterator<Item = ImageDefinition>,
    {
        let mut scheduler = Self {
            state: BuildState {
                built: prebuilt,
                ..BuildState::default()
            },
            waiting_on: HashMap::new(),
            dependents: HashMap::new(),
            order: Vec::new(),
        };

        for image in images {
            let unbuilt = image
                .dependencies
                .iter()
                .filter(|d| !scheduler.state.built.contains_key(*d))
                .count();

            if unbuilt == 0 {
                tracing::info!(repo = %image.repo, "No unbuilt dependencies; ready to build");
                scheduler.state.ready.insert(image.repo.clone(), image);
                continue;
            }

            for dep in &image.dependencies {
                if !scheduler.state.built.contains_key(dep) {
                    scheduler
                        .dependents
                        .entry(dep.clone())
                        .or_default()
                        .push(image.repo.clone());
                }
            }
            scheduler.waiting_on.insert(image.repo.clone(), unbuilt);
            scheduler.state.pending.insert(image.repo.clone(), image);
        }

        scheduler
    }

    /// The next image to build. Among several ready images the
    /// lexically smallest repo wins; any ready image would be valid.
    pub fn next_ready(&self) -> Option<&ImageDefinition> {
        self.state.ready.values().next()
    }

    /// Record a successful build of a ready image and promote every pending
    /// image whose last missing dependency this was. Returns the promoted
    /// repos.
    pub fn mark_built(&mut self, repo: &str, version: impl Into<String>) -> Result<Vec<String>> {
        if self.state.ready.remove(repo).is_none() {
            return Err(anyhow::anyhow!("{} is not ready and cannot be marked as built", repo).into());
        }
        self.state.built.insert(repo.to_string(), version.into());
        self.order.push(repo.to_string());

        let mut promoted = Vec::new();
        for dependent in self.dependents.remove(repo).unwrap_or_default() {
            let Some(count) = self.waiting_on.get_mut(&dependent) else {
                continue;
            };
            *count -= 1;
            if *count > 0 {
                tracing::debug!(repo = %dependent, remaining = *count, "Still waiting on dependencies");
                continue;
            }

            self.waiting_on.remove(&dependent);
            if let Some(image) = self.state.pending.remove(&dependent) {
                tracing::info!(repo = %dependent, "Now ready to be built");
                self.state.ready.insert(dependent.clone(), image);
                promoted.push(dependent);
            }
        }
        Ok(promoted)
    }

    pub fn status(&self) -> SchedulerStatus {
        if !self.state.ready.is_empty() {
            SchedulerStatus::Running
        } else if self.state.pending.is_empty() {
            SchedulerStatus::Complete
        } else {
            SchedulerStatus::Stuck(self.state.pending.keys().cloned().collect())
        }
    }

    /// Dependencies of a pending repo that are not built yet.
    pub fn missing_dependencies(&self, repo: &str) -> Vec<&str> {
        self.state
            .pending
            .get(repo)
            .map(|image| {
                image
                    .dependencies
                    .iter()
                    .filter(|d| !self.state.built.contains_key(*d))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn built(&self) -> &BTreeMap<String, String> {
        &self.state.built
    }

    /// Repos built by this run in the order they finished.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn unbuilt(&self) -> Vec<String> {
        self.state.unbuilt()
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn into_state(self) -> BuildState {
        self.state
    }
}

/// Dry-run the scheduler: the full build order of `images` without building
/// anything. `version_of` supplies the version recorded for each image.
pub fn plan_order<I, F>(
    images: I,
    prebuilt: BTreeMap<String, String>,
    mut version_of: F,
) -> Result<Vec<String>>
where
    I: IntoIterator<Item = ImageDefinition>,
    F: FnMut(&ImageDefinition) -> String,
{
    let mut scheduler = BuildScheduler::new(images, prebuilt);
    while let Some(image) = scheduler.next_ready() {
        let repo = image.repo.clone();
        let version = version_of(image);
        scheduler.mark_built(&repo, version)?;
    }

    match scheduler.status() {
        SchedulerStatus::Stuck(repos) => Err(ChainBuildError::Unreachable { repos }),
        _ => Ok(scheduler.order().to_vec()),
    }
}
