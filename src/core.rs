//! Run orchestration: select, resolve versions, then build in dependency order.

use crate::catalog::{ImageCatalog, ImageDefinition};
use crate::docker::{BuildBackend, TemplateRenderer};
use crate::error::{ChainBuildError, ConfigError, Result};
use crate::executor::{image_tag, BuildExecutor, BuildOutcome};
use crate::logging::RunMetrics;
use crate::observer::{BuildEvent, BuildObserver, NoopObserver};
use crate::oci::TagSource;
use crate::scheduler::{plan_order, BuildScheduler, SchedulerStatus};
use crate::selector::{select, SelectionPolicy};
use crate::version::{VersionFormat, VersionResolver};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lets a caller stop a run between builds, directly or by deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Which images to build and how to treat their dependencies.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Repos to build; empty means the whole catalog
    pub only: Vec<String>,
    pub policy: SelectionPolicy,
    /// Caller-supplied versions for dependencies that are not rebuilt
    pub pins: BTreeMap<String, u32>,
}

/// Selected images with every version resolved.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Images to build; each carries `ImageVersion::Resolved`
    pub images: Vec<ImageDefinition>,
    /// Already published dependencies: repo -> formatted version
    pub external: BTreeMap<String, String>,
    pub format: VersionFormat,
}

impl BuildPlan {
    /// Formatted version an image will be built as.
    pub fn version_of(&self, image: &ImageDefinition) -> Option<String> {
        image.version.resolved().map(|v| self.format.format(v))
    }

    /// Tag `image` will be pushed as under `namespace`.
    pub fn tag_for(&self, namespace: &str, image: &ImageDefinition) -> Option<String> {
        self.version_of(image)
            .map(|version| image_tag(namespace, &image.repo, &version))
    }

    /// The order a run will build in, or the set that can never be built.
    pub fn order(&self) -> Result<Vec<String>> {
        plan_order(self.images.clone(), self.external.clone(), |image| {
            self.version_of(image).unwrap_or_default()
        })
    }

    /// Direct dependencies of `image` mapped to the versions they will have.
    pub fn substitutions(&self, image: &ImageDefinition) -> BTreeMap<String, String> {
        image
            .dependencies
            .iter()
            .filter_map(|dep| {
                self.external
                    .get(dep)
                    .cloned()
                    .or_else(|| {
                        self.images
                            .iter()
                            .find(|i| &i.repo == dep)
                            .and_then(|i| self.version_of(i))
                    })
                    .map(|v| (dep.clone(), v))
            })
            .collect()
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Outcomes in build order
    pub built: Vec<BuildOutcome>,
    pub metrics: RunMetrics,
}

impl RunReport {
    pub fn order(&self) -> Vec<&str> {
        self.built.iter().map(|o| o.repo.as_str()).collect()
    }
}

/// Ties the collaborators together for one or more runs.
pub struct Pipeline<'a> {
    tags: &'a dyn TagSource,
    renderer: &'a dyn TemplateRenderer,
    backend: &'a dyn BuildBackend,
    observer: &'a dyn BuildObserver,
    format: VersionFormat,
    namespace: String,
    push: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        tags: &'a dyn TagSource,
        renderer: &'a dyn TemplateRenderer,
        backend: &'a dyn BuildBackend,
    ) -> Self {
        Self {
            tags,
            renderer,
            backend,
            observer: &NoopObserver,
            format: VersionFormat::default(),
            namespace: String::new(),
            push: true,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn BuildObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_format(mut self, format: VersionFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Select images and resolve every version the run needs. Fails before
    /// any build on configuration or resolution errors.
    pub fn plan(&self, catalog: &ImageCatalog, request: &PlanRequest) -> Result<BuildPlan> {
        let selection = select(catalog, &request.only, request.policy)?;
        let resolver = VersionResolver::new(self.tags, &self.format)?;

        let mut images = Vec::with_capacity(selection.len());
        for image in selection.images {
            let version = resolver.resolve(&image)?;
            images.push(image.with_version(version));
        }

        // Dependencies that are not rebuilt: pin, then declared version, then
        // the newest published tag.
        let mut external = BTreeMap::new();
        for repo in &selection.external {
            let version = match request.pins.get(repo) {
                Some(v) => Some(*v),
                None => match catalog.get(repo) {
                    Some(def) => resolver.published(def)?,
                    None => None,
                },
            };
            let version = version.ok_or_else(|| ConfigError::MissingPublishedVersion(repo.clone()))?;
            tracing::info!(repo = %repo, version, "Using published version of dependency");
            external.insert(repo.clone(), self.format.format(version));
        }

        Ok(BuildPlan {
            images,
            external,
            format: self.format.clone(),
        })
    }

    /// Build every image of `plan` in dependency order.
    pub fn execute(&self, plan: &BuildPlan, cancel: &CancelToken) -> Result<RunReport> {
        let start = Instant::now();
        let executor = BuildExecutor::new(self.renderer, self.backend, plan.format.clone(), self.namespace.clone())
            .with_push(self.push);
        let mut scheduler = BuildScheduler::new(plan.images.clone(), plan.external.clone());
        let mut report = RunReport {
            built: Vec::new(),
            metrics: RunMetrics::new(plan.images.len()),
        };

        self.observer.on_event(BuildEvent::RunStarted {
            total_images: plan.images.len(),
        });

        let result = self.drive(&executor, &mut scheduler, &mut report, cancel);

        report.metrics.total_duration_ms = start.elapsed().as_millis() as u64;
        self.observer.on_event(BuildEvent::RunFinished {
            built: report.built.len(),
            unbuilt: scheduler.unbuilt().len(),
            total_duration_ms: report.metrics.total_duration_ms,
        });

        result.map(|_| report)
    }

    /// Plan and execute in one go.
    pub fn run(&self, catalog: &ImageCatalog, request: &PlanRequest, cancel: &CancelToken) -> Result<RunReport> {
        let plan = self.plan(catalog, request)?;
        self.execute(&plan, cancel)
    }

    fn drive(
        &self,
        executor: &BuildExecutor<'_>,
        scheduler: &mut BuildScheduler,
        report: &mut RunReport,
        cancel: &CancelToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                let unbuilt = scheduler.unbuilt();
                crate::log_unbuilt!(unbuilt);
                return Err(ChainBuildError::Cancelled { unbuilt });
            }

            let Some(image) = scheduler.next_ready().cloned() else {
                break;
            };

            self.observer.on_event(BuildEvent::ImageStarted {
                repo: image.repo.clone(),
                tag: executor.tag_for(&image.repo, &plan_version(executor, &image)),
            });

            match executor.execute(&image, scheduler.built()) {
                Ok(outcome) => {
                    scheduler.mark_built(&outcome.repo, outcome.version.clone())?;
                    report.metrics.record_build(outcome.duration_ms, outcome.published);
                    self.observer.on_event(BuildEvent::ImageBuilt {
                        repo: outcome.repo.clone(),
                        tag: outcome.tag.clone(),
                        duration_ms: outcome.duration_ms,
                        published: outcome.published,
                    });
                    report.built.push(outcome);
                }
                Err(e) => {
                    report.metrics.record_failure();
                    self.observer.on_event(BuildEvent::ImageFailed {
                        repo: image.repo.clone(),
                        error: e.to_string(),
                    });
                    crate::log_unbuilt!(scheduler.unbuilt());
                    return Err(e);
                }
            }
        }

        match scheduler.status() {
            SchedulerStatus::Stuck(repos) => {
                for repo in &repos {
                    tracing::debug!(
                        repo = %repo,
                        missing = ?scheduler.missing_dependencies(repo),
                        "Never became ready"
                    );
                }
                crate::log_unbuilt!(repos);
                Err(ChainBuildError::Unreachable { repos })
            }
            _ => Ok(()),
        }
    }
}

fn plan_version(executor: &BuildExecutor<'_>, image: &ImageDefinition) -> String {
    image
        .version
        .resolved()
        .map(|v| executor.format().format(v))
        .unwrap_or_default()
}
