use crate::catalog::ImageDefinition;
use crate::docker::{BuildBackend, BuildRequest, TemplateRenderer};
use crate::error::{BuildStage, ChainBuildError, Result};
use crate::version::VersionFormat;
use std::collections::BTreeMap;
use std::time::Instant;

/// `<namespace>/<repo>:<version>`, or `<repo>:<version>` without a namespace.
pub fn image_tag(namespace: &str, repo: &str, version: &str) -> String {
    if namespace.is_empty() {
        format!("{}:{}", repo, version)
    } else {
        format!("{}/{}:{}", namespace, repo, version)
    }
}

/// Result of building one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub repo: String,
    /// Formatted version, e.g. `v004`
    pub version: String,
    pub tag: String,
    pub published: bool,
    pub duration_ms: u64,
}

/// Builds (and optionally publishes) one ready image at a time.
pub struct BuildExecutor<'a> {
    renderer: &'a dyn TemplateRenderer,
    backend: &'a dyn BuildBackend,
    format: VersionFormat,
    namespace: String,
    push: bool,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(
        renderer: &'a dyn TemplateRenderer,
        backend: &'a dyn BuildBackend,
        format: VersionFormat,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            backend,
            format,
            namespace: namespace.into(),
            push: true,
        }
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn format(&self) -> &VersionFormat {
        &self.format
    }

    pub fn tag_for(&self, repo: &str, version: &str) -> String {
        image_tag(&self.namespace, repo, version)
    }

    /// Versions of the image's direct dependencies, keyed by repo.
    /// Dependencies of dependencies are deliberately not exposed.
    pub fn substitutions(
        &self,
        image: &ImageDefinition,
        built: &BTreeMap<String, String>,
    ) -> std::result::Result<BTreeMap<String, String>, String> {
        let mut values = BTreeMap::new();
        for dep in &image.dependencies {
            let version = built
                .get(dep)
                .ok_or_else(|| format!("dependency {} has not been built", dep))?;
            values.insert(dep.clone(), version.clone());
        }
        Ok(values)
    }

    /// Render, build and (if enabled) publish `image`. `built` must hold every
    /// direct dependency of the image.
    pub fn execute(
        &self,
        image: &ImageDefinition,
        built: &BTreeMap<String, String>,
    ) -> Result<BuildOutcome> {
        let start = Instant::now();
        let version = image
            .version
            .resolved()
            .map(|v| self.format.format(v))
            .ok_or_else(|| anyhow::anyhow!("version of {} was never resolved", image.repo))?;
        let tag = self.tag_for(&image.repo, &version);
        let fail = |stage: BuildStage, reason: String| ChainBuildError::Build {
            repo: image.repo.clone(),
            tag: tag.clone(),
            stage,
            reason,
        };

        crate::log_build_start!(image.repo, tag);

        let values = self
            .substitutions(image, built)
            .map_err(|reason| fail(BuildStage::Render, reason))?;
        let instructions = self
            .renderer
            .render(&image.template_path(), &values)
            .map_err(|e| fail(BuildStage::Render, e.to_string()))?;

        let request = BuildRequest {
            repo: &image.repo,
            source: &image.source,
            instructions: &instructions,
            tag: &tag,
        };
        self.backend
            .build(&request)
            .map_err(|e| fail(BuildStage::Build, format!("{:#}", e)))?;

        if self.push {
            tracing::info!(tag = %tag, "Publishing image");
            self.backend
                .publish(&tag)
                .map_err(|e| fail(BuildStage::Publish, format!("{:#}", e)))?;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        crate::log_build_complete!(image.repo, tag, duration_ms, self.push);

        Ok(BuildOutcome {
            repo: image.repo.clone(),
            version,
            tag,
            published: self.push,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::TemplateError;
    use std::path::Path;
    use std::sync::Mutex;

    struct EchoRenderer;
    impl TemplateRenderer for EchoRenderer {
        fn render(
            &self,
            _template: &Path,
            values: &BTreeMap<String, String>,
        ) -> std::result::Result<String, TemplateError> {
            Ok(values
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","))
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        fail_publish: bool,
    }

    impl BuildBackend for RecordingBackend {
        fn build(&self, request: &BuildRequest<'_>) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("build {} [{}]", request.tag, request.instructions));
            Ok(())
        }

        fn publish(&self, tag: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("push {}", tag));
            if self.fail_publish {
                anyhow::bail!("registry said no");
            }
            Ok(())
        }
    }

    fn built(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_image_tag_with_and_without_namespace() {
        assert_eq!(image_tag("acme", "base", "v001"), "acme/base:v001");
        assert_eq!(image_tag("", "base", "v001"), "base:v001");

        let backend = RecordingBackend::default();
        let executor = BuildExecutor::new(&EchoRenderer, &backend, VersionFormat::default(), "acme");
        assert_eq!(executor.tag_for("base", "v001"), image_tag("acme", "base", "v001"));
    }

    #[test]
    fn test_substitutions_use_direct_dependencies_only() {
        let backend = RecordingBackend::default();
        let executor = BuildExecutor::new(&EchoRenderer, &backend, VersionFormat::default(), "acme");
        let image = ImageDefinition::new("app", "app").with_dependencies(["worker"]);

        let values = executor
            .substitutions(&image, &built(&[("base", "v001"), ("worker", "v002")]))
            .unwrap();
        assert_eq!(values, built(&[("worker", "v002")]));
    }

    #[test]
    fn test_execute_builds_then_publishes() {
        let backend = RecordingBackend::default();
        let executor = BuildExecutor::new(&EchoRenderer, &backend, VersionFormat::default(), "acme");
        let image = ImageDefinition::new("app", "app")
            .with_dependencies(["base"])
            .with_version(4);

        let outcome = executor.execute(&image, &built(&[("base", "v001")])).unwrap();

        assert_eq!(outcome.tag, "acme/app:v004");
        assert_eq!(outcome.version, "v004");
        assert!(outcome.published);
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec!["build acme/app:v004 [base=v001]", "push acme/app:v004"]
        );
    }

    #[test]
    fn test_no_push_skips_publish() {
        let backend = RecordingBackend::default();
        let executor = BuildExecutor::new(&EchoRenderer, &backend, VersionFormat::new("", 4), "")
            .with_push(false);
        let image = ImageDefinition::new("base", "base").with_version(12);

        let outcome = executor.execute(&image, &BTreeMap::new()).unwrap();
        assert_eq!(outcome.tag, "base:0012");
        assert!(!outcome.published);
        assert_eq!(backend.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_publish_failure_is_a_build_error() {
        let backend = RecordingBackend {
            fail_publish: true,
            ..Default::default()
        };
        let executor = BuildExecutor::new(&EchoRenderer, &backend, VersionFormat::default(), "acme");
        let image = ImageDefinition::new("base", "base").with_version(1);

        match executor.execute(&image, &BTreeMap::new()).unwrap_err() {
            ChainBuildError::Build { repo, stage, reason, .. } => {
                assert_eq!(repo, "base");
                assert_eq!(stage, BuildStage::Publish);
                assert!(reason.contains("registry said no"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unbuilt_dependency_fails_before_backend() {
        let backend = RecordingBackend::default();
        let executor = BuildExecutor::new(&EchoRenderer, &backend, VersionFormat::default(), "acme");
        let image = ImageDefinition::new("app", "app")
            .with_dependencies(["base"])
            .with_version(1);

        let err = executor.execute(&image, &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            ChainBuildError::Build {
                stage: BuildStage::Render,
                ..
            }
        ));
        assert!(backend.calls.lock().unwrap().is_empty());
    }
}
