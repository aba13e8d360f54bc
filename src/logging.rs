use std::io;
/// Structured logging and run metrics for chainbuild
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize logging with optional JSON output. `RUST_LOG` overrides the
/// default level.
pub fn init_logging(json_output: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if verbose { "chainbuild=debug" } else { "chainbuild=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = Registry::default().with(env_filter);

    if json_output {
        // JSON output for log aggregation in CI
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false)
                    .without_time(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Counters collected over one run
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub planned: u64,
    pub built: u64,
    pub published: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
}

impl RunMetrics {
    pub fn new(planned: usize) -> Self {
        Self {
            planned: planned as u64,
            ..Self::default()
        }
    }

    pub fn record_build(&mut self, duration_ms: u64, published: bool) {
        self.built += 1;
        self.total_duration_ms += duration_ms;
        if published {
            self.published += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn average_build_time_ms(&self) -> f64 {
        if self.built == 0 {
            0.0
        } else {
            (self.total_duration_ms as f64) / (self.built as f64)
        }
    }

    pub fn completion_rate(&self) -> f64 {
        if self.planned == 0 {
            1.0
        } else {
            (self.built as f64) / (self.planned as f64)
        }
    }
}

#[macro_export]
macro_rules! log_build_start {
    ($repo:expr, $tag:expr) => {
        tracing::info!(repo = %$repo, tag = %$tag, "Building image");
    };
}

#[macro_export]
macro_rules! log_build_complete {
    ($repo:expr, $tag:expr, $duration_ms:expr, $published:expr) => {
        tracing::info!(
            repo = %$repo,
            tag = %$tag,
            duration_ms = $duration_ms,
            published = $published,
            "Image built"
        );
    };
}

#[macro_export]
macro_rules! log_unbuilt {
    ($repos:expr) => {
        tracing::error!("Unable to build all images. The following were not built:");
        for repo in $repos.iter() {
            tracing::error!("  {}", repo);
        }
    };
}
