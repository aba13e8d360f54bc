use chainbuild::config::RunConfig;
use chainbuild::constants::{
    DEFAULT_BUILD_DIR, DEFAULT_DOCKER_PROGRAM, DEFAULT_REGISTRY_URL, DEFAULT_TAG_PAGE_SIZE,
    DEFAULT_VERSION_PREFIX, DEFAULT_VERSION_WIDTH,
};
use chainbuild::core::{BuildPlan, Pipeline, RunReport};
use chainbuild::docker::{DockerCli, MustacheRenderer};
use chainbuild::executor::image_tag;
use chainbuild::logging::init_logging;
use chainbuild::manifest::load_catalog;
use chainbuild::observer::{BuildEvent, BuildObserver};
use chainbuild::oci::HubTagSource;
use chainbuild::selector::SelectionPolicy;
use chainbuild::version::VersionFormat;
use chainbuild::{ChainBuildError, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Build a chain of container images in dependency order and publish them
/// with incrementing version tags.
#[derive(Parser, Debug)]
#[command(name = "chainbuild", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory containing one subdirectory per image
    #[arg(long, env = "CHAINBUILD_ROOT", default_value = ".", global = true)]
    root: PathBuf,

    /// Registry namespace, e.g. your Docker Hub organisation
    #[arg(short, long, env = "CHAINBUILD_NAMESPACE", default_value = "", hide_default_value = true, global = true)]
    namespace: String,

    #[arg(long, env = "CHAINBUILD_REGISTRY", default_value = DEFAULT_REGISTRY_URL, global = true)]
    registry: String,

    /// Bearer token for the registry tag API
    #[arg(long, env = "CHAINBUILD_REGISTRY_TOKEN", hide_env_values = true, global = true)]
    registry_token: Option<String>,

    #[arg(long, env = "CHAINBUILD_PAGE_SIZE", default_value_t = DEFAULT_TAG_PAGE_SIZE, global = true)]
    page_size: u32,

    /// Only build these images (repeatable, or comma separated)
    #[arg(long, env = "CHAINBUILD_ONLY", value_delimiter = ',', global = true)]
    only: Vec<String>,

    /// Do not rebuild dependencies of the selected images
    #[arg(long, env = "CHAINBUILD_NO_DEPS", global = true)]
    no_deps: bool,

    /// Pin a dependency that is not rebuilt: <repo>=<version>
    #[arg(long, env = "CHAINBUILD_PIN", value_delimiter = ',', global = true)]
    pin: Vec<String>,

    /// Build images without pushing them
    #[arg(long, env = "CHAINBUILD_NO_PUSH", global = true)]
    no_push: bool,

    /// Stop starting new builds after this long, e.g. "45m"
    #[arg(long, env = "CHAINBUILD_TIMEOUT", value_parser = humantime::parse_duration, global = true)]
    timeout: Option<Duration>,

    /// Where build contexts are staged
    #[arg(long, env = "CHAINBUILD_BUILD_DIR", default_value = DEFAULT_BUILD_DIR, global = true)]
    build_dir: PathBuf,

    #[arg(long, env = "CHAINBUILD_DOCKER", default_value = DEFAULT_DOCKER_PROGRAM, global = true)]
    docker: String,

    #[arg(long, env = "CHAINBUILD_VERSION_PREFIX", default_value = DEFAULT_VERSION_PREFIX, global = true)]
    version_prefix: String,

    #[arg(long, env = "CHAINBUILD_VERSION_WIDTH", default_value_t = DEFAULT_VERSION_WIDTH, global = true)]
    version_width: usize,

    /// Emit logs, and `plan` output, as JSON
    #[arg(long, env = "CHAINBUILD_JSON", global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Build and publish images (default)
    Build,
    /// Resolve versions and print the build order without building
    Plan,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let config = RunConfig {
            root: self.root.clone(),
            build_dir: self.build_dir.clone(),
            namespace: self.namespace.clone(),
            registry_url: self.registry.clone(),
            page_size: self.page_size,
            registry_token: self.registry_token.clone(),
            version_format: VersionFormat::new(self.version_prefix.clone(), self.version_width),
            push: !self.no_push,
            only: self.only.clone(),
            policy: if self.no_deps {
                SelectionPolicy::WithoutDependencies
            } else {
                SelectionPolicy::WithDependencies
            },
            pins: Default::default(),
            timeout: self.timeout,
            docker_program: self.docker.clone(),
        };
        Ok(config.with_pins(&self.pin)?.validate()?)
    }
}

/// Renders run events as a progress bar on stderr.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }
}

impl BuildObserver for ProgressObserver {
    fn on_event(&self, event: BuildEvent) {
        match event {
            BuildEvent::RunStarted { total_images } => {
                self.bar.set_length(total_images as u64);
                self.bar.enable_steady_tick(Duration::from_millis(120));
            }
            BuildEvent::ImageStarted { tag, .. } => self.bar.set_message(tag),
            BuildEvent::ImageBuilt {
                tag,
                duration_ms,
                published,
                ..
            } => {
                let action = if published { "built and pushed" } else { "built" };
                self.bar.println(format!(
                    "{} {} {} in {}",
                    "✔".green(),
                    tag.bold(),
                    action,
                    humantime::format_duration(Duration::from_millis(duration_ms))
                ));
                self.bar.inc(1);
            }
            BuildEvent::ImageFailed { repo, error } => {
                self.bar
                    .println(format!("{} {}: {}", "✘".red(), repo.bold(), error));
            }
            BuildEvent::RunFinished { .. } => self.bar.finish_and_clear(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.json, cli.verbose) {
        eprintln!("failed to initialise logging: {}", e);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            let repos = e.repos();
            if matches!(
                e,
                ChainBuildError::Build { .. }
                    | ChainBuildError::Unreachable { .. }
                    | ChainBuildError::Cancelled { .. }
            ) && !repos.is_empty()
            {
                eprintln!("{}", "Affected images:".yellow());
                for repo in repos {
                    eprintln!("  {}", repo);
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.run_config()?;
    let catalog = load_catalog(&config.root)?;
    if catalog.is_empty() {
        tracing::warn!(root = %config.root.display(), "No images found");
        return Ok(());
    }

    let mut tags = HubTagSource::with_registry(&config.registry_url, &config.namespace)
        .page_size(config.page_size);
    if let Some(token) = &config.registry_token {
        tags.set_token(token);
    }
    let backend = DockerCli::new(config.docker_program.clone(), config.build_dir.clone());
    let observer = ProgressObserver::new(cli.json);

    let pipeline = Pipeline::new(&tags, &MustacheRenderer, &backend)
        .with_observer(&observer)
        .with_format(config.version_format.clone())
        .with_namespace(config.namespace.clone())
        .with_push(config.push);

    let plan = pipeline.plan(&catalog, &config.plan_request())?;
    match cli.command.unwrap_or(Command::Build) {
        Command::Plan => print_plan(&plan, &config.namespace, cli.json),
        Command::Build => {
            let report = pipeline.execute(&plan, &config.cancel_token())?;
            print_summary(&report);
            Ok(())
        }
    }
}

/// One line of `chainbuild plan --json` output.
#[derive(Serialize)]
struct PlannedImage<'a> {
    repo: &'a str,
    tag: String,
    substitutions: BTreeMap<String, String>,
}

fn print_plan(plan: &BuildPlan, namespace: &str, json: bool) -> Result<()> {
    let order = plan.order()?;

    if json {
        let planned: Vec<PlannedImage<'_>> = order
            .iter()
            .filter_map(|repo| plan.images.iter().find(|i| &i.repo == repo))
            .map(|image| PlannedImage {
                repo: &image.repo,
                tag: plan.tag_for(namespace, image).unwrap_or_default(),
                substitutions: plan.substitutions(image),
            })
            .collect();
        let out = serde_json::to_string_pretty(&planned).map_err(anyhow::Error::from)?;
        println!("{}", out);
        return Ok(());
    }

    for (repo, version) in &plan.external {
        println!("{} {}", "published".dimmed(), image_tag(namespace, repo, version));
    }
    for (position, repo) in order.iter().enumerate() {
        let Some(image) = plan.images.iter().find(|i| &i.repo == repo) else {
            continue;
        };
        let tag = plan.tag_for(namespace, image).unwrap_or_default();
        println!("{:>3}. {}", position + 1, tag.bold());
        for (dep, dep_version) in plan.substitutions(image) {
            println!("       {} = {}", dep.cyan(), dep_version);
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let metrics = &report.metrics;
    println!(
        "{} {} image(s) built, {} pushed in {}",
        "Done:".green().bold(),
        metrics.built,
        metrics.published,
        humantime::format_duration(Duration::from_millis(metrics.total_duration_ms))
    );
    for outcome in &report.built {
        println!("  {}", outcome.tag);
    }
}
