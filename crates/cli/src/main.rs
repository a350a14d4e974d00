use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dockship_core::{
    ContainerSpec, DeploymentTarget, FailurePolicy, DEFAULT_CONTAINER_NAME, DEFAULT_PORT,
};
use orchestrator::{DeployConfig, Deployer, StageTimeouts};
use settings::{Settings, DEFAULT_CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SOURCE_DIR: &str = "server";
const DEFAULT_LOG_FILTER: &str = "dockship=info,orchestrator=info,transport=info,settings=info";
/// Exit status after a second Ctrl-C, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "dockship")]
#[command(about = "Package a server directory and redeploy it as a container on a remote host", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive the source directory, upload it and restart the container
    Deploy(DeployArgs),
    /// Print the URL of one API endpoint
    Endpoint {
        name: String,

        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Substitute this host for the configured one
        #[arg(long)]
        host: Option<String>,
    },
    /// List every API endpoint
    Endpoints {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Args)]
struct DeployArgs {
    remote_user: String,
    remote_host: String,
    remote_path: String,

    #[arg(long, default_value = DEFAULT_SOURCE_DIR)]
    source: PathBuf,

    /// Directory the archive is written to (defaults to the source's parent)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Limit for every stage, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Keep running remote steps after one fails
    #[arg(long)]
    lenient_remote: bool,

    /// Print the plan and remote script without touching anything
    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value = DEFAULT_CONTAINER_NAME)]
    container_name: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory name to leave out of the archive (repeatable, default: venv)
    #[arg(long, value_name = "NAME")]
    exclude: Vec<String>,

    #[arg(long)]
    ssh_port: Option<u16>,

    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

impl DeployArgs {
    fn deploy_config(&self) -> DeployConfig {
        let mut config = DeployConfig::new(&self.source)
            .with_container(ContainerSpec::named(&self.container_name).with_port(self.port))
            .with_ssh_port(self.ssh_port);

        if let Some(dir) = &self.staging_dir {
            config = config.with_staging_dir(dir);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeouts(StageTimeouts::uniform(Duration::from_secs(secs)));
        }
        if self.lenient_remote {
            config = config.with_failure_policy(FailurePolicy::Lenient);
        }
        if !self.exclude.is_empty() {
            config = config.with_exclude(self.exclude.iter().cloned());
        }

        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Deploy(args) => deploy(args).await.context("deploy failed"),
        Commands::Endpoint { name, config, host } => endpoint(&name, &config, host).await,
        Commands::Endpoints { config, host } => endpoints(&config, host).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn deploy(args: DeployArgs) -> Result<()> {
    let target = DeploymentTarget::new(&args.remote_user, &args.remote_host, &args.remote_path)?;
    let deployer = Deployer::new(args.deploy_config());

    if args.dry_run {
        let plan = deployer.plan(&target)?;
        println!("Source:  {}", plan.source_dir.display());
        println!("Archive: {}", plan.archive_path.display());
        println!("Target:  {}", target);
        println!();
        print!("{}", plan.script.render());
        return Ok(());
    }

    let token = deployer.cancellation_token();
    tokio::spawn(async move {
        let mut received = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            received += 1;
            match interrupt_action(received) {
                InterruptAction::Cancel => {
                    tracing::warn!("Interrupt received, cancelling deployment (Ctrl-C again to exit)");
                    token.cancel();
                }
                InterruptAction::Exit => {
                    tracing::warn!("Second interrupt received, exiting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        }
    });

    let report = deployer.deploy(&target).await?;
    println!("{}", report.summary());

    match deployed_health_url(&args, &target).await {
        Ok(url) => println!("Health check: {}", url),
        Err(e) => tracing::warn!(error = %e, "No health endpoint configured"),
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    Cancel,
    Exit,
}

/// The first Ctrl-C cancels the run and lets cleanup finish; any later one
/// exits at once.
fn interrupt_action(received: usize) -> InterruptAction {
    if received <= 1 {
        InterruptAction::Cancel
    } else {
        InterruptAction::Exit
    }
}

/// Health URL of the container just started: the remote host and the port
/// it was bound to, with the protocol from the settings file.
async fn deployed_health_url(
    args: &DeployArgs,
    target: &DeploymentTarget,
) -> settings::Result<String> {
    Settings::load(&args.config)
        .await
        .with_host(target.remote_host())
        .with_port(args.port)
        .endpoint_url("health")
}

async fn load_settings(config: &Path, host: Option<String>) -> Settings {
    let settings = Settings::load(config).await;
    match host {
        Some(host) => settings.with_host(host),
        None => settings,
    }
}

async fn endpoint(name: &str, config: &Path, host: Option<String>) -> Result<()> {
    let settings = load_settings(config, host).await;
    let url = settings
        .endpoint_url(name)
        .with_context(|| format!("cannot resolve endpoint '{}'", name))?;
    println!("{}", url);
    Ok(())
}

async fn endpoints(config: &Path, host: Option<String>) -> Result<()> {
    let settings = load_settings(config, host).await;
    for (name, url) in settings.endpoint_urls() {
        println!("{:<28}{}", name, url);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
}
