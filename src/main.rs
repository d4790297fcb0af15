use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use color_eyre::eyre::{Context, Report, Result};
use tokio_util::sync::CancellationToken;

mod cluster;
mod config;
mod consts;
mod dispatch;
mod error;
#[cfg(test)]
mod fake;
mod manifest;
mod oc;
mod orchestrator;
mod provision;
mod remote;
mod resources;
mod watcher;

use crate::cluster::PodPhase;
use crate::config::Settings;
use crate::error::FlowError;
use crate::oc::OcCli;
use crate::orchestrator::{Orchestrator, StatusReport};
use crate::provision::{CreateOutcome, ProvisionReport};

#[derive(Debug, Parser)]
#[command(name = "sb")]
#[command(
    about = "Develop Java applications inside a supervised OpenShift pod",
    long_about = None
)]
struct Cli {
    /// Path to config file (default: ~/.config/sb.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Kubeconfig forwarded to every oc call
    #[arg(long, global = true, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Application descriptor (default: ./MANIFEST)
    #[arg(long, global = true, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Namespace holding the development pod
    #[arg(short, long, global = true, env = "SB_NAMESPACE")]
    namespace: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Create the development resources in the cluster
    ///
    /// Creates the image streams, the build cache claim, the deployment
    /// config, the service and the route. Running it again leaves existing
    /// objects untouched.
    Init {
        /// Namespace to create them in (overrides --namespace)
        #[arg(value_name = "NAMESPACE")]
        target: Option<String>,
    },
    /// Copy sources or the built archive into the pod
    ///
    /// Examples:
    ///   sb push --mode source
    ///   sb push --mode binary
    Push {
        /// What to push: "source" or "binary"
        #[arg(long)]
        mode: String,
    },
    /// Build the project inside the pod
    Compile {
        /// Return once the build is started instead of following its log
        #[arg(long)]
        no_follow: bool,
    },
    /// Restart the application with the debugger enabled and forward its port
    Debug {
        /// Port mapping LOCAL:REMOTE, or a single port for both (default from config, 5005:5005)
        #[arg(short, long, value_name = "LOCAL:REMOTE")]
        ports: Option<String>,
    },
    /// Show the application's pods
    Status,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .event_format(format)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config::load_config_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            std::process::exit(2);
        }
    };

    let namespace = match &cli.command {
        Command::Init { target } => target.clone().or(cli.namespace.clone()),
        _ => cli.namespace.clone(),
    };
    let project_dir = std::env::current_dir().context("Failed to get current directory")?;
    let settings = Settings::resolve(&config, project_dir, cli.manifest.clone(), namespace);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let oc = OcCli::new(config.oc.clone(), cli.kubeconfig.clone());
    let orchestrator = Orchestrator::new(&oc, &oc, &settings, cancel);

    if let Err(e) = run(cli.command, &orchestrator).await {
        let code = e.exit_code();
        eprintln!("Error: {:?}", Report::new(e));
        std::process::exit(code);
    }
    Ok(())
}

async fn run(command: Command, orchestrator: &Orchestrator<'_, OcCli, OcCli>) -> Result<(), FlowError> {
    match command {
        Command::Init { .. } => {
            let report = orchestrator.init().await?;
            print_provision(&report);
        }
        Command::Push { mode } => orchestrator.push(&mode).await?,
        Command::Compile { no_follow } => orchestrator.compile(!no_follow).await?,
        Command::Debug { ports } => orchestrator.debug(ports.as_deref()).await?,
        Command::Status => {
            let report = orchestrator.status().await?;
            print_status(&report, Utc::now());
        }
    }
    Ok(())
}

fn print_provision(report: &ProvisionReport) {
    use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(vec![
        Cell::new("KIND").add_attribute(Attribute::Bold),
        Cell::new("NAME").add_attribute(Attribute::Bold),
        Cell::new("RESULT").add_attribute(Attribute::Bold),
    ]);

    for (kind, name, outcome) in &report.outcomes {
        let (text, color) = match outcome {
            CreateOutcome::Created => ("created", Color::Green),
            CreateOutcome::AlreadyExisted => ("unchanged", Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(kind),
            Cell::new(name),
            Cell::new(text).fg(color),
        ]);
    }

    println!("{table}");
    if let Some(host) = &report.route_host {
        println!("\nRoute: http://{}", host);
    }
}

fn print_status(report: &StatusReport, now: DateTime<Utc>) {
    if report.pods.is_empty() {
        println!(
            "No pods for {} in namespace {}.",
            report.app.name(),
            report.app.namespace()
        );
        return;
    }

    use comfy_table::{Attribute, Cell, ContentArrangement, Table};

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(vec![
        Cell::new("").add_attribute(Attribute::Bold),
        Cell::new("NAME").add_attribute(Attribute::Bold),
        Cell::new("STATUS").add_attribute(Attribute::Bold),
        Cell::new("READY").add_attribute(Attribute::Bold),
        Cell::new("AGE").add_attribute(Attribute::Bold),
    ]);

    for pod in &report.pods {
        let marker = if report.selected.as_deref() == Some(pod.name()) {
            "*"
        } else {
            ""
        };
        let (ready, total) = pod.ready_count();
        table.add_row(vec![
            Cell::new(marker),
            Cell::new(pod.name()),
            Cell::new(pod.describe()).fg(phase_color(&pod.phase())),
            Cell::new(format!("{}/{}", ready, total)),
            Cell::new(format_age(pod.metadata.creation_timestamp, now)),
        ]);
    }

    println!("{table}");
}

fn phase_color(phase: &PodPhase) -> comfy_table::Color {
    use comfy_table::Color;

    match phase {
        PodPhase::Running => Color::Green,
        PodPhase::Pending => Color::Yellow,
        PodPhase::Succeeded => Color::Cyan,
        PodPhase::Failed => Color::Red,
        PodPhase::Unknown(_) => Color::Reset,
    }
}

/// Compact age such as `5m` or `3d`
fn format_age(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(created) = created else {
        return "-".to_string();
    };
    let seconds = now.signed_duration_since(created).num_seconds().max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h", seconds / 3600)
    } else {
        format!("{}d", seconds / 86400)
    }
}
