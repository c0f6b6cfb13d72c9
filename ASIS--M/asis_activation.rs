use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use asis_activation::{
    ActivationConfig, ActivationController, ComponentRegistry, ComponentState, DashboardSnapshot,
    FactoryCatalog,
};
use clap::Parser;
use shared_event_bus::FileEventPublisher;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "asis_activation",
    version,
    about = "Activates the ASIS components phase by phase and keeps them under watch"
)]
struct Cli {
    /// TOML configuration. Built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the component manifest directory.
    #[arg(long)]
    components_dir: Option<PathBuf>,
    /// Overrides the JSON-lines activation log path.
    #[arg(long)]
    log_path: Option<PathBuf>,
    /// Appends activation events to this JSON-lines file.
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Seconds between dashboard prints.
    #[arg(long, default_value_t = 10)]
    snapshot_interval: u64,
    /// Activate, print one snapshot, then shut down.
    #[arg(long)]
    once: bool,
    /// Print snapshots as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ActivationConfig::load(path)?,
        None => ActivationConfig::default(),
    };
    if let Some(dir) = &cli.components_dir {
        config.components_dir = dir.clone();
    }
    if let Some(path) = &cli.log_path {
        config.log_path = path.clone();
    }
    init_tracing(config.debug);

    let mut builder = ActivationController::builder(config)
        .registry(ComponentRegistry::standard())
        .catalog(FactoryCatalog::builtin());
    if let Some(path) = &cli.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        builder = builder.event_publisher(Arc::new(publisher));
    }
    let controller = builder.build().context("failed to wire activation controller")?;

    controller
        .activate()
        .await
        .context("activation aborted")?;
    print_snapshot(&controller.snapshot(), cli.json)?;

    if !cli.once {
        let mut ticker = interval(Duration::from_secs(cli.snapshot_interval.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("listening for ctrl-c")?;
                    tracing::info!("interrupt received, shutting down");
                    break;
                }
                _ = ticker.tick() => print_snapshot(&controller.snapshot(), cli.json)?,
            }
        }
    }

    controller.shutdown().await;
    print_snapshot(&controller.snapshot(), cli.json)?;
    Ok(())
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "asis_activation=debug,info"
    } else {
        "asis_activation=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_snapshot(snapshot: &DashboardSnapshot, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }
    let verdict = if snapshot.fully_operational() {
        "fully operational"
    } else if snapshot.components_online == snapshot.components_total {
        "operational, degraded"
    } else {
        "partially operational"
    };
    println!(
        "[{}] system {} ({verdict}), mode {:?}",
        snapshot.timestamp.format("%H:%M:%S"),
        snapshot.system_status,
        snapshot.mode
    );
    println!(
        "  online {}/{}  mocked {}  avg health {:.2}  ticks {}",
        snapshot.components_online,
        snapshot.components_total,
        snapshot.components_mocked,
        snapshot.average_health,
        snapshot.cycle_ticks
    );
    for detail in snapshot.components.values() {
        let marker = match detail.state {
            ComponentState::Online | ComponentState::Autonomous if detail.degraded => "~",
            ComponentState::Online | ComponentState::Autonomous => "+",
            ComponentState::Error => "!",
            ComponentState::Offline | ComponentState::Initializing => "-",
        };
        let note = detail
            .error_message
            .as_deref()
            .map(|msg| format!("  ({msg})"))
            .unwrap_or_default();
        println!(
            "  {marker} {:<24} {:<20} {:<12} {:.2}{note}",
            detail.display_name,
            detail.phase.to_string(),
            detail.state.to_string(),
            detail.health_score
        );
    }
    Ok(())
}
