//! bgpvpn-ovnd - BGPVPN EVPN metadata driver daemon
//!
//! Pops lifecycle events from the event queue and keeps logical switch
//! metadata in line with BGPVPN associations.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use bgpvpn_ovnd::config::{recommended_agent_config, DEFAULT_CONFIG_PATH};
use bgpvpn_ovnd::{
    AssociationReconciler, DriverConfig, EventBus, MetadataStoreClient, RedisBackend,
    RedisEventQueue, RedisTopology,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// BGPVPN EVPN metadata driver
#[derive(Parser, Debug)]
#[command(name = "bgpvpn-ovnd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Process lifecycle events until interrupted (default)
    Run,
    /// Run one reconciliation pass and exit
    Sweep,
    /// Print the recommended data-plane agent configuration
    AgentConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Run);

    if command == Command::AgentConfig {
        print!("{}", recommended_agent_config());
        return ExitCode::SUCCESS;
    }

    let config = match DriverConfig::load_or_default(&args.config).and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bgpvpn-ovnd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log.level);
    info!("--- Starting bgpvpn-ovnd ---");

    let result = match command {
        Command::Sweep => sweep(&config).await,
        _ => run(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("bgpvpn-ovnd exiting with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

async fn build_reconciler(config: &DriverConfig) -> anyhow::Result<Arc<AssociationReconciler>> {
    let backend = RedisBackend::connect(&config.metadata_store)
        .await
        .context("connecting to metadata store")?;
    let topology = RedisTopology::connect(&config.topology)
        .await
        .context("connecting to topology mirror")?;

    let store = MetadataStoreClient::new(Arc::new(backend))
        .with_prefix(config.metadata_store.name_prefix.clone());
    Ok(Arc::new(AssociationReconciler::new(
        Arc::new(topology),
        store,
    )))
}

async fn sweep(config: &DriverConfig) -> anyhow::Result<()> {
    let reconciler = build_reconciler(config).await?;
    let report = reconciler.reconcile_all().await?;
    if !report.is_clean() {
        anyhow::bail!("{} networks failed to reconcile", report.failed.len());
    }
    Ok(())
}

/// Processes queued events until ctrl-c.
///
/// The queue is one-way: a precommit error here is only logged and cannot
/// abort the upstream mutation. Blocking validation requires embedding the
/// library and calling `EventBus::dispatch` from the API request path.
async fn run(config: &DriverConfig) -> anyhow::Result<()> {
    let reconciler = build_reconciler(config).await?;
    let queue = RedisEventQueue::connect(&config.topology.uri(), config.events.queue_key.clone())
        .await
        .context("connecting to event queue")?;

    let mut bus = EventBus::new();
    bus.register(reconciler);

    let poll_timeout = config.poll_timeout();
    info!("bgpvpn-ovnd initialization complete");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            popped = queue.pop(poll_timeout) => {
                match popped {
                    Ok(Some(event)) => {
                        // Errors are logged by the bus; the event is not retried
                        if let Err(e) = bus.dispatch(&event).await {
                            if e.is_retryable() {
                                tokio::time::sleep(poll_timeout).await;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) if e.is_retryable() => {
                        warn!("Event queue unavailable: {}", e);
                        tokio::time::sleep(poll_timeout).await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    info!("--- bgpvpn-ovnd stopped ---");
    Ok(())
}
