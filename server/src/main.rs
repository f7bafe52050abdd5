//! `shardctl` - consensus shard controller.
//!
//! ```text
//! shardctl run -c shardctl.yaml                      # run the controller
//! shardctl route --strategy enable "SELECT 1"        # where would a statement go
//! ```

mod config;
mod status;
mod telemetry;
mod topology;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shardctl_client::{RestDbAgent, TcpLivenessTransport};
use shardctl_cluster::{AdvisoryRepairer, Collaborators, ConsensusController};
use shardctl_gateway::{QueryRouter, SessionState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ShardctlConfig;
use crate::topology::StaticTopology;

#[derive(Parser)]
#[command(name = "shardctl", version, about = "Consensus shard diagnosis and repair controller")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller and its status endpoint
    Run {
        /// Path to YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the tablet type a statement would be routed to
    Route {
        /// Read/write separation setting, e.g. "enable" or "disable"
        #[arg(long, default_value = "enable")]
        strategy: String,

        #[arg(long)]
        in_transaction: bool,

        /// The session has created temporary tables
        #[arg(long)]
        temp_tables: bool,

        /// The session holds an advisory lock
        #[arg(long)]
        advisory_lock: bool,

        sql: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::Route {
            strategy,
            in_transaction,
            temp_tables,
            advisory_lock,
            sql,
        } => {
            telemetry::init_tracing("warn");
            let router = QueryRouter::from_setting(&strategy)?;
            let session = SessionState {
                in_transaction,
                has_created_temp_tables: temp_tables,
                has_advisory_lock: advisory_lock,
            };
            let tablet_type = router.route(&session, &sql)?;
            println!("{}", tablet_type);
            Ok(())
        }
    }
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ShardctlConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    telemetry::init_tracing(&config.log.level);
    debug!("effective configuration:\n{}", config.to_yaml()?);

    if let Some(addr) = &config.metrics.listen_addr {
        telemetry::init_metrics(addr)?;
        info!("Prometheus metrics on {}", addr);
    }

    let topology = Arc::new(StaticTopology::from_sections(&config.shards));
    let collaborators = Collaborators {
        agent: Arc::new(RestDbAgent::new(config.agent.clone())?),
        liveness: Arc::new(TcpLivenessTransport::new()),
        repairer: Arc::new(AdvisoryRepairer),
    };

    let controller = Arc::new(ConsensusController::new(
        config.controller_config(),
        topology.clone(),
        collaborators,
    ));

    for identity in topology.identities() {
        if let Err(e) = controller.track_shard(identity.clone()).await {
            error!(shard = %identity, error = %e, "failed to track shard");
        }
    }
    if controller.shards().is_empty() {
        warn!("no shards configured; serving status only");
    }

    controller.start();

    let addr: SocketAddr = config
        .http
        .listen_addr
        .parse()
        .with_context(|| format!("invalid http listen address {}", config.http.listen_addr))?;
    let served = status::start_status_server(addr, controller.clone(), shutdown_signal()).await;

    controller.shutdown();
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
