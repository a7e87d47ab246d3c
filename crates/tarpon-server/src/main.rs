//! Main entry point for the Tarpon remoting server.
//!
//! Loads configuration, sets up logging and metrics, seeds the cluster and
//! deployment registries, and serves the length-prefixed TCP transport until
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use tarpon_api::JsonPayloadCodec;
use tarpon_core::cluster::ClusterRegistry;
use tarpon_core::deployment::DeploymentRepository;
use tarpon_core::recovery::RecoveryRegistry;
use tarpon_server::service::{
    InMemoryTransactionManager, NoopComponentInvoker, PeriodicRecoveryManager,
};
use tarpon_server::transport::ServerState;
use tarpon_server::{metrics, model, startup, transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = model::Configuration::new()?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    metrics::init_metrics();
    if configuration.metrics_enabled() {
        let addr = configuration.metrics_addr().parse()?;
        metrics::install_prometheus(addr)?;
        info!("Prometheus scrape endpoint on {addr}");
    }

    let node_name = configuration.node_name();
    let clusters = Arc::new(ClusterRegistry::new());
    for (group_name, members) in configuration.cluster_groups() {
        clusters.register_group(group_name, members).await;
    }

    let deployments = Arc::new(DeploymentRepository::new());
    for module in configuration.modules() {
        deployments.deploy(module).await;
    }

    let recovery_manager =
        PeriodicRecoveryManager::new(Duration::from_secs(configuration.recovery_scan_interval_secs()));
    recovery_manager.start();
    let recovery = RecoveryRegistry::new(&node_name, recovery_manager.clone());
    recovery.start();

    let state = Arc::new(ServerState {
        codec: Arc::new(JsonPayloadCodec),
        transaction_manager: Arc::new(InMemoryTransactionManager::new()),
        invoker: Arc::new(NoopComponentInvoker),
        deployments,
        clusters,
        recovery: recovery.clone(),
        channel_capacity: configuration.channel_capacity(),
        max_frame_len: configuration.max_frame_len(),
    });

    let listen_addr = configuration.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!(node = %node_name, "listening on {listen_addr}");
    let server = tokio::spawn(transport::serve(listener, state));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    server.abort();
    recovery.stop();
    recovery_manager.stop();

    Ok(())
}
