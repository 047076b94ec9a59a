/**
 * FLEETMON KERNEL - Entry point
 *
 * ROLE : Loads the configuration and the initial site, builds the control
 * node over HTTP transport, then starts the poller, the optional MQTT health
 * publisher and the REST API.
 */

use anyhow::Context;
use fleetmon_kernel::config::load_config;
use fleetmon_kernel::health::HealthTracker;
use fleetmon_kernel::http::{build_router, AppState};
use fleetmon_kernel::poller::spawn_poller;
use fleetmon_kernel::transport::HttpTransport;
use fleetmon_kernel::{ControlNode, Site};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetmon_kernel=info")),
        )
        .init();

    let cfg = load_config().await;
    let site = Site::from_config(cfg.site.clone()).context("invalid site in kernel config")?;
    tracing::info!(
        hosts = site.hosts().len(),
        applications = site.applications().len(),
        instances = site.instances().len(),
        "site loaded"
    );

    let transport = HttpTransport::new(&cfg.transport).context("cannot build HTTP transport")?;
    let node = ControlNode::new(site, Arc::new(transport));
    let health = HealthTracker::new();

    if cfg.poll.enabled {
        spawn_poller(node.clone(), health.clone(), Duration::from_secs(cfg.poll.interval_secs.max(1)));
    }
    if let Some(mqtt) = cfg.mqtt.clone() {
        health.spawn_health_publisher(mqtt, node.site());
    }

    let app = build_router(AppState { node, health });
    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("cannot bind {}", cfg.listen))?;
    tracing::info!(addr = %cfg.listen, "listening");
    axum::serve(listener, app).await.context("http server stopped")?;
    Ok(())
}
