mod collector;
mod config;
mod signals;

use std::sync::Arc;

use anyhow::Context;
use harvest_client::{ApiClient, HmacSigner};
use harvest_core::{ControlPlane, Scheduler, client_identity, init_uptime, probe_local_address};
use harvest_observe::logger_init;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{collector::ProcSource, config::AgentConfig, signals::SignalHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_uptime();

    // 1) Config + logger
    let cfg = AgentConfig::from_env().context("failed to read agent configuration")?;
    logger_init(&cfg.logger).context("failed to initialize logger")?;
    cfg.validate().context("invalid agent configuration")?;
    info!(version = harvest_core::agent_version(), "harvest agent starting");

    if let Err(e) = run(cfg).await {
        error!("agent failed: {e:#}");
        return Err(e);
    }
    info!("agent stopped");
    Ok(())
}

async fn run(cfg: AgentConfig) -> anyhow::Result<()> {
    // 2) Signed control-plane client
    let signer = HmacSigner::new(cfg.token_id, cfg.token).context("failed to create request signer")?;
    let client = Arc::new(
        ApiClient::new(cfg.client, Arc::new(signer)).context("failed to create control plane client")?,
    );

    // 3) Scheduler + signals
    let ctx = CancellationToken::new();
    let scheduler = Scheduler::new(
        client.clone(),
        Arc::new(ProcSource::new(cfg.collector)),
        client.clone(),
        cfg.scheduler,
    );
    let signals =
        SignalHandler::install(ctx.clone(), scheduler.subscribe()).context("failed to install signal handlers")?;

    // 4) Connection test + client registration
    info!(url = %client.base_url(), "testing connections");
    let connected = tokio::select! {
        _ = ctx.cancelled() => None,
        r = connect(&client) => Some(r),
    };
    match connected {
        None => {
            info!("shutdown requested before the agent connected");
            signals.shutdown();
            return Ok(());
        }
        Some(Err(e)) => {
            signals.shutdown();
            return Err(e);
        }
        Some(Ok(())) => info!("connected successfully, waiting for tasks"),
    }

    // 5) Poll until shutdown
    scheduler.run(ctx).await;
    signals.shutdown();
    Ok(())
}

async fn connect(client: &ApiClient) -> anyhow::Result<()> {
    let (host, port) = client.authority();
    let address = probe_local_address(&host, port)
        .await
        .with_context(|| format!("unable to connect to {host}:{port}"))?;

    client
        .update_client(&client_identity(address))
        .await
        .context("unable to update client")?;
    Ok(())
}
