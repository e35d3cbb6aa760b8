use anyhow::Context;
use shardkv::{web, Config, KvEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("shardkv starting...");

    // Optional JSON config file as first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;

    let engine = match KvEngine::open(config.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Recovery failed: {}", e);
            return Err(e).context("recovering store");
        }
    };

    let shutdown = CancellationToken::new();

    let snapshot_handle = config.snapshot_interval().map(|interval| {
        tokio::spawn(engine.clone().run_snapshot_loop(interval, shutdown.clone()))
    });

    let mut web_handle = {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        let addr = config.http_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = web::run_web_server(&addr, engine, shutdown).await {
                error!("HTTP server error: {}", e);
            }
        })
    };

    let web_stopped = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
            info!("Ctrl-C received");
            false
        }
        _ = &mut web_handle => {
            error!("HTTP server stopped");
            true
        }
    };
    shutdown.cancel();

    if !web_stopped {
        let _ = web_handle.await;
    }
    if let Some(handle) = snapshot_handle {
        let _ = handle.await;
    }

    tokio::task::spawn_blocking(move || engine.shutdown())
        .await
        .context("shutdown task")?
        .context("final snapshot")?;

    info!("shardkv stopped");
    Ok(())
}
