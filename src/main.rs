//! Taskmill daemon entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

use taskmill::adapters::http::{build_router, serve_with_shutdown, AppState};
use taskmill::adapters::sqlite::{open_store, SqliteTaskStore};
use taskmill::application::{AgentRegistry, Daemon, ExecutorPool, TaskQueue, WorkflowMachine};
use taskmill::domain::models::Config;
use taskmill::infrastructure::config::ConfigLoader;
use taskmill::infrastructure::logging;

#[derive(Debug, Parser)]
#[command(name = "taskmill", version, about = "Autonomous feature factory daemon")]
struct Cli {
    /// Executor pool size.
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Queue poll interval in seconds.
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Path to the SQLite store file.
    #[arg(long, value_name = "PATH")]
    store_path: Option<String>,

    /// Listen address for the HTTP API (ADDR:PORT).
    #[arg(long, value_name = "ADDR:PORT")]
    listen: Option<String>,

    /// Explicit config file instead of .taskmill/config.yaml.
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

impl Cli {
    /// CLI flags are the highest-precedence configuration layer.
    fn apply_to(&self, config: &mut Config) -> Result<()> {
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent = max_concurrent;
        }
        if let Some(poll_interval) = self.poll_interval {
            config.poll_interval_secs = poll_interval;
        }
        if let Some(ref store_path) = self.store_path {
            config.database.path = store_path.clone();
        }
        if let Some(ref listen) = self.listen {
            let (host, port) = listen
                .rsplit_once(':')
                .context("--listen must be ADDR:PORT")?;
            config.server.host = host.to_string();
            config.server.port = port.parse().context("--listen port must be numeric")?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    cli.apply_to(&mut config)?;
    ConfigLoader::validate(&config).context("Invalid configuration")?;

    let _log_guard = logging::init(&config.logging)?;

    info!(
        max_concurrent = config.max_concurrent,
        poll_interval_secs = config.poll_interval_secs,
        store_path = %config.database.path,
        "Starting taskmill daemon"
    );

    // Fatal startup errors below this point exit nonzero.
    let pool = open_store(&config.database).await.context("Failed to open task store")?;
    let store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let queue = TaskQueue::new(store);

    let machine = Arc::new(WorkflowMachine::five_phase_tdd(&config.workflow));
    let registry = Arc::new(
        AgentRegistry::from_config(&config.agents).context("Invalid agent registry")?,
    );
    registry
        .validate_for(&machine)
        .context("Agent registry does not cover the workflow's agents")?;

    let executor_pool = Arc::new(ExecutorPool::new(
        config.max_concurrent,
        queue.clone(),
        Arc::clone(&registry),
        Arc::clone(&machine),
        config.store_retry.clone(),
    ));

    let daemon = Daemon::new(
        queue.clone(),
        Arc::clone(&executor_pool),
        Duration::from_secs(config.poll_interval_secs),
    );
    daemon.recover().await.context("Startup recovery failed")?;

    let listen_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    info!(addr = %listen_addr, "HTTP API listening");

    let (shutdown_tx, daemon_shutdown_rx) = broadcast::channel::<()>(1);
    let mut server_shutdown_rx = shutdown_tx.subscribe();

    // SIGINT / SIGTERM trigger graceful shutdown.
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let router = build_router(AppState {
        queue: queue.clone(),
        pool: Arc::clone(&executor_pool),
    });
    let server = tokio::spawn(serve_with_shutdown(listener, router, async move {
        let _ = server_shutdown_rx.recv().await;
    }));

    daemon.run(daemon_shutdown_rx).await;

    executor_pool.shutdown(Duration::from_secs(config.graceful_timeout_secs)).await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error during shutdown"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    pool.close().await;
    info!("Clean shutdown");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
