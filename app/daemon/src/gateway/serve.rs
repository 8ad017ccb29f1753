//! Shared serve entrypoint — used by the binary and tests.

use crate::config::{CHANNELS_DB, CONFIG_FILE, DATA_DIR, DaemonConfig, JOBS_DB};
use crate::gateway::{AppState, routes};
use anyhow::Result;
use channel::{SharedStore, SqliteChannelStore};
use queue::{JobStore, Runner, RunnerHandle, StopMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Handle returned by [`serve`] — holds the bound port and shutdown
/// trigger for both the server and the job runner.
pub struct ServeHandle {
    /// The port the gateway is listening on.
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<tokio::task::JoinHandle<Result<(), std::io::Error>>>,
    runner: Option<RunnerHandle>,
}

impl ServeHandle {
    /// Trigger graceful shutdown and wait for the server and runner to
    /// stop.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.await??;
        }
        if let Some(runner) = self.runner.take() {
            runner.shutdown().await?;
        }
        Ok(())
    }
}

/// Load config from the directory and start serving.
pub async fn serve(config_dir: &Path) -> Result<ServeHandle> {
    let config_path = config_dir.join(CONFIG_FILE);
    let config = DaemonConfig::load(&config_path)?;
    tracing::info!("loaded configuration from {}", config_path.display());
    serve_with_config(&config, config_dir).await
}

/// Serve with an already-loaded config. Useful when the caller
/// resolves config separately (e.g. the CLI with scaffold logic).
pub async fn serve_with_config(config: &DaemonConfig, config_dir: &Path) -> Result<ServeHandle> {
    let data_dir = config_dir.join(DATA_DIR);
    std::fs::create_dir_all(&data_dir)?;

    let channels: SharedStore = Arc::new(SqliteChannelStore::open(
        data_dir.join(CHANNELS_DB),
        config.service.channel_ttl(),
    )?);
    let jobs = Arc::new(JobStore::open(data_dir.join(JOBS_DB))?);
    let stops = StopMap::new();

    let (dispatcher, runner) = Runner::new(
        jobs.clone(),
        channels.clone(),
        crate::handlers::registry(),
        config.service.clone(),
        stops.clone(),
    )
    .start()?;

    let state = AppState {
        jobs,
        channels,
        dispatcher,
        stops,
        config: config.service.clone(),
    };

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    let port = listener.local_addr()?.port();
    tracing::info!("axond listening on {} (port {port})", config.bind);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("received shutdown signal");
            })
            .await
    });

    Ok(ServeHandle {
        port,
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
        runner: Some(runner),
    })
}
