use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rentcal::compactor;
use rentcal::directory::InMemoryDirectory;
use rentcal::engine::Engine;
use rentcal::notify::NotifyHub;
use rentcal::wire::{self, Backend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let metrics_port: Option<u16> = std::env::var("RENTCAL_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    rentcal::observability::init(metrics_port)?;

    let port = std::env::var("RENTCAL_PORT").unwrap_or_else(|_| "5480".into());
    let bind = std::env::var("RENTCAL_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("RENTCAL_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let password = std::env::var("RENTCAL_PASSWORD").unwrap_or_else(|_| "rentcal".into());
    let max_connections: usize = std::env::var("RENTCAL_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("RENTCAL_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let directory_seed = std::env::var("RENTCAL_DIRECTORY").ok();

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let directory = match &directory_seed {
        Some(path) => Arc::new(InMemoryDirectory::load(Path::new(path))?),
        None => Arc::new(InMemoryDirectory::new()),
    };
    let hub = Arc::new(NotifyHub::new());
    let wal_path = PathBuf::from(&data_dir).join("rentcal.wal");
    let engine = Arc::new(Engine::new(wal_path, directory.clone(), hub.clone())?);

    let compactor_engine = engine.clone();
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, compact_threshold).await;
    });

    let backend = Arc::new(Backend {
        engine,
        directory: directory.clone(),
        hub,
        password,
    });
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("rentcal listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!(
        "  directory: {} properties, {} users{}",
        directory.property_count(),
        directory.user_count(),
        directory_seed.map_or(String::new(), |p| format!(" (from {p})"))
    );
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(rentcal::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(rentcal::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(rentcal::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let backend = backend.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, backend).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(rentcal::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("rentcal stopped");
    Ok(())
}
