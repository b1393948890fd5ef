use anyhow::{Context, Result};
use notice_core::{LogOptions, LoggingListener, MemoryFabric, NoticeConfig, init_logging};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod notice_logic;
use notice_logic::{config, fixture::FabricFixture, pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = config::load_config();

    let log_options = LogOptions {
        app_name: "server_notice".to_string(),
        level: config.log_level.clone().unwrap_or_else(|| "info".to_string()),
        log_dir: config.log_dir.clone(),
        json: config.log_json.unwrap_or(false),
        ..Default::default()
    };
    let _log_guard = init_logging(&log_options).context("initialising logging")?;

    let pipeline_config = match &config.pipeline_config {
        Some(path) => NoticeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => NoticeConfig::default(),
    };
    let fixture_path = config.fixture_path.clone().context("no fixture path configured")?;
    let fixture = FabricFixture::load(&fixture_path)?;

    let fabric = MemoryFabric::new();
    let (domains, monitor) = fixture.install(&fabric);
    tracing::info!(domains = ?domains, "fabric fixture loaded");

    let registry = Arc::new(pipeline::build_registry(fabric, Arc::new(monitor), pipeline_config));
    for domain in &domains {
        registry.get_or_create(domain).api.add_listener(Arc::new(LoggingListener));
    }

    let shutdown = CancellationToken::new();
    let period = Duration::from_secs(config.cycle_interval_secs.unwrap_or(5).max(1));
    let cycles = tokio::spawn(pipeline::run_cycles(registry.clone(), domains, period, shutdown.clone()));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        tracing::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "SIGTERM handler unavailable");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    shutdown.cancel();
    if let Err(e) = cycles.await {
        tracing::error!(error = %e, "cycle loop ended abnormally");
    }
    registry.shutdown();

    tracing::info!("Shutdown complete.");
    Ok(())
}
