use anyhow::Result;
use tokio::signal;

mod sensor_logic;
use sensor_logic::{config, downstream, logger, state};

use lib_common::{CsvFileSource, ReplayScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir(), &config.log_level())?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new();

    // Load the batch once. An unreadable file leaves the store empty and the
    // server up, answering "no data" on every read until restarted.
    let source = CsvFileSource::new(config.data_path());
    if let Err(err) = app_state.store.load(&source) {
        log::error!("Failed to load sensor data: {}", err);
    }

    let scheduler = ReplayScheduler::new(
        app_state.cursor.clone(),
        app_state.hub.clone(),
        config.replay_interval(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    let downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(scheduler_handle, downstream_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
