use clap::Parser;
use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use vigie::capture::snapshot::ProcfsSource;
use vigie::configuration::config::Config;
use vigie::pipeline::capture_pipeline::CapturePipeline;
use vigie::pipeline::emitter::EventEmitter;
use vigie::storage::database_storage::DatabaseStorage;
use vigie::storage::storage_trait::ConnectionStore;
use vigie::web_interface::web_server::WebServer;

#[derive(Parser)]
#[command(name = "vigie")]
#[command(version = "0.1.0")]
#[command(about = "A host connection monitor with VPN traffic classification")]
struct Args {
    /// Optional TOML configuration file; defaults are used when omitted
    config_file: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
██╗   ██╗██╗ ██████╗ ██╗███████╗
██║   ██║██║██╔════╝ ██║██╔════╝
██║   ██║██║██║  ███╗██║█████╗
╚██╗ ██╔╝██║██║   ██║██║██╔══╝
 ╚████╔╝ ██║╚██████╔╝██║███████╗
  ╚═══╝  ╚═╝ ╚═════╝ ╚═╝╚══════╝
================================
 Host connection monitor v0.1.0
================================
"
    );

    let args = Args::parse();

    let config = match &args.config_file {
        Some(path) => {
            info!("Importing configuration from {}", path);
            match Config::from_file(Path::new(path)) {
                Ok(config) => config,
                Err(e) => {
                    error!("Unable to import configuration from file: {:?}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    // Storage init on the blocking pool; a migration failure is fatal
    let db_path = config.database_path.clone();
    let store: Arc<dyn ConnectionStore> =
        match tokio::task::spawn_blocking(move || DatabaseStorage::new_file(db_path)).await {
            Ok(Ok(storage)) => Arc::new(storage),
            Ok(Err(e)) => {
                error!("Unable to initialize storage: {}, exiting...", e);
                std::process::exit(1);
            }
            Err(e) => {
                error!("Storage init task failed: {}, exiting...", e);
                std::process::exit(1);
            }
        };
    info!("Storage ready at {:?}", config.database_path);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.web_ui_enabled {
        let server = WebServer::new(Arc::clone(&store));
        let port = config.dashboard_port;
        let web_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            info!("Starting web query surface on port {}", port);
            if let Err(e) = server.start(port, web_shutdown).await {
                error!("Web interface error: {}", e);
            }
        });
    }

    let mut pipeline = CapturePipeline::new(
        Arc::new(ProcfsSource::new()),
        store,
        &config,
        EventEmitter::stdout(),
        shutdown_rx,
    );
    let pipeline_task = tokio::spawn(async move { pipeline.run().await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    match pipeline_task.await {
        Ok(Ok(())) => info!("Pipeline stopped cleanly"),
        Ok(Err(e)) => error!("Pipeline error during shutdown: {}", e),
        Err(e) => error!("Error joining at the end of execution: {:?}", e),
    }
}
