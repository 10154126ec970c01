//! Application orchestrator — wires the engine and server together.

use std::sync::Arc;

use panovault_engine::{
    BatchRunner, HttpCatalog, HttpDownloader, JpegExifCodec, LocalFolderStore, ProgressStore,
};
use panovault_server::{EngineHandler, ServerConfig, TransferServer};

use crate::config::Config;

/// Runs the daemon until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    // -- Engine --
    let store = Arc::new(ProgressStore::new());
    let downloader = Arc::new(HttpDownloader::new(&config.access_token)?);
    let destination = Arc::new(LocalFolderStore::new(&config.storage_root));
    let runner = Arc::new(BatchRunner::new(
        Arc::clone(&store),
        downloader,
        destination,
        Arc::new(JpegExifCodec),
    ));

    // -- WS server --
    // The catalog client backs `download_photo` lookups for ids the session
    // has not seen yet.
    let catalog = Arc::new(HttpCatalog::new(&config.access_token)?);
    let handler =
        EngineHandler::new(Arc::clone(&store), Arc::clone(&runner)).with_catalog(catalog);
    let server = TransferServer::new(ServerConfig { port: config.port }, handler);

    let server_run = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = server_run.run().await {
            tracing::error!("server error: {e}");
        }
    });

    // Wait for the server to bind.
    let port = loop {
        let p = server.port().await;
        if p > 0 {
            break p;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    };

    tracing::info!(port, "WebSocket server listening");
    tracing::info!("daemon ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");

    // Stop accepting triggers first, then let the batch wind down.
    runner.cancel();
    server.shutdown();

    Ok(())
}
