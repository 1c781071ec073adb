use anyhow::Result;
use archive_uploader::{LocalStore, Uploader, config::AppConfig};
use std::{fs, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!("Starting archive-uploader with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Wire store + cancellation ---
    let store = LocalStore::new(&cfg.storage_dir);
    store.create_bucket(&cfg.upload.bucket).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            on_signal.cancel();
        }
    });

    let uploader = Uploader::new(Arc::new(store), cfg.upload.clone()).with_cancellation(cancel);
    match uploader.build_and_upload(&cfg.sources, &cfg.output_key).await {
        Ok(location) => {
            println!("{}", location.url);
            Ok(())
        }
        Err(err) => {
            tracing::error!(kind = ?err.kind(), "upload failed: {}", err);
            if let Some(abort_err) = err.abort_failure() {
                tracing::error!("abort also failed: {}", abort_err);
            }
            Err(err.into())
        }
    }
}
