//! Startup preparation that must succeed before traffic is accepted.

use std::io;

use crate::config::UploadConfig;

/// Create the upload storage directory (and parents) if missing.
///
/// A missing static directory is only logged; the asset route then answers
/// 404 without taking the upload route down.
pub async fn prepare_storage(config: &UploadConfig) -> io::Result<()> {
    tokio::fs::create_dir_all(&config.storage_dir).await?;
    tracing::info!(path = %config.storage_dir.display(), "Upload storage ready");

    if !tokio::fs::try_exists(&config.static_dir).await.unwrap_or(false) {
        tracing::warn!(path = %config.static_dir.display(), "Static asset directory not found");
    }
    Ok(())
}
