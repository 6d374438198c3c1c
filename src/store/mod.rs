pub mod disk;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::error::StoreError;
use anyhow::{Context, Result};
use disk::DiskStore;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(200);
const LOCK_WAIT: Duration = Duration::from_secs(60);

/// Opens the persistent store under the configured data directory, waiting
/// for another process that holds it to finish.
pub async fn open_disk_store(config: &AppConfig) -> Result<Arc<DiskStore>> {
    let path = config.default_data_path()?.join("store");
    let store = open_when_free(&path, LOCK_WAIT)
        .await
        .with_context(|| format!("Failed to open price store at {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn open_when_free(path: &Path, wait: Duration) -> Result<DiskStore, StoreError> {
    let deadline = Instant::now() + wait;
    let mut announced = false;
    loop {
        match DiskStore::open(path) {
            Err(StoreError::Locked { .. }) if Instant::now() < deadline => {
                if !announced {
                    info!("Price store is in use, waiting for it to be released");
                    announced = true;
                }
                tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
            }
            result => return result,
        }
    }
}
