//! Google Cloud Storage disk driver / GCS 磁盘驱动
//!
//! Filesystem-style operations (list, read, write, copy, move, delete, URLs)
//! over a GCS bucket, registered into a [`storage::StorageManager`] by disk name.

pub mod config;
pub mod facades;
pub mod provider;
pub mod storage;
pub mod utils;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use config::{ConfigSource, JsonConfig};
pub use drivers::gcs::{GcsConfig, GcsDriver, GcsDriverFactory, GcsError};
pub use provider::{GcsServiceProvider, ServiceProvider};
pub use storage::{DriverBox, OpContext, StorageDriver, StorageManager};

/// Register all storage drivers / 注册所有存储驱动
pub async fn register_storage_drivers(manager: &storage::StorageManager) -> anyhow::Result<()> {
    drivers::register_all(manager).await
}
