// Driver package / 驱动包
pub mod gcs;

use crate::storage::StorageManager;

/// Register all drivers to StorageManager / 注册所有驱动
pub async fn register_all(manager: &StorageManager) -> anyhow::Result<()> {
    // Register Google Cloud Storage driver / 注册GCS驱动
    manager.register_factory(Box::new(gcs::GcsDriverFactory)).await?;
    Ok(())
}
