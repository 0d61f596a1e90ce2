//! Facade accessors / 门面访问

use anyhow::Result;

use crate::storage::{DriverBox, StorageManager};

/// Driver bound to `disk` / 获取磁盘驱动
pub async fn gcs(manager: &StorageManager, disk: &str) -> Result<DriverBox> {
    manager.disk(disk).await
}
