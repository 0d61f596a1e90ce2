//! Service provider / 服务提供者
//!
//! Hooks the GCS driver into a host: `register` binds the driver factory,
//! `boot` offers the default disk configuration for publishing.

use anyhow::Result;
use async_trait::async_trait;

use crate::drivers;
use crate::storage::{PublishFile, StorageManager};

/// Binding of the GCS driver / GCS驱动绑定名
pub const BINDING: &str = drivers::gcs::DRIVER_TYPE;
/// Host configuration binding / 配置绑定
pub const CONFIG: &str = "config";
/// Host storage binding / 存储绑定
pub const STORAGE: &str = "storage";
/// Package name used for publishing / 发布包名
pub const PACKAGE: &str = "gcs-disk";

const CONFIG_TEMPLATE: &str = include_str!("../config/gcs.json");

/// What a provider binds, needs and extends / 绑定关系
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationship {
    pub bindings: Vec<String>,
    pub dependencies: Vec<String>,
    pub provide_for: Vec<String>,
}

/// Provider lifecycle / 服务提供者接口
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    fn relationship(&self) -> Relationship;

    /// Bind factories / 注册
    async fn register(&self, manager: &StorageManager) -> Result<()>;

    /// Runs after every provider registered / 启动
    async fn boot(&self, manager: &StorageManager) -> Result<()>;
}

/// GCS service provider / GCS服务提供者
#[derive(Debug, Clone, Copy, Default)]
pub struct GcsServiceProvider;

#[async_trait]
impl ServiceProvider for GcsServiceProvider {
    fn relationship(&self) -> Relationship {
        Relationship {
            bindings: vec![BINDING.to_string()],
            dependencies: vec![CONFIG.to_string()],
            provide_for: vec![STORAGE.to_string()],
        }
    }

    async fn register(&self, manager: &StorageManager) -> Result<()> {
        drivers::register_all(manager).await
    }

    async fn boot(&self, manager: &StorageManager) -> Result<()> {
        manager
            .publishes(
                PACKAGE,
                vec![PublishFile {
                    target: "gcs.json".to_string(),
                    contents: CONFIG_TEMPLATE.to_string(),
                }],
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, JsonConfig};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_relationship() {
        let rel = GcsServiceProvider.relationship();
        assert_eq!(rel.bindings, vec!["gcs"]);
        assert_eq!(rel.dependencies, vec!["config"]);
        assert_eq!(rel.provide_for, vec!["storage"]);
    }

    #[tokio::test]
    async fn test_register_and_boot() {
        let dir = tempfile::tempdir().unwrap();
        let config = JsonConfig::new(json!({
            "filesystems": { "disks": { "gcs": { "driver": "gcs", "bucket": "b" } } }
        }));
        let manager = StorageManager::new(Arc::new(config)).with_config_dir(dir.path());

        let provider = GcsServiceProvider;
        provider.register(&manager).await.unwrap();
        provider.boot(&manager).await.unwrap();

        assert_eq!(manager.disk("gcs").await.unwrap().name(), "gcs");

        let written = manager.publish(PACKAGE, false).await.unwrap();
        assert_eq!(written, vec![dir.path().join("gcs.json")]);

        let published = JsonConfig::load(&written[0]).unwrap();
        assert_eq!(published.get_string("filesystems.disks.gcs.driver"), "gcs");
    }
}
