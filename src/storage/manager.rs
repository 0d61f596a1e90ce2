use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::StorageDriver;
use crate::config::ConfigSource;

pub type DriverBox = Arc<Box<dyn StorageDriver>>;

/// Driver factory trait / 驱动工厂 trait
pub trait DriverFactory: Send + Sync {
    /// Binding key the factory is registered under / 驱动类型名称
    fn driver_type(&self) -> &'static str;

    /// Create a fresh driver instance / 创建驱动实例
    fn create_driver(&self, config: &dyn ConfigSource, params: &Value) -> Result<Box<dyn StorageDriver>>;
}

/// A file a package can publish into the host's config directory / 可发布的文件
#[derive(Debug, Clone)]
pub struct PublishFile {
    /// Target file name relative to the config directory / 目标文件名
    pub target: String,
    pub contents: String,
}

/// Storage manager (driver registry and disk resolution) / 存储管理器
#[derive(Clone)]
pub struct StorageManager {
    config: Arc<dyn ConfigSource>,
    factories: Arc<RwLock<HashMap<String, Arc<Box<dyn DriverFactory>>>>>,
    publishes: Arc<RwLock<HashMap<String, Vec<PublishFile>>>>,
    config_dir: PathBuf,
}

impl StorageManager {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self {
            config,
            factories: Arc::new(RwLock::new(HashMap::new())),
            publishes: Arc::new(RwLock::new(HashMap::new())),
            config_dir: PathBuf::from("config"),
        }
    }

    /// Directory published files are written to / 配置发布目录
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn config(&self) -> &dyn ConfigSource {
        self.config.as_ref()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Register driver factory / 注册驱动工厂
    pub async fn register_factory(&self, factory: Box<dyn DriverFactory>) -> Result<()> {
        let driver_type = factory.driver_type().to_string();

        let mut factories = self.factories.write().await;
        factories.insert(driver_type.clone(), Arc::new(factory));

        tracing::info!("Driver factory registered: {}", driver_type);
        Ok(())
    }

    /// Build a new driver from a binding and parameters / 按绑定名创建驱动
    pub async fn make_with(&self, binding: &str, params: Value) -> Result<DriverBox> {
        let factory = {
            let factories = self.factories.read().await;
            factories
                .get(binding)
                .cloned()
                .ok_or_else(|| anyhow!("Driver type not found: {}", binding))?
        };

        let driver = factory.create_driver(self.config.as_ref(), &params)?;
        Ok(Arc::new(driver))
    }

    /// Driver for a configured disk (`filesystems.disks.{name}.driver`) / 按磁盘名获取驱动
    pub async fn disk(&self, name: &str) -> Result<DriverBox> {
        let driver_type = self
            .config
            .get_string(&format!("filesystems.disks.{}.driver", name));
        if driver_type.is_empty() {
            return Err(anyhow!("Disk not configured: {}", name));
        }

        self.make_with(&driver_type, json!({ "disk": name })).await
    }

    /// Driver for `filesystems.default` / 默认磁盘
    pub async fn default_disk(&self) -> Result<DriverBox> {
        let name = self.config.get_string("filesystems.default");
        if name.is_empty() {
            return Err(anyhow!("Default disk not configured"));
        }
        self.disk(&name).await
    }

    /// List all available driver types / 列出所有可用的驱动类型
    pub async fn list_driver_types(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        factories.keys().cloned().collect()
    }

    /// Register files a package publishes / 注册包的发布文件
    pub async fn publishes(&self, package: &str, files: Vec<PublishFile>) {
        let mut publishes = self.publishes.write().await;
        publishes.entry(package.to_string()).or_default().extend(files);
    }

    /// Write a package's files into the config directory; existing files are
    /// kept unless `force` / 发布配置文件
    pub async fn publish(&self, package: &str, force: bool) -> Result<Vec<PathBuf>> {
        let files = {
            let publishes = self.publishes.read().await;
            publishes
                .get(package)
                .cloned()
                .ok_or_else(|| anyhow!("Nothing to publish for package: {}", package))?
        };

        tokio::fs::create_dir_all(&self.config_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.config_dir.display()))?;

        let mut written = Vec::new();
        for file in files {
            let target = self.config_dir.join(&file.target);
            if !force && tokio::fs::try_exists(&target).await.unwrap_or(false) {
                tracing::info!("Publish skipped, file exists: {}", target.display());
                continue;
            }

            tokio::fs::write(&target, file.contents.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;
            tracing::info!("Published: {}", target.display());
            written.push(target);
        }
        Ok(written)
    }
}
