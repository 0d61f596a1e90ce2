//! GCS存储驱动
//!
//! 对象存储没有目录，目录由 `/` 分隔的键前缀推导；`make_directory` 写入
//! 以 `/` 结尾的零字节占位对象。

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;

use super::client::{Connector, ListPage, ListQuery, ObjectClient, UploadBody};
use super::config::GcsConfig;
use super::credentials::ServiceAccount;
use super::error::GcsError;
use super::store::GcsConnector;
use super::writer::ObjectWriter;
use crate::config::ConfigSource;
use crate::storage::{DriverBox, OpContext, SourceFile, StorageDriver};
use crate::utils::{dir_prefix, is_dir_marker, join_key, normalize_path, DELIMITER};

/// 目录占位对象的Content-Type
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
/// V4签名URL的最长有效期（7天）
pub const MAX_SIGNED_URL_SECS: i64 = 7 * 24 * 3600;

/// GCS磁盘驱动
pub struct GcsDriver {
    disk: String,
    config: Arc<GcsConfig>,
    connector: Arc<dyn Connector>,
    /// 首次使用时创建，与 `with_context` 副本共享
    client: Arc<OnceCell<Arc<dyn ObjectClient>>>,
    context: OpContext,
}

impl GcsDriver {
    /// Driver for `disk`, reading `filesystems.disks.{disk}.*` / 从主机配置创建
    pub fn new(source: &dyn ConfigSource, disk: &str) -> Self {
        Self::with_connector(disk, GcsConfig::from_source(source, disk), Arc::new(GcsConnector::new()))
    }

    /// Driver with an explicit client connector / 指定连接器
    pub fn with_connector(disk: &str, config: GcsConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            disk: disk.to_string(),
            config: Arc::new(config),
            connector,
            client: Arc::new(OnceCell::new()),
            context: OpContext::new(),
        }
    }

    pub fn config(&self) -> &GcsConfig {
        &self.config
    }

    pub fn context(&self) -> &OpContext {
        &self.context
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// 获取客户端（懒加载，失败后下次调用重试）
    async fn client(&self) -> Result<Arc<dyn ObjectClient>, GcsError> {
        let client = self
            .context
            .run(self.client.get_or_try_init(|| async {
                tracing::debug!("GCS磁盘 {} 初始化客户端", self.disk);
                self.connector.connect(&self.config).await
            }))
            .await?;
        Ok(client.clone())
    }

    /// 列出前缀下全部结果（自动翻页）
    async fn list_all(&self, prefix: &str, delimiter: Option<&str>) -> Result<ListPage, GcsError> {
        let client = self.client().await?;
        let mut query = ListQuery {
            prefix: prefix.to_string(),
            delimiter: delimiter.map(str::to_string),
            page_token: None,
        };

        let mut all = ListPage::default();
        loop {
            let page = self
                .context
                .run(client.list_page(self.bucket(), &query))
                .await?;
            all.objects.extend(page.objects);
            all.prefixes.extend(page.prefixes);

            match page.next_page_token {
                Some(token) => query.page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(
            "GCS列出 {}: {} 个对象, {} 个前缀",
            prefix,
            all.objects.len(),
            all.prefixes.len()
        );
        Ok(all)
    }

    /// 流式上传本地文件
    async fn upload_source(&self, key: &str, source: &dyn SourceFile) -> Result<()> {
        let client = self.client().await?;
        let file = tokio::fs::File::open(source.path())
            .await
            .map_err(|e| anyhow!("Failed to open {}: {}", source.path().display(), e))?;
        let content_type = source.mime_type().ok();

        tracing::debug!("GCS上传文件 {} -> {}", source.path().display(), key);
        self.context
            .run(client.upload(
                self.bucket(),
                key,
                UploadBody::Reader(Box::new(file)),
                content_type.as_deref(),
            ))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for GcsDriver {
    fn name(&self) -> &str {
        "gcs"
    }

    fn with_context(&self, ctx: OpContext) -> DriverBox {
        let driver: Box<dyn StorageDriver> = Box::new(GcsDriver {
            disk: self.disk.clone(),
            config: self.config.clone(),
            connector: self.connector.clone(),
            client: self.client.clone(),
            context: ctx,
        });
        Arc::new(driver)
    }

    async fn all_files(&self, path: &str) -> Result<Vec<String>> {
        let page = self.list_all(&dir_prefix(path), None).await?;
        Ok(page
            .objects
            .into_iter()
            .map(|o| o.name)
            .filter(|name| !is_dir_marker(name))
            .collect())
    }

    async fn all_directories(&self, path: &str) -> Result<Vec<String>> {
        let prefix = dir_prefix(path);
        let page = self.list_all(&prefix, None).await?;

        // 每个对象键的所有中间前缀都是目录
        let mut seen = HashSet::new();
        let mut directories = Vec::new();
        for object in &page.objects {
            let rest = &object.name[prefix.len()..];
            for (pos, _) in rest.match_indices(DELIMITER) {
                let dir = &object.name[..prefix.len() + pos];
                if seen.insert(dir.to_string()) {
                    directories.push(dir.to_string());
                }
            }
        }
        Ok(directories)
    }

    async fn files(&self, path: &str) -> Result<Vec<String>> {
        let page = self.list_all(&dir_prefix(path), Some(DELIMITER)).await?;
        Ok(page
            .objects
            .into_iter()
            .map(|o| o.name)
            .filter(|name| !is_dir_marker(name))
            .collect())
    }

    async fn directories(&self, path: &str) -> Result<Vec<String>> {
        let prefix = dir_prefix(path);
        let page = self.list_all(&prefix, Some(DELIMITER)).await?;

        let mut seen = HashSet::new();
        let mut directories = Vec::new();
        for p in page.prefixes {
            if p == prefix {
                continue;
            }
            let dir = p.strip_suffix(DELIMITER).unwrap_or(&p).to_string();
            if seen.insert(dir.clone()) {
                directories.push(dir);
            }
        }
        Ok(directories)
    }

    async fn copy(&self, old_path: &str, new_path: &str) -> Result<()> {
        let client = self.client().await?;
        self.context
            .run(client.copy(self.bucket(), normalize_path(old_path), normalize_path(new_path)))
            .await?;
        Ok(())
    }

    async fn delete(&self, paths: &[&str]) -> Result<()> {
        let client = self.client().await?;
        for path in paths {
            match self.context.run(client.delete(self.bucket(), normalize_path(path))).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!("GCS删除: {} 不存在，忽略", path);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let prefix = dir_prefix(path);
        let page = self.list_all(&prefix, None).await?;
        let client = self.client().await?;

        tracing::debug!("GCS删除目录 {}: {} 个对象", prefix, page.objects.len());
        for object in page.objects {
            match self.context.run(client.delete(self.bucket(), &object.name)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("GCS exists({}) 失败: {}", path, e);
                return false;
            }
        };

        match self.context.run(client.stat(self.bucket(), normalize_path(path))).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!("GCS exists({}) 失败: {}", path, e);
                false
            }
        }
    }

    async fn open_reader(&self, path: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
        let client = self.client().await?;
        let reader = self
            .context
            .run(client.reader(self.bucket(), normalize_path(path)))
            .await?;
        // 读取过程同样受上下文约束
        Ok(Box::new(self.context.scope(reader)))
    }

    async fn last_modified(&self, path: &str) -> Result<DateTime<Utc>> {
        let client = self.client().await?;
        let meta = self.context.run(client.stat(self.bucket(), normalize_path(path))).await?;
        meta.updated
            .ok_or_else(|| anyhow!("Object has no modification time: {}", path))
    }

    async fn mime_type(&self, path: &str) -> Result<String> {
        let client = self.client().await?;
        let meta = self.context.run(client.stat(self.bucket(), normalize_path(path))).await?;
        Ok(meta
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()))
    }

    async fn size(&self, path: &str) -> Result<u64> {
        let client = self.client().await?;
        let meta = self.context.run(client.stat(self.bucket(), normalize_path(path))).await?;
        Ok(meta.size)
    }

    async fn make_directory(&self, path: &str) -> Result<()> {
        let key = dir_prefix(path);
        if key.is_empty() {
            // 根目录总是存在
            return Ok(());
        }

        let mut writer = self.open_writer(&key, Some(DIRECTORY_CONTENT_TYPE)).await?;
        writer.shutdown().await?;
        Ok(())
    }

    async fn open_writer(
        &self,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
        let client = self.client().await?;
        Ok(Box::new(ObjectWriter::new(
            client,
            self.context.clone(),
            self.bucket(),
            normalize_path(path),
            content_type.map(str::to_string),
        )))
    }

    async fn put_file(&self, dir: &str, source: &dyn SourceFile) -> Result<String> {
        let key = join_key(dir, &source.hash_name());
        self.upload_source(&key, source).await?;
        Ok(key)
    }

    async fn put_file_as(&self, dir: &str, source: &dyn SourceFile, name: &str) -> Result<String> {
        let ext = source.extension()?;
        let name = if name.contains('.') || ext.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", name, ext)
        };

        let key = join_key(dir, &name);
        self.upload_source(&key, source).await?;
        Ok(key)
    }

    async fn move_item(&self, old_path: &str, new_path: &str) -> Result<()> {
        // 非原子：复制成功而删除失败时两份都在
        self.copy(old_path, new_path).await?;
        let client = self.client().await?;
        self.context
            .run(client.delete(self.bucket(), normalize_path(old_path)))
            .await?;
        Ok(())
    }

    fn path(&self, path: &str) -> String {
        normalize_path(path).to_string()
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url().trim_end_matches('/'),
            normalize_path(path)
        )
    }

    async fn temporary_url(&self, path: &str, expiry: DateTime<Utc>) -> Result<String> {
        let key = normalize_path(path);
        let client = self.client().await?;
        self.context.run(client.stat(self.bucket(), key)).await?;

        if !self.config.has_credentials() {
            return Err(GcsError::SigningUnavailable {
                bucket: self.config.bucket.clone(),
            }
            .into());
        }
        let account = ServiceAccount::load(&self.config.credentials).map_err(GcsError::from)?;

        let expires_in = (expiry - Utc::now()).num_seconds();
        if expires_in <= 0 {
            return Err(GcsError::Signing("expiry must be in the future".to_string()).into());
        }
        if expires_in > MAX_SIGNED_URL_SECS {
            return Err(GcsError::Signing(format!(
                "expiry must be within {} seconds, got {}",
                MAX_SIGNED_URL_SECS, expires_in
            ))
            .into());
        }

        tracing::debug!("GCS签名URL: {} ({}), {}s", key, account.identity(), expires_in);
        let url = self
            .context
            .run(client.signed_url(
                self.bucket(),
                key,
                std::time::Duration::from_secs(expires_in as u64),
            ))
            .await?;
        Ok(url)
    }
}
