//! 对象存储客户端抽象
//!
//! 驱动只依赖这几个原语；SDK实现见 `store.rs`，内存实现见 `memory.rs`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use super::config::GcsConfig;
use super::error::GcsError;

/// Listing query for one page.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub prefix: String,
    /// Group keys by this delimiter into `prefixes` / 分隔符
    pub delimiter: Option<String>,
    pub page_token: Option<String>,
}

/// One page of listing results.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    /// Common prefixes, each ending with the delimiter / 公共前缀
    pub prefixes: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Object metadata.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

/// Upload payload.
pub enum UploadBody {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

/// Object storage primitives used by the driver.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn list_page(&self, bucket: &str, query: &ListQuery) -> Result<ListPage, GcsError>;

    /// Metadata; `NotFound` when the object doesn't exist.
    async fn stat(&self, bucket: &str, name: &str) -> Result<ObjectMeta, GcsError>;

    async fn reader(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, GcsError>;

    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        body: UploadBody,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta, GcsError>;

    /// Server-side copy within the bucket.
    async fn copy(&self, bucket: &str, src: &str, dst: &str) -> Result<(), GcsError>;

    /// Delete; `NotFound` when the object doesn't exist.
    async fn delete(&self, bucket: &str, name: &str) -> Result<(), GcsError>;

    /// Signed GET URL valid for `expires_in` / 生成GET签名URL
    async fn signed_url(
        &self,
        bucket: &str,
        name: &str,
        expires_in: Duration,
    ) -> Result<String, GcsError>;
}

/// Builds the client for a disk on first use.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &GcsConfig) -> Result<Arc<dyn ObjectClient>, GcsError>;
}
