use async_trait::async_trait;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Storage driver interface (filesystem-style operations over one disk) / 存储驱动接口
///
/// Paths are object keys relative to the disk root; a single leading `/` is
/// ignored. Directories are pseudo-directories inferred from `/`-separated keys.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Driver name / 驱动名称
    fn name(&self) -> &str;

    /// New driver sharing this one's configuration but running every
    /// operation under `ctx` / 使用新上下文的驱动副本
    fn with_context(&self, ctx: OpContext) -> DriverBox;

    /// Every file under `path`, recursively / 递归列出全部文件
    async fn all_files(&self, path: &str) -> Result<Vec<String>>;

    /// Every directory under `path`, recursively / 递归列出全部目录
    async fn all_directories(&self, path: &str) -> Result<Vec<String>>;

    /// Files directly inside `path` / 列出当前目录文件
    async fn files(&self, path: &str) -> Result<Vec<String>>;

    /// Directories directly inside `path` / 列出当前目录子目录
    async fn directories(&self, path: &str) -> Result<Vec<String>>;

    /// Copy a file / 复制文件
    async fn copy(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Delete files; missing files are ignored / 删除文件
    async fn delete(&self, paths: &[&str]) -> Result<()>;

    /// Delete a directory with everything below it / 删除目录
    async fn delete_directory(&self, path: &str) -> Result<()>;

    /// Whether a file exists / 文件是否存在
    async fn exists(&self, path: &str) -> bool;

    /// Whether a file is missing / 文件是否不存在
    async fn missing(&self, path: &str) -> bool {
        !self.exists(path).await
    }

    /// Open file reader / 打开文件读取器
    async fn open_reader(&self, path: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>>;

    /// Read whole file / 读取完整文件
    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.open_reader(path).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Read whole file as UTF-8 text / 读取文本文件
    async fn get(&self, path: &str) -> Result<String> {
        let data = self.get_bytes(path).await?;
        String::from_utf8(data).map_err(|e| anyhow!("File is not valid UTF-8: {}: {}", path, e))
    }

    /// Last modification time / 最后修改时间
    async fn last_modified(&self, path: &str) -> Result<DateTime<Utc>>;

    /// Stored MIME type / MIME类型
    async fn mime_type(&self, path: &str) -> Result<String>;

    /// File size in bytes / 文件大小
    async fn size(&self, path: &str) -> Result<u64>;

    /// Create directory / 创建目录
    async fn make_directory(&self, path: &str) -> Result<()>;

    /// Open file writer; data is committed on `shutdown` / 打开文件写入器
    async fn open_writer(
        &self,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<Box<dyn AsyncWrite + Unpin + Send>>;

    /// Put complete file data / 写入完整文件
    async fn put(&self, path: &str, content: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut writer = self.open_writer(path, None).await?;
        writer.write_all(content).await?;
        // 必须调用shutdown, 上传在关闭时完成
        writer.shutdown().await?;
        Ok(())
    }

    /// Store a source file under `dir` with a generated name, returns the key / 以随机名存储文件
    async fn put_file(&self, dir: &str, source: &dyn SourceFile) -> Result<String>;

    /// Store a source file under `dir` as `name`, returns the key / 以指定名存储文件
    async fn put_file_as(&self, dir: &str, source: &dyn SourceFile, name: &str) -> Result<String>;

    /// Move file / 移动文件
    async fn move_item(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Storage key for a path / 存储键
    fn path(&self, path: &str) -> String;

    /// Public URL / 公开访问URL
    fn url(&self, path: &str) -> String;

    /// Time-limited signed URL / 临时签名URL
    async fn temporary_url(&self, path: &str, expiry: DateTime<Utc>) -> Result<String>;
}

pub mod context;
pub mod file;
pub mod manager;

pub use context::{interrupted_reason, Interrupted, OpContext, Scoped};
pub use file::{LocalFile, SourceFile};
pub use manager::{DriverBox, DriverFactory, PublishFile, StorageManager};
