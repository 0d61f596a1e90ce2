//! Uploaded source file abstraction / 上传源文件抽象

use anyhow::{anyhow, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Length of generated file names (without extension) / 随机文件名长度
const HASH_NAME_LEN: usize = 40;

/// A file on local disk waiting to be stored on a disk / 待上传的本地文件
pub trait SourceFile: Send + Sync {
    /// Local path of the file content / 文件本地路径
    fn path(&self) -> &Path;

    /// Random file name keeping the extension / 保留扩展名的随机文件名
    fn hash_name(&self) -> String {
        let name: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(HASH_NAME_LEN)
            .map(char::from)
            .collect();

        match self.extension() {
            Ok(ext) if !ext.is_empty() => format!("{}.{}", name, ext),
            _ => name,
        }
    }

    /// File extension without the dot / 文件扩展名
    fn extension(&self) -> Result<String>;

    /// Detected MIME type / MIME类型
    fn mime_type(&self) -> Result<String>;
}

/// Source file backed by a local path / 本地路径文件
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    /// Name the client sent; preferred for extension detection / 客户端原始文件名
    client_name: Option<String>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), client_name: None }
    }

    /// Temp files usually lack an extension, so keep the original name / 保留原始文件名
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    fn name_for_detection(&self) -> PathBuf {
        match self.client_name {
            Some(ref name) => PathBuf::from(name),
            None => self.path.clone(),
        }
    }
}

impl SourceFile for LocalFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn extension(&self) -> Result<String> {
        let name = self.name_for_detection();
        if let Some(ext) = name.extension().and_then(|e| e.to_str()) {
            return Ok(ext.to_lowercase());
        }

        Err(anyhow!("unknown file extension: {:?}", name))
    }

    fn mime_type(&self) -> Result<String> {
        let mime = mime_guess::from_path(self.name_for_detection()).first_or_octet_stream();
        Ok(mime.essence_str().to_string())
    }
}
