//! GCS驱动配置

use serde::{Deserialize, Serialize};

use crate::config::ConfigSource;

/// 公共访问URL默认前缀
pub const DEFAULT_PUBLIC_HOST: &str = "https://storage.googleapis.com";

/// GCS磁盘配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcsConfig {
    /// 项目ID
    #[serde(default)]
    pub project_id: String,
    /// 存储桶名称
    pub bucket: String,
    /// 服务账号JSON文件路径（为空时使用默认凭证）
    #[serde(default)]
    pub credentials: String,
    /// 公共访问URL（为空时使用 https://storage.googleapis.com/{bucket}）
    #[serde(default)]
    pub url: String,
}

impl GcsConfig {
    /// 读取 `filesystems.disks.{disk}.*`
    pub fn from_source(source: &dyn ConfigSource, disk: &str) -> Self {
        let key = |field: &str| format!("filesystems.disks.{}.{}", disk, field);

        Self {
            project_id: source.get_string(&key("project_id")),
            bucket: source.get_string(&key("bucket")),
            credentials: source.get_string(&key("credentials")),
            url: source.get_string(&key("url")),
        }
    }

    /// 公共访问URL（未配置时按bucket推导）
    pub fn base_url(&self) -> String {
        if self.url.is_empty() {
            format!("{}/{}", DEFAULT_PUBLIC_HOST, self.bucket)
        } else {
            self.url.clone()
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }
}
