//! Host configuration module / 宿主配置模块
//!
//! Drivers read their disk settings through [`ConfigSource`], which the host
//! injects into the [`StorageManager`](crate::storage::StorageManager).
//! [`JsonConfig`] is the bundled implementation: a JSON document addressed
//! with dotted keys, with `${VAR}` placeholders expanded from the environment.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

static ENV_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern")
});

/// Read-only access to host configuration / 宿主配置访问接口
pub trait ConfigSource: Send + Sync {
    /// Look up a dotted key, e.g. `filesystems.disks.gcs.bucket` / 按点分键查找
    fn get(&self, key: &str) -> Option<Value>;

    /// Look up a key as string; missing keys and non-scalar values yield "" / 以字符串读取
    fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}

/// JSON-backed configuration / 基于JSON的配置
#[derive(Debug, Default)]
pub struct JsonConfig {
    root: RwLock<Value>,
}

impl JsonConfig {
    pub fn new(root: Value) -> Self {
        Self { root: RwLock::new(root) }
    }

    /// Load configuration from a JSON file / 从文件加载配置
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let root: Value = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(Self::new(root))
    }

    /// Set a dotted key, creating intermediate objects / 设置配置项
    pub fn set(&self, key: &str, value: Value) {
        let mut root = self.root.write();
        let mut node = &mut *root;

        for part in key.split('.') {
            if !node.is_object() {
                *node = Value::Object(Default::default());
            }
            node = match node {
                Value::Object(obj) => obj.entry(part.to_string()).or_insert(Value::Null),
                _ => return,
            };
        }
        *node = value;
    }
}

impl ConfigSource for JsonConfig {
    fn get(&self, key: &str) -> Option<Value> {
        let root = self.root.read();
        let mut node = &*root;
        for part in key.split('.') {
            node = node.get(part)?;
        }

        match node {
            Value::Null => None,
            Value::String(s) => Some(Value::String(expand_env(s))),
            other => Some(other.clone()),
        }
    }
}

/// Expand `${VAR}` placeholders; unset variables become "" / 展开环境变量占位符
pub fn expand_env(raw: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(raw, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
