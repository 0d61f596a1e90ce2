//! GCS驱动工厂

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::driver::GcsDriver;
use crate::config::ConfigSource;
use crate::storage::{DriverFactory, StorageDriver};

/// Binding key of the GCS driver / 驱动绑定名
pub const DRIVER_TYPE: &str = "gcs";

/// Creates a [`GcsDriver`] per call; parameters: `{"disk": "<name>"}`.
pub struct GcsDriverFactory;

impl DriverFactory for GcsDriverFactory {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    fn create_driver(&self, config: &dyn ConfigSource, params: &Value) -> Result<Box<dyn StorageDriver>> {
        let disk = params
            .get("disk")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("[gcs] disk parameter is required and must be a string"))?;

        tracing::debug!("创建GCS驱动: disk={}", disk);
        Ok(Box::new(GcsDriver::new(config, disk)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonConfig;
    use serde_json::json;

    #[test]
    fn test_create_driver() {
        let config = JsonConfig::new(json!({
            "filesystems": { "disks": { "gcs": { "driver": "gcs", "bucket": "media" } } }
        }));

        let driver = GcsDriverFactory
            .create_driver(&config, &json!({ "disk": "gcs" }))
            .unwrap();
        assert_eq!(driver.name(), "gcs");
        assert_eq!(driver.url("/a.txt"), "https://storage.googleapis.com/media/a.txt");
    }

    #[test]
    fn test_disk_parameter_required() {
        let config = JsonConfig::new(json!({}));
        assert!(GcsDriverFactory.create_driver(&config, &json!({})).is_err());
        assert!(GcsDriverFactory.create_driver(&config, &json!({ "disk": 1 })).is_err());
    }
}
