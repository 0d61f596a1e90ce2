//! 内存对象存储（测试与本地开发使用）

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::client::{Connector, ListPage, ListQuery, ObjectClient, ObjectMeta, UploadBody};
use super::config::GcsConfig;
use super::error::GcsError;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    updated: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    /// bucket -> (name -> object)
    buckets: RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    /// Names whose mutations fail with a 503 / 注入故障的对象
    failing: RwLock<HashSet<String>>,
}

/// In-memory object store; clones share state.
#[derive(Clone)]
pub struct MemoryClient {
    inner: Arc<Inner>,
    page_size: usize,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Smaller pages exercise pagination / 设置分页大小
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make upload/copy/delete of `name` fail / 注入故障
    pub fn inject_failure(&self, name: &str) {
        self.inner.failing.write().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.inner.failing.write().clear();
    }

    /// Number of objects in a bucket / 对象数量
    pub fn object_count(&self, bucket: &str) -> usize {
        self.inner
            .buckets
            .read()
            .get(bucket)
            .map(|objects| objects.len())
            .unwrap_or(0)
    }

    fn check_failure(&self, name: &str) -> Result<(), GcsError> {
        if self.inner.failing.read().contains(name) {
            return Err(GcsError::Api {
                status: 503,
                message: format!("injected failure for {}", name),
            });
        }
        Ok(())
    }

    fn meta(name: &str, obj: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            name: name.to_string(),
            size: obj.data.len() as u64,
            content_type: obj.content_type.clone(),
            updated: Some(obj.updated),
        }
    }
}

/// Listing entry before pagination.
enum Listed {
    Object(ObjectMeta),
    Prefix(String),
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn list_page(&self, bucket: &str, query: &ListQuery) -> Result<ListPage, GcsError> {
        let buckets = self.inner.buckets.read();
        let objects = match buckets.get(bucket) {
            Some(objects) => objects,
            None => return Ok(ListPage::default()),
        };

        // BTreeMap有序，对象与公共前缀按名称顺序合并
        let mut seen_prefixes = BTreeSet::new();
        let mut entries: Vec<Listed> = Vec::new();
        for (name, obj) in objects.range(query.prefix.clone()..) {
            if !name.starts_with(&query.prefix) {
                break;
            }

            let rest = &name[query.prefix.len()..];
            if let Some(delim) = query.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(pos) = rest.find(delim) {
                    let prefix = format!("{}{}", query.prefix, &rest[..pos + delim.len()]);
                    if seen_prefixes.insert(prefix.clone()) {
                        entries.push(Listed::Prefix(prefix));
                    }
                    continue;
                }
            }
            entries.push(Listed::Object(Self::meta(name, obj)));
        }

        let total = entries.len();
        let start = match query.page_token {
            Some(ref token) => token.parse::<usize>().map_err(|_| GcsError::Api {
                status: 400,
                message: format!("invalid page token {}", token),
            })?,
            None => 0,
        }
        .min(total);
        let end = (start + self.page_size).min(total);

        let mut page = ListPage::default();
        for entry in entries.drain(start..end) {
            match entry {
                Listed::Object(meta) => page.objects.push(meta),
                Listed::Prefix(prefix) => page.prefixes.push(prefix),
            }
        }
        if end < total {
            page.next_page_token = Some(end.to_string());
        }
        Ok(page)
    }

    async fn stat(&self, bucket: &str, name: &str) -> Result<ObjectMeta, GcsError> {
        let buckets = self.inner.buckets.read();
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(name))
            .map(|obj| Self::meta(name, obj))
            .ok_or_else(|| GcsError::not_found(bucket, name))
    }

    async fn reader(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, GcsError> {
        let data = {
            let buckets = self.inner.buckets.read();
            buckets
                .get(bucket)
                .and_then(|objects| objects.get(name))
                .map(|obj| obj.data.clone())
                .ok_or_else(|| GcsError::not_found(bucket, name))?
        };
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        body: UploadBody,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta, GcsError> {
        self.check_failure(name)?;

        let data = match body {
            UploadBody::Bytes(data) => data,
            UploadBody::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Bytes::from(buf)
            }
        };

        let obj = StoredObject {
            data,
            content_type: content_type.map(str::to_string),
            updated: Utc::now(),
        };
        let meta = Self::meta(name, &obj);
        self.inner
            .buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(name.to_string(), obj);
        Ok(meta)
    }

    async fn copy(&self, bucket: &str, src: &str, dst: &str) -> Result<(), GcsError> {
        self.check_failure(dst)?;

        let mut buckets = self.inner.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| GcsError::not_found(bucket, src))?;
        let mut obj = objects
            .get(src)
            .cloned()
            .ok_or_else(|| GcsError::not_found(bucket, src))?;
        obj.updated = Utc::now();
        objects.insert(dst.to_string(), obj);
        Ok(())
    }

    async fn delete(&self, bucket: &str, name: &str) -> Result<(), GcsError> {
        self.check_failure(name)?;

        self.inner
            .buckets
            .write()
            .get_mut(bucket)
            .and_then(|objects| objects.remove(name))
            .map(|_| ())
            .ok_or_else(|| GcsError::not_found(bucket, name))
    }

    /// Unsigned `memory://` URL carrying the requested lifetime / 内存实现不做签名
    async fn signed_url(
        &self,
        bucket: &str,
        name: &str,
        expires_in: Duration,
    ) -> Result<String, GcsError> {
        Ok(format!(
            "memory://{}/{}?expires_in={}",
            bucket,
            name,
            expires_in.as_secs()
        ))
    }
}

#[async_trait]
impl Connector for MemoryClient {
    async fn connect(&self, config: &GcsConfig) -> Result<Arc<dyn ObjectClient>, GcsError> {
        if config.bucket.is_empty() {
            return Err(GcsError::Init("bucket is not configured".to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(client: &MemoryClient, names: &[&str]) {
        for name in names {
            client
                .upload("b", name, UploadBody::Bytes(Bytes::from_static(b"x")), None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_with_delimiter() {
        let client = MemoryClient::new();
        seed(&client, &["dir/a", "dir/b", "dir/sub/c", "dir2/d", "top"]).await;

        let page = client
            .list_page("b", &ListQuery { prefix: "dir/".into(), delimiter: Some("/".into()), page_token: None })
            .await
            .unwrap();
        let names: Vec<_> = page.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["dir/a", "dir/b"]);
        assert_eq!(page.prefixes, vec!["dir/sub/".to_string()]);
        assert!(page.next_page_token.is_none());

        let all = client
            .list_page("b", &ListQuery { prefix: "".into(), delimiter: None, page_token: None })
            .await
            .unwrap();
        assert_eq!(all.objects.len(), 5);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let client = MemoryClient::new().with_page_size(2);
        seed(&client, &["p/1", "p/2", "p/3", "p/4", "p/5"]).await;

        let mut names = Vec::new();
        let mut query = ListQuery { prefix: "p/".into(), ..Default::default() };
        let mut pages = 0;
        loop {
            let page = client.list_page("b", &query).await.unwrap();
            pages += 1;
            names.extend(page.objects.into_iter().map(|o| o.name));
            match page.next_page_token {
                Some(token) => query.page_token = Some(token),
                None => break,
            }
        }
        assert_eq!(pages, 3);
        assert_eq!(names, vec!["p/1", "p/2", "p/3", "p/4", "p/5"]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let client = MemoryClient::new();
        let err = client.delete("b", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let client = MemoryClient::new();
        seed(&client, &["f"]).await;
        client.inject_failure("f");
        assert!(matches!(client.delete("b", "f").await, Err(GcsError::Api { status: 503, .. })));
        client.clear_failures();
        client.delete("b", "f").await.unwrap();
        assert_eq!(client.object_count("b"), 0);
    }
}
