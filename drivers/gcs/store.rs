//! 基于 google-cloud-storage SDK 的对象客户端
//!
//! 传输、重试与认证均由SDK完成，这里只负责请求构造和结果转换。

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::rewrite::RewriteObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::objects::Object;
use google_cloud_storage::http::Error as StorageError;
use google_cloud_storage::sign::{SignedURLMethod, SignedURLOptions};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::{ReaderStream, StreamReader};

use super::client::{Connector, ListPage, ListQuery, ObjectClient, ObjectMeta, UploadBody};
use super::config::GcsConfig;
use super::credentials::ServiceAccount;
use super::error::GcsError;

const EMULATOR_ENV: &str = "STORAGE_EMULATOR_HOST";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
/// 下载时预读的数据块数
const READ_AHEAD_CHUNKS: usize = 4;

/// Object client backed by the GCS JSON API through the SDK.
#[derive(Clone)]
pub struct GcsClient {
    client: Client,
}

impl GcsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// SDK错误转换：404统一为 `NotFound`
fn map_error(err: StorageError, bucket: &str, name: &str) -> GcsError {
    match err {
        StorageError::Response(response) if response.code == 404 => GcsError::not_found(bucket, name),
        StorageError::Response(response) => GcsError::Api {
            status: response.code as u16,
            message: response.message,
        },
        other => GcsError::Storage(other),
    }
}

fn object_meta(object: Object) -> ObjectMeta {
    ObjectMeta {
        size: u64::try_from(object.size).unwrap_or(0),
        content_type: object.content_type,
        updated: object
            .updated
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.unix_timestamp(), t.nanosecond())),
        name: object.name,
    }
}

#[async_trait]
impl ObjectClient for GcsClient {
    async fn list_page(&self, bucket: &str, query: &ListQuery) -> Result<ListPage, GcsError> {
        let req = ListObjectsRequest {
            bucket: bucket.to_string(),
            prefix: Some(query.prefix.clone()).filter(|p| !p.is_empty()),
            delimiter: query.delimiter.clone(),
            page_token: query.page_token.clone(),
            ..Default::default()
        };
        let response = self
            .client
            .list_objects(&req)
            .await
            .map_err(|e| map_error(e, bucket, &query.prefix))?;

        Ok(ListPage {
            objects: response
                .items
                .unwrap_or_default()
                .into_iter()
                .map(object_meta)
                .collect(),
            prefixes: response.prefixes.unwrap_or_default(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn stat(&self, bucket: &str, name: &str) -> Result<ObjectMeta, GcsError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: name.to_string(),
            ..Default::default()
        };
        let object = self
            .client
            .get_object(&req)
            .await
            .map_err(|e| map_error(e, bucket, name))?;
        Ok(object_meta(object))
    }

    async fn reader(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, GcsError> {
        let client = self.client.clone();
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: name.to_string(),
            ..Default::default()
        };
        let (opened_tx, opened_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel::<io::Result<bytes::Bytes>>(READ_AHEAD_CHUNKS);

        // 下载流借用了请求，由后台任务持有并转发数据块；读取端丢弃后任务随之结束
        tokio::spawn(async move {
            let stream = match client.download_streamed_object(&req, &Range::default()).await {
                Ok(stream) => {
                    let _ = opened_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };

            let mut stream = Box::pin(stream);
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e));
                let failed = chunk.is_err();
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
        });

        match opened_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(map_error(e, bucket, name)),
            Err(_) => {
                return Err(GcsError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "download task ended before the response arrived",
                )))
            }
        }

        let chunks = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        Ok(Box::new(StreamReader::new(Box::pin(chunks))))
    }

    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        body: UploadBody,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta, GcsError> {
        let req = UploadObjectRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };
        let mut media = Media::new(name.to_string());
        media.content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string().into();

        let result = match body {
            UploadBody::Bytes(data) => {
                media.content_length = Some(data.len() as u64);
                self.client
                    .upload_object(&req, data, &UploadType::Simple(media))
                    .await
            }
            UploadBody::Reader(reader) => {
                self.client
                    .upload_streamed_object(&req, ReaderStream::new(reader), &UploadType::Simple(media))
                    .await
            }
        };

        let object = result.map_err(|e| map_error(e, bucket, name))?;
        Ok(object_meta(object))
    }

    async fn copy(&self, bucket: &str, src: &str, dst: &str) -> Result<(), GcsError> {
        let mut req = RewriteObjectRequest {
            source_bucket: bucket.to_string(),
            source_object: src.to_string(),
            destination_bucket: bucket.to_string(),
            destination_object: dst.to_string(),
            ..Default::default()
        };

        // 大对象的rewrite分多次完成，需带上rewrite_token继续
        loop {
            let response = self
                .client
                .rewrite_object(&req)
                .await
                .map_err(|e| map_error(e, bucket, src))?;
            if response.done {
                return Ok(());
            }
            match response.rewrite_token {
                Some(token) => req.rewrite_token = Some(token),
                None => {
                    return Err(GcsError::Decode(
                        "rewrite not done but no rewrite token returned".to_string(),
                    ))
                }
            }
        }
    }

    async fn delete(&self, bucket: &str, name: &str) -> Result<(), GcsError> {
        let req = DeleteObjectRequest {
            bucket: bucket.to_string(),
            object: name.to_string(),
            ..Default::default()
        };
        self.client
            .delete_object(&req)
            .await
            .map_err(|e| map_error(e, bucket, name))
    }

    async fn signed_url(
        &self,
        bucket: &str,
        name: &str,
        expires_in: Duration,
    ) -> Result<String, GcsError> {
        let opts = SignedURLOptions {
            method: SignedURLMethod::GET,
            expires: expires_in,
            ..Default::default()
        };
        self.client
            .signed_url(bucket, name, None, None, opts)
            .await
            .map_err(|e| GcsError::Signing(e.to_string()))
    }
}

/// Builds [`GcsClient`]s. Credentials come from the disk's `credentials` path,
/// otherwise from Application Default Credentials.
#[derive(Debug, Clone, Default)]
pub struct GcsConnector {
    endpoint: Option<String>,
}

impl GcsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anonymous client against an emulator or test server / 指定端点（匿名访问）
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
        }
    }

    fn emulator_endpoint(&self) -> Option<String> {
        self.endpoint.clone().or_else(|| {
            let host = std::env::var(EMULATOR_ENV).ok().filter(|h| !h.is_empty())?;
            if host.starts_with("http://") || host.starts_with("https://") {
                Some(host)
            } else {
                Some(format!("http://{}", host))
            }
        })
    }

    async fn client_config(&self, config: &GcsConfig) -> Result<ClientConfig, GcsError> {
        if let Some(endpoint) = self.emulator_endpoint() {
            let mut client_config = ClientConfig::default().anonymous();
            client_config.storage_endpoint = endpoint;
            return Ok(client_config);
        }

        if config.has_credentials() {
            // 先用本地加载器校验，得到具体的凭证错误
            ServiceAccount::load(&config.credentials)?;
            let file = CredentialsFile::new_from_file(config.credentials.clone())
                .await
                .map_err(|e| GcsError::Init(format!("failed to load credentials: {}", e)))?;
            return ClientConfig::default()
                .with_credentials(file)
                .await
                .map_err(|e| GcsError::Init(e.to_string()));
        }

        // 默认凭证链：GOOGLE_APPLICATION_CREDENTIALS、gcloud配置、元数据服务器
        ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| GcsError::Init(e.to_string()))
    }
}

#[async_trait]
impl Connector for GcsConnector {
    async fn connect(&self, config: &GcsConfig) -> Result<Arc<dyn ObjectClient>, GcsError> {
        if config.bucket.is_empty() {
            return Err(GcsError::Init("bucket is not configured".to_string()));
        }

        let client_config = self.client_config(config).await?;
        tracing::info!(
            "GCS client initialized: bucket={}, endpoint={}",
            config.bucket,
            client_config.storage_endpoint
        );
        Ok(Arc::new(GcsClient::new(Client::new(client_config))))
    }
}
