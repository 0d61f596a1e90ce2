//! GCS写入器 - 通过有界管道边写边传
//!
//! 写入端与后台上传任务之间是一个固定容量的内存管道，内存占用与对象大小无关。
//! 只有调用 `shutdown` 才会提交对象；未关闭即丢弃时上传失败，数据被丢弃。

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;

use super::client::{ObjectClient, ObjectMeta, UploadBody};
use super::error::GcsError;
use crate::storage::{OpContext, Scoped};

/// 管道容量
pub const PIPE_CAPACITY: usize = 256 * 1024;

/// 上传端读取器：未提交时遇到EOF视为中止
struct CommitGate {
    inner: DuplexStream,
    committed: Arc<AtomicBool>,
}

impl AsyncRead for CommitGate {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let wanted = buf.remaining();
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {}
            other => return other,
        }

        let eof = wanted > 0 && buf.filled().len() == before;
        if eof && !this.committed.load(Ordering::Acquire) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "writer dropped before shutdown",
            )));
        }
        Poll::Ready(Ok(()))
    }
}

/// Streaming object writer; the object is committed on `shutdown`.
pub struct ObjectWriter {
    name: String,
    pipe: Option<Scoped<DuplexStream>>,
    upload: Option<JoinHandle<Result<ObjectMeta, GcsError>>>,
    committed: Arc<AtomicBool>,
    written: u64,
    finished: bool,
}

impl ObjectWriter {
    /// Starts the upload task; must be called inside a runtime.
    pub fn new(
        client: Arc<dyn ObjectClient>,
        context: OpContext,
        bucket: impl Into<String>,
        name: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        let bucket = bucket.into();
        let name = name.into();
        let committed = Arc::new(AtomicBool::new(false));
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

        let body = CommitGate {
            inner: reader,
            committed: committed.clone(),
        };
        let task_context = context.clone();
        let task_name = name.clone();
        let upload = tokio::spawn(async move {
            task_context
                .run(client.upload(
                    &bucket,
                    &task_name,
                    UploadBody::Reader(Box::new(body)),
                    content_type.as_deref(),
                ))
                .await
        });

        Self {
            name,
            pipe: Some(context.scope(writer)),
            upload: Some(upload),
            committed,
            written: 0,
            finished: false,
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "GCS写入器已关闭")
}

impl AsyncWrite for ObjectWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Err(closed_error()));
        }
        let pipe = match this.pipe.as_mut() {
            Some(pipe) => pipe,
            None => return Poll::Ready(Err(closed_error())),
        };

        let res = Pin::new(pipe).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = res {
            this.written += n as u64;
        }
        res
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().pipe.as_mut() {
            Some(pipe) => Pin::new(pipe).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Some(pipe) = this.pipe.as_mut() {
            this.committed.store(true, Ordering::Release);
            match Pin::new(pipe).poll_shutdown(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => {
                    this.committed.store(false, Ordering::Release);
                    return Poll::Ready(Err(e));
                }
                Poll::Pending => return Poll::Pending,
            }
            // 关闭写入端，上传任务读到EOF后提交
            this.pipe = None;
            tracing::debug!("GCS写入器关闭: 提交 {} ({} bytes)", this.name, this.written);
        }

        let upload = match this.upload.as_mut() {
            Some(upload) => upload,
            None => return Poll::Ready(Ok(())),
        };
        let result = match Pin::new(upload).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };
        this.upload = None;
        this.finished = true;

        Poll::Ready(match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(GcsError::Io(e))) => Err(e),
            Ok(Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e)),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        })
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if !self.finished && self.pipe.is_some() {
            tracing::warn!(
                "GCS写入器未关闭即被丢弃，已写入的 {} bytes 不会提交: {}",
                self.written,
                self.name
            );
        }
    }
}
