//! Operation context / 操作上下文
//!
//! A driver carries one [`OpContext`]; every backend call it issues is raced
//! against the context's cancellation token and deadline.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Why an operation was interrupted / 操作中断原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation token plus optional deadline / 取消令牌与截止时间
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a caller-owned cancellation token / 绑定调用方的取消令牌
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run a future under this context / 在上下文中执行
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Interrupted>,
    {
        if self.token.is_cancelled() {
            return Err(Interrupted::Cancelled.into());
        }

        let guarded = async {
            tokio::select! {
                _ = self.token.cancelled() => Err(Interrupted::Cancelled.into()),
                res = fut => res,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .unwrap_or_else(|_| Err(Interrupted::DeadlineExceeded.into())),
            None => guarded.await,
        }
    }

    /// Bind a reader or writer to this context / 将读写流绑定到上下文
    ///
    /// Every poll after cancellation or past the deadline fails with an
    /// `io::Error` wrapping [`Interrupted`]. Must be called inside a runtime.
    pub fn scope<T>(&self, inner: T) -> Scoped<T> {
        Scoped {
            inner,
            cancelled: Box::pin(self.token.clone().cancelled_owned()),
            deadline: self.deadline.map(|d| Box::pin(tokio::time::sleep_until(d))),
        }
    }
}

impl From<Interrupted> for io::Error {
    fn from(reason: Interrupted) -> Self {
        let kind = match reason {
            Interrupted::Cancelled => io::ErrorKind::Other,
            Interrupted::DeadlineExceeded => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, reason)
    }
}

/// Stream bound to an [`OpContext`] / 受上下文约束的读写流
pub struct Scoped<T> {
    inner: T,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<T> Scoped<T> {
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn check(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Err(Interrupted::Cancelled.into());
        }
        if let Some(deadline) = self.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                return Err(Interrupted::DeadlineExceeded.into());
            }
        }
        Ok(())
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Scoped<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.check(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Scoped<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(e) = this.check(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.check(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.check(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

/// The [`Interrupted`] reason carried by an I/O error, if any / 提取中断原因
pub fn interrupted_reason(err: &io::Error) -> Option<Interrupted> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<Interrupted>())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Interrupted(Interrupted),
    }

    impl From<Interrupted> for TestError {
        fn from(e: Interrupted) -> Self {
            TestError::Interrupted(e)
        }
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = OpContext::new();
        let res: Result<u32, TestError> = ctx.run(async { Ok(7) }).await;
        assert_eq!(res, Ok(7));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let token = CancellationToken::new();
        let ctx = OpContext::with_token(token.clone());
        token.cancel();

        let res: Result<u32, TestError> = ctx.run(async { Ok(1) }).await;
        assert_eq!(res, Err(TestError::Interrupted(Interrupted::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_cancelled_while_pending() {
        let token = CancellationToken::new();
        let ctx = OpContext::with_token(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let res: Result<(), TestError> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert_eq!(res, Err(TestError::Interrupted(Interrupted::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_deadline() {
        let ctx = OpContext::new().with_timeout(Duration::from_millis(10));
        let res: Result<(), TestError> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert_eq!(res, Err(TestError::Interrupted(Interrupted::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_scoped_read_stops_after_cancel() {
        let token = CancellationToken::new();
        let ctx = OpContext::with_token(token.clone());
        let mut reader = ctx.scope(&b"0123456789"[..]);

        let mut head = [0u8; 4];
        reader.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"0123");

        token.cancel();
        let mut rest = Vec::new();
        let err = reader.read_to_end(&mut rest).await.unwrap_err();
        assert_eq!(interrupted_reason(&err), Some(Interrupted::Cancelled));
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_read_deadline() {
        let (_tx, rx) = tokio::io::duplex(16);
        let ctx = OpContext::new().with_timeout(Duration::from_millis(10));
        let mut reader = ctx.scope(rx);

        // 对端从不写入，读取只能因截止时间结束
        let mut buf = Vec::new();
        let err = reader.read_to_end(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(interrupted_reason(&err), Some(Interrupted::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_scoped_write_after_cancel() {
        let token = CancellationToken::new();
        let ctx = OpContext::with_token(token.clone());
        let mut writer = ctx.scope(Vec::new());

        writer.write_all(b"ok").await.unwrap();
        token.cancel();
        let err = writer.write_all(b"late").await.unwrap_err();
        assert_eq!(interrupted_reason(&err), Some(Interrupted::Cancelled));
        assert_eq!(writer.into_inner(), b"ok".to_vec());
    }
}
