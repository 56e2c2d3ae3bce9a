//! Write coalescing for chatty upstream connections.
//!
//! # Responsibilities
//! - Hold small writes back for a bounded delay
//! - Write through as soon as the size threshold is reached
//! - Stay transparent for reads, flush and shutdown
//!
//! # Design Decisions
//! - The delay is enforced inside `poll_flush`: copy loops flush whenever
//!   their reader stalls, so writes arriving during the delay join the batch
//! - Shutdown never waits for the delay

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Default delay before a partial batch is written.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);

/// Default batch size that triggers an immediate write.
pub const DEFAULT_THRESHOLD: usize = 1280;

/// How long and how much to coalesce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorkPolicy {
    pub delay: Duration,
    pub threshold: usize,
}

impl Default for CorkPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// A stream whose writes are coalesced according to a [`CorkPolicy`].
#[derive(Debug)]
pub struct Corked<S> {
    inner: S,
    buf: BytesMut,
    policy: CorkPolicy,
    deadline: Pin<Box<Sleep>>,
}

impl<S> Corked<S> {
    pub fn new(inner: S, policy: CorkPolicy) -> Self {
        let threshold = policy.threshold.max(1);
        Self {
            inner,
            buf: BytesMut::with_capacity(threshold),
            policy: CorkPolicy { threshold, ..policy },
            deadline: Box::pin(tokio::time::sleep(Duration::ZERO)),
        }
    }

    /// Bytes accepted but not yet written to the inner stream.
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl<S: AsyncWrite + Unpin> Corked<S> {
    /// Writes the whole batch to the inner stream.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.buf.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.buf))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.buf.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Corked<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Corked<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.buf.len() >= this.policy.threshold {
            ready!(this.poll_drain(cx))?;
        }
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if this.buf.is_empty() {
            let deadline = Instant::now() + this.policy.delay;
            this.deadline.as_mut().reset(deadline);
        }
        let n = data.len().min(this.policy.threshold - this.buf.len());
        this.buf.extend_from_slice(&data[..n]);
        if this.buf.len() >= this.policy.threshold {
            // Best effort; a pending drain resumes on the next write or flush.
            if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
                return Poll::Ready(Err(e));
            }
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.buf.is_empty() && this.buf.len() < this.policy.threshold {
            ready!(this.deadline.as_mut().poll(cx));
        }
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
