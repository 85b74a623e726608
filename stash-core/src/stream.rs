//! Request-scoped upstream byte stream with an exactly-once release.
//!
//! A [`StreamHandle`] owns the boxed body stream of an upstream response and
//! the hooks that must run once the transport resources are gone. Release
//! happens on the first of: an explicit [`StreamHandle::release`], the end of
//! the stream, or drop. Client aborts surface as a drop of the response body,
//! so cancellation takes the same path as normal completion.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed upstream body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// An open upstream stream plus its release hooks.
pub struct StreamHandle {
    stream: Option<ByteStream>,
    on_release: Option<ReleaseHook>,
}

impl StreamHandle {
    /// Wrap an upstream byte stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
            on_release: None,
        }
    }

    /// A single-chunk stream, mostly useful for fixtures.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(stream::once(async move { Ok(data) }))
    }

    /// Register a hook to run when the handle is released.
    ///
    /// Hooks run in registration order, after the inner stream is dropped.
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let hook: ReleaseHook = match self.on_release.take() {
            Some(previous) => Box::new(move || {
                previous();
                hook();
            }),
            None => Box::new(hook),
        };
        self.on_release = Some(hook);
        self
    }

    /// Whether the underlying stream has already been released.
    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Drop the upstream stream and run the release hooks. Idempotent.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Some(hook) = self.on_release.take() {
                hook();
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl Stream for StreamHandle {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.stream.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.release();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("released", &self.is_released())
            .finish()
    }
}
