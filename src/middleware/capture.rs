//! Response body tee.
//!
//! [`CaptureBody`] sits between the handler's response body and hyper. Each
//! data frame is copied into a bounded buffer and then handed on unchanged,
//! so the client sees exactly what the handler produced while a copy
//! accumulates for the response log line. A limit of zero only counts.

use std::{
    mem,
    pin::Pin,
    task::{Context, Poll},
};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed in response body: {0}")]
    Body(#[from] axum::Error),
}

/// Body copy handed to the completion callback once the stream ends.
#[derive(Debug, Clone)]
pub struct Captured {
    /// Retained bytes, at most the capture limit.
    bytes: Bytes,
    size: u64,
}

impl Captured {
    /// Total data bytes forwarded to the client.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_truncated(&self) -> bool {
        self.size > self.bytes.len() as u64
    }

    pub fn text(&self) -> String {
        let text = String::from_utf8_lossy(&self.bytes);
        if self.is_truncated() {
            format!("{}... (truncated, {} bytes total)", text, self.size)
        } else {
            text.into_owned()
        }
    }
}

/// The body was dropped before reaching end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomplete {
    /// Data bytes forwarded before the stream stopped.
    pub size: u64,
}

pub type CaptureOutcome = Result<Captured, Incomplete>;

type OnComplete = Box<dyn FnOnce(CaptureOutcome) + Send>;

pub struct CaptureBody {
    inner: Body,
    buf: BytesMut,
    written: u64,
    limit: usize,
    on_complete: Option<OnComplete>,
}

impl CaptureBody {
    /// Wraps `inner`, retaining up to `limit` bytes.
    ///
    /// `on_complete` runs exactly once: with the capture when the stream
    /// ends, or with [`Incomplete`] when the body is dropped early.
    pub fn new<F>(inner: Body, limit: usize, on_complete: F) -> Self
    where
        F: FnOnce(CaptureOutcome) + Send + 'static,
    {
        Self {
            inner,
            buf: BytesMut::new(),
            written: 0,
            limit,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn record(&mut self, data: &Bytes) {
        self.written += data.len() as u64;
        let room = self.limit.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&data[..data.len().min(room)]);
    }

    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            let bytes = mem::take(&mut self.buf).freeze();
            on_complete(Ok(Captured {
                bytes,
                size: self.written,
            }));
        }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = CaptureError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record(data);
                }
                // hyper stops polling once the body reports its end.
                if this.inner.is_end_stream() {
                    this.complete();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(CaptureError::from(e)))),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CaptureBody {
    fn drop(&mut self) {
        if self.inner.is_end_stream() {
            self.complete();
        } else if let Some(on_complete) = self.on_complete.take() {
            on_complete(Err(Incomplete { size: self.written }));
        }
    }
}
