// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::stream::{FusedStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::ServeError;
use crate::protocols::Payload;

/// How a [`ResponseStream`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Open,
    /// The engine produced its last chunk
    Completed,
    /// The request was cancelled, or the consumer dropped the stream early
    Cancelled,
    /// The engine failed mid-stream
    Interrupted,
}

type CloseHook = Box<dyn FnOnce(StreamStatus) + Send>;

/// A lazy, finite, non-restartable sequence of response chunks.
///
/// Chunks are yielded in engine order. Once the request's cancellation token fires no further
/// chunks are pulled from the engine. An engine failure is yielded once as
/// [`ServeError::StreamInterrupted`] and ends the stream. The close hook runs exactly once, when the
/// stream ends or is dropped, whichever happens first.
pub struct ResponseStream {
    inner: Pin<Box<dyn Stream<Item = anyhow::Result<Payload>> + Send>>,
    cancelled: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
    on_close: Option<CloseHook>,
    status: StreamStatus,
}

impl ResponseStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<Payload>> + Send + 'static,
    {
        ResponseStream {
            inner: Box::pin(stream),
            cancelled: None,
            on_close: None,
            status: StreamStatus::Open,
        }
    }

    /// Stop pulling chunks once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(async move { token.cancelled().await }));
        self
    }

    /// Run `hook` once when the stream closes. Replaces any previous hook.
    pub fn on_close(mut self, hook: impl FnOnce(StreamStatus) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Close the stream without pulling any more chunks
    pub fn close(&mut self) {
        self.finish(StreamStatus::Cancelled);
    }

    fn finish(&mut self, status: StreamStatus) {
        if self.status != StreamStatus::Open {
            return;
        }
        self.status = status;
        self.cancelled = None;
        tracing::trace!(?status, "response stream closed");
        if let Some(hook) = self.on_close.take() {
            hook(status);
        }
    }
}

impl Stream for ResponseStream {
    type Item = Result<Payload, ServeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.status != StreamStatus::Open {
            return Poll::Ready(None);
        }

        // Cancellation wins over a ready chunk
        if let Some(cancelled) = self.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                self.finish(StreamStatus::Cancelled);
                return Poll::Ready(None);
            }
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(err))) => {
                tracing::warn!(error = %err, "engine stream failed");
                self.finish(StreamStatus::Interrupted);
                Poll::Ready(Some(Err(ServeError::StreamInterrupted {
                    reason: format!("{err:#}"),
                })))
            }
            Poll::Ready(None) => {
                self.finish(StreamStatus::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ResponseStream {
    fn is_terminated(&self) -> bool {
        self.status != StreamStatus::Open
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.finish(StreamStatus::Cancelled);
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
