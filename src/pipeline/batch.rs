//! Batching combinator: fixed-size windows over a fallible record stream.

use crate::Error;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Windows an inner stream of records into `Vec`s of exactly `window` items,
/// with a final window of 1..=`window` items if the source ends mid-window.
///
/// Laws (assuming no cancellation and no inner error):
/// - concatenating all windows reproduces the source exactly;
/// - an empty source yields zero windows, never one empty window;
/// - at most `window` records are buffered at any time.
///
/// The cancellation token is checked between individual records and between
/// windows, and is also waited on while the inner stream is pending, so a
/// producer stalled in I/O does not delay cancellation. On cancellation the
/// combinator discards any partially filled window and yields
/// [`Error::Cancelled`] as its final item - a cancellation outcome, never a
/// partial batch. An inner error likewise discards the partial window and
/// ends the stream after surfacing the error.
pub struct Batched<S, T> {
    inner: Option<S>,
    window: usize,
    buf: Vec<T>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<S, T> Batched<S, T> {
    /// `window` is clamped to at least 1.
    pub fn new(inner: S, window: usize, cancel: CancellationToken) -> Self {
        let window = window.max(1);
        Self {
            inner: Some(inner),
            window,
            buf: Vec::with_capacity(window),
            cancelled: Box::pin(cancel.cancelled_owned()),
        }
    }
}

// No structural pinning: the inner stream is only polled through `Pin::new`
// (it is `Unpin`) and the cancellation future is boxed.
impl<S: Unpin, T> Unpin for Batched<S, T> {}

impl<S, T> Stream for Batched<S, T>
where
    S: Stream<Item = crate::Result<T>> + Unpin,
{
    type Item = crate::Result<Vec<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            // Fused once the source ends, errors, or cancellation fires.
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            if this.cancelled.as_mut().poll(cx).is_ready() {
                this.inner = None;
                this.buf.clear();
                return Poll::Ready(Some(Err(Error::Cancelled)));
            }

            match Pin::new(&mut *inner).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(item))) => {
                    this.buf.push(item);
                    if this.buf.len() == this.window {
                        let full = std::mem::replace(
                            &mut this.buf,
                            Vec::with_capacity(this.window),
                        );
                        return Poll::Ready(Some(Ok(full)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.inner = None;
                    this.buf.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    if this.buf.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(std::mem::take(&mut this.buf))));
                }
            }
        }
    }
}
