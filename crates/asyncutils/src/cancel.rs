use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

pin_project! {
    /// Stream that ends as soon as its token is cancelled.
    ///
    /// The token is only checked before pulling the next item from the inner
    /// stream; an item that was already handed out is never interrupted.
    #[must_use = "streams do nothing unless polled"]
    pub struct UntilCancelled<S> {
        #[pin]
        stream: S,
        token: CancellationToken,
        done: bool,
    }
}

impl<S> UntilCancelled<S> {
    pub fn new(stream: S, token: CancellationToken) -> Self {
        Self {
            stream,
            token,
            done: false,
        }
    }
}

impl<S: Stream> Stream for UntilCancelled<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        if this.token.is_cancelled() {
            *this.done = true;
            return Poll::Ready(None);
        }
        match this.stream.poll_next(cx) {
            Poll::Ready(None) => {
                *this.done = true;
                Poll::Ready(None)
            },
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.done {
            true => (0, Some(0)),
            false => (0, self.stream.size_hint().1),
        }
    }
}

pub trait StreamCancelExt: Stream + Sized {
    /// Stop yielding items once `token` is cancelled.
    fn until_cancelled(self, token: CancellationToken) -> UntilCancelled<Self> {
        UntilCancelled::new(self, token)
    }
}
impl<S: Stream> StreamCancelExt for S {}
