use crate::cancel::StreamCancelExt;
use futures::{StreamExt, TryStreamExt, stream};
use std::num::NonZeroUsize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounded-concurrency runner for batches of async work.
///
/// Items are started in order and at most `concurrency` of them are in flight
/// at once; [`Limiter::serial()`] runs them strictly one after another. All
/// work is driven on the calling task, so item futures may borrow from the
/// caller and need not be `Send`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limiter {
    concurrency: NonZeroUsize,
}
impl Default for Limiter {
    fn default() -> Self {
        Self::serial()
    }
}
impl Limiter {
    pub const fn serial() -> Self {
        Self {
            concurrency: NonZeroUsize::MIN,
        }
    }

    /// A zero concurrency is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: NonZeroUsize::new(concurrency).unwrap_or(NonZeroUsize::MIN),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    /// Run `f` over every item, stopping at the first error.
    ///
    /// When an item fails, items still queued are abandoned without being
    /// started and the error is returned. On success the outputs are returned
    /// in item order.
    pub async fn try_run<I, F, Fut, T, E>(&self, items: I, f: F) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(items).map(f).buffered(self.concurrency()).try_collect().await
    }

    /// Run `f` over every item and collect every outcome, in item order.
    pub async fn run_all<I, F, Fut>(&self, items: I, f: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        stream::iter(items).map(f).buffered(self.concurrency()).collect().await
    }

    /// Like [`run_all()`](Self::run_all), but checks `token` before starting
    /// each item. Items not yet started when the token is cancelled are
    /// skipped; items already running are left to finish.
    pub async fn run_until_cancelled<I, F, Fut>(&self, items: I, token: &CancellationToken, f: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        let items: Vec<_> = items.into_iter().collect();
        let total = items.len();
        let outcomes: Vec<_> = stream::iter(items)
            .until_cancelled(token.clone())
            .map(f)
            .buffered(self.concurrency())
            .collect()
            .await;
        if outcomes.len() < total {
            debug!(skipped = total - outcomes.len(), "batch cancelled");
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(4, 4)]
    fn test_concurrency(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(Limiter::new(requested).concurrency(), expected);
    }

    #[test]
    fn test_default_is_serial() {
        assert_eq!(Limiter::default(), Limiter::serial());
        assert_eq!(Limiter::serial().concurrency(), 1);
    }

    #[tokio::test]
    async fn test_serial_never_overlaps() {
        let running = Cell::new(0);
        let peak = Cell::new(0);
        let order = RefCell::new(Vec::new());
        let limiter = Limiter::serial();
        limiter
            .run_all(1..=5, |n| {
                let (running, peak, order) = (&running, &peak, &order);
                async move {
                    running.set(running.get() + 1);
                    peak.set(peak.get().max(running.get()));
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    order.borrow_mut().push(n);
                    running.set(running.get() - 1);
                }
            })
            .await;
        assert_eq!(peak.get(), 1);
        assert_eq!(*order.borrow(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_try_run_fails_fast() {
        let started = Cell::new(0);
        let result: Result<Vec<i32>, String> = Limiter::serial()
            .try_run(1..=5, |n| {
                let started = &started;
                async move {
                    started.set(started.get() + 1);
                    match n {
                        2 => Err(format!("item {n} failed")),
                        n => Ok(n * 10),
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap_err(), "item 2 failed");
        assert_eq!(started.get(), 2);
    }

    #[tokio::test]
    async fn test_try_run_success() {
        let result: Result<Vec<i32>, ()> = Limiter::new(3).try_run(1..=4, |n| async move { Ok(n * 2) }).await;
        assert_eq!(result.unwrap(), vec![2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn test_run_all_keeps_failures() {
        let outcomes = Limiter::serial()
            .run_all(["a", "b", "c"], |s| async move {
                match s {
                    "b" => Err(s),
                    s => Ok(s),
                }
            })
            .await;
        assert_eq!(outcomes, vec![Ok("a"), Err("b"), Ok("c")]);
    }

    #[tokio::test]
    async fn test_cancellation_is_checked_between_items() {
        let token = CancellationToken::new();
        let started = RefCell::new(Vec::new());
        let outcomes = Limiter::serial()
            .run_until_cancelled(1..=4, &token, |n| {
                let (token, started) = (&token, &started);
                async move {
                    started.borrow_mut().push(n);
                    if n == 2 {
                        token.cancel();
                        // The item that observed the cancellation still runs to the end.
                        tokio::task::yield_now().await;
                    }
                    n
                }
            })
            .await;
        assert_eq!(outcomes, vec![1, 2]);
        assert_eq!(*started.borrow(), vec![1, 2]);
    }
}
