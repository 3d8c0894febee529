//! Progress reporting and change notifications.
//!
//! Every public operation is allotted a progress budget. It splits that
//! budget over its I/O steps with a [`Budget`], which reports whatever is
//! left when it is dropped: the increments reported by one invocation always
//! add up to the allotted budget, including when the operation returns early.

use std::sync::Mutex;

/// Receives fractional progress increments.
pub trait ProgressSink: Send + Sync {
    fn report(&self, increment: f64);
}

/// Receives notifications about the list of titles.
pub trait ChangeListener: Send + Sync {
    /// A full listing of the storage root started (`true`) or finished.
    fn list_loading(&self, _loading: bool) {}

    /// Titles were added to or removed from the store.
    fn data_list_changed(&self) {}
}

/// Discards progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;
impl ProgressSink for NoProgress {
    fn report(&self, _increment: f64) {}
}

/// Ignores notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoListener;
impl ChangeListener for NoListener {}

/// Collects every increment reported to it.
#[derive(Debug, Default)]
pub struct ProgressTally {
    increments: Mutex<Vec<f64>>,
}
impl ProgressTally {
    pub fn increments(&self) -> Vec<f64> {
        self.increments.lock().map(|increments| increments.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> f64 {
        self.increments().iter().sum()
    }

    pub fn reset(&self) {
        if let Ok(mut increments) = self.increments.lock() {
            increments.clear();
        }
    }
}
impl ProgressSink for ProgressTally {
    fn report(&self, increment: f64) {
        if let Ok(mut increments) = self.increments.lock() {
            increments.push(increment);
        }
    }
}

/// Share of a progress budget owned by one operation (or one step of it).
pub struct Budget<'a> {
    sink: &'a dyn ProgressSink,
    total: f64,
    remaining: f64,
}
impl<'a> Budget<'a> {
    pub fn new(sink: &'a dyn ProgressSink, total: f64) -> Self {
        let total = total.max(0.0);
        Self {
            sink,
            total,
            remaining: total,
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Report `fraction` of the total, capped at what is left.
    pub fn step(&mut self, fraction: f64) {
        let amount = self.take(fraction);
        if amount > 0.0 {
            self.sink.report(amount);
        }
    }

    /// Carve `fraction` of the total out into a budget of its own.
    pub fn split(&mut self, fraction: f64) -> Budget<'a> {
        let amount = self.take(fraction);
        Budget::new(self.sink, amount)
    }

    /// Split what is left into `parts` equal budgets.
    pub fn divide(mut self, parts: usize) -> Vec<Budget<'a>> {
        let share = match parts {
            0 => return Vec::new(),
            parts => self.remaining / parts as f64,
        };
        let sink = self.sink;
        self.remaining = 0.0;
        (0..parts).map(|_| Budget::new(sink, share)).collect()
    }

    /// Report everything that is left.
    pub fn finish(self) {}

    fn take(&mut self, fraction: f64) -> f64 {
        let amount = (self.total * fraction).clamp(0.0, self.remaining);
        self.remaining -= amount;
        amount
    }
}
impl Drop for Budget<'_> {
    fn drop(&mut self) {
        if self.remaining > 0.0 {
            self.sink.report(self.remaining);
            self.remaining = 0.0;
        }
    }
}
