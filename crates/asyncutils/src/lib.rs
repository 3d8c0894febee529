//! Batch execution helpers.
//!
//! Everything that touches a shared storage root runs through a [`Limiter`],
//! which by default lets exactly one item run at a time. Batches can be
//! stopped between items with a [`CancellationToken`].

mod cancel;
mod limiter;

pub use crate::cancel::{StreamCancelExt, UntilCancelled};
pub use crate::limiter::Limiter;
pub use tokio_util::sync::CancellationToken;
