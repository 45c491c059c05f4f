//! Outbound notification of job outcomes.
//!
//! - [`Notifier`]: the delivery seam the job executor depends on.
//! - [`WebhookDelivery`]: HTTP POST of the `{job_id, data, error}`
//!   envelope with a bounded timeout.

pub mod delivery;

pub use delivery::webhook::{Notifier, WebhookDelivery, WebhookError};
