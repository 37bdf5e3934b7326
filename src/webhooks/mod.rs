//! Asynchronous payment provider notifications.
pub mod reconciler;

pub use reconciler::{WebhookOutcome, WebhookReconciler};
