//! Alert notification delivery.
//!
//! This crate provides:
//! - `AlertNotifier`, the seam the evaluation engine pushes new alerts through
//! - `Notifier` trait for pluggable delivery channels, with a webhook channel
//! - Minijinja rendering of subject/body text from the alert row
//! - `Dispatcher`, which routes each alert to its rule's channels

pub mod dispatcher;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use traits::{AlertNotifier, DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
