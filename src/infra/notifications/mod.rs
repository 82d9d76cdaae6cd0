// Notifier implementations.

pub mod log_notifier;
pub mod webhook_notifier;

pub use log_notifier::LogNotifier;
pub use webhook_notifier::WebhookNotifier;
