pub mod format;
pub mod sink;

pub use sink::{NotificationSink, StdoutSink, WebhookSink};
