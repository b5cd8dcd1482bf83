//! 通知：渠道、分发与幂等保证

pub mod channel;
pub mod channels;
pub mod dispatcher;

pub use channel::{NotificationChannel, NotificationMessage, SendResult};
pub use channels::{LogChannel, WebhookChannel};
pub use dispatcher::{NotificationDispatcher, NotificationSink};
