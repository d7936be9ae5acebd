//! # notify — Delivery
//!
//! `deliver(message, channel)` is fire-and-forget from the pipeline's point
//! of view: failures are logged and never block a tick, and a missed alert
//! is never re-sent.

pub mod format;
pub mod telegram;

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::info;

pub use format::{format_session_summary, format_signal};
pub use telegram::TelegramNotifier;

pub trait Notifier: Send + Sync {
    /// Channel name for logs and the health endpoint.
    fn channel(&self) -> &str;

    fn deliver<'a>(&'a self, message: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Writes messages to the log only.  Used when no chat channel is set up.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn channel(&self) -> &str {
        "log"
    }

    fn deliver<'a>(&'a self, message: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            info!(channel = "log", "📨 {message}");
            Ok(())
        }
        .boxed()
    }
}
