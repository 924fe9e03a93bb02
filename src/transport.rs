//! Outbound channels: mail delivery and the local event sink used when mail fails.

use crate::models::Severity;
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    fmt::Debug,
    io::{self, Write},
};

/// Error returned by a [`MailTransport`].
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Content type of rendered HTML notifications.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// A notification ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Sender, formatted as `"<display name>" <address>`.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Single line subject.
    pub subject: String,
    /// Rendered body.
    pub body: Bytes,
    /// MIME type of `body`.
    pub content_type: &'static str,
}

/// Delivers notifications to the support mailbox.
///
/// Implement this for your SMTP client of choice.
///
/// ```
/// use async_trait::async_trait;
/// use error_notifier::{MailMessage, MailTransport, TransportError};
///
/// #[derive(Debug)]
/// struct Discard;
///
/// #[async_trait]
/// impl MailTransport for Discard {
///     async fn send(&self, _message: MailMessage) -> Result<(), TransportError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MailTransport: Send + Sync + Debug {
    /// Send one message.
    async fn send(&self, message: MailMessage) -> Result<(), TransportError>;
}

/// Local record of last resort for notifications that could not be mailed.
pub trait EventSink: Send + Sync + Debug {
    /// Record `body` under `source`.
    fn record(&self, source: &str, body: &str, severity: Severity);
}

/// Writes failed notifications to standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrEventSink;

impl EventSink for StderrEventSink {
    fn record(&self, source: &str, body: &str, severity: Severity) {
        let stderr = io::stderr();
        let mut out = stderr.lock();
        // Nowhere left to report a failing stderr.
        let _ = writeln!(out, "[{}] {}\n{}", severity.as_str(), source, body);
    }
}

/// Emits failed notifications as `tracing` error events with target `error_notifier::event`.
#[cfg(feature = "internal-logs")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[cfg(feature = "internal-logs")]
impl EventSink for TracingEventSink {
    fn record(&self, source: &str, body: &str, severity: Severity) {
        tracing::error!(
            target: "error_notifier::event",
            source,
            severity = severity.as_str(),
            "{}",
            body
        );
    }
}
