//! Turns failures and the chain of causes behind them into deduplicated, severity-classified
//! notifications for a support mailbox, with a local fallback when mail cannot be sent.
//!
//! # Usage
//!
//! Describe failures as [`Fault`]s, either directly or converted from any
//! [`std::error::Error`], and hand them to a [`Notifier`]:
//!
//! ```no_run
//! use error_notifier::{
//!     CommandDescriptor, Fault, ManagedOptions, MailMessage, MailTransport, Notifier,
//!     NotifierConfig, ReportContext, TransportError,
//! };
//!
//! #[derive(Debug)]
//! struct Smtp;
//!
//! #[async_trait::async_trait]
//! impl MailTransport for Smtp {
//!     async fn send(&self, message: MailMessage) -> Result<(), TransportError> {
//!         // Hand `message` to your SMTP client.
//!         # let _ = message;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), error_notifier::Error> {
//!     let config: NotifierConfig =
//!         "AppName=orders;SmtpServer=smtp.corp.local;SupportEmail=support@corp.local".parse()?;
//!     let notifier = Notifier::builder(config, Smtp).build()?;
//!
//!     let cause = Fault::data_access("Timeout expired", -2, 11);
//!     let fault = Fault::managed(
//!         "saving order failed",
//!         Some(cause),
//!         ManagedOptions::default()
//!             .with_command(CommandDescriptor::new("exec dbo.SaveOrder @id").with_parameter("@id", "7")),
//!     );
//!     notifier.report_with(&fault, &ReportContext::default().with_logical_user("ann"));
//!
//!     notifier.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Severity
//!
//! Every fault in the chain contributes a [`Severity`] and the worst one wins, ordered
//! `Info < Error < ExternalError < Alarm`. Failures of the environment (databases that are down,
//! unreachable hosts, timeouts) are escalated to `ExternalError`. See [`classify`] for the rules.
//!
//! | Severity        | Subject                                  |
//! | --------------- | ---------------------------------------- |
//! | `Error`         | `AppError[<app>][<component>]:<message>` |
//! | `ExternalError` | `Error <message>`                        |
//! | `Info`          | `*Info* <message>`                       |
//! | `Alarm`         | `*Alarm* <message>`                      |
//!
//! External failures and alarms are only sent when the report carries a domain, unless
//! [`NotifierConfig::with_require_domain`] turns that off. Reports of external failures are
//! stripped of stack traces and component details before they are sent.
//!
//! # Deduplication
//!
//! A notification with the same host, user, method and subject as one sent within the dedup
//! window (20 minutes by default) is dropped.
//!
//! # Fallback
//!
//! When rendering or sending fails, the report is rendered as plain text, prefixed with the
//! delivery parameters and the reason, and recorded once through the [`EventSink`].
#![doc(html_root_url = "https://docs.rs/error-notifier/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs, missing_debug_implementations)]
#![warn(unreachable_pub)]

pub mod classify;
mod config;
mod context;
mod dispatch;
mod error;
mod internal_logs;
mod models;
mod notifier;
mod provenance;
mod render;
mod report;
mod runner;
mod throttle;
mod transport;

pub use config::{NotifierConfig, ParseError, CONNECTION_STRING_ENV};
pub use context::ReportContext;
pub use error::Error;
pub use models::{
    scrub, Chain, CommandDescriptor, ContextInfo, DataAccessFault, ErrorReport, ExceptionRecord,
    Fault, FaultKind, Managed, ManagedOptions, RecordedCommand, RemoteServiceFault,
    ReportWarning, RequestInfo, Severity, SocketFault, TransportFault, TransportStatus,
};
pub use notifier::{Notifier, NotifierBuilder};
pub use provenance::{Component, ComponentRegistry, ComponentSource, Provenance, StaticComponents};
pub use render::{RenderError, ReportRenderer, TextRenderer};
pub use throttle::{Clock, DedupKey, DedupThrottle, ManualClock, SystemClock};
#[cfg(feature = "internal-logs")]
#[cfg_attr(docsrs, doc(cfg(feature = "internal-logs")))]
pub use transport::TracingEventSink;
pub use transport::{
    EventSink, MailMessage, MailTransport, StderrEventSink, TransportError, HTML_CONTENT_TYPE,
};
