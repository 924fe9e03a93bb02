use crate::{config::ParseError, render::RenderError, transport::TransportError};
use std::env::VarError;

/// Errors of this crate.
///
/// Only setting up a [`Notifier`](crate::Notifier) can fail. Reporting never returns an error;
/// delivery failures are routed to the event sink and described with the `Render` and
/// `Transport` variants there.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The connection string could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] ParseError),

    /// An environment variable holding the configuration could not be read.
    #[error("reading environment variable {name} failed with {source}")]
    EnvVar {
        /// Name of the variable.
        name: &'static str,
        /// Cause.
        source: VarError,
    },

    /// Application name, SMTP server or support address is empty.
    #[error("notifier is not configured: {0} is empty")]
    NotConfigured(&'static str),

    /// No tokio runtime was given and none is running on the current thread.
    #[error("no tokio runtime available to run notification workers")]
    NoRuntime,

    /// The report could not be rendered.
    #[error("rendering report failed with {0}")]
    Render(#[from] RenderError),

    /// The mail transport failed to send the notification.
    #[error("sending mail failed with {0}")]
    Transport(TransportError),
}
