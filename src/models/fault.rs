use crate::{
    models::{scrub, CommandDescriptor, Severity},
    provenance::Provenance,
};
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    error::Error as StdError,
    fmt, io,
};

/// Informational class of a data access failure. Such failures carry messages for the user, not
/// for support.
pub(crate) const INFORMATIONAL_CLASS: u8 = 12;

const LOGICAL_METHOD: &str = "LogicalError";

/// One node of a cause chain.
///
/// A `Fault` is what gets reported. It can be built directly with the constructors below or
/// converted from any [`std::error::Error`] with [`Fault::from_error`].
///
/// ```
/// use error_notifier::{Fault, ManagedOptions, Severity};
///
/// let db = Fault::data_access("Timeout expired", -2, 11);
/// let fault = Fault::managed(
///     "Saving the order failed",
///     Some(db),
///     ManagedOptions::default().with_severity(Severity::Error),
/// );
/// assert_eq!(2, fault.chain().count());
/// ```
#[derive(Debug, Clone)]
pub struct Fault {
    type_name: String,
    message: String,
    kind: FaultKind,
    stack_trace: Option<String>,
    code: Option<i32>,
    source: Option<Box<Fault>>,
}

/// What kind of failure a [`Fault`] describes.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FaultKind {
    /// Unrecognized failure.
    Generic,
    /// Failure raised by the application itself, carrying reporting instructions.
    Managed(Managed),
    /// Database failure.
    DataAccess(DataAccessFault),
    /// HTTP or other web transport failure.
    Transport(TransportFault),
    /// Socket level failure.
    Socket(SocketFault),
    /// I/O failure.
    Io,
    /// Directory service failure.
    Directory,
    /// Fault returned by a remote service.
    RemoteService(RemoteServiceFault),
}

/// Reporting instructions attached to a first-party failure.
#[derive(Debug, Clone)]
pub struct Managed {
    pub(crate) severity: Severity,
    pub(crate) details: String,
    pub(crate) notify: bool,
    pub(crate) provenance: Option<Provenance>,
    pub(crate) command: Option<CommandDescriptor>,
}

impl Managed {
    /// Declared severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Free-form details. Credentials are scrubbed when the report is built.
    pub fn details(&self) -> &str {
        &self.details
    }

    /// Whether this failure should produce a notification.
    pub fn notify(&self) -> bool {
        self.notify
    }

    /// Explicit origin. When present no stack trace scan is done.
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// Database command that was executing.
    pub fn command(&self) -> Option<&CommandDescriptor> {
        self.command.as_ref()
    }
}

/// Options for [`Fault::managed`]. Every unset option is derived from the cause.
#[derive(Debug, Clone, Default)]
pub struct ManagedOptions {
    /// Free-form details. Defaults to empty.
    pub details: Option<String>,
    /// Whether to notify. Defaults to the managed cause's flag, otherwise `true`. With a command
    /// attached and an informational data access cause it defaults to `false`.
    pub notify: Option<bool>,
    /// Severity. Defaults to the managed cause's severity, otherwise [`Severity::Error`].
    pub severity: Option<Severity>,
    /// Database command that was executing.
    pub command: Option<CommandDescriptor>,
    /// Explicit origin.
    pub provenance: Option<Provenance>,
}

impl ManagedOptions {
    /// Set details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Set whether to notify.
    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Set severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach the database command.
    pub fn with_command(mut self, command: CommandDescriptor) -> Self {
        self.command = Some(command);
        self
    }

    /// Set explicit origin.
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

/// Database failure details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAccessFault {
    /// Server error number.
    pub number: i32,
    /// Severity class reported by the server.
    pub class: u8,
}

impl DataAccessFault {
    /// Whether the failure only carries a message for the user.
    pub fn is_informational(&self) -> bool {
        self.class == INFORMATIONAL_CLASS
    }
}

/// Outcome of a web transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportStatus {
    /// The server answered with an error status.
    ProtocolError,
    /// Unclassified failure.
    UnknownError,
    /// No connection could be made.
    ConnectFailure,
    /// The host name could not be resolved.
    NameResolutionFailure,
    /// No response within the timeout.
    Timeout,
    /// The connection was closed prematurely.
    ConnectionClosed,
    /// The response could not be received.
    ReceiveFailure,
    /// The request could not be sent.
    SendFailure,
    /// The server certificate was not trusted.
    TrustFailure,
}

/// Web transport failure details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFault {
    /// Transport outcome.
    pub status: TransportStatus,
    /// HTTP status of the response, if one was received.
    pub http_status: Option<u16>,
}

/// Socket failure details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketFault {
    /// Socket error code.
    pub code: i32,
}

/// Remote service fault details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteServiceFault {
    /// URL of the service that raised the fault.
    pub actor: String,
}

impl Fault {
    /// Create an unrecognized failure.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Fault {
            type_name: type_name.into(),
            message: message.into(),
            kind: FaultKind::Generic,
            stack_trace: None,
            code: None,
            source: None,
        }
    }

    fn with_kind(type_name: &str, message: impl Into<String>, kind: FaultKind) -> Self {
        Fault {
            kind,
            ..Fault::new(type_name, message)
        }
    }

    /// Create a first-party failure wrapping an optional cause.
    pub fn managed(
        message: impl Into<String>,
        source: Option<Fault>,
        options: ManagedOptions,
    ) -> Self {
        let inner_managed = source.as_ref().and_then(|s| s.as_managed());
        let severity = options
            .severity
            .or_else(|| inner_managed.map(|m| m.severity))
            .unwrap_or(Severity::Error);
        let informational_cause = source
            .as_ref()
            .and_then(|s| s.as_data_access())
            .map_or(false, |d| d.is_informational());
        let notify = options
            .notify
            .or_else(|| (options.command.is_some() && informational_cause).then_some(false))
            .or_else(|| inner_managed.map(|m| m.notify))
            .unwrap_or(true);

        let managed = Managed {
            severity,
            details: options.details.unwrap_or_default(),
            notify,
            provenance: options.provenance,
            command: options.command,
        };
        Fault {
            source: source.map(Box::new),
            ..Fault::with_kind("DetailedError", message, FaultKind::Managed(managed))
        }
    }

    /// Create a first-party failure raised by application logic rather than by a failing call.
    ///
    /// The origin is given explicitly. Without a method name the origin's method reads
    /// `LogicalError`.
    pub fn logical(
        message: impl Into<String>,
        details: impl Into<String>,
        component: impl Into<String>,
        version: impl Into<String>,
        method: Option<String>,
        severity: Severity,
    ) -> Self {
        let provenance = Provenance::new(
            component,
            version,
            Some(method.unwrap_or_else(|| LOGICAL_METHOD.to_string())),
        );
        Fault::managed(
            message,
            None,
            ManagedOptions::default()
                .with_details(details)
                .with_severity(severity)
                .with_provenance(provenance),
        )
        .with_type_name("LogicalError")
    }

    /// Create a database failure.
    pub fn data_access(message: impl Into<String>, number: i32, class: u8) -> Self {
        Fault::with_kind(
            "DataAccessError",
            message,
            FaultKind::DataAccess(DataAccessFault { number, class }),
        )
    }

    /// Create a web transport failure.
    pub fn transport(
        message: impl Into<String>,
        status: TransportStatus,
        http_status: Option<u16>,
    ) -> Self {
        Fault::with_kind(
            "TransportError",
            message,
            FaultKind::Transport(TransportFault {
                status,
                http_status,
            }),
        )
    }

    /// Create a socket failure.
    pub fn socket(message: impl Into<String>, code: i32) -> Self {
        Fault::with_kind(
            "SocketError",
            message,
            FaultKind::Socket(SocketFault { code }),
        )
        .with_code(code)
    }

    /// Create an I/O failure.
    pub fn io(message: impl Into<String>) -> Self {
        Fault::with_kind("IoError", message, FaultKind::Io)
    }

    /// Create a directory service failure.
    pub fn directory(message: impl Into<String>) -> Self {
        Fault::with_kind("DirectoryError", message, FaultKind::Directory)
    }

    /// Create a remote service fault.
    pub fn remote_service(message: impl Into<String>, actor: impl Into<String>) -> Self {
        Fault::with_kind(
            "RemoteServiceError",
            message,
            FaultKind::RemoteService(RemoteServiceFault {
                actor: actor.into(),
            }),
        )
    }

    /// Convert a Rust error and its `source()` chain.
    ///
    /// `std::io::Error`s for reset, refused and timed out connections become socket faults with
    /// the matching TCP error code. Other I/O errors keep their OS error code.
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let fault = match error.downcast_ref::<io::Error>() {
            Some(io_error) => Fault::from_io(io_error),
            None => Fault::new(type_name_of(error), error.to_string()),
        };
        match error.source() {
            Some(source) => fault.with_source(Fault::from_error(source)),
            None => fault,
        }
    }

    fn from_io(error: &io::Error) -> Self {
        let socket_code = match error.kind() {
            io::ErrorKind::ConnectionReset => Some(10054),
            io::ErrorKind::ConnectionRefused => Some(10061),
            io::ErrorKind::TimedOut => Some(10060),
            _ => None,
        };
        match socket_code {
            Some(code) => Fault::socket(error.to_string(), code),
            None => Fault {
                code: error.raw_os_error(),
                ..Fault::io(error.to_string())
            },
        }
    }

    /// Set the raw stack trace text.
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Capture the stack trace from a [`Backtrace`]. Backtraces that were not captured are
    /// ignored.
    pub fn with_backtrace(self, backtrace: &Backtrace) -> Self {
        match backtrace.status() {
            BacktraceStatus::Captured => self.with_stack_trace(backtrace.to_string()),
            _ => self,
        }
    }

    /// Set the platform status code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Set the cause.
    pub fn with_source(mut self, source: Fault) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Override the type name.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Kind of failure.
    pub fn kind(&self) -> &FaultKind {
        &self.kind
    }

    /// Raw stack trace text.
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    /// Platform status code.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Direct cause.
    pub fn inner(&self) -> Option<&Fault> {
        self.source.as_deref()
    }

    /// Iterate the chain from this fault to its innermost cause.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }

    /// Reporting instructions, if this is a first-party failure.
    pub fn as_managed(&self) -> Option<&Managed> {
        match &self.kind {
            FaultKind::Managed(managed) => Some(managed),
            _ => None,
        }
    }

    /// Database failure details, if this is a database failure.
    pub fn as_data_access(&self) -> Option<&DataAccessFault> {
        match &self.kind {
            FaultKind::DataAccess(data_access) => Some(data_access),
            _ => None,
        }
    }

    /// Details shown next to the message. Remote service faults name the service.
    pub fn details(&self) -> Option<String> {
        match &self.kind {
            FaultKind::Managed(managed) if !managed.details.is_empty() => {
                Some(managed.details.clone())
            }
            FaultKind::RemoteService(remote) => Some(format!("Service URL : {}", remote.actor)),
            _ => None,
        }
    }

    /// Multi-line description of the whole chain: type, message, stack trace, details and the
    /// database command of every node. Credentials are scrubbed.
    pub fn extended_details(&self) -> String {
        let mut out = String::new();
        for fault in self.chain() {
            out.push_str(&format!("{}: {}\n", fault.type_name, fault.message));
            if let Some(stack_trace) = &fault.stack_trace {
                out.push_str(&format!("\tStack Trace:\n{}\n", stack_trace));
            }
            if let Some(managed) = fault.as_managed() {
                if !managed.details.is_empty() {
                    out.push_str(&format!("\tDetails:\n{}\n", scrub(&managed.details)));
                }
                if let Some(command) = managed.command.as_ref().map(|c| c.record()) {
                    out.push_str(&format!("\tCommand:\n{}\n", command.text));
                    if let Some(connection) = &command.connection {
                        out.push_str(&format!("\tConnection:\n{}\n", connection));
                    }
                    if let Some(timeout) = command.timeout_secs {
                        out.push_str(&format!("\tTimeout:\n{} s\n", timeout));
                    }
                    if !command.parameters.is_empty() {
                        out.push_str(&format!("\tParameters:\n{}\n", command.parameters));
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Fault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|s| s as &(dyn StdError + 'static))
    }
}

/// Iterator over a cause chain, outermost first.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    next: Option<&'a Fault>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Fault;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source.as_deref();
        Some(current)
    }
}

/// Leading identifier of the error's `Debug` output, which is the type name for derived
/// implementations.
fn type_name_of(error: &dyn StdError) -> String {
    let debug = format!("{:?}", error);
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        "Error".into()
    } else {
        name
    }
}
