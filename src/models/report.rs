use crate::models::{ContextInfo, RecordedCommand, Severity};
use serde::Serialize;
use std::fmt;

/// One node of the reported cause chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRecord {
    pub(crate) message: String,
    pub(crate) type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) severity: Option<Severity>,
    pub(crate) details: String,
    pub(crate) is_first_in_chain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) command: Option<RecordedCommand>,
}

impl ExceptionRecord {
    /// Message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared severity. Only first-party failures and remote service faults declare one.
    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    /// Details with credentials scrubbed. May be empty.
    pub fn details(&self) -> &str {
        &self.details
    }

    /// Whether this is the outermost first-party failure that starts a managed run of the chain.
    pub fn is_first_in_chain(&self) -> bool {
        self.is_first_in_chain
    }

    /// Component the failure originated in.
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Version of that component.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Method the failure originated in.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Stack trace without trailing newlines.
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    /// Database command, when the failure wrapped a data access failure.
    pub fn command(&self) -> Option<&RecordedCommand> {
        self.command.as_ref()
    }
}

/// Problem found while building a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub enum ReportWarning {
    /// No stack frame could be attributed to a first-party component.
    UnattributedOrigin,
    /// A data access failure was reported without the command that caused it.
    MissingDataAccessCommand,
}

impl fmt::Display for ReportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportWarning::UnattributedOrigin => f.write_str("could not attribute origin"),
            ReportWarning::MissingDataAccessCommand => {
                f.write_str("data access failure reported without its command")
            }
        }
    }
}

/// Everything known about one reported failure. Built by
/// [`Notifier::build_report`](crate::Notifier::build_report) and never changed afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub(crate) root_type: String,
    pub(crate) root_message: String,
    pub(crate) severity: Severity,
    pub(crate) mail_worthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) method: Option<String>,
    pub(crate) records: Vec<ExceptionRecord>,
    pub(crate) context: ContextInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) warnings: Vec<ReportWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
}

impl ErrorReport {
    /// Type name of the innermost fault, the root cause.
    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// Message of the innermost fault.
    pub fn root_message(&self) -> &str {
        &self.root_message
    }

    /// Overall severity of the chain.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether the chain asked for a notification.
    pub fn mail_worthy(&self) -> bool {
        self.mail_worthy
    }

    /// First component found scanning the chain from the outside in.
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Version of [`component`](Self::component).
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Method belonging to [`component`](Self::component).
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// One record per chain node, innermost first.
    pub fn records(&self) -> &[ExceptionRecord] {
        &self.records
    }

    /// Execution context.
    pub fn context(&self) -> &ContextInfo {
        &self.context
    }

    /// Problems found while building the report.
    pub fn warnings(&self) -> &[ReportWarning] {
        &self.warnings
    }

    /// Platform status code of the innermost fault.
    pub fn code(&self) -> Option<i32> {
        self.code
    }
}
