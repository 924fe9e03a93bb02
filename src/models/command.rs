use crate::models::scrub;
use serde::Serialize;
use std::time::Duration;

/// The database command that was executing when a data access failure happened.
///
/// Attach it to a managed fault wrapping the data access failure so that the report shows what
/// was sent to the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandDescriptor {
    connection: Option<String>,
    text: String,
    parameters: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl CommandDescriptor {
    /// Create a descriptor for the given command text.
    pub fn new(text: impl Into<String>) -> Self {
        CommandDescriptor {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the connection string the command ran on. It is scrubbed before it ends up in a
    /// report.
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Add a bound parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn record(&self) -> RecordedCommand {
        RecordedCommand {
            connection: self.connection.as_deref().map(scrub),
            text: self.text.clone(),
            parameters: self
                .parameters
                .iter()
                .map(|(name, value)| format!("{}='{}';\n", name, value))
                .collect::<String>()
                .trim_end_matches(['\n', '\r'])
                .to_string(),
            timeout_secs: self.timeout.map(|t| t.as_secs()),
        }
    }
}

/// A command as it appears in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) connection: Option<String>,
    pub(crate) text: String,
    pub(crate) parameters: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) timeout_secs: Option<u64>,
}

impl RecordedCommand {
    /// Connection string with credentials masked.
    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// Command text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parameters, one `name='value';` per line.
    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    /// Command timeout in seconds.
    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }
}
