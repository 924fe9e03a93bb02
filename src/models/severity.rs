use serde_repr::Serialize_repr;
use std::{cmp::Ordering, fmt};

/// Severity of a reported failure.
///
/// The discriminants are the wire codes used when a report is serialized. They do not define the
/// ordering: comparisons follow `Alarm > ExternalError > Error > Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr)]
#[repr(u8)]
pub enum Severity {
    /// Application bug. The default for anything not explicitly classified.
    Error = 1,
    /// Urgent failure that should page someone.
    Alarm = 2,
    /// Informational message.
    Info = 3,
    /// Failure of the environment (database, network, remote service) rather than of the
    /// application itself.
    ExternalError = 4,
}

impl Severity {
    fn rank(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Error => 1,
            Severity::ExternalError => 2,
            Severity::Alarm => 3,
        }
    }

    /// Name of the severity as it appears in subjects and rendered reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Alarm => "Alarm",
            Severity::Info => "Info",
            Severity::ExternalError => "ExternalError",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
