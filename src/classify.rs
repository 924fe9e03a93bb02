//! Severity and notification rules for cause chains.
//!
//! A chain's severity is the worst severity any of its faults contributes. Chains whose
//! innermost cause is a failure of the environment (database down, network unreachable, remote
//! service refusing) are escalated to [`Severity::ExternalError`] so that they are not mistaken
//! for application bugs.

use crate::models::{Fault, FaultKind, Severity, TransportStatus};

/// Platform status codes recognized as environmental failures.
pub mod codes {
    /// Operation not supported.
    pub const NOT_SUPPORTED: i32 = 0x8013_1515_u32 as i32;
    /// Access denied.
    pub const UNAUTHORIZED_ACCESS: i32 = 0x8007_0005_u32 as i32;
    /// Operation timed out.
    pub const TIMEOUT: i32 = 0x8013_1505_u32 as i32;
    /// Database login failed.
    pub const LOGIN_FAILED: i32 = 0x8004_0E4D_u32 as i32;
    /// Directory server is not operational.
    pub const SERVER_NOT_OPERATIONAL: i32 = 0x8007_203A_u32 as i32;
    /// Remote service refused the call.
    pub const SERVICE_REFUSED: i32 = 0x8013_1501_u32 as i32;
    /// Network location cannot be reached.
    pub const NETWORK_NOT_REACHED: i32 = 0x8007_04D0_u32 as i32;
}

/// Database error numbers meaning the database itself is unavailable or overloaded.
const DATABASE_OUTAGE_NUMBERS: [i32; 25] = [
    -2, -1, 2, 51, 53, 64, 233, 10054, 10060, 10061, 11001, 17806, // connection failed
    17142, // service paused
    17147, // server killed
    17148, // server uninstalling
    17809, // no free connection
    18452, 18456, 1385, // login failed
    4064, // default database unavailable
    229,  // permission denied
    8645, // memory grant timeout
    1205, // deadlock victim
    6005, // shutting down
    9002, // log full
];

/// Socket error codes of failed TCP connections.
const TCP_FAILURE_CODES: [i32; 5] = [
    10054, // reset by peer
    11001, // host not found
    10061, // refused
    10065, // host unreachable
    10060, // timed out
];

const NAMED_PIPE_FAILURES: [&str; 2] = [
    "provider: Named Pipes Provider, error: 40",
    "provider: Поставщик именованных каналов, error: 40",
];

const CONNECTION_OPEN_FRAMES: [&str; 2] = ["SqlConnection.Open()", "Connection::open"];

const REPORTING_SERVICE_FRAME: &str = "ReportingService";

/// Where a fault sits in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPosition {
    /// The chain has a single fault.
    Only,
    /// Innermost cause of a longer chain.
    Innermost,
    /// Any wrapper of the innermost cause.
    Outer,
}

impl ChainPosition {
    /// Position of the fault at `index` of a chain of `len` faults ordered innermost-first.
    pub fn of(index: usize, len: usize) -> Self {
        if len <= 1 {
            ChainPosition::Only
        } else if index == 0 {
            ChainPosition::Innermost
        } else {
            ChainPosition::Outer
        }
    }
}

/// Outcome of classifying a whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Overall severity.
    pub severity: Severity,
    /// Whether any fault asked for a notification.
    pub mail_worthy: bool,
}

/// Returns [`Severity::ExternalError`] when `innermost` is a failure of the environment.
pub fn escalate(innermost: &Fault) -> Option<Severity> {
    is_environmental(innermost).then_some(Severity::ExternalError)
}

fn is_environmental(fault: &Fault) -> bool {
    let code = fault.code();
    let stack_mentions =
        |needle: &str| fault.stack_trace().map_or(false, |trace| trace.contains(needle));

    if NAMED_PIPE_FAILURES
        .iter()
        .any(|pattern| fault.message().contains(pattern))
    {
        return true;
    }
    if matches!(
        code,
        Some(codes::NOT_SUPPORTED) | Some(codes::UNAUTHORIZED_ACCESS) | Some(codes::TIMEOUT)
    ) {
        return true;
    }

    match fault.kind() {
        FaultKind::DataAccess(data_access) => {
            DATABASE_OUTAGE_NUMBERS.contains(&data_access.number)
                || CONNECTION_OPEN_FRAMES.iter().any(|frame| stack_mentions(*frame))
                || code == Some(codes::LOGIN_FAILED)
        }
        FaultKind::Transport(transport) => match transport.status {
            TransportStatus::ProtocolError => transport.http_status.map_or(false, |s| s >= 500),
            TransportStatus::UnknownError => false,
            _ => true,
        },
        FaultKind::Directory => code == Some(codes::SERVER_NOT_OPERATIONAL),
        FaultKind::RemoteService(_) => {
            stack_mentions(REPORTING_SERVICE_FRAME) && code == Some(codes::SERVICE_REFUSED)
        }
        FaultKind::Socket(socket) => TCP_FAILURE_CODES.contains(&socket.code),
        FaultKind::Io => code == Some(codes::NETWORK_NOT_REACHED),
        FaultKind::Generic | FaultKind::Managed(_) => false,
    }
}

/// Severity a fault declares for itself. Remote service faults always declare
/// [`Severity::Error`].
pub fn declared_severity(fault: &Fault) -> Option<Severity> {
    match fault.kind() {
        FaultKind::Managed(managed) => Some(managed.severity()),
        FaultKind::RemoteService(_) => Some(Severity::Error),
        _ => None,
    }
}

/// Whether a fault asks for a notification. `None` means it leaves the decision to the rest of
/// the chain.
///
/// Informational data access failures never ask. The innermost cause of a longer chain only
/// votes when it is a managed or data access fault, because its wrapper already describes it.
pub fn notify_vote(fault: &Fault, position: ChainPosition) -> Option<bool> {
    match fault.kind() {
        FaultKind::Managed(managed) => Some(managed.notify()),
        FaultKind::DataAccess(data_access) => Some(!data_access.is_informational()),
        _ if position == ChainPosition::Innermost => None,
        _ => Some(true),
    }
}

fn contribution(fault: &Fault, position: ChainPosition) -> Option<Severity> {
    declared_severity(fault).or(match (fault.kind(), position) {
        (FaultKind::Managed(_), _) | (_, ChainPosition::Innermost) => None,
        _ => Some(Severity::Error),
    })
}

/// Classify a chain ordered innermost-first.
pub fn classify_chain(chain: &[&Fault]) -> Verdict {
    let mut verdict = Verdict {
        severity: Severity::Info,
        mail_worthy: false,
    };
    for (index, fault) in chain.iter().enumerate() {
        let position = ChainPosition::of(index, chain.len());
        if let Some(severity) = contribution(fault, position) {
            verdict.severity = verdict.severity.max(severity);
        }
        if let Some(vote) = notify_vote(fault, position) {
            verdict.mail_worthy |= vote;
        }
    }

    let innermost = match chain.first() {
        Some(innermost) => *innermost,
        None => return verdict,
    };
    let lone_managed_below_error = chain.len() == 1
        && innermost.as_managed().is_some()
        && verdict.severity < Severity::Error;
    if verdict.severity == Severity::Error || lone_managed_below_error {
        if let Some(escalated) = escalate(innermost) {
            verdict.severity = escalated;
        }
    }
    verdict
}
