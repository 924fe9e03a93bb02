use crate::models::{truncate_chars, ContextInfo, RequestInfo};
use chrono::{DateTime, Utc};
use http::{header::AUTHORIZATION, HeaderMap, Method, Uri};
use std::{env, path::PathBuf};
use sysinfo::{ProcessesToUpdate, System};

const UNKNOWN: &str = "unknown";
const MAX_AUTHORIZATION_CHARS: usize = 100;

/// Context supplied by the caller of a report.
///
/// ```
/// use error_notifier::{ReportContext, RequestInfo};
///
/// let mut headers = http::HeaderMap::new();
/// headers.insert(http::header::USER_AGENT, "curl/8.0".parse().unwrap());
/// let request = RequestInfo::new(
///     "10.1.2.3",
///     &http::Method::GET,
///     &"https://orders.corp.local/list".parse().unwrap(),
///     &headers,
/// )
/// .with_remote_host("ws17.corp.local");
/// let context = ReportContext::default()
///     .with_logical_user("ann")
///     .with_request(request);
/// # let _ = context;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    /// Identity the application acts for, if it differs from the OS user.
    pub logical_user: Option<String>,
    /// Request being served.
    pub request: Option<RequestInfo>,
}

impl ReportContext {
    /// Set the logical user.
    pub fn with_logical_user(mut self, user: impl Into<String>) -> Self {
        self.logical_user = Some(user.into());
        self
    }

    /// Set the request being served.
    pub fn with_request(mut self, request: RequestInfo) -> Self {
        self.request = Some(request);
        self
    }
}

impl RequestInfo {
    /// Describe an HTTP request. Authorization headers are cut to 100 characters.
    pub fn new(
        remote_addr: impl Into<String>,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Self {
        RequestInfo {
            remote_addr: remote_addr.into(),
            remote_host: None,
            url: uri.to_string(),
            method: method.as_str().to_string(),
            headers: dump_headers(headers),
        }
    }

    /// Set the resolved host name of the client.
    pub fn with_remote_host(mut self, remote_host: impl Into<String>) -> Self {
        self.remote_host = Some(remote_host.into());
        self
    }
}

fn dump_headers(headers: &HeaderMap) -> String {
    let mut dump = String::new();
    for (name, value) in headers.iter() {
        let mut value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        if name == AUTHORIZATION {
            truncate_chars(&mut value, MAX_AUTHORIZATION_CHARS);
        }
        dump.push_str(&format!("{}->[{}]\n", name.as_str(), value));
    }
    dump.trim().to_string()
}

/// Collect the execution context of a report.
pub(crate) fn collect(
    app_name: &str,
    own_domain: Option<&str>,
    context: &ReportContext,
    now: DateTime<Utc>,
) -> ContextInfo {
    let domain = own_domain
        .filter(|own| {
            context
                .request
                .as_ref()
                .and_then(|r| r.remote_host.as_deref())
                .map_or(true, |host| same_domain(host, own))
        })
        .map(str::to_string);

    ContextInfo {
        app_name: app_name.to_string(),
        host: System::host_name().unwrap_or_else(|| UNKNOWN.into()),
        user: user_identity(context.logical_user.as_deref(), &os_user()),
        time: now,
        base_directory: base_directory(),
        runtime_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        memory_used: memory_used(),
        request: context.request.clone(),
        domain,
    }
}

/// Whether `host` lives in `domain`: the part after the first dot is compared case-insensitively.
fn same_domain(host: &str, domain: &str) -> bool {
    let host_domain = host.split_once('.').map_or(host, |(_, rest)| rest);
    host_domain.to_lowercase() == domain.to_lowercase()
}

fn os_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| UNKNOWN.into())
}

fn user_identity(logical: Option<&str>, os: &str) -> String {
    match logical {
        Some(logical) if logical != os => format!("{}({})", logical, os),
        _ => os.to_string(),
    }
}

fn base_directory() -> String {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .or_else(|| env::current_dir().ok())
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| UNKNOWN.into())
}

fn memory_used() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use test_case::test_case;

    fn request(remote_host: Option<&str>) -> RequestInfo {
        let info = RequestInfo::new(
            "10.1.2.3",
            &Method::POST,
            &Uri::from_static("https://orders.corp.local/save?id=7"),
            &HeaderMap::new(),
        );
        match remote_host {
            Some(host) => info.with_remote_host(host),
            None => info,
        }
    }

    #[test_case(Some("ann"), "svc", "ann(svc)" ; "logical differs")]
    #[test_case(Some("svc"), "svc", "svc" ; "logical equals os")]
    #[test_case(None, "svc", "svc" ; "no logical user")]
    fn user_identity_format(logical: Option<&str>, os: &str, expected: &str) {
        assert_eq!(expected, user_identity(logical, os));
    }

    #[test_case("ws17.corp.local", "CORP.local", true ; "same domain")]
    #[test_case("ws17.partner.com", "corp.local", false ; "other domain")]
    #[test_case("corp.local", "local", true ; "first label dropped")]
    #[test_case("localhost", "corp.local", false ; "no dot")]
    fn domain_comparison(host: &str, domain: &str, expected: bool) {
        assert_eq!(expected, same_domain(host, domain));
    }

    #[test]
    fn domain_cleared_for_foreign_requests() {
        let now = Utc::now();
        let foreign = ReportContext::default().with_request(request(Some("pc.partner.com")));
        let info = collect("orders", Some("corp.local"), &foreign, now);
        assert_eq!(None, info.domain());

        let own = ReportContext::default().with_request(request(Some("ws17.corp.local")));
        let info = collect("orders", Some("corp.local"), &own, now);
        assert_eq!(Some("corp.local"), info.domain());

        let unresolved = ReportContext::default().with_request(request(None));
        let info = collect("orders", Some("corp.local"), &unresolved, now);
        assert_eq!(Some("corp.local"), info.domain());
    }

    #[test]
    fn collect_fills_context() {
        let now = Utc::now();
        let info = collect("orders", None, &ReportContext::default(), now);
        assert_eq!("orders", info.app_name());
        assert_eq!(now, info.time());
        assert!(!info.host().is_empty());
        assert!(!info.user().is_empty());
        assert!(!info.base_directory().is_empty());
        assert_eq!(Some(env!("CARGO_PKG_VERSION")), info.runtime_version());
        assert!(info.request().is_none());
    }

    #[test]
    fn header_dump_truncates_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", "x".repeat(200))).unwrap(),
        );
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
        let info = RequestInfo::new(
            "10.1.2.3",
            &Method::GET,
            &Uri::from_static("https://orders.corp.local/"),
            &headers,
        );

        let lines: Vec<_> = info.headers().lines().collect();
        assert_eq!(2, lines.len());
        assert_eq!(
            format!("authorization->[Bearer {}]", "x".repeat(93)),
            lines[0]
        );
        assert_eq!("accept->[*/*]", lines[1]);
        assert_eq!("POST", request(None).method());
    }
}
