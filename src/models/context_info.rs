use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where and when a failure happened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    pub(crate) app_name: String,
    pub(crate) host: String,
    pub(crate) user: String,
    pub(crate) time: DateTime<Utc>,
    pub(crate) base_directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) runtime_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) memory_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) request: Option<RequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) domain: Option<String>,
}

impl ContextInfo {
    /// Application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Host name, or `unknown`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// User, written `logical(os)` when the logical user differs from the OS user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// When the report was built.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Directory of the executable, or the current directory.
    pub fn base_directory(&self) -> &str {
        &self.base_directory
    }

    /// Version of this crate, which built the report. The application's own version is the
    /// report's [`version`](crate::ErrorReport::version) when its component is registered.
    pub fn runtime_version(&self) -> Option<&str> {
        self.runtime_version.as_deref()
    }

    /// Resident memory of the process in bytes.
    pub fn memory_used(&self) -> Option<u64> {
        self.memory_used
    }

    /// Request being served when the failure happened.
    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_ref()
    }

    /// Environment descriptor. Absent when the request came from outside the own domain.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

/// The request being served when a failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub(crate) remote_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) remote_host: Option<String>,
    pub(crate) url: String,
    pub(crate) method: String,
    pub(crate) headers: String,
}

impl RequestInfo {
    /// Address of the client.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Resolved host name of the client.
    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }

    /// Requested URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Header dump, one `name->[value]` per line.
    pub fn headers(&self) -> &str {
        &self.headers
    }
}
