use crate::Error;
use std::{collections::HashMap, str::FromStr, time::Duration};

/// Environment variable read by [`NotifierConfig::from_env`].
pub const CONNECTION_STRING_ENV: &str = "ERROR_NOTIFIER_CONNECTION_STRING";

pub(crate) const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(20 * 60);
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const FIELDS_SEPARATOR: char = ';';
const FIELD_KEY_VALUE_SEPARATOR: char = '=';

/// Settings of a [`Notifier`](crate::Notifier).
///
/// Usually parsed from a connection string:
///
/// ```
/// let config: error_notifier::NotifierConfig =
///     "AppName=orders;SmtpServer=mail.local;SupportEmail=support@example.com;DedupWindowMinutes=5"
///         .parse()
///         .unwrap();
/// assert_eq!("orders", config.app_name());
/// assert_eq!(std::time::Duration::from_secs(300), config.dedup_window());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    app_name: String,
    smtp_server: String,
    support_email: String,
    dedup_window: Duration,
    domain: Option<String>,
    require_domain: bool,
    workers: usize,
    queue_capacity: usize,
}

/// Reasons a connection string is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A field is not of the form `key=value`.
    #[error("invalid format")]
    InvalidFormat,
    /// A required field is absent.
    #[error("missing field {0}")]
    MissingField(&'static str),
    /// A numeric field does not hold an integer.
    #[error("invalid number for {0}")]
    InvalidNumber(&'static str),
    /// A flag is neither `true` nor `false`.
    #[error("invalid boolean for {0}")]
    InvalidBool(&'static str),
}

impl FromStr for NotifierConfig {
    type Err = ParseError;

    /// Parse a `key=value;` connection string.
    ///
    /// Keys are case-insensitive and unknown keys are ignored. `AppName`, `SmtpServer` and
    /// `SupportEmail` are required.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut result: HashMap<String, String> = s
            .split(FIELDS_SEPARATOR)
            .filter(|kv| !kv.trim().is_empty())
            .map(|kv| {
                let parts: Vec<&str> = kv.split(FIELD_KEY_VALUE_SEPARATOR).collect();
                if parts.len() == 2 {
                    Ok((parts[0].trim().to_lowercase(), parts[1].trim().to_string()))
                } else {
                    Err(ParseError::InvalidFormat)
                }
            })
            .collect::<Result<_, _>>()?;

        let mut config = NotifierConfig::new(
            required(&mut result, "appname", "AppName")?,
            required(&mut result, "smtpserver", "SmtpServer")?,
            required(&mut result, "supportemail", "SupportEmail")?,
        );

        if let Some(minutes) = result.remove("dedupwindowminutes") {
            let minutes: i64 = minutes
                .parse()
                .map_err(|_| ParseError::InvalidNumber("DedupWindowMinutes"))?;
            config = config.with_dedup_window_minutes(minutes);
        }
        if let Some(domain) = result.remove("domain").filter(|d| !d.is_empty()) {
            config = config.with_domain(domain);
        }
        if let Some(require_domain) = result.remove("requiredomain") {
            config = config.with_require_domain(parse_bool(&require_domain, "RequireDomain")?);
        }
        if let Some(workers) = result.remove("workers") {
            config = config.with_workers(parse_usize(&workers, "Workers")?);
        }
        if let Some(capacity) = result.remove("queuecapacity") {
            config = config.with_queue_capacity(parse_usize(&capacity, "QueueCapacity")?);
        }

        Ok(config)
    }
}

fn required(
    fields: &mut HashMap<String, String>,
    key: &str,
    name: &'static str,
) -> Result<String, ParseError> {
    fields
        .remove(key)
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingField(name))
}

fn parse_bool(value: &str, name: &'static str) -> Result<bool, ParseError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ParseError::InvalidBool(name))
    }
}

fn parse_usize(value: &str, name: &'static str) -> Result<usize, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber(name))
}

impl NotifierConfig {
    /// Create a configuration with default settings.
    pub fn new(
        app_name: impl Into<String>,
        smtp_server: impl Into<String>,
        support_email: impl Into<String>,
    ) -> Self {
        NotifierConfig {
            app_name: app_name.into(),
            smtp_server: smtp_server.into(),
            support_email: support_email.into(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            domain: None,
            require_domain: true,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Read the connection string from `ERROR_NOTIFIER_CONNECTION_STRING`.
    pub fn from_env() -> Result<Self, Error> {
        let connection_string =
            std::env::var(CONNECTION_STRING_ENV).map_err(|source| Error::EnvVar {
                name: CONNECTION_STRING_ENV,
                source,
            })?;
        Ok(connection_string.parse()?)
    }

    /// Set how long an identical notification is suppressed after one was sent.
    ///
    /// Default: 20 minutes
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Set the dedup window in minutes. Negative values keep the current window.
    pub fn with_dedup_window_minutes(self, minutes: i64) -> Self {
        match u64::try_from(minutes) {
            Ok(minutes) => self.with_dedup_window(Duration::from_secs(minutes.saturating_mul(60))),
            Err(_) => self,
        }
    }

    /// Set the own domain, used as the environment descriptor of reports.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Whether external failures and alarms are only sent when a domain is known for the report.
    ///
    /// Default: true
    pub fn with_require_domain(mut self, require_domain: bool) -> Self {
        self.require_domain = require_domain;
        self
    }

    /// Set the number of delivery workers. At least one worker is always started.
    ///
    /// Default: 2
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set how many notifications may wait for a worker before new ones are dropped.
    ///
    /// Default: 256
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// SMTP server notifications are sent through.
    pub fn smtp_server(&self) -> &str {
        &self.smtp_server
    }

    /// Support address notifications are sent to.
    pub fn support_email(&self) -> &str {
        &self.support_email
    }

    /// Dedup window.
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Own domain.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Whether a domain is required for external failures and alarms.
    pub fn require_domain(&self) -> bool {
        self.require_domain
    }

    /// Number of delivery workers.
    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }

    /// Queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Whether application name, SMTP server and support address are all set.
    pub fn is_configured(&self) -> bool {
        self.missing_field().is_none()
    }

    pub(crate) fn missing_field(&self) -> Option<&'static str> {
        if self.app_name.is_empty() {
            Some("AppName")
        } else if self.smtp_server.is_empty() {
            Some("SmtpServer")
        } else if self.support_email.is_empty() {
            Some("SupportEmail")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const BASE: &str = "AppName=orders;SmtpServer=mail.local;SupportEmail=support@example.com";

    #[test]
    fn parse_defaults() {
        let config: NotifierConfig = BASE.parse().unwrap();
        assert_eq!("orders", config.app_name());
        assert_eq!("mail.local", config.smtp_server());
        assert_eq!("support@example.com", config.support_email());
        assert_eq!(DEFAULT_DEDUP_WINDOW, config.dedup_window());
        assert_eq!(None, config.domain());
        assert!(config.require_domain());
        assert_eq!(DEFAULT_WORKERS, config.workers());
        assert_eq!(DEFAULT_QUEUE_CAPACITY, config.queue_capacity());
        assert!(config.is_configured());
    }

    #[test_case(
        "appname=orders;SMTPSERVER=mail.local;SupportEmail=support@example.com;DedupWindowMinutes=5",
        Duration::from_secs(300), None, true ; "case insensitive keys")]
    #[test_case(
        "Foo=1;AppName=orders;SmtpServer=mail.local;Bar=2;SupportEmail=support@example.com;",
        DEFAULT_DEDUP_WINDOW, None, true ; "ignore unknown fields")]
    #[test_case(
        "AppName=orders; SmtpServer = mail.local ;SupportEmail=support@example.com;Domain=corp.local;RequireDomain=False",
        DEFAULT_DEDUP_WINDOW, Some("corp.local"), false ; "domain")]
    #[test_case(
        "AppName=orders;SmtpServer=mail.local;SupportEmail=support@example.com;DedupWindowMinutes=-3",
        DEFAULT_DEDUP_WINDOW, None, true ; "negative window keeps default")]
    fn parse_succeeds(
        connection_string: &'static str,
        expected_window: Duration,
        expected_domain: Option<&'static str>,
        expected_require_domain: bool,
    ) {
        let config: NotifierConfig = connection_string.parse().unwrap();
        assert_eq!("mail.local", config.smtp_server());
        assert_eq!(expected_window, config.dedup_window());
        assert_eq!(expected_domain, config.domain());
        assert_eq!(expected_require_domain, config.require_domain());
    }

    #[test_case("SmtpServer=mail.local;SupportEmail=s@x", ParseError::MissingField("AppName") ; "no app name")]
    #[test_case("AppName=a;SupportEmail=s@x", ParseError::MissingField("SmtpServer") ; "no smtp server")]
    #[test_case("AppName=a;SmtpServer=m;SupportEmail=", ParseError::MissingField("SupportEmail") ; "empty support email")]
    #[test_case("AppName=a;SmtpServer=m;SupportEmail=s@x;NoValue", ParseError::InvalidFormat ; "field without value")]
    #[test_case("AppName=a;SmtpServer=m;SupportEmail=s@x;Domain=a=b", ParseError::InvalidFormat ; "2 equals signs")]
    #[test_case("AppName=a;SmtpServer=m;SupportEmail=s@x;Workers=many", ParseError::InvalidNumber("Workers") ; "invalid workers")]
    #[test_case("AppName=a;SmtpServer=m;SupportEmail=s@x;RequireDomain=yes", ParseError::InvalidBool("RequireDomain") ; "invalid flag")]
    fn parse_fails(connection_string: &'static str, expected: ParseError) {
        assert_eq!(
            expected,
            connection_string.parse::<NotifierConfig>().unwrap_err()
        );
    }

    #[test]
    fn builders_clamp_pool_settings() {
        let config = NotifierConfig::new("a", "m", "s@x")
            .with_workers(0)
            .with_queue_capacity(0);
        assert_eq!(1, config.workers());
        assert_eq!(1, config.queue_capacity());
    }

    #[test]
    fn empty_fields_are_not_configured() {
        let config = NotifierConfig::new("orders", "", "s@x");
        assert!(!config.is_configured());
        assert_eq!(Some("SmtpServer"), config.missing_field());
    }
}
