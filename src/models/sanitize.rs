use crate::models::{ContextInfo, ErrorReport, ExceptionRecord};
use once_cell::sync::Lazy;
use regex::Regex;

static AROUND_EQUALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*=\s*").expect("static regex is valid"));
static PASSWORD_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)password=([^;]*);").expect("static regex is valid"));
static PWD_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)pwd=([^;]*);").expect("static regex is valid"));

/// Remove credentials from a connection string or any other `key=value;` text.
///
/// Whitespace around `=` is removed and the values of `password` and `pwd` (matched
/// case-insensitively) are replaced with `*****`. Applying it twice gives the same result as
/// applying it once.
///
/// ```
/// assert_eq!(
///     "Server=db; Password=*****;User=sa",
///     error_notifier::scrub("Server = db; Password = hunter2;User=sa"),
/// );
/// ```
pub fn scrub(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // A trailing separator lets the last field match as well.
    let terminated = format!("{};", text);
    let compact = AROUND_EQUALS.replace_all(&terminated, "=");
    let masked = PASSWORD_VALUE.replace_all(&compact, "Password=*****;");
    let mut masked = PWD_VALUE.replace_all(&masked, "PWD=*****;").into_owned();
    masked.pop();
    masked
}

/// Truncate `value` to at most `max_chars` characters without splitting a character.
pub(crate) fn truncate_chars(value: &mut String, max_chars: usize) {
    if let Some((idx, _)) = value.char_indices().nth(max_chars) {
        value.truncate(idx);
    }
}

pub(crate) trait Sanitize {
    fn sanitize(&mut self);
}

/// Drops everything that points into the application's code or the process. Used for reports
/// about failures of the environment, which are read by people outside the development team.
impl Sanitize for ExceptionRecord {
    fn sanitize(&mut self) {
        self.component = None;
        self.version = None;
        self.method = None;
        self.stack_trace = None;
    }
}

impl Sanitize for ContextInfo {
    fn sanitize(&mut self) {
        self.runtime_version = None;
        self.memory_used = None;
    }
}

/// The report-level attribution stays: it is part of the dedup key.
impl Sanitize for ErrorReport {
    fn sanitize(&mut self) {
        for record in self.records.iter_mut() {
            record.sanitize();
        }
        self.context.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Server=db;Password=secret", "Server=db;Password=*****" ; "last field")]
    #[test_case("password=secret;Server=db", "Password=*****;Server=db" ; "first field")]
    #[test_case("Server = db ; PWD = x y z ;", "Server=db ; PWD=*****;" ; "whitespace around equals")]
    #[test_case("uid=sa;pwd=;", "uid=sa;PWD=*****;" ; "empty value")]
    #[test_case("no secrets here", "no secrets here" ; "plain text")]
    #[test_case("", "" ; "empty")]
    fn scrub_masks_credentials(input: &str, expected: &str) {
        assert_eq!(expected, scrub(input));
    }

    #[test]
    fn scrub_is_idempotent() {
        let once = scrub("Data Source=.;Initial Catalog=x;Password = p@ss;pwd=1");
        assert_eq!(once, scrub(&once));
        assert!(!once.contains("p@ss"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let mut value = "ошибка".to_string();
        truncate_chars(&mut value, 3);
        assert_eq!("оши", value);

        let mut short = "ab".to_string();
        truncate_chars(&mut short, 10);
        assert_eq!("ab", short);
    }
}
