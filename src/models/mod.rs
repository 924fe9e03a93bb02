mod command;
mod context_info;
mod fault;
mod report;
mod sanitize;
mod severity;

pub use command::*;
pub use context_info::*;
pub use fault::*;
pub use report::*;
pub(crate) use sanitize::Sanitize;
pub use sanitize::scrub;
pub(crate) use sanitize::truncate_chars;
pub use severity::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn serialization_format() {
        let report = ErrorReport {
            root_type: "DetailedError".into(),
            root_message: "save failed".into(),
            severity: Severity::ExternalError,
            mail_worthy: true,
            component: None,
            version: None,
            method: None,
            records: vec![ExceptionRecord {
                message: "save failed".into(),
                type_name: "DetailedError".into(),
                severity: Some(Severity::Error),
                details: String::new(),
                is_first_in_chain: true,
                component: None,
                version: None,
                method: None,
                stack_trace: None,
                command: None,
            }],
            context: ContextInfo {
                app_name: "orders".into(),
                host: "web1".into(),
                user: "ann".into(),
                time: Utc.with_ymd_and_hms(2020, 6, 21, 10, 40, 0).unwrap(),
                base_directory: "/srv".into(),
                runtime_version: None,
                memory_used: None,
                request: None,
                domain: None,
            },
            warnings: vec![ReportWarning::UnattributedOrigin],
            code: None,
        };
        let serialized = serde_json::to_string(&report).unwrap();
        let expected = "{\"rootType\":\"DetailedError\",\"rootMessage\":\"save failed\",\"severity\":4,\"mailWorthy\":true,\"records\":[{\"message\":\"save failed\",\"typeName\":\"DetailedError\",\"severity\":1,\"details\":\"\",\"isFirstInChain\":true}],\"context\":{\"appName\":\"orders\",\"host\":\"web1\",\"user\":\"ann\",\"time\":\"2020-06-21T10:40:00Z\",\"baseDirectory\":\"/srv\"},\"warnings\":[\"UnattributedOrigin\"]}";
        assert_eq!(expected, serialized);
    }
}
