use crate::{
    classify::{classify_chain, declared_severity},
    models::{
        scrub, ContextInfo, ErrorReport, ExceptionRecord, Fault, ReportWarning, Sanitize,
        Severity,
    },
    provenance::{ComponentRegistry, Provenance},
};

/// Turns a cause chain into an [`ErrorReport`].
#[derive(Debug)]
pub(crate) struct ReportBuilder<'a> {
    registry: &'a ComponentRegistry,
}

impl<'a> ReportBuilder<'a> {
    pub(crate) fn new(registry: &'a ComponentRegistry) -> Self {
        ReportBuilder { registry }
    }

    /// Build the report for `fault` and everything it wraps. Never fails.
    pub(crate) fn build(&self, fault: &Fault, context: ContextInfo) -> ErrorReport {
        let mut chain: Vec<&Fault> = fault.chain().collect();
        chain.reverse();
        let innermost = chain[0];
        let verdict = classify_chain(&chain);

        let mut warnings = Vec::new();
        let mut records = Vec::with_capacity(chain.len());
        for (index, fault) in chain.iter().enumerate() {
            let inner = index.checked_sub(1).map(|i| chain[i]);
            let (record, warning) = self.record(fault, inner, chain.len() == 1);
            if let Some(warning) = warning {
                push_unique(&mut warnings, warning);
            }
            records.push(record);
        }

        if let Some(first) = chain.iter().rposition(|fault| starts_managed_run(fault)) {
            records[first].is_first_in_chain = true;
        }

        let (component, version, method) =
            match records.iter().rev().find(|r| r.component.is_some()) {
                Some(r) => (r.component.clone(), r.version.clone(), r.method.clone()),
                None => {
                    push_unique(&mut warnings, ReportWarning::UnattributedOrigin);
                    (None, None, None)
                }
            };

        let mut report = ErrorReport {
            root_type: innermost.type_name().to_string(),
            root_message: innermost.message().to_string(),
            severity: verdict.severity,
            mail_worthy: verdict.mail_worthy,
            component,
            version,
            method,
            records,
            context,
            warnings,
            code: innermost.code(),
        };
        if report.severity == Severity::ExternalError {
            report.sanitize();
        }
        report
    }

    fn record(
        &self,
        fault: &Fault,
        inner: Option<&Fault>,
        alone: bool,
    ) -> (ExceptionRecord, Option<ReportWarning>) {
        let provenance = self.provenance(fault);
        let managed = fault.as_managed();

        let mut warning = None;
        let mut command = None;
        if inner.map_or(false, |i| i.as_data_access().is_some()) {
            command = managed.and_then(|m| m.command()).map(|c| c.record());
            if command.is_none() {
                warning = Some(ReportWarning::MissingDataAccessCommand);
            }
        } else if alone && fault.as_data_access().is_some() {
            warning = Some(ReportWarning::MissingDataAccessCommand);
        }

        let (component, version, method) = match provenance {
            Some(p) => (
                Some(p.component().to_string()),
                Some(p.version().to_string()),
                p.method().map(str::to_string),
            ),
            None => (None, None, None),
        };
        let record = ExceptionRecord {
            message: fault.message().to_string(),
            type_name: fault.type_name().to_string(),
            severity: declared_severity(fault),
            details: fault.details().map(|d| scrub(&d)).unwrap_or_default(),
            is_first_in_chain: false,
            component,
            version,
            method,
            stack_trace: fault
                .stack_trace()
                .map(|s| s.trim_end_matches(['\n', '\r']).to_string()),
            command,
        };
        (record, warning)
    }

    fn provenance(&self, fault: &Fault) -> Option<Provenance> {
        if let Some(explicit) = fault.as_managed().and_then(|m| m.provenance()) {
            return Some(explicit.clone());
        }
        fault
            .stack_trace()
            .and_then(|trace| self.registry.resolve(trace))
    }
}

/// A managed fault whose cause is absent or foreign: the point where first-party code took over.
fn starts_managed_run(fault: &Fault) -> bool {
    fault.as_managed().is_some()
        && fault
            .inner()
            .map_or(true, |inner| inner.as_managed().is_none())
}

fn push_unique(warnings: &mut Vec<ReportWarning>, warning: ReportWarning) {
    if !warnings.contains(&warning) {
        warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::codes,
        context::{collect, ReportContext},
        models::{CommandDescriptor, ManagedOptions},
        provenance::Component,
    };
    use chrono::Utc;

    const TRACE: &str = "   0: orders_core::store::save::h1111111111111111
             at ./crates/core/src/store.rs:42:9
   1: tokio::runtime::task::raw::poll::h3333333333333333

";

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(vec![Component::new("orders_core", "1.4.0")], None)
    }

    fn build(fault: &Fault) -> ErrorReport {
        let registry = registry();
        let context = collect("orders", Some("corp.local"), &ReportContext::default(), Utc::now());
        ReportBuilder::new(&registry).build(fault, context)
    }

    fn managed(message: &str, inner: Option<Fault>, options: ManagedOptions) -> Fault {
        Fault::managed(message, inner, options)
    }

    #[test]
    fn one_record_per_fault_innermost_first() {
        let fault = managed(
            "outer",
            Some(managed(
                "middle",
                Some(Fault::new("ParseError", "inner")),
                ManagedOptions::default(),
            )),
            ManagedOptions::default(),
        );
        let report = build(&fault);
        let messages: Vec<_> = report.records().iter().map(|r| r.message()).collect();
        assert_eq!(vec!["inner", "middle", "outer"], messages);
        assert_eq!("ParseError", report.root_type());
        assert_eq!("inner", report.root_message());
    }

    #[test]
    fn first_in_chain_marks_outermost_managed_boundary() {
        let fault = managed(
            "outer",
            Some(managed(
                "middle",
                Some(Fault::new("ParseError", "inner")),
                ManagedOptions::default(),
            )),
            ManagedOptions::default(),
        );
        let report = build(&fault);
        let flags: Vec<_> = report
            .records()
            .iter()
            .map(|r| r.is_first_in_chain())
            .collect();
        assert_eq!(vec![false, true, false], flags);
    }

    #[test]
    fn provenance_from_stack_and_explicit() {
        let inner = Fault::new("ParseError", "bad").with_stack_trace(TRACE);
        let outer = managed(
            "outer",
            Some(inner),
            ManagedOptions::default().with_provenance(Provenance::new(
                "orders_web",
                "2.0.0",
                Some("post".into()),
            )),
        );
        let report = build(&outer);
        assert_eq!(Some("orders_core"), report.records()[0].component());
        assert_eq!(Some("1.4.0"), report.records()[0].version());
        assert_eq!(
            Some("   0: orders_core::store::save::h1111111111111111\n             at ./crates/core/src/store.rs:42:9\n   1: tokio::runtime::task::raw::poll::h3333333333333333"),
            report.records()[0].stack_trace()
        );
        assert_eq!(Some("orders_web"), report.component());
        assert_eq!(Some("post"), report.method());
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn unattributed_origin_is_a_warning() {
        let report = build(&Fault::new("ParseError", "bad"));
        assert_eq!(&[ReportWarning::UnattributedOrigin], report.warnings());
        assert_eq!(None, report.component());
    }

    #[test]
    fn command_recorded_on_data_access_wrapper() {
        let fault = managed(
            "save failed",
            Some(Fault::data_access("constraint", 547, 16)),
            ManagedOptions::default()
                .with_details("Password=secret;id=7")
                .with_command(
                    CommandDescriptor::new("exec dbo.Save @id")
                        .with_connection("Server=db;Password=secret")
                        .with_parameter("@id", "7"),
                ),
        );
        let report = build(&fault);
        let outer = &report.records()[1];
        let command = outer.command().unwrap();
        assert_eq!(Some("Server=db;Password=*****"), command.connection());
        assert_eq!("@id='7';", command.parameters());
        assert_eq!("Password=*****;id=7", outer.details());
        assert!(!report
            .warnings()
            .contains(&ReportWarning::MissingDataAccessCommand));
    }

    #[test_case::test_case(Fault::data_access("constraint", 547, 16) ; "lone data access")]
    #[test_case::test_case(managed("save failed", Some(Fault::data_access("constraint", 547, 16)), ManagedOptions::default()) ; "wrapper without command")]
    fn missing_command_is_a_warning(fault: Fault) {
        let report = build(&fault);
        assert!(report
            .warnings()
            .contains(&ReportWarning::MissingDataAccessCommand));
    }

    #[test]
    fn external_reports_are_stripped() {
        let inner = Fault::data_access("Timeout expired", -2, 11).with_stack_trace(TRACE);
        let fault = managed(
            "save failed",
            Some(inner),
            ManagedOptions::default().with_command(CommandDescriptor::new("exec dbo.Save")),
        );
        let report = build(&fault);
        assert_eq!(Severity::ExternalError, report.severity());
        assert!(report.records().iter().all(|r| r.component().is_none()
            && r.method().is_none()
            && r.stack_trace().is_none()));
        assert_eq!(Some("orders_core"), report.component());
        assert_eq!(None, report.context().runtime_version());
        assert_eq!(None, report.context().memory_used());
        assert!(report.records()[1].command().is_some());
    }

    #[test]
    fn code_comes_from_innermost() {
        let fault = managed(
            "outer",
            Some(Fault::new("TimeoutError", "slow").with_code(codes::TIMEOUT)),
            ManagedOptions::default(),
        )
        .with_code(7);
        let report = build(&fault);
        assert_eq!(Some(codes::TIMEOUT), report.code());
    }
}
