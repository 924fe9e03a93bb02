use crate::{
    config::NotifierConfig,
    context::{collect, ReportContext},
    dispatch::{subject, Dispatcher},
    internal_logs::notifier_debug,
    models::{ErrorReport, Fault, Severity},
    provenance::{Component, ComponentRegistry, ComponentSource},
    render::{ReportRenderer, TextRenderer},
    report::ReportBuilder,
    runner::TaskRunner,
    throttle::{Clock, DedupKey, DedupThrottle, SystemClock},
    transport::{EventSink, MailTransport},
    Error,
};
use futures_util::FutureExt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Reports failures to the support mailbox.
///
/// Reporting never fails and never blocks: [`report`](Notifier::report) builds the report on the
/// calling thread and hands delivery to a pool of background workers.
///
/// ```no_run
/// # async fn run(transport: impl error_notifier::MailTransport + 'static) -> Result<(), error_notifier::Error> {
/// use error_notifier::{Fault, Notifier, NotifierConfig};
///
/// let config = NotifierConfig::from_env()?;
/// let notifier = Notifier::builder(config, transport).build()?;
///
/// if let Err(err) = std::fs::read_to_string("/etc/orders.toml") {
///     notifier.report(&Fault::from_error(&err));
/// }
/// notifier.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Notifier {
    shared: Arc<Shared>,
    runner: TaskRunner,
}

#[derive(Debug)]
struct Shared {
    config: NotifierConfig,
    registry: ComponentRegistry,
    throttle: DedupThrottle,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
}

impl Notifier {
    /// Start building a notifier that mails through `transport`.
    pub fn builder(
        config: NotifierConfig,
        transport: impl MailTransport + 'static,
    ) -> NotifierBuilder {
        NotifierBuilder {
            config,
            transport: Arc::new(transport),
            renderer: Arc::new(TextRenderer),
            event_sink: default_event_sink(),
            components: Vec::new(),
            component_source: None,
            clock: Arc::new(SystemClock),
            runtime: None,
        }
    }

    /// Build the report for `fault` without sending anything.
    pub fn build_report(&self, fault: &Fault, context: &ReportContext) -> ErrorReport {
        self.shared.build_report(fault, context)
    }

    /// Report `fault` in the background.
    pub fn report(&self, fault: &Fault) {
        self.report_with(fault, &ReportContext::default());
    }

    /// Report `fault` in the background, together with the caller's context.
    pub fn report_with(&self, fault: &Fault, context: &ReportContext) {
        let report = self.shared.build_report(fault, context);
        let subject = match self.shared.admit(&report) {
            Some(subject) => subject,
            None => return,
        };

        let guard = self.shared.dispatcher.begin();
        let shared = Arc::clone(&self.shared);
        self.runner.schedule(
            async move {
                let _guard = guard;
                shared.dispatcher.deliver(subject, &report).await;
            }
            .boxed(),
        );
    }

    /// Report `fault` and wait until the notification has been sent or recorded in the event
    /// sink.
    pub async fn report_and_wait(&self, fault: &Fault, context: &ReportContext) {
        let report = self.shared.build_report(fault, context);
        if let Some(subject) = self.shared.admit(&report) {
            let _guard = self.shared.dispatcher.begin();
            self.shared.dispatcher.deliver(subject, &report).await;
        }
    }

    /// Number of accepted notifications whose delivery has not concluded yet.
    pub fn in_flight(&self) -> usize {
        self.shared.dispatcher.in_flight()
    }

    /// Registry used to attribute failures to components.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.shared.registry
    }

    /// Configuration in use.
    pub fn config(&self) -> &NotifierConfig {
        &self.shared.config
    }

    /// Stop accepting background reports and wait for the queued ones to be delivered.
    pub async fn shutdown(&self) {
        self.runner.shutdown().await;
    }
}

impl Shared {
    fn build_report(&self, fault: &Fault, context: &ReportContext) -> ErrorReport {
        let info = collect(
            self.config.app_name(),
            self.config.domain(),
            context,
            self.clock.now(),
        );
        ReportBuilder::new(&self.registry).build(fault, info)
    }

    /// Decide whether `report` is sent. Returns its subject if so.
    fn admit(&self, report: &ErrorReport) -> Option<String> {
        if !report.mail_worthy() {
            notifier_debug!(root = report.root_type(), "report is not mail-worthy");
            return None;
        }
        let environmental = matches!(
            report.severity(),
            Severity::ExternalError | Severity::Alarm
        );
        if environmental && self.config.require_domain() && report.context().domain().is_none() {
            notifier_debug!(
                severity = report.severity().as_str(),
                "report skipped outside the own domain"
            );
            return None;
        }

        let subject = subject(report, self.config.app_name());
        let key = DedupKey::new(
            report.context().host(),
            report.context().user(),
            report.method().unwrap_or_default(),
            &subject,
        );
        if self.throttle.admit(key, self.clock.now()) {
            Some(subject)
        } else {
            None
        }
    }
}

#[cfg(feature = "internal-logs")]
fn default_event_sink() -> Arc<dyn EventSink> {
    Arc::new(crate::transport::TracingEventSink)
}

#[cfg(not(feature = "internal-logs"))]
fn default_event_sink() -> Arc<dyn EventSink> {
    Arc::new(crate::transport::StderrEventSink)
}

/// Builder for [`Notifier`].
#[derive(Debug)]
pub struct NotifierBuilder {
    config: NotifierConfig,
    transport: Arc<dyn MailTransport>,
    renderer: Arc<dyn ReportRenderer>,
    event_sink: Arc<dyn EventSink>,
    components: Vec<Component>,
    component_source: Option<Arc<dyn ComponentSource>>,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
}

impl NotifierBuilder {
    /// Set the renderer of mail bodies and fallback records.
    ///
    /// Default: [`TextRenderer`].
    pub fn with_renderer(mut self, renderer: impl ReportRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// Set where notifications go when mail fails.
    ///
    /// Default: [`TracingEventSink`](crate::TracingEventSink) with the `internal-logs` feature,
    /// [`StderrEventSink`](crate::StderrEventSink) without.
    pub fn with_event_sink(mut self, event_sink: impl EventSink + 'static) -> Self {
        self.event_sink = Arc::new(event_sink);
        self
    }

    /// Register first-party components.
    pub fn with_components(mut self, components: impl IntoIterator<Item = Component>) -> Self {
        self.components.extend(components);
        self
    }

    /// Set a source that is rescanned when an unknown component shows up in a stack trace.
    pub fn with_component_source(mut self, source: impl ComponentSource + 'static) -> Self {
        self.component_source = Some(Arc::new(source));
        self
    }

    /// Set the clock used for report timestamps and deduplication.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run delivery workers on `runtime` instead of the runtime current at
    /// [`build`](NotifierBuilder::build).
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the notifier and start its workers.
    ///
    /// Fails if a required setting is empty or no tokio runtime is available.
    pub fn build(self) -> Result<Notifier, Error> {
        if let Some(field) = self.config.missing_field() {
            return Err(Error::NotConfigured(field));
        }
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };

        let runner = TaskRunner::new(
            &runtime,
            self.config.workers(),
            self.config.queue_capacity(),
        );
        let dispatcher = Dispatcher::new(
            self.config.app_name(),
            self.config.smtp_server(),
            self.config.support_email(),
            self.transport,
            self.renderer,
            self.event_sink,
        );
        notifier_debug!(
            app = self.config.app_name(),
            workers = self.config.workers(),
            "notifier started"
        );
        Ok(Notifier {
            shared: Arc::new(Shared {
                registry: ComponentRegistry::new(self.components, self.component_source),
                throttle: DedupThrottle::new(self.config.dedup_window()),
                clock: self.clock,
                dispatcher,
                config: self.config,
            }),
            runner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{CommandDescriptor, ManagedOptions, TransportStatus},
        provenance::Provenance,
        throttle::ManualClock,
        transport::{MailMessage, TransportError},
    };
    use async_trait::async_trait;
    use std::{sync::Mutex, time::Duration};

    #[derive(Debug, Default, Clone)]
    struct Outbox(Arc<Mutex<Vec<MailMessage>>>);

    #[async_trait]
    impl MailTransport for Outbox {
        async fn send(&self, message: MailMessage) -> Result<(), TransportError> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn config() -> NotifierConfig {
        NotifierConfig::new("orders", "smtp.corp.local", "support@corp.local")
    }

    fn subjects(outbox: &Outbox) -> Vec<String> {
        outbox
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.subject.clone())
            .collect()
    }

    #[test]
    fn build_requires_runtime() {
        let result = Notifier::builder(config(), Outbox::default()).build();
        assert!(matches!(result, Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn build_requires_configuration() {
        let config = NotifierConfig::new("orders", "", "support@corp.local");
        let result = Notifier::builder(config, Outbox::default()).build();
        assert!(matches!(result, Err(Error::NotConfigured("SmtpServer"))));
    }

    #[tokio::test]
    async fn duplicates_suppressed_until_window_passes() {
        let outbox = Outbox::default();
        let clock = Arc::new(ManualClock::default());
        let notifier = Notifier::builder(config(), outbox.clone())
            .with_clock(clock.clone())
            .build()
            .unwrap();
        let fault = Fault::new("ParseError", "bad input");

        notifier
            .report_and_wait(&fault, &ReportContext::default())
            .await;
        clock.advance(Duration::from_secs(60));
        notifier
            .report_and_wait(&fault, &ReportContext::default())
            .await;
        clock.advance(Duration::from_secs(20 * 60));
        notifier
            .report_and_wait(&fault, &ReportContext::default())
            .await;

        assert_eq!(
            vec!["AppError[orders]:bad input", "AppError[orders]:bad input"],
            subjects(&outbox)
        );
    }

    #[tokio::test]
    async fn environmental_failures_need_own_domain() {
        let outbox = Outbox::default();
        let notifier = Notifier::builder(config(), outbox.clone()).build().unwrap();
        let fault = Fault::transport("dns", TransportStatus::NameResolutionFailure, None);
        notifier
            .report_and_wait(&fault, &ReportContext::default())
            .await;
        assert!(subjects(&outbox).is_empty());

        let outbox = Outbox::default();
        let notifier = Notifier::builder(config().with_require_domain(false), outbox.clone())
            .build()
            .unwrap();
        notifier
            .report_and_wait(&fault, &ReportContext::default())
            .await;
        assert_eq!(vec!["Error dns"], subjects(&outbox));

        let outbox = Outbox::default();
        let notifier = Notifier::builder(config().with_domain("corp.local"), outbox.clone())
            .build()
            .unwrap();
        notifier
            .report_and_wait(&fault, &ReportContext::default())
            .await;
        assert_eq!(vec!["Error dns"], subjects(&outbox));
    }

    #[tokio::test]
    async fn external_failures_from_different_methods_are_both_sent() {
        let outbox = Outbox::default();
        let notifier = Notifier::builder(config().with_domain("corp.local"), outbox.clone())
            .build()
            .unwrap();
        let fault = |method: &str| {
            Fault::managed(
                "database call failed",
                Some(Fault::data_access("Timeout expired", -2, 11)),
                ManagedOptions::default()
                    .with_command(CommandDescriptor::new("exec dbo.Run"))
                    .with_provenance(Provenance::new(
                        "orders_core",
                        "1.4.0",
                        Some(method.to_string()),
                    )),
            )
        };

        let report = notifier.build_report(&fault("save_order"), &ReportContext::default());
        assert_eq!(Severity::ExternalError, report.severity());
        assert_eq!(Some("save_order"), report.method());
        assert!(report.records().iter().all(|r| r.method().is_none()));

        for method in ["save_order", "load_invoice", "save_order"] {
            notifier
                .report_and_wait(&fault(method), &ReportContext::default())
                .await;
        }
        assert_eq!(
            vec!["Error Timeout expired", "Error Timeout expired"],
            subjects(&outbox)
        );
    }

    #[tokio::test]
    async fn not_mail_worthy_is_skipped() {
        let outbox = Outbox::default();
        let notifier = Notifier::builder(config(), outbox.clone()).build().unwrap();
        let fault = Fault::managed(
            "handled",
            None,
            ManagedOptions::default().with_notify(false),
        );
        notifier
            .report_and_wait(&fault, &ReportContext::default())
            .await;
        assert!(subjects(&outbox).is_empty());
        assert_eq!(0, notifier.in_flight());
    }

    #[tokio::test]
    async fn build_report_uses_registered_components() {
        let notifier = Notifier::builder(config(), Outbox::default())
            .with_components(vec![Component::new("orders-core", "1.4.0")])
            .build()
            .unwrap();
        let fault = Fault::new("ParseError", "bad")
            .with_stack_trace("   0: orders_core::parse::h0123456789abcdef");
        let report = notifier.build_report(&fault, &ReportContext::default());
        assert_eq!(Some("orders_core"), report.component());
        assert_eq!("orders", report.context().app_name());
        assert!(notifier.registry().contains("orders_core"));
    }
}
