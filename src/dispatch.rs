use crate::{
    internal_logs::{notifier_debug, notifier_warn},
    models::{truncate_chars, ErrorReport, Severity},
    render::ReportRenderer,
    transport::{EventSink, MailMessage, MailTransport, HTML_CONTENT_TYPE},
    Error,
};
use futures_util::FutureExt;
use std::{
    fmt::Write,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

/// Longest subject line in characters.
pub(crate) const MAX_SUBJECT_CHARS: usize = 254;
const EVENT_SOURCE_PREFIX: &str = "ErrorNotifier";

/// Subject line of the notification for `report`.
///
/// Mail rules on the support side sort on the prefix, so its format is fixed.
pub(crate) fn subject(report: &ErrorReport, app_name: &str) -> String {
    let message = report.root_message();
    let mut subject = match report.severity() {
        Severity::Error => match report.component() {
            Some(component) => format!("AppError[{}][{}]:{}", app_name, component, message),
            None => format!("AppError[{}]:{}", app_name, message),
        },
        Severity::ExternalError => format!("Error {}", message),
        severity @ (Severity::Info | Severity::Alarm) => format!("*{}* {}", severity, message),
    }
    .replace(['\r', '\n'], " ");
    truncate_chars(&mut subject, MAX_SUBJECT_CHARS);
    subject
}

/// Counts delivery attempts that have been accepted but not concluded.
#[derive(Debug, Default)]
pub(crate) struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub(crate) fn begin(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(&self.0))
    }

    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ends an in-flight delivery when dropped.
#[derive(Debug)]
pub(crate) struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

/// Sends notifications and falls back to the event sink when that fails.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    app_name: String,
    smtp_server: String,
    support_email: String,
    transport: Arc<dyn MailTransport>,
    renderer: Arc<dyn ReportRenderer>,
    event_sink: Arc<dyn EventSink>,
    // Only one message is handed to the transport at a time.
    send_lock: tokio::sync::Mutex<()>,
    sink_lock: Mutex<()>,
    in_flight: InFlight,
}

impl Dispatcher {
    pub(crate) fn new(
        app_name: impl Into<String>,
        smtp_server: impl Into<String>,
        support_email: impl Into<String>,
        transport: Arc<dyn MailTransport>,
        renderer: Arc<dyn ReportRenderer>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Dispatcher {
            app_name: app_name.into(),
            smtp_server: smtp_server.into(),
            support_email: support_email.into(),
            transport,
            renderer,
            event_sink,
            send_lock: tokio::sync::Mutex::new(()),
            sink_lock: Mutex::new(()),
            in_flight: InFlight::default(),
        }
    }

    pub(crate) fn begin(&self) -> InFlightGuard {
        self.in_flight.begin()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    fn sender(&self) -> String {
        format!("\"{}\" <{}>", self.app_name, self.support_email)
    }

    /// Mail the report. Failures end up in the event sink and are not returned.
    pub(crate) async fn deliver(&self, subject: String, report: &ErrorReport) {
        match self.send(&subject, report).await {
            Ok(()) => {
                notifier_debug!(subject = subject.as_str(), "notification sent");
            }
            Err(err) => {
                notifier_warn!(
                    subject = subject.as_str(),
                    error = %err,
                    "sending notification failed, recording it locally"
                );
                self.fallback(&subject, report, &err);
            }
        }
    }

    async fn send(&self, subject: &str, report: &ErrorReport) -> Result<(), Error> {
        let body = self.renderer.render_html(report)?;
        let message = MailMessage {
            from: self.sender(),
            to: self.support_email.clone(),
            subject: subject.to_string(),
            body,
            content_type: HTML_CONTENT_TYPE,
        };

        let _guard = self.send_lock.lock().await;
        match AssertUnwindSafe(self.transport.send(message))
            .catch_unwind()
            .await
        {
            Ok(result) => result.map_err(Error::Transport),
            Err(_) => Err(Error::Transport("mail transport panicked".into())),
        }
    }

    fn fallback(&self, subject: &str, report: &ErrorReport, err: &Error) {
        let body = self.fallback_text(subject, report, err);
        let source = format!("{}: {}", EVENT_SOURCE_PREFIX, self.app_name);

        let _guard = self.sink_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let recorded = panic::catch_unwind(AssertUnwindSafe(|| {
            self.event_sink.record(&source, &body, Severity::Error)
        }));
        if recorded.is_err() {
            notifier_warn!(source = source.as_str(), "event sink panicked, notification lost");
        }
    }

    fn fallback_text(&self, subject: &str, report: &ErrorReport, err: &Error) -> String {
        let mut text = String::new();
        // Writing to a String does not fail.
        let _ = writeln!(text, "Failed to send notification mail.");
        let _ = writeln!(text, "Server: {}", self.smtp_server);
        let _ = writeln!(text, "To: {}", self.support_email);
        let _ = writeln!(text, "From: {}", self.sender());
        let _ = writeln!(text, "Subject: {}", subject);
        let _ = writeln!(text, "Reason: {}", err);
        let _ = writeln!(text);
        match self.renderer.render_plain_text(report) {
            Ok(plain) => text.push_str(&plain),
            Err(render_err) => {
                let _ = writeln!(text, "Rendering the report failed: {}", render_err);
                let _ = writeln!(text, "{}: {}", report.root_type(), report.root_message());
            }
        }
        text
    }
}
