//! Turning a report into a notification body.

use crate::models::{ErrorReport, ExceptionRecord};
use bytes::Bytes;
use std::fmt::{self, Debug, Write};

/// Error returned by a [`ReportRenderer`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum RenderError {
    /// Writing the document failed.
    #[error("formatting failed")]
    Format(#[from] fmt::Error),

    /// A template could not be rendered.
    #[error("template {name} failed: {message}")]
    Template {
        /// Template name.
        name: String,
        /// What went wrong.
        message: String,
    },
}

/// Renders reports for the mail body and for the fallback record.
pub trait ReportRenderer: Send + Sync + Debug {
    /// Render the body of the notification mail.
    fn render_html(&self, report: &ErrorReport) -> Result<Bytes, RenderError>;

    /// Render the report as plain text. Used when the mail could not be sent.
    fn render_plain_text(&self, report: &ErrorReport) -> Result<String, RenderError>;
}

/// Built-in renderer that lays the report out as text. The HTML body wraps the same text in a
/// `<pre>` block.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl ReportRenderer for TextRenderer {
    fn render_html(&self, report: &ErrorReport) -> Result<Bytes, RenderError> {
        let text = self.render_plain_text(report)?;
        let mut html = String::with_capacity(text.len() + 128);
        html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>");
        escape_html(&mut html, report.root_message());
        html.push_str("</title></head><body><pre>");
        escape_html(&mut html, &text);
        html.push_str("</pre></body></html>\n");
        Ok(Bytes::from(html))
    }

    fn render_plain_text(&self, report: &ErrorReport) -> Result<String, RenderError> {
        let mut out = String::new();
        writeln!(out, "{}: {}", report.root_type(), report.root_message())?;
        writeln!(out, "Severity: {}", report.severity())?;
        if let Some(code) = report.code() {
            writeln!(out, "Code: {:#010x}", code)?;
        }
        if let Some(component) = report.component() {
            write!(out, "Origin: {}", component)?;
            if let Some(version) = report.version() {
                write!(out, " {}", version)?;
            }
            if let Some(method) = report.method() {
                write!(out, " in {}", method)?;
            }
            writeln!(out)?;
        }
        for warning in report.warnings() {
            writeln!(out, "Warning: {}", warning)?;
        }

        let context = report.context();
        writeln!(out)?;
        writeln!(out, "Application: {}", context.app_name())?;
        writeln!(out, "Host: {}", context.host())?;
        writeln!(out, "User: {}", context.user())?;
        writeln!(out, "Time: {}", context.time().to_rfc3339())?;
        writeln!(out, "Directory: {}", context.base_directory())?;
        if let Some(version) = context.runtime_version() {
            writeln!(out, "Notifier version: {}", version)?;
        }
        if let Some(memory) = context.memory_used() {
            writeln!(out, "Memory: {} bytes", memory)?;
        }
        if let Some(domain) = context.domain() {
            writeln!(out, "Domain: {}", domain)?;
        }
        if let Some(request) = context.request() {
            writeln!(out, "Request: {} {}", request.method(), request.url())?;
            write!(out, "Client: {}", request.remote_addr())?;
            if let Some(host) = request.remote_host() {
                write!(out, " ({})", host)?;
            }
            writeln!(out)?;
            for line in request.headers().lines() {
                writeln!(out, "  {}", line)?;
            }
        }

        for (index, record) in report.records().iter().enumerate() {
            writeln!(out)?;
            render_record(&mut out, index, record)?;
        }
        Ok(out)
    }
}

fn render_record(out: &mut String, index: usize, record: &ExceptionRecord) -> fmt::Result {
    write!(out, "#{} {}: {}", index, record.type_name(), record.message())?;
    if let Some(severity) = record.severity() {
        write!(out, " [{}]", severity)?;
    }
    if record.is_first_in_chain() {
        out.push_str(" (first handled)");
    }
    writeln!(out)?;
    if let Some(component) = record.component() {
        writeln!(
            out,
            "   at {} {} {}",
            component,
            record.version().unwrap_or_default(),
            record.method().unwrap_or_default()
        )?;
    }
    if !record.details().is_empty() {
        writeln!(out, "   Details: {}", record.details())?;
    }
    if let Some(command) = record.command() {
        writeln!(out, "   Command: {}", command.text())?;
        if let Some(connection) = command.connection() {
            writeln!(out, "   Connection: {}", connection)?;
        }
        for line in command.parameters().lines() {
            writeln!(out, "   {}", line)?;
        }
        if let Some(timeout) = command.timeout_secs() {
            writeln!(out, "   Timeout: {}s", timeout)?;
        }
    }
    if let Some(stack_trace) = record.stack_trace() {
        for line in stack_trace.lines() {
            writeln!(out, "   | {}", line)?;
        }
    }
    Ok(())
}

fn escape_html(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}
