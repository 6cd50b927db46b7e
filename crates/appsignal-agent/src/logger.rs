// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log formatting for the agent.
//!
//! Every line is prefixed with `appsignal` so agent output can be told apart
//! from the instrumented application's own logs:
//!
//! ```text
//! appsignal | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Custom log formatter that prefixes messages with `appsignal`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "appsignal | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Builds the filter used by [`init`], silencing the HTTP and TLS stacks.
pub fn env_filter(log_level: &str) -> Result<EnvFilter, Box<dyn std::error::Error + Send + Sync>> {
    Ok(EnvFilter::try_new(format!(
        "h2=off,hyper=off,rustls=off,{log_level}"
    ))?)
}

/// Installs a global subscriber writing agent logs to stderr.
///
/// Fails when the level does not parse or a global subscriber is already set.
pub fn init(log_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock poisoned").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_formatter_prefixes_lines() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_writer(capture.clone())
            .event_format(Formatter)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("transmit", action = "markers");
            let _guard = span.enter();
            tracing::info!(status = 200, "Transmitted");
        });

        let output = String::from_utf8(capture.0.lock().expect("lock poisoned").clone())
            .expect("utf8 output");
        assert!(output.starts_with("appsignal | INFO | transmit{"));
        assert!(output.contains("markers"));
        assert!(output.contains("}: Transmitted"));
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        assert!(env_filter("info").is_ok());
        assert!(env_filter("[[[").is_err());
    }

    #[test]
    fn test_env_filter_silences_transport_stacks() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_writer(capture.clone())
            .with_env_filter(env_filter("debug").expect("valid filter"))
            .event_format(Formatter)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "h2", "h2 frame");
            tracing::debug!(target: "hyper", "hyper connection");
            tracing::debug!(target: "rustls", "rustls handshake");
            tracing::debug!(target: "reqwest", "reqwest request");
            tracing::debug!(target: "appsignal_agent", "agent event");
        });

        let output = String::from_utf8(capture.0.lock().expect("lock poisoned").clone())
            .expect("utf8 output");
        assert!(!output.contains("h2 frame"));
        assert!(!output.contains("hyper connection"));
        assert!(!output.contains("rustls handshake"));
        assert!(output.contains("reqwest request"));
        assert!(output.contains("appsignal | DEBUG | agent event"));
    }

    #[test]
    #[serial]
    fn test_init_twice_fails() {
        // The first call may lose against another test's global subscriber.
        let _ = init("debug");
        assert!(init("debug").is_err());
    }
}
