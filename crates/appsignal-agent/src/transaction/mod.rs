// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The in-process record of one monitored request or background job.
//!
//! A [`Transaction`] is created when a request or job begins, receives its
//! root event, tags and at most one captured exception while it runs, and is
//! handed to the native layer when it completes. Lifecycle management lives in
//! [`registry`].

pub mod registry;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::exception::{ExceptionReport, ExceptionReporter};
use crate::native::{NativeAgent, NoopNativeAgent};
use crate::queue_start::{background_queue_start, http_queue_start, UNKNOWN_QUEUE_START};
use crate::sanitizer::{Session, SESSION_ENV_KEY};
use crate::value::{Env, RawMap};

pub use registry::{SharedTransaction, TransactionRegistry, WorkerId};

/// Event name suffixes of the supported background job frameworks.
pub const BACKGROUND_JOB_FRAMEWORKS: &[&str] = &["delayed_job", "sidekiq", "resque"];

/// Whether a transaction is a web request or a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    HttpRequest,
    BackgroundJob,
}

impl TransactionKind {
    /// Classifies a root event by the framework suffix of its name.
    pub fn from_event_name(name: &str) -> Self {
        if BACKGROUND_JOB_FRAMEWORKS
            .iter()
            .any(|framework| name.ends_with(framework))
        {
            Self::BackgroundJob
        } else {
            Self::HttpRequest
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpRequest => "http_request",
            Self::BackgroundJob => "background_job",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the root event, as emitted by the instrumented framework.
///
/// Web requests populate `controller`, `action` and the request metadata;
/// background jobs populate `class`, `method` and `queue_start`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPayload {
    pub controller: Option<String>,
    pub action: Option<String>,
    pub class: Option<String>,
    pub method: Option<String>,
    pub params: Option<RawMap>,
    pub path: Option<String>,
    pub request_format: Option<String>,
    pub request_method: Option<String>,
    /// Moment the job was enqueued, in seconds since epoch.
    pub queue_start: Option<f64>,
}

impl EventPayload {
    /// Action name for the given kind: `Controller#action` or `Class#method`.
    pub fn action_name(&self, kind: TransactionKind) -> String {
        let (owner, member) = match kind {
            TransactionKind::HttpRequest => (&self.controller, &self.action),
            TransactionKind::BackgroundJob => (&self.class, &self.method),
        };
        format!(
            "{}#{}",
            owner.as_deref().unwrap_or_default(),
            member.as_deref().unwrap_or_default()
        )
    }
}

/// An error captured from the instrumented application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    pub class_name: String,
    pub message: String,
    pub backtrace: Vec<String>,
}

impl CapturedError {
    pub fn new(
        class_name: impl Into<String>,
        message: impl Into<String>,
        backtrace: Vec<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            backtrace,
        }
    }
}

/// A monitored request or job.
pub struct Transaction {
    request_id: String,
    env: Option<Env>,
    session: Option<Session>,
    tags: RawMap,
    root_event_name: Option<String>,
    root_event_payload: Option<EventPayload>,
    action: Option<String>,
    kind: Option<TransactionKind>,
    queue_start: Option<i64>,
    exception: Option<CapturedError>,
    time: Option<f64>,
    native: Arc<dyn NativeAgent>,
    reporter: Arc<ExceptionReporter>,
    clock: Arc<dyn Clock>,
}

impl Transaction {
    /// Creates a detached transaction that reports nowhere.
    ///
    /// Transactions that should reach the native layer are created through
    /// [`TransactionRegistry::create`].
    pub fn new(request_id: impl Into<String>, env: Option<Env>) -> Self {
        Self::with_collaborators(
            request_id.into(),
            env,
            Arc::new(NoopNativeAgent),
            Arc::new(ExceptionReporter::default()),
            Arc::new(SystemClock),
        )
    }

    pub(crate) fn with_collaborators(
        request_id: String,
        env: Option<Env>,
        native: Arc<dyn NativeAgent>,
        reporter: Arc<ExceptionReporter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = env
            .as_ref()
            .and_then(|env| env.get(SESSION_ENV_KEY))
            .and_then(|session| session.as_map())
            .map(|session| Session::Direct(session.clone()));

        Self {
            request_id,
            env,
            session,
            tags: RawMap::new(),
            root_event_name: None,
            root_event_payload: None,
            action: None,
            kind: None,
            queue_start: None,
            exception: None,
            time: None,
            native,
            reporter,
            clock,
        }
    }

    /// Replaces the clock used for exception and queue times.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the reporter used to assemble exception reports.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<ExceptionReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn env(&self) -> Option<&Env> {
        self.env.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Attaches session data, e.g. a wrapped session accessor.
    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn tags(&self) -> &RawMap {
        &self.tags
    }

    /// Merges `tags` into the existing tags.
    pub fn set_tags(&mut self, tags: RawMap) {
        self.tags.extend(tags);
    }

    pub fn root_event_name(&self) -> Option<&str> {
        self.root_event_name.as_deref()
    }

    pub fn root_event_payload(&self) -> Option<&EventPayload> {
        self.root_event_payload.as_ref()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn kind(&self) -> Option<TransactionKind> {
        self.kind
    }

    /// Queue start in milliseconds, or `-1` when unknown.
    pub fn queue_start(&self) -> i64 {
        self.queue_start.unwrap_or(UNKNOWN_QUEUE_START)
    }

    pub fn exception(&self) -> Option<&CapturedError> {
        self.exception.as_ref()
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Seconds since epoch at which the exception was captured.
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Sets the root event, deriving kind, action and queue start from it,
    /// and reports the metadata to the native layer.
    ///
    /// Only the first root event counts; later calls are ignored.
    pub fn set_root_event(&mut self, name: impl Into<String>, payload: EventPayload) {
        let name = name.into();
        if let Some(existing) = &self.root_event_name {
            debug!(
                request_id = %self.request_id,
                "Ignoring root event {name}, {existing} is already set"
            );
            return;
        }

        let kind = TransactionKind::from_event_name(&name);
        let action = payload.action_name(kind);
        let queue_start = match self.queue_start {
            Some(cached) => cached,
            None => {
                let derived = match kind {
                    TransactionKind::HttpRequest => http_queue_start(self.env.as_ref()),
                    TransactionKind::BackgroundJob => {
                        background_queue_start(payload.queue_start, self.clock.now())
                    }
                };
                self.queue_start = Some(derived);
                derived
            }
        };

        self.native
            .set_transaction_metadata(&self.request_id, &action, kind, queue_start);
        debug!(
            request_id = %self.request_id,
            kind = %kind,
            queue_start,
            "Root event set for {action}"
        );

        self.root_event_name = Some(name);
        self.root_event_payload = Some(payload);
        self.kind = Some(kind);
        self.action = Some(action);
    }

    /// Captures an error, stamps the capture time and forwards the encoded
    /// exception report to the native layer.
    ///
    /// Reporting failures are logged and never surface to the caller.
    pub fn set_exception(&mut self, error: CapturedError) {
        self.time = Some(self.clock.now());
        self.exception = Some(error);

        let Some(report) = self.exception_hash() else {
            return;
        };
        match serde_json::to_string(&report) {
            Ok(json) => self
                .native
                .set_exception_for_transaction(&self.request_id, &json),
            Err(err) => warn!(
                request_id = %self.request_id,
                "Failed to encode exception report: {err}"
            ),
        }
    }

    /// Forgets a previously captured error.
    pub fn clear_exception(&mut self) {
        self.exception = None;
        self.time = None;
    }

    /// Builds the exception report, `None` without a captured error.
    pub fn exception_hash(&self) -> Option<ExceptionReport> {
        self.reporter.exception_hash(self)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("request_id", &self.request_id)
            .field("action", &self.action)
            .field("kind", &self.kind)
            .field("queue_start", &self.queue_start)
            .field("tags", &self.tags)
            .field("exception", &self.exception)
            .finish_non_exhaustive()
    }
}
