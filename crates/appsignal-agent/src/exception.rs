// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Exception report assembly.
//!
//! [`ExceptionReporter::exception_hash`] turns a transaction with a captured
//! error into an [`ExceptionReport`]: the action and kind, a request overview,
//! sanitized params, environment, session data and tags, and the error itself
//! with a cleaned backtrace.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::AgentConfig;
use crate::sanitizer::{Sanitizer, ENV_METHODS};
use crate::transaction::{Transaction, TransactionKind};

/// Framework specific backtrace filtering.
pub trait BacktraceCleaner: Send + Sync {
    fn clean(&self, frames: &[String]) -> Vec<String>;
}

/// Request summary taken from the root event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub path: Option<String>,
    pub request_format: Option<String>,
    pub request_method: Option<String>,
}

/// The error part of an exception report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionDetails {
    pub exception: String,
    pub message: String,
    pub backtrace: Option<Vec<String>>,
}

/// Structured exception report, serialized as JSON for the native layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionReport {
    pub action: Option<String>,
    pub kind: Option<TransactionKind>,
    pub time: f64,
    pub overview: Option<Overview>,
    pub params: Option<Map<String, Value>>,
    pub environment: Option<Map<String, Value>>,
    pub session_data: Option<Map<String, Value>>,
    pub tags: Map<String, Value>,
    pub exception: ExceptionDetails,
}

/// Assembles exception reports from transactions.
#[derive(Clone)]
pub struct ExceptionReporter {
    sanitizer: Sanitizer,
    env_whitelist: Vec<String>,
    backtrace_cleaner: Option<Arc<dyn BacktraceCleaner>>,
}

impl Default for ExceptionReporter {
    fn default() -> Self {
        Self::new(Sanitizer::default())
    }
}

impl ExceptionReporter {
    pub fn new(sanitizer: Sanitizer) -> Self {
        Self {
            sanitizer,
            env_whitelist: ENV_METHODS.iter().map(ToString::to_string).collect(),
            backtrace_cleaner: None,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(Sanitizer::new(config.skip_session_data))
    }

    #[must_use]
    pub fn with_backtrace_cleaner(mut self, cleaner: Arc<dyn BacktraceCleaner>) -> Self {
        self.backtrace_cleaner = Some(cleaner);
        self
    }

    #[must_use]
    pub fn with_env_whitelist(mut self, whitelist: Vec<String>) -> Self {
        self.env_whitelist = whitelist;
        self
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Builds the report, or `None` when no error has been captured.
    pub fn exception_hash(&self, transaction: &Transaction) -> Option<ExceptionReport> {
        let error = transaction.exception()?;
        let root = transaction.root_event_payload();

        Some(ExceptionReport {
            action: transaction.action().map(ToString::to_string),
            kind: transaction.kind(),
            time: transaction.time().unwrap_or_default(),
            overview: root.map(|payload| Overview {
                path: payload.path.clone(),
                request_format: payload.request_format.clone(),
                request_method: payload.request_method.clone(),
            }),
            params: root
                .and_then(|payload| payload.params.as_ref())
                .map(|params| self.sanitizer.sanitize_map(params)),
            environment: self
                .sanitizer
                .sanitized_environment(transaction.env(), self.env_whitelist.as_slice()),
            session_data: self
                .sanitizer
                .sanitized_session_data(transaction.env(), transaction.session()),
            tags: self.sanitizer.sanitized_tags(transaction.tags()),
            exception: ExceptionDetails {
                exception: error.class_name.clone(),
                message: error.message.clone(),
                backtrace: self.cleaned_backtrace(transaction),
            },
        })
    }

    /// Backtrace of the captured error after cleaning, `None` without one.
    pub fn cleaned_backtrace(&self, transaction: &Transaction) -> Option<Vec<String>> {
        let frames = &transaction.exception()?.backtrace;
        Some(match &self.backtrace_cleaner {
            Some(cleaner) => cleaner.clean(frames),
            None => frames.clone(),
        })
    }
}

impl fmt::Debug for ExceptionReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionReporter")
            .field("sanitizer", &self.sanitizer)
            .field("env_whitelist", &self.env_whitelist.len())
            .field("backtrace_cleaner", &self.backtrace_cleaner.is_some())
            .finish()
    }
}
