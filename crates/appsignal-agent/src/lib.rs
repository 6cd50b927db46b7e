// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # AppSignal agent core
//!
//! In-process instrumentation core of the AppSignal monitoring agent.
//!
//! ## Overview
//!
//! - [`transaction`]: one transaction per request or background job, and the
//!   per-worker registry that tracks the current one
//! - [`queue_start`]: queue start derivation from untrusted headers and job
//!   payloads
//! - [`sanitizer`]: whitelist sanitization of params, session data, env and tags
//! - [`exception`]: exception report assembly
//! - [`transmitter`]: JSON transmission with a pinned root certificate
//! - [`marker`]: deploy marker notification
//!
//! Loading the native library, framework hooks and config discovery live
//! outside this crate; [`native::NativeAgent`] and [`config::AgentConfig`]
//! are the seams.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod clock;
pub mod config;
pub mod error;
pub mod exception;
pub mod logger;
pub mod marker;
pub mod native;
pub mod queue_start;
pub mod sanitizer;
pub mod transaction;
pub mod transmitter;
pub mod value;

pub use config::AgentConfig;
pub use error::{ConfigError, TransmitError};
pub use exception::{BacktraceCleaner, ExceptionReport, ExceptionReporter};
pub use native::{NativeAgent, NoopNativeAgent};
pub use sanitizer::{Sanitizer, Session, SessionAccessor};
pub use transaction::{
    CapturedError, EventPayload, SharedTransaction, Transaction, TransactionKind,
    TransactionRegistry, WorkerId,
};
pub use transmitter::Transmitter;
pub use value::{Env, RawKey, RawMap, RawValue};
