// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Boundary to the native monitoring library.
//!
//! Loading and binding the native library happens outside this crate. The
//! core only reports transaction lifecycle events through [`NativeAgent`].

use crate::transaction::TransactionKind;

/// Receiver of transaction lifecycle events.
pub trait NativeAgent: Send + Sync {
    /// A transaction started on some worker.
    fn start_transaction(&self, request_id: &str);

    /// The root event of a transaction was set.
    fn set_transaction_metadata(
        &self,
        request_id: &str,
        action: &str,
        kind: TransactionKind,
        queue_start: i64,
    );

    /// An exception report, encoded as JSON, was captured.
    fn set_exception_for_transaction(&self, request_id: &str, exception_json: &str);

    /// The transaction finished.
    fn finish_transaction(&self, request_id: &str);
}

/// Drops every event. Used when no native library is loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNativeAgent;

impl NativeAgent for NoopNativeAgent {
    fn start_transaction(&self, _request_id: &str) {}

    fn set_transaction_metadata(
        &self,
        _request_id: &str,
        _action: &str,
        _kind: TransactionKind,
        _queue_start: i64,
    ) {
    }

    fn set_exception_for_transaction(&self, _request_id: &str, _exception_json: &str) {}

    fn finish_transaction(&self, _request_id: &str) {}
}
