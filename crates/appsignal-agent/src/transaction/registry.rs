// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Registry of the current transaction per worker.
//!
//! Every worker (usually a thread) owns at most one current transaction. The
//! surrounding runtime names the worker explicitly with a [`WorkerId`]; the
//! registry never infers it. Slots are only touched by their own worker, so
//! the map lock is uncontended in practice.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, warn};

use super::Transaction;
use crate::clock::{Clock, SystemClock};
use crate::exception::ExceptionReporter;
use crate::native::NativeAgent;
use crate::value::Env;

/// A transaction shared between the registry and its worker.
pub type SharedTransaction = Arc<Mutex<Transaction>>;

/// Opaque identifier of a worker owning a transaction slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier of the calling thread.
    pub fn current_thread() -> Self {
        Self(format!("{:?}", thread::current().id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for WorkerId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A worker's current transaction, keyed by its request id so the registry
/// never has to lock the transaction itself.
#[derive(Debug)]
struct Slot {
    request_id: String,
    transaction: SharedTransaction,
}

/// Holds the current transaction of every worker.
pub struct TransactionRegistry {
    slots: Mutex<HashMap<WorkerId, Slot>>,
    native: Arc<dyn NativeAgent>,
    reporter: Arc<ExceptionReporter>,
    clock: Arc<dyn Clock>,
}

impl TransactionRegistry {
    pub fn new(native: Arc<dyn NativeAgent>, reporter: ExceptionReporter) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            native,
            reporter: Arc::new(reporter),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<WorkerId, Slot>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a transaction and installs it as the worker's current one.
    ///
    /// An existing transaction in the slot is replaced without being
    /// finished; callers must not nest transactions on one worker.
    pub fn create(
        &self,
        worker: &WorkerId,
        request_id: impl Into<String>,
        env: Option<Env>,
    ) -> SharedTransaction {
        let request_id = request_id.into();
        let transaction = Arc::new(Mutex::new(Transaction::with_collaborators(
            request_id.clone(),
            env,
            Arc::clone(&self.native),
            Arc::clone(&self.reporter),
            Arc::clone(&self.clock),
        )));

        {
            let mut slots = self.slots();
            let duplicate = slots
                .iter()
                .any(|(owner, slot)| owner != worker && slot.request_id == request_id);
            if duplicate {
                warn!(%worker, "Request id {request_id} is already current on another worker");
            }
            let slot = Slot {
                request_id: request_id.clone(),
                transaction: Arc::clone(&transaction),
            };
            if slots.insert(worker.clone(), slot).is_some() {
                warn!(%worker, "Replacing an unfinished transaction with {request_id}");
            }
        }

        self.native.start_transaction(&request_id);
        debug!(%worker, "Started transaction {request_id}");
        transaction
    }

    /// Returns the worker's current transaction.
    pub fn current(&self, worker: &WorkerId) -> Option<SharedTransaction> {
        self.slots()
            .get(worker)
            .map(|slot| Arc::clone(&slot.transaction))
    }

    /// Finishes the worker's current transaction and clears the slot.
    ///
    /// Does nothing when the worker has no current transaction.
    pub fn complete_current(&self, worker: &WorkerId) {
        let Some(Slot { request_id, .. }) = self.slots().remove(worker) else {
            return;
        };
        self.native.finish_transaction(&request_id);
        debug!(%worker, "Completed transaction {request_id}");
    }

    /// Number of workers with a current transaction.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

impl fmt::Debug for TransactionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRegistry")
            .field("live", &self.len())
            .finish_non_exhaustive()
    }
}
