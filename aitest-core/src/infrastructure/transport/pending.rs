//! Correlation of in-flight requests with their responses.

use super::error::TransportError;
use super::rpc_result;
use crate::rpc::{RpcError, numeric_id};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::debug;

type Responder = oneshot::Sender<Result<Value, TransportError>>;

#[derive(Default)]
struct Table {
    waiting: HashMap<u64, Responder>,
    closed: bool,
}

/// Pending-request map keyed by a monotonic id.
///
/// Shared between the caller side and the reader task of one transport.
#[derive(Clone)]
pub(crate) struct PendingRequests {
    server: Arc<str>,
    next_id: Arc<AtomicU64>,
    table: Arc<Mutex<Table>>,
}

impl PendingRequests {
    pub(crate) fn new(server: &str) -> Self {
        Self {
            server: Arc::from(server),
            next_id: Arc::new(AtomicU64::new(1)),
            table: Arc::new(Mutex::new(Table::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve an id. The entry is removed again when the guard drops, so a
    /// cancelled caller never leaves a stale responder behind.
    pub(crate) fn register(&self) -> Result<PendingGuard, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let mut table = self.lock();
        if table.closed {
            return Err(TransportError::Closed {
                server: self.server.to_string(),
            });
        }
        table.waiting.insert(id, tx);
        Ok(PendingGuard {
            id,
            rx: Some(rx),
            owner: self.clone(),
        })
    }

    /// Route a response to its waiter. Returns `false` for unknown ids.
    pub(crate) fn resolve(&self, id: &Value, outcome: Result<Value, RpcError>) -> bool {
        let Some(key) = numeric_id(id) else {
            debug!(server = %self.server, response_id = %id, "response with foreign id");
            return false;
        };
        let Some(sender) = self.lock().waiting.remove(&key) else {
            debug!(server = %self.server, response_id = key, "received response for unknown request");
            return false;
        };
        let _ = sender.send(rpc_result(&self.server, outcome));
        true
    }

    /// Fail every waiter and refuse new registrations.
    pub(crate) fn fail_all<F>(&self, make_error: F)
    where
        F: Fn(&str) -> TransportError,
    {
        let drained: Vec<Responder> = {
            let mut table = self.lock();
            table.closed = true;
            table.waiting.drain().map(|(_, sender)| sender).collect()
        };
        for sender in drained {
            let _ = sender.send(Err(make_error(&*self.server)));
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().waiting.len()
    }
}

pub(crate) struct PendingGuard {
    id: u64,
    rx: Option<oneshot::Receiver<Result<Value, TransportError>>>,
    owner: PendingRequests,
}

impl PendingGuard {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the response routed to this id.
    pub(crate) async fn wait(mut self) -> Result<Value, TransportError> {
        let rx = self.rx.take().ok_or_else(|| TransportError::Closed {
            server: self.owner.server.to_string(),
        })?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Closed {
                server: self.owner.server.to_string(),
            }),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.owner.lock().waiting.remove(&self.id);
    }
}
