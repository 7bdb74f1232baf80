//! Correlation container
//!
//! Thread-safe table from correlation id to outstanding call state. An entry
//! exists exactly while its call is pending: it is inserted by `register`,
//! and removed exactly once, by either `resolve` or `cancel`.

use crate::handler::{logging_handler, DefaultHandler, ResponseCallback};
use crate::messages::{Request, RequestId, Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Correlation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("Duplicate request id: {0}")]
    DuplicateId(RequestId),

    #[error("No pending request with id: {0}")]
    NotFound(RequestId),
}

/// Who consumes the response once it arrives
enum Completion {
    /// A caller parked on the receiving half
    Waiter(oneshot::Sender<Response>),
    /// A callback dispatched off the resolver's context
    Callback(ResponseCallback),
}

/// Record of one outstanding call
pub struct PendingEntry {
    pub id: RequestId,
    pub request: Request,
    pub response: Option<Response>,
    completion: Completion,
}

impl PendingEntry {
    fn new(request: Request, completion: Completion) -> Self {
        Self {
            id: request.id,
            request,
            response: None,
            completion,
        }
    }

    /// Hand the attached response to its consumer. Must run without the table lock held.
    fn complete(self, default_handler: &DefaultHandler) {
        let Some(response) = self.response else {
            return;
        };

        match self.completion {
            Completion::Callback(callback) => spawn_callback(callback, self.request, response),
            Completion::Waiter(tx) => {
                if let Err(response) = tx.send(response) {
                    default_handler(Some(&self.request), &response);
                }
            }
        }
    }
}

fn spawn_callback(callback: ResponseCallback, request: Request, response: Response) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { callback(request, response) });
        }
        Err(_) => {
            std::thread::spawn(move || callback(request, response));
        }
    }
}

/// Storage for pending calls
///
/// Implementations must hold any internal lock only for the table mutation
/// and run callbacks and the default handler outside of it.
pub trait MessageContainer: Send + Sync {
    /// Register a request with a parked waiter; returns the waiter's receiving half.
    /// If the receiver is dropped, the eventual response goes to the default handler.
    fn register(&self, request: Request) -> Result<oneshot::Receiver<Response>, CorrelationError>;

    /// Register a request whose response is delivered to `callback`
    fn register_with_callback(
        &self,
        request: Request,
        callback: ResponseCallback,
    ) -> Result<(), CorrelationError>;

    /// Remove an entry without invoking its callback
    fn cancel(&self, id: RequestId) -> Result<Request, CorrelationError>;

    /// Remove every entry without invoking callbacks; parked waiters observe closure
    fn cancel_all(&self) -> Vec<Request>;

    /// Match a response to its entry, remove the entry and deliver the response
    fn resolve(&self, response: Response) -> Result<(), CorrelationError>;

    fn waiting_count(&self) -> usize;

    /// Snapshot of outstanding requests, ordered by id
    fn list_waiting(&self) -> Vec<Request>;
}

/// `HashMap`-backed container guarded by a single mutex
pub struct MapMessageContainer {
    waiting: Mutex<HashMap<RequestId, PendingEntry>>,
    default_handler: DefaultHandler,
}

impl MapMessageContainer {
    pub fn new() -> Self {
        Self::with_default_handler(logging_handler())
    }

    pub fn with_default_handler(default_handler: DefaultHandler) -> Self {
        Self {
            waiting: Mutex::new(HashMap::new()),
            default_handler,
        }
    }

    fn insert(&self, entry: PendingEntry) -> Result<(), CorrelationError> {
        let mut waiting = self.waiting.lock();
        if waiting.contains_key(&entry.id) {
            return Err(CorrelationError::DuplicateId(entry.id));
        }
        waiting.insert(entry.id, entry);
        Ok(())
    }
}

impl Default for MapMessageContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageContainer for MapMessageContainer {
    fn register(&self, request: Request) -> Result<oneshot::Receiver<Response>, CorrelationError> {
        let (tx, rx) = oneshot::channel();
        self.insert(PendingEntry::new(request, Completion::Waiter(tx)))?;
        Ok(rx)
    }

    fn register_with_callback(
        &self,
        request: Request,
        callback: ResponseCallback,
    ) -> Result<(), CorrelationError> {
        self.insert(PendingEntry::new(request, Completion::Callback(callback)))
    }

    fn cancel(&self, id: RequestId) -> Result<Request, CorrelationError> {
        let entry = self
            .waiting
            .lock()
            .remove(&id)
            .ok_or(CorrelationError::NotFound(id))?;
        debug!(id, method = %entry.request.method, "Cancelled pending request");
        Ok(entry.request)
    }

    fn cancel_all(&self) -> Vec<Request> {
        let drained: Vec<PendingEntry> = self.waiting.lock().drain().map(|(_, e)| e).collect();
        let mut requests: Vec<Request> = drained.into_iter().map(|e| e.request).collect();
        requests.sort_by_key(|r| r.id);
        requests
    }

    fn resolve(&self, response: Response) -> Result<(), CorrelationError> {
        let id = response.id();
        let mut entry = self
            .waiting
            .lock()
            .remove(&id)
            .ok_or(CorrelationError::NotFound(id))?;

        entry.response = Some(response);
        entry.complete(&self.default_handler);
        Ok(())
    }

    fn waiting_count(&self) -> usize {
        self.waiting.lock().len()
    }

    fn list_waiting(&self) -> Vec<Request> {
        let mut requests: Vec<Request> = self
            .waiting
            .lock()
            .values()
            .map(|e| e.request.clone())
            .collect();
        requests.sort_by_key(|r| r.id);
        requests
    }
}
