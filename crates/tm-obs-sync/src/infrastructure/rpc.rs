//! Request/response correlation over a full-duplex socket.
//!
//! Both applications answer commands asynchronously on the same socket that
//! carries events.  A caller registers an id, sends its request, and waits on
//! a oneshot channel; the socket's reader task completes the channel when the
//! response with that id arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::application::ClientError;

/// Outstanding requests keyed by id.
pub struct PendingRequests<T> {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<T>>>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh id and the receiver its response will arrive on.
    pub fn register(&self) -> (u64, oneshot::Receiver<T>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting().insert(id, tx);
        (id, rx)
    }

    /// Hands `value` to whoever waits on `id`.
    ///
    /// Returns `false` when nobody does (late or unknown response).
    pub fn complete(&self, id: u64, value: T) -> bool {
        match self.waiting().remove(&id) {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Forgets `id` without answering it.
    pub fn cancel(&self, id: u64) {
        self.waiting().remove(&id);
    }

    /// Drops every waiter; their receivers observe a closed channel.
    pub fn fail_all(&self) -> usize {
        let mut waiting = self.waiting();
        let count = waiting.len();
        waiting.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiting().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for the response to `id`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Timeout`] when no response arrived in time and
    /// [`ClientError::ConnectionLost`] when the waiter was failed.
    pub async fn wait(
        &self,
        id: u64,
        response: oneshot::Receiver<T>,
        timeout: Duration,
    ) -> Result<T, ClientError> {
        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ClientError::ConnectionLost),
            Err(_) => {
                self.cancel(id);
                Err(ClientError::Timeout)
            }
        }
    }

    fn waiting(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<T>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
