//! Result records and the caller-side result queue

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::error::IpcError;
use crate::protocol::{decode_f32_be, ArrayHeader};

/// A completed result: the header line and its binary payload
#[derive(Debug, Clone, PartialEq)]
pub struct TransVar {
    header: String,
    payload: Bytes,
    received_at: DateTime<Utc>,
}

impl TransVar {
    pub fn new(header: impl Into<String>, payload: Bytes) -> Self {
        Self {
            header: header.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Decode the header as an `array` descriptor
    pub fn array_header(&self) -> Result<ArrayHeader, IpcError> {
        ArrayHeader::parse(&self.header)
    }

    /// Decode the payload as big-endian f32 values
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, IpcError> {
        decode_f32_be(&self.payload)
    }

    pub fn into_parts(self) -> (String, Bytes) {
        (self.header, self.payload)
    }
}

/// What the listener reports to the caller, in receipt order
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    /// A complete result (header and payload)
    Result(TransVar),
    /// The worker signaled an error for the current request
    WorkerError(String),
}

/// FIFO of completed results plus the validity of the current request
///
/// The listener never touches this state directly: it sends
/// [`ListenerEvent`]s, which are applied here in order whenever the caller
/// looks at the queue. A `WorkerError` invalidates the request; results that
/// arrive while invalid are discarded until [`ResultCache::rearm`].
#[derive(Debug)]
pub struct ResultCache {
    events: mpsc::UnboundedReceiver<ListenerEvent>,
    queue: VecDeque<TransVar>,
    valid: bool,
    listener_alive: bool,
}

impl ResultCache {
    pub fn new(events: mpsc::UnboundedReceiver<ListenerEvent>) -> Self {
        Self {
            events,
            queue: VecDeque::new(),
            valid: true,
            listener_alive: true,
        }
    }

    /// Whether no worker error has been seen since the last re-arm
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the listener can still deliver events
    pub fn listener_alive(&self) -> bool {
        self.listener_alive
    }

    /// Results cached locally (events not yet drained are not counted)
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Apply everything the listener has sent so far
    pub fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.listener_alive = false;
                    break;
                }
            }
        }
    }

    /// Mark a new request as live. Events received before this call are
    /// applied under the previous state first.
    pub fn rearm(&mut self) {
        self.drain();
        if !self.valid {
            debug!("Re-arming request after worker error");
        }
        self.valid = true;
    }

    /// Oldest result if one is available and the request is still valid
    pub fn poll(&mut self) -> Option<TransVar> {
        self.drain();
        if !self.valid {
            return None;
        }
        self.queue.pop_front()
    }

    /// Wait for the oldest result
    ///
    /// Returns `None` as soon as the request is invalid, or once the listener
    /// has terminated and nothing is left in the queue. Cancel safe.
    pub async fn wait(&mut self) -> Option<TransVar> {
        loop {
            self.drain();
            if !self.valid {
                return None;
            }
            if let Some(result) = self.queue.pop_front() {
                return Some(result);
            }
            if !self.listener_alive {
                return None;
            }

            match self.events.recv().await {
                Some(event) => self.apply(event),
                None => self.listener_alive = false,
            }
        }
    }

    fn apply(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Result(result) if self.valid => self.queue.push_back(result),
            ListenerEvent::Result(result) => {
                debug!(header = %result.header(), "Discarding result received after a worker error");
            }
            ListenerEvent::WorkerError(_) => self.valid = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(id: &str) -> ListenerEvent {
        ListenerEvent::Result(TransVar::new(
            format!("array|{}|0|1|", id),
            Bytes::from_static(&[0, 0, 0, 0]),
        ))
    }

    fn cache() -> (mpsc::UnboundedSender<ListenerEvent>, ResultCache) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ResultCache::new(rx))
    }

    #[test]
    fn test_fifo_order() {
        let (tx, mut cache) = cache();
        tx.send(result("r1")).unwrap();
        tx.send(result("r2")).unwrap();

        assert_eq!(cache.poll().unwrap().header(), "array|r1|0|1|");
        assert_eq!(cache.poll().unwrap().header(), "array|r2|0|1|");
        assert!(cache.poll().is_none());
    }

    #[test]
    fn test_error_hides_queued_results_until_rearm() {
        let (tx, mut cache) = cache();
        tx.send(result("r1")).unwrap();
        tx.send(ListenerEvent::WorkerError("kernel failed".to_string())).unwrap();

        assert!(cache.poll().is_none());
        assert!(!cache.is_valid());
        // Not un-cached, only hidden
        assert_eq!(cache.len(), 1);

        cache.rearm();
        assert_eq!(cache.poll().unwrap().header(), "array|r1|0|1|");
    }

    #[test]
    fn test_results_after_error_are_discarded() {
        let (tx, mut cache) = cache();
        tx.send(ListenerEvent::WorkerError("bad input".to_string())).unwrap();
        tx.send(result("late")).unwrap();

        cache.rearm();
        assert!(cache.is_empty());

        tx.send(result("fresh")).unwrap();
        assert_eq!(cache.poll().unwrap().header(), "array|fresh|0|1|");
    }

    #[tokio::test]
    async fn test_wait_returns_none_when_listener_gone() {
        let (tx, mut cache) = cache();
        tx.send(result("last")).unwrap();
        drop(tx);

        assert!(cache.wait().await.is_some());
        assert!(cache.wait().await.is_none());
        assert!(!cache.listener_alive());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_late_result() {
        let (tx, mut cache) = cache();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(result("slow")).unwrap();
        });

        let got = cache.wait().await.unwrap();
        assert_eq!(got.array_header().unwrap().id, "slow");
    }

    #[tokio::test]
    async fn test_wait_stops_on_error() {
        let (tx, mut cache) = cache();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(ListenerEvent::WorkerError("oops".to_string())).unwrap();
        });

        assert!(cache.wait().await.is_none());
    }

    #[test]
    fn test_transvar_f32_payload() {
        let var = TransVar::new("array|a|0|2|", crate::protocol::encode_f32_be(&[0.5, 4.0]));
        assert_eq!(var.to_f32_vec().unwrap(), vec![0.5, 4.0]);
        let (header, payload) = var.into_parts();
        assert_eq!(header, "array|a|0|2|");
        assert_eq!(payload.len(), 8);
    }
}
