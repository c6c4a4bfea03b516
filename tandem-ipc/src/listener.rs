//! Background reader for the inbound channel
//!
//! The listener runs as a single tokio task. It reads result headers, pairs
//! `array` headers with the payload frame that follows, and reports results
//! and worker errors to the caller as [`ListenerEvent`]s. It stops when the
//! shutdown token is cancelled, when the worker closes the channel, or on the
//! first transport fault; a terminated listener is never restarted.

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{ListenerEvent, TransVar};
use crate::error::IpcError;
use crate::protocol::InboundHeader;
use crate::transport::FrameSource;

/// Why a listener stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The handle shut the channel down
    Shutdown,
    /// The worker closed its end between messages
    PeerClosed,
    /// Any other receive failure
    Fault(String),
}

/// Observable listener lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    Running,
    Terminated(Termination),
}

impl ListenerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ListenerState::Running)
    }
}

pub struct ResultListener<S> {
    source: S,
    events: mpsc::UnboundedSender<ListenerEvent>,
    shutdown: CancellationToken,
    state: watch::Sender<ListenerState>,
}

impl<S> ResultListener<S>
where
    S: FrameSource + 'static,
{
    /// Create a listener in the `Running` state and a receiver for its state
    pub fn new(
        source: S,
        events: mpsc::UnboundedSender<ListenerEvent>,
        shutdown: CancellationToken,
    ) -> (Self, watch::Receiver<ListenerState>) {
        let (state, state_rx) = watch::channel(ListenerState::Running);
        (
            Self {
                source,
                events,
                shutdown,
                state,
            },
            state_rx,
        )
    }

    /// Run the listener on its own task
    pub fn spawn(self) -> JoinHandle<Termination> {
        tokio::spawn(self.run())
    }

    /// Receive until terminated
    pub async fn run(mut self) -> Termination {
        let termination = loop {
            if let Err(termination) = self.step().await {
                break termination;
            }
        };

        match &termination {
            Termination::Shutdown => info!("Result channel closed"),
            Termination::PeerClosed => info!("Worker closed the result channel"),
            Termination::Fault(message) => error!(error = %message, "Result listener failed"),
        }

        if let Err(e) = self.source.close().await {
            debug!(error = %e, "Error closing result channel");
        }
        self.state
            .send_replace(ListenerState::Terminated(termination.clone()));

        termination
    }

    async fn step(&mut self) -> Result<(), Termination> {
        let frame = self.next_frame().await?;
        let header = String::from_utf8_lossy(&frame).trim().to_string();
        info!(header = %header, "Received result header from worker");

        match InboundHeader::parse(&header) {
            InboundHeader::Array => {
                debug!("Waiting for result data");
                let payload = match self.next_frame().await {
                    Err(Termination::PeerClosed) => {
                        return Err(Termination::Fault(
                            "worker closed the result channel before sending the payload"
                                .to_string(),
                        ))
                    }
                    other => other?,
                };
                debug!(header = %header, payload_len = payload.len(), "Caching result from worker");
                self.emit(ListenerEvent::Result(TransVar::new(header, payload)))
            }
            InboundHeader::Error(message) => {
                error!(message = %message, "Worker signaled error");
                self.emit(ListenerEvent::WorkerError(message))
            }
            InboundHeader::Unknown(kind) => {
                warn!(kind = %kind, "Unknown result header type");
                Ok(())
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Bytes, Termination> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Termination::Shutdown),
            frame = self.source.recv_frame() => match frame {
                Ok(frame) => Ok(frame),
                Err(IpcError::ConnectionClosed) => Err(Termination::PeerClosed),
                Err(e) => Err(Termination::Fault(e.to_string())),
            },
        }
    }

    fn emit(&self, event: ListenerEvent) -> Result<(), Termination> {
        // The receiving side only disappears with the handle
        self.events.send(event).map_err(|_| Termination::Shutdown)
    }
}
