//! Host-side handle for one external worker process

use bytes::Bytes;
use std::time::Duration;
use tandem_config::TransportConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binder::PortBinder;
use crate::cache::{ResultCache, TransVar};
use crate::error::IpcError;
use crate::listener::{ListenerState, ResultListener, Termination};
use crate::protocol::{ArrayHeader, Metadata, Request, QUIT_HEADER};
use crate::transport::{FrameSink, InboundChannel, OutboundChannel};

/// Resolved port pair the worker must be told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPorts {
    /// Outbound endpoint: the worker reads requests here
    pub request: u16,
    /// Inbound endpoint: the worker writes results here
    pub result: u16,
}

/// Combines the channel pair, the result listener and the result queue
///
/// One request is outstanding at a time. Sends re-arm the request; results
/// are collected in the background and retrieved with [`get_result`].
/// Nothing on the listener side is raised to the caller: worker errors and
/// listener termination show up as `None` from the result getters.
///
/// [`get_result`]: WorkerHandle::get_result
pub struct WorkerHandle {
    outbound: OutboundChannel,
    cache: ResultCache,
    stop: CancellationToken,
    listener: Option<JoinHandle<Termination>>,
    state: watch::Receiver<ListenerState>,
    ports: WorkerPorts,
    quit_sent: bool,
    closed: bool,
}

impl WorkerHandle {
    /// Bind both endpoints and start the result listener
    ///
    /// The outbound endpoint takes the first free port from
    /// `config.base_port`, the inbound endpoint the first free port after it.
    pub async fn start(config: &TransportConfig) -> Result<Self, IpcError> {
        let binder = PortBinder::from_config(config);

        let (request_listener, request_port) = binder.bind(config.base_port).await?;
        let result_start = request_port.checked_add(1).ok_or(IpcError::PortsExhausted {
            start: request_port,
            attempts: 0,
        })?;
        let (result_listener, result_port) = binder.bind(result_start).await?;

        let outbound = OutboundChannel::new(
            request_listener,
            config.connect_timeout,
            config.max_frame_length,
        )?;
        let inbound = InboundChannel::new(result_listener, config.max_frame_length)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let (listener, state) = ResultListener::new(inbound, events_tx, stop.clone());
        let listener = listener.spawn();

        info!(request_port, result_port, "Starting worker handle");

        Ok(Self {
            outbound,
            cache: ResultCache::new(events_rx),
            stop,
            listener: Some(listener),
            state,
            ports: WorkerPorts {
                request: request_port,
                result: result_port,
            },
            quit_sent: false,
            closed: false,
        })
    }

    pub fn ports(&self) -> WorkerPorts {
        self.ports
    }

    pub fn listener_state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed
    }

    /// Whether the current request has not been invalidated by a worker error
    pub fn is_request_valid(&mut self) -> bool {
        self.cache.drain();
        self.cache.is_valid()
    }

    /// Ask the worker to run `operation` on `inputs`. Does not wait for a reply.
    pub async fn send_request<S: AsRef<str>>(
        &mut self,
        operation: &str,
        inputs: &[S],
        metadata: &Metadata,
    ) -> Result<(), IpcError> {
        self.ensure_open()?;
        let header = Request::task(operation, inputs, metadata.clone()).encode()?;

        // Re-arm before sending so a fast reply is not judged by the previous request
        self.cache.rearm();
        info!(header = %header, "Sending task request");
        self.outbound.send_frame(Bytes::from(header)).await
    }

    /// Send an array descriptor followed by its raw payload
    pub async fn send_array_data(
        &mut self,
        id: &str,
        origin: &[i64],
        shape: &[i64],
        payload: impl Into<Bytes>,
        metadata: &Metadata,
    ) -> Result<(), IpcError> {
        self.ensure_open()?;
        let header =
            ArrayHeader::new(id, origin.to_vec(), shape.to_vec(), metadata.clone()).encode()?;

        self.cache.rearm();
        self.send_data_packet(&header, payload.into()).await
    }

    /// Send an arbitrary header and a payload frame as one logical unit
    pub async fn send_data_packet(&mut self, header: &str, payload: Bytes) -> Result<(), IpcError> {
        self.ensure_open()?;
        info!(header = %header, payload_len = payload.len(), "Sending data packet");
        self.outbound
            .send_packet(Bytes::copy_from_slice(header.as_bytes()), payload)
            .await
    }

    /// Wait for the oldest result
    ///
    /// Returns `None` once the worker has signaled an error for the current
    /// request, or when the listener has terminated with nothing queued.
    /// Dropping the future cancels the wait.
    pub async fn get_result(&mut self) -> Option<TransVar> {
        info!("Waiting for result to appear from worker");
        self.cache.wait().await
    }

    /// [`get_result`](Self::get_result) bounded by `timeout`
    pub async fn get_result_timeout(&mut self, timeout: Duration) -> Option<TransVar> {
        match tokio::time::timeout(timeout, self.get_result()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(?timeout, "Timed out waiting for result");
                None
            }
        }
    }

    /// Oldest result if one has already arrived
    pub fn try_get_result(&mut self) -> Option<TransVar> {
        self.cache.poll()
    }

    /// Tell the worker to exit, then shut down
    ///
    /// With no worker connected there is nobody to tell, so this only shuts
    /// down.
    pub async fn quit(&mut self) -> Result<(), IpcError> {
        if self.closed {
            return Ok(());
        }
        if !self.outbound.is_connected() {
            debug!("No worker connected to the request channel, skipping quit");
            self.shutdown().await;
            return Ok(());
        }
        let sent = self.send_quit().await;
        self.shutdown().await;
        sent
    }

    /// Stop the listener and release both endpoints
    ///
    /// Sends `quit` first if the worker is connected and has not been told
    /// already. Safe to call any number of times.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }

        if !self.quit_sent && self.outbound.is_connected() {
            if let Err(e) = self.send_quit().await {
                warn!(error = %e, "Failed to send quit to worker");
            }
        }

        self.stop.cancel();

        if let Err(e) = self.outbound.close().await {
            debug!(error = %e, "Error closing request channel");
        }

        if let Some(listener) = self.listener.take() {
            match listener.await {
                Ok(termination) => debug!(?termination, "Result listener stopped"),
                Err(e) => warn!(error = %e, "Result listener task failed"),
            }
        }

        self.closed = true;
        info!(
            request_port = self.ports.request,
            result_port = self.ports.result,
            "Worker handle shut down"
        );
    }

    async fn send_quit(&mut self) -> Result<(), IpcError> {
        info!("Sending quit request");
        self.outbound
            .send_frame(Bytes::from_static(QUIT_HEADER.as_bytes()))
            .await?;
        self.quit_sent = true;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), IpcError> {
        if self.closed {
            return Err(IpcError::ShutDown);
        }
        Ok(())
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Stops the listener task, which releases the inbound endpoint
        self.stop.cancel();
    }
}
