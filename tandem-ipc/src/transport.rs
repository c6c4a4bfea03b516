//! Outbound and inbound worker channels
//!
//! Both channels are TCP listeners owned by the host; the worker connects to
//! each of them. Messages travel as length-delimited frames, so a header and
//! the payload that follows it arrive as two distinct frames.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use crate::error::IpcError;

/// Direction of a channel relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Host to worker
    Outbound,
    /// Worker to host
    Inbound,
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRole::Outbound => write!(f, "outbound"),
            ChannelRole::Inbound => write!(f, "inbound"),
        }
    }
}

/// Write side of a frame transport
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

/// Read side of a frame transport
///
/// `recv_frame` must be cancel safe: dropping it before completion loses no
/// frame. End of stream is reported as [`IpcError::ConnectionClosed`].
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next frame
    async fn recv_frame(&mut self) -> Result<Bytes, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_length)
        .new_codec()
}

/// Host to worker "push" channel
///
/// The first send waits for the worker to connect, bounded by the connect
/// timeout. The listener stays bound until [`OutboundChannel::close`] so the
/// worker can reconnect after a broken connection.
pub struct OutboundChannel {
    port: u16,
    listener: Option<TcpListener>,
    writer: Option<FramedWrite<TcpStream, LengthDelimitedCodec>>,
    connect_timeout: Duration,
    max_frame_length: usize,
}

impl OutboundChannel {
    pub fn new(
        listener: TcpListener,
        connect_timeout: Duration,
        max_frame_length: usize,
    ) -> Result<Self, IpcError> {
        let port = listener.local_addr()?.port();
        Ok(Self {
            port,
            listener: Some(listener),
            writer: None,
            connect_timeout,
            max_frame_length,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn role(&self) -> ChannelRole {
        ChannelRole::Outbound
    }

    /// Whether a worker connection is currently established
    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.listener.is_none() && self.writer.is_none()
    }

    async fn connection(
        &mut self,
    ) -> Result<&mut FramedWrite<TcpStream, LengthDelimitedCodec>, IpcError> {
        if self.writer.is_none() {
            let listener = self.listener.as_ref().ok_or(IpcError::ShutDown)?;
            debug!(port = self.port, "Waiting for worker to connect to request channel");

            let (stream, peer) = tokio::time::timeout(self.connect_timeout, listener.accept())
                .await
                .map_err(|_| {
                    IpcError::Timeout(format!("worker to connect on port {}", self.port))
                })??;
            stream.set_nodelay(true)?;

            info!(port = self.port, %peer, "Worker connected to request channel");
            self.writer = Some(FramedWrite::new(stream, frame_codec(self.max_frame_length)));
        }

        self.writer.as_mut().ok_or(IpcError::ShutDown)
    }
}

impl OutboundChannel {
    /// Send a header and its payload as one unit
    ///
    /// Both frames are size-checked before either is written, so a rejected
    /// payload never leaves an orphan header on the wire.
    pub async fn send_packet(&mut self, header: Bytes, payload: Bytes) -> Result<(), IpcError> {
        self.write_frames(vec![header, payload]).await
    }

    fn check_frame(&self, frame: &Bytes) -> Result<(), IpcError> {
        if frame.len() > self.max_frame_length {
            return Err(IpcError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_length,
            });
        }
        Ok(())
    }

    async fn write_frames(&mut self, frames: Vec<Bytes>) -> Result<(), IpcError> {
        for frame in &frames {
            self.check_frame(frame)?;
        }

        let writer = self.connection().await?;

        let mut written = Ok(());
        for frame in frames {
            written = writer.feed(frame).await;
            if written.is_err() {
                break;
            }
        }
        if written.is_ok() {
            written = SinkExt::<Bytes>::flush(writer).await;
        }

        if let Err(e) = written {
            warn!(error = %e, "Request channel write failed, dropping connection");
            self.writer = None;
            return Err(IpcError::Io(e));
        }

        Ok(())
    }
}

#[async_trait]
impl FrameSink for OutboundChannel {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), IpcError> {
        self.write_frames(vec![frame]).await
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        self.listener = None;
        if let Some(mut writer) = self.writer.take() {
            SinkExt::<Bytes>::close(&mut writer).await?;
        }
        Ok(())
    }
}

/// Worker to host "pull" channel, read by a single listener task
pub struct InboundChannel {
    port: u16,
    listener: Option<TcpListener>,
    reader: Option<FramedRead<TcpStream, LengthDelimitedCodec>>,
    max_frame_length: usize,
}

impl InboundChannel {
    pub fn new(listener: TcpListener, max_frame_length: usize) -> Result<Self, IpcError> {
        let port = listener.local_addr()?.port();
        Ok(Self {
            port,
            listener: Some(listener),
            reader: None,
            max_frame_length,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn role(&self) -> ChannelRole {
        ChannelRole::Inbound
    }
}

#[async_trait]
impl FrameSource for InboundChannel {
    async fn recv_frame(&mut self) -> Result<Bytes, IpcError> {
        if self.reader.is_none() {
            let listener = self.listener.as_ref().ok_or(IpcError::ConnectionClosed)?;
            let (stream, peer) = listener.accept().await?;
            info!(port = self.port, %peer, "Worker connected to result channel");
            self.reader = Some(FramedRead::new(stream, frame_codec(self.max_frame_length)));
        }

        let reader = self.reader.as_mut().ok_or(IpcError::ConnectionClosed)?;
        match reader.next().await {
            Some(Ok(frame)) => Ok(frame.freeze()),
            Some(Err(e)) => Err(IpcError::Io(e)),
            None => {
                self.reader = None;
                Err(IpcError::ConnectionClosed)
            }
        }
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        self.reader = None;
        self.listener = None;
        Ok(())
    }
}
