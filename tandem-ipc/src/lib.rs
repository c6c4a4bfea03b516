//! Host-side bridge to an external worker process
//!
//! This crate emulates a request/response protocol over two one-directional
//! TCP channels: the host pushes `task`/`array`/`quit` headers to the worker
//! and a background listener pulls `array` results and `error` signals back.
//! Callers poll for results through [`WorkerHandle`].

pub mod binder;
pub mod cache;
pub mod error;
pub mod handle;
pub mod listener;
pub mod protocol;
pub mod transport;
pub mod worker;

// Re-export commonly used types
pub use binder::PortBinder;
pub use cache::{ListenerEvent, ResultCache, TransVar};
pub use error::IpcError;
pub use handle::{WorkerHandle, WorkerPorts};
pub use listener::{ListenerState, ResultListener, Termination};
pub use protocol::{ArrayHeader, InboundHeader, Metadata, Request};
pub use transport::{ChannelRole, FrameSink, FrameSource, InboundChannel, OutboundChannel};
pub use worker::Worker;
