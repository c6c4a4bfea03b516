//! Scripted stand-in for an external worker process
//!
//! Connects to both host endpoints the way a real worker would and lets a
//! test read request frames and write result frames by hand.

#![allow(dead_code)]

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Once;
use std::time::Duration;
use tandem_config::TransportConfig;
use tandem_ipc::{WorkerHandle, WorkerPorts};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Keep test output readable; `RUST_LOG` still overrides
pub fn init_quiet_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tandem_logging::init_simple_tracing("warn");
    });
}

pub fn transport_config(base_port: u16) -> TransportConfig {
    TransportConfig {
        base_port,
        connect_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Start a handle and attach a fake worker to it
pub async fn start_pair(base_port: u16) -> Result<(WorkerHandle, FakeWorker)> {
    start_pair_with(&transport_config(base_port)).await
}

pub async fn start_pair_with(config: &TransportConfig) -> Result<(WorkerHandle, FakeWorker)> {
    init_quiet_logging();
    let handle = WorkerHandle::start(config).await?;
    let worker = FakeWorker::connect(handle.ports()).await?;
    Ok((handle, worker))
}

pub struct FakeWorker {
    requests: Framed<TcpStream, LengthDelimitedCodec>,
    results: Option<Framed<TcpStream, LengthDelimitedCodec>>,
}

impl FakeWorker {
    pub async fn connect(ports: WorkerPorts) -> Result<Self> {
        let requests = TcpStream::connect(("127.0.0.1", ports.request))
            .await
            .context("connect to request channel")?;
        let results = TcpStream::connect(("127.0.0.1", ports.result))
            .await
            .context("connect to result channel")?;

        Ok(Self {
            requests: Framed::new(requests, LengthDelimitedCodec::new()),
            results: Some(Framed::new(results, LengthDelimitedCodec::new())),
        })
    }

    /// Next raw request frame; `None` once the host closed the channel
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.requests.next())
            .await
            .map_err(|_| anyhow!("no request frame within 5s"))?;
        match frame {
            Some(frame) => Ok(Some(frame?.freeze())),
            None => Ok(None),
        }
    }

    /// Next request header as text
    pub async fn next_header(&mut self) -> Result<String> {
        let frame = self
            .next_frame()
            .await?
            .ok_or_else(|| anyhow!("request channel closed"))?;
        Ok(String::from_utf8(frame.to_vec())?)
    }

    /// Every header-sized frame until the host closes the channel
    pub async fn drain_headers(&mut self) -> Result<Vec<String>> {
        let mut headers = Vec::new();
        while let Some(frame) = self.next_frame().await? {
            headers.push(String::from_utf8_lossy(&frame).into_owned());
        }
        Ok(headers)
    }

    pub async fn send_array(&mut self, header: &str, payload: impl Into<Bytes>) -> Result<()> {
        let results = self.results()?;
        results.send(Bytes::copy_from_slice(header.as_bytes())).await?;
        results.send(payload.into()).await?;
        Ok(())
    }

    pub async fn send_error(&mut self, message: &str) -> Result<()> {
        let header = format!("error|{}", message);
        self.results()?.send(Bytes::from(header)).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, frame: &'static [u8]) -> Result<()> {
        self.results()?.send(Bytes::from_static(frame)).await?;
        Ok(())
    }

    /// Hang up the result channel, as a crashing worker would
    pub async fn close_results(&mut self) -> Result<()> {
        if let Some(mut results) = self.results.take() {
            SinkExt::<Bytes>::close(&mut results).await?;
        }
        Ok(())
    }

    fn results(&mut self) -> Result<&mut Framed<TcpStream, LengthDelimitedCodec>> {
        self.results
            .as_mut()
            .ok_or_else(|| anyhow!("result channel already closed"))
    }
}
