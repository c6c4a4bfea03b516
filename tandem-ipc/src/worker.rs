//! Worker abstraction
//!
//! Concrete workers differ only in which operations they ask for; the
//! transport mechanics live in [`WorkerHandle`], which implements this trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::TransVar;
use crate::error::IpcError;
use crate::handle::WorkerHandle;
use crate::protocol::{element_count, encode_f32_be, Metadata};

#[async_trait]
pub trait Worker: Send {
    /// Submit a task invocation
    async fn send_request(
        &mut self,
        operation: &str,
        inputs: &[String],
        metadata: &Metadata,
    ) -> Result<(), IpcError>;

    /// Submit array data
    async fn send_array_data(
        &mut self,
        id: &str,
        origin: &[i64],
        shape: &[i64],
        payload: Bytes,
        metadata: &Metadata,
    ) -> Result<(), IpcError>;

    /// Wait for the next result; `None` after a worker error or listener exit
    async fn get_result(&mut self) -> Option<TransVar>;

    /// Tell the worker to exit and release the channels
    async fn quit(&mut self) -> Result<(), IpcError>;

    /// Send a task and wait for its result
    async fn execute(
        &mut self,
        operation: &str,
        inputs: &[String],
        metadata: &Metadata,
    ) -> Result<Option<TransVar>, IpcError> {
        self.send_request(operation, inputs, metadata).await?;
        Ok(self.get_result().await)
    }

    /// Submit f32 values in the worker's big-endian array layout
    async fn send_f32_array(
        &mut self,
        id: &str,
        origin: &[i64],
        shape: &[i64],
        values: &[f32],
        metadata: &Metadata,
    ) -> Result<(), IpcError> {
        let expected = element_count(shape)?;
        if expected != values.len() as i64 {
            return Err(IpcError::InvalidHeader(format!(
                "shape {:?} describes {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        self.send_array_data(id, origin, shape, encode_f32_be(values), metadata)
            .await
    }
}

#[async_trait]
impl Worker for WorkerHandle {
    async fn send_request(
        &mut self,
        operation: &str,
        inputs: &[String],
        metadata: &Metadata,
    ) -> Result<(), IpcError> {
        WorkerHandle::send_request(self, operation, inputs, metadata).await
    }

    async fn send_array_data(
        &mut self,
        id: &str,
        origin: &[i64],
        shape: &[i64],
        payload: Bytes,
        metadata: &Metadata,
    ) -> Result<(), IpcError> {
        WorkerHandle::send_array_data(self, id, origin, shape, payload, metadata).await
    }

    async fn get_result(&mut self) -> Option<TransVar> {
        WorkerHandle::get_result(self).await
    }

    async fn quit(&mut self) -> Result<(), IpcError> {
        WorkerHandle::quit(self).await
    }
}
