//! Request/result round trips between a worker handle and a scripted worker

mod common;

use anyhow::Result;
use bytes::Bytes;
use common::{start_pair, start_pair_with, transport_config};
use std::time::Duration;
use tandem_ipc::protocol::encode_f32_be;
use tandem_ipc::{IpcError, Metadata, Worker};

#[tokio::test]
async fn test_task_request_wire_format_and_result() -> Result<()> {
    let (mut handle, mut worker) = start_pair(31000).await?;

    let mut metadata = Metadata::new();
    metadata.insert("dtype".to_string(), "float32".to_string());
    handle.send_request("sum", &["a", "b"], &metadata).await?;

    assert_eq!(worker.next_header().await?, "task|sum|a,b|dtype:float32");

    worker
        .send_array("array|out|0|3|dtype:float32", encode_f32_be(&[1.0, 2.5, -3.0]))
        .await?;

    let result = handle.get_result().await.expect("result");
    let header = result.array_header()?;
    assert_eq!(header.id, "out");
    assert_eq!(header.shape, vec![3]);
    assert_eq!(header.metadata.get("dtype").map(String::as_str), Some("float32"));
    assert_eq!(result.to_f32_vec()?, vec![1.0, 2.5, -3.0]);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_array_data_sent_as_header_then_payload() -> Result<()> {
    let (mut handle, mut worker) = start_pair(31100).await?;

    let payload = Bytes::from_static(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    handle
        .send_array_data("r1", &[0, 0], &[2, 3], payload.clone(), &Metadata::new())
        .await?;

    assert_eq!(worker.next_header().await?, "array|r1|0,0|2,3|");
    assert_eq!(worker.next_frame().await?, Some(payload));

    handle.send_data_packet("array|raw|5|1|", Bytes::from_static(&[42])).await?;
    assert_eq!(worker.next_header().await?, "array|raw|5|1|");
    assert_eq!(worker.next_frame().await?, Some(Bytes::from_static(&[42])));

    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_oversized_array_leaves_request_stream_in_sync() -> Result<()> {
    let config = tandem_config::TransportConfig {
        max_frame_length: 64,
        ..transport_config(31150)
    };
    let (mut handle, mut worker) = start_pair_with(&config).await?;

    let err = handle
        .send_array_data("big", &[0], &[32], vec![0u8; 128], &Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IpcError::FrameTooLarge { size: 128, max: 64 }));

    handle.send_request("sum", &["a"], &Metadata::new()).await?;
    assert_eq!(worker.next_header().await?, "task|sum|a|");

    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_results_returned_in_arrival_order() -> Result<()> {
    let (mut handle, mut worker) = start_pair(31200).await?;

    handle.send_request("split", &["x"], &Metadata::new()).await?;
    worker.next_header().await?;

    for id in ["r1", "r2", "r3"] {
        worker
            .send_array(&format!("array|{}|0|1|", id), encode_f32_be(&[0.0]))
            .await?;
    }

    for id in ["r1", "r2", "r3"] {
        let result = handle.get_result().await.expect("result");
        assert_eq!(result.array_header()?.id, id);
    }

    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_worker_error_invalidates_until_next_request() -> Result<()> {
    let (mut handle, mut worker) = start_pair(31300).await?;

    handle.send_request("divide", &["a", "zero"], &Metadata::new()).await?;
    worker.next_header().await?;
    worker.send_error("division by zero").await?;

    assert!(handle.get_result().await.is_none());
    assert!(!handle.is_request_valid());
    assert!(handle.try_get_result().is_none());

    handle.send_request("divide", &["a", "b"], &Metadata::new()).await?;
    assert!(handle.is_request_valid());
    assert_eq!(worker.next_header().await?, "task|divide|a,b|");
    worker.send_array("array|q|0|1|", encode_f32_be(&[0.5])).await?;

    let result = handle.get_result().await.expect("result after re-arm");
    assert_eq!(result.to_f32_vec()?, vec![0.5]);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_result_headers_are_skipped() -> Result<()> {
    let (mut handle, mut worker) = start_pair(31400).await?;

    handle.send_request("ping", &[] as &[&str], &Metadata::new()).await?;
    assert_eq!(worker.next_header().await?, "task|ping||");

    worker.send_raw(b"status|busy").await?;
    worker.send_array("array|pong|0|1|", encode_f32_be(&[1.0])).await?;

    let result = handle.get_result().await.expect("result");
    assert_eq!(result.header(), "array|pong|0|1|");
    assert!(handle.listener_state().is_running());

    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_result_timeout_and_non_blocking_poll() -> Result<()> {
    let (mut handle, mut worker) = start_pair(31500).await?;

    handle.send_request("slow", &["a"], &Metadata::new()).await?;
    worker.next_header().await?;

    assert!(handle.try_get_result().is_none());
    assert!(handle
        .get_result_timeout(Duration::from_millis(100))
        .await
        .is_none());

    worker.send_array("array|late|0|1|", encode_f32_be(&[7.0])).await?;
    let result = handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .expect("result within timeout");
    assert_eq!(result.array_header()?.id, "late");

    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_execute_through_worker_trait() -> Result<()> {
    let (mut handle, mut worker) = start_pair(31600).await?;

    let script = tokio::spawn(async move {
        let header = worker.next_header().await?;
        worker
            .send_array("array|mean|0|1|", encode_f32_be(&[2.0]))
            .await?;
        Ok::<_, anyhow::Error>((header, worker))
    });

    let inputs = vec!["tas".to_string()];
    let result = handle
        .execute("mean", &inputs, &Metadata::new())
        .await?
        .expect("result");
    assert_eq!(result.to_f32_vec()?, vec![2.0]);

    let (header, _worker) = script.await??;
    assert_eq!(header, "task|mean|tas|");

    handle.shutdown().await;
    Ok(())
}
