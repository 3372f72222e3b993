//! Large payload upload through the lifecycle and the in-memory hub.

mod common;

use base64::Engine;
use common::Harness;
use flate2::read::GzDecoder;
use gateway_core::lifecycle::capability;
use gateway_core::upload::{PROP_FILENAME, PROP_GZIPPED, PROP_JOB_ID, PROP_MULTIPART, PROP_PART};
use gateway_core::{
    ChunkAccumulator, ChunkBudget, LifecycleConfig, Message, MessageSink, StreamingUploader,
    UploadConfig,
};
use rand::Rng;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

const MAX_MESSAGE_BYTES: usize = 8 * 1024;

async fn started_with_small_messages() -> Harness {
    let harness = Harness::with_configs(
        LifecycleConfig::default(),
        UploadConfig::default()
            .with_max_message_bytes(MAX_MESSAGE_BYTES)
            .with_read_unit_bytes(1024),
    );
    harness.lifecycle.start().await.unwrap();
    harness
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(&mut bytes[..]);
    bytes
}

#[test]
fn test_accumulator_sizes_for_default_read_unit() {
    let budget = ChunkBudget {
        min_bytes: 250_000,
        max_bytes: 333_334,
    };
    let mut acc = ChunkAccumulator::new(budget, 16_384);
    let source = vec![7u8; 500_000];

    let mut chunks = Vec::new();
    for unit in source.chunks(16_384) {
        chunks.extend(acc.append(unit));
    }
    chunks.extend(acc.finish());

    let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![180_224, 180_224, 139_552]);
    for size in sizes {
        assert!(ChunkBudget::encoded_len(size) <= budget.max_bytes);
    }
}

/// Keeps every message the uploader sends.
#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<(String, Message)>>,
}

#[async_trait::async_trait]
impl MessageSink for RecordingSink {
    async fn send_message(&self, output_name: &str, message: Message) -> gateway_core::Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((output_name.to_string(), message));
        Ok(())
    }
}

#[tokio::test]
async fn test_half_megabyte_source_ships_as_three_chunks() {
    // 240 000 encoded bytes hold 180 000 raw; flushing only near the top
    // keeps every chunk within one read unit of that
    let budget = ChunkBudget {
        min_bytes: 240_000,
        max_bytes: 240_000,
    };
    let sink = Arc::new(RecordingSink::default());
    let uploader = StreamingUploader::with_budget(
        sink.clone(),
        UploadConfig::default().with_read_unit_bytes(1024),
        budget,
    );
    let source = random_bytes(500_000);

    let status = uploader.upload_reader("values.json", source.as_slice()).await;

    assert!(status.is_success());
    assert_eq!(status.parts_sent, 3);

    let messages = sink.messages.lock().unwrap();
    assert_eq!(messages.len(), 4);

    let mut compressed = Vec::new();
    for (part, (output_name, message)) in messages[..3].iter().enumerate() {
        assert_eq!(output_name, "iotc");
        assert_eq!(message.property(PROP_PART), Some(part.to_string().as_str()));

        let data = message.body_json().unwrap()["data"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(data.len() <= budget.max_bytes);
        compressed.extend(
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .unwrap(),
        );
    }

    let mut restored = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut restored)
        .unwrap();
    assert_eq!(restored, source);

    let status_body = messages[3].1.body_json().unwrap();
    let telemetry = &status_body[capability::EV_LARGE_PAYLOAD_STATUS];
    assert_eq!(telemetry["st"], "200");
    assert_eq!(telemetry["fn"], "values.json");
    assert_eq!(telemetry["sz"], compressed.len().to_string());
    assert_eq!(status.total_compressed_bytes as usize, compressed.len());
}

#[tokio::test(start_paused = true)]
async fn test_file_upload_sends_ordered_chunks_then_status() {
    let harness = started_with_small_messages().await;
    let sent_before = harness.hub.sent_messages().len();

    let source = random_bytes(40_000);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fetchNodes-20240101-120000.json");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&source)
        .unwrap();

    let status = harness.lifecycle.upload_file(&path).await;
    assert!(status.is_success());
    assert_eq!(status.filename, "fetchNodes-20240101-120000.json");

    let sent = harness.hub.sent_messages().split_off(sent_before);
    let (chunks, tail) = sent.split_at(sent.len() - 1);
    assert_eq!(chunks.len() as u32, status.parts_sent);
    assert!(chunks.len() > 1);

    let job_id = status.job_id.to_string();
    let mut compressed = Vec::new();
    for (part, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.output_name.as_deref(), Some("iotc"));
        assert!(chunk.message.body.len() <= MAX_MESSAGE_BYTES);

        let message = &chunk.message;
        assert_eq!(message.property(PROP_MULTIPART), Some("1"));
        assert_eq!(message.property(PROP_GZIPPED), Some("1"));
        assert_eq!(message.property(PROP_JOB_ID), Some(job_id.as_str()));
        assert_eq!(
            message.property(PROP_FILENAME),
            Some("fetchNodes-20240101-120000.json")
        );
        assert_eq!(message.property(PROP_PART), Some(part.to_string().as_str()));

        let data = message.body_json().unwrap()["data"]
            .as_str()
            .unwrap()
            .to_string();
        compressed.extend(
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .unwrap(),
        );
    }

    let mut restored = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut restored)
        .unwrap();
    assert_eq!(restored, source);

    let status_body = tail[0].message.body_json().unwrap();
    let telemetry = &status_body[capability::EV_LARGE_PAYLOAD_STATUS];
    assert_eq!(telemetry["ji"], job_id.as_str());
    assert_eq!(telemetry["st"], "200");
    assert_eq!(telemetry["sz"], compressed.len().to_string());
    assert_eq!(status.total_compressed_bytes as usize, compressed.len());
}

#[tokio::test(start_paused = true)]
async fn test_background_upload_of_small_file() {
    let harness = started_with_small_messages().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assets.json");
    std::fs::write(&path, br#"[{"assetId":"line-1"}]"#).unwrap();

    let status = harness.lifecycle.send_large_payload(&path).await.unwrap();

    assert!(status.is_success());
    assert_eq!(status.parts_sent, 1);
    let statuses = harness.bodies_with(capability::EV_LARGE_PAYLOAD_STATUS);
    assert_eq!(statuses.len(), 1);
    assert_eq!(
        statuses[0][capability::EV_LARGE_PAYLOAD_STATUS]["fn"],
        "assets.json"
    );
}

#[tokio::test(start_paused = true)]
async fn test_upload_without_connection_fails_cleanly() {
    let harness = started_with_small_messages().await;
    harness.lifecycle.close().await;
    let sent_before = harness.hub.sent_messages().len();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("values.json");
    std::fs::write(&path, random_bytes(2_000)).unwrap();

    let status = harness.lifecycle.upload_file(&path).await;

    assert_eq!(status.status_code, 500);
    assert_eq!(status.parts_sent, 0);
    assert_eq!(harness.hub.sent_messages().len(), sent_before);
}
