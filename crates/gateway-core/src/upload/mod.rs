//! Streaming compressed upload of large payloads as chunked telemetry.
//!
//! Pipeline: byte source -> gzip -> [`ChunkAccumulator`] -> sequential sends.
//! Each chunk message carries `{"data": <base64>}` with properties
//! `mp="1"`, `ji=<job id>`, `fn=<file name>`, `pt=<part>`, `gz="1"`. Part
//! numbers start at 0 and increase by one per chunk. The receiver reassembles
//! by arrival order, so chunks are never sent concurrently.
//!
//! Every job ends with exactly one `evLargePayloadStatus` message, whether it
//! succeeded or not.

mod accumulator;

pub use accumulator::ChunkAccumulator;

use crate::codec::encode_base64;
use crate::config::UploadConfig;
use crate::error::{GatewayError, Result};
use crate::lifecycle::capability::EV_LARGE_PAYLOAD_STATUS;
use crate::size_budget::{compute_chunk_budget, ChunkBudget};
use crate::transport::Message;
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info};
use uuid::Uuid;

pub const PROP_MULTIPART: &str = "mp";
pub const PROP_JOB_ID: &str = "ji";
pub const PROP_FILENAME: &str = "fn";
pub const PROP_PART: &str = "pt";
pub const PROP_GZIPPED: &str = "gz";

/// Bounded send primitive the uploader writes to.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(&self, output_name: &str, message: Message) -> Result<()>;
}

/// Progress of one upload.
#[derive(Debug)]
pub struct UploadJob {
    pub job_id: Uuid,
    pub base_filename: String,
    /// Part number of the next chunk.
    pub part_number: u32,
    /// Compressed bytes sent so far.
    pub total_bytes: u64,
    accumulator: ChunkAccumulator,
}

impl UploadJob {
    fn new(base_filename: &str, budget: ChunkBudget, unit_hint: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            base_filename: base_filename.to_string(),
            part_number: 0,
            total_bytes: 0,
            accumulator: ChunkAccumulator::new(budget, unit_hint),
        }
    }

    pub fn accumulated_bytes(&self) -> usize {
        self.accumulator.accumulated_bytes()
    }
}

/// Outcome of one upload, as reported in the terminal status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStatus {
    pub job_id: Uuid,
    pub filename: String,
    pub status_code: u16,
    pub status_message: String,
    pub total_compressed_bytes: u64,
    pub parts_sent: u32,
}

impl UploadStatus {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

#[derive(Serialize)]
struct StatusTelemetry<'a> {
    ji: String,
    #[serde(rename = "fn")]
    filename: &'a str,
    st: String,
    sm: &'a str,
    sz: String,
}

/// Ships byte sources as gzip-compressed chunk messages.
pub struct StreamingUploader {
    sink: Arc<dyn MessageSink>,
    config: UploadConfig,
    budget: ChunkBudget,
}

impl StreamingUploader {
    pub fn new(sink: Arc<dyn MessageSink>, config: UploadConfig) -> Result<Self> {
        let budget = Self::budget_for(&config)?;
        Ok(Self::with_budget(sink, config, budget))
    }

    pub fn with_budget(sink: Arc<dyn MessageSink>, config: UploadConfig, budget: ChunkBudget) -> Self {
        Self {
            sink,
            config,
            budget,
        }
    }

    /// Chunk budget for the `{"data": ...}` envelope under `config`.
    pub fn budget_for(config: &UploadConfig) -> Result<ChunkBudget> {
        if config.read_unit_bytes == 0 {
            return Err(GatewayError::Config {
                message: "read_unit_bytes must be greater than zero".into(),
            });
        }
        compute_chunk_budget(config.max_message_bytes, &json!({ "data": "" }))
    }

    pub fn budget(&self) -> ChunkBudget {
        self.budget
    }

    /// Upload a file under its base name.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> UploadStatus {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut job = self.start_job(&filename);
        let outcome = match tokio::fs::File::open(path).await {
            Ok(file) => self.run(&mut job, file).await,
            Err(e) => Err(GatewayError::io_with_path(e, path)),
        };
        self.complete(job, outcome).await
    }

    /// Upload everything `reader` yields under `filename`.
    pub async fn upload_reader<R>(&self, filename: &str, reader: R) -> UploadStatus
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut job = self.start_job(filename);
        let outcome = self.run(&mut job, reader).await;
        self.complete(job, outcome).await
    }

    fn start_job(&self, filename: &str) -> UploadJob {
        let job = UploadJob::new(filename, self.budget, self.config.read_unit_bytes);
        info!(
            "Starting large payload upload of {} (job {}, chunk budget {}-{} bytes)",
            filename, job.job_id, self.budget.min_bytes, self.budget.max_bytes
        );
        job
    }

    async fn run<R>(&self, job: &mut UploadJob, mut reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut read_buf = vec![0u8; self.config.read_unit_bytes];

        loop {
            let n = reader.read(&mut read_buf).await?;
            if n == 0 {
                break;
            }

            encoder.write_all(&read_buf[..n])?;
            let unit = std::mem::take(encoder.get_mut());
            if !unit.is_empty() {
                self.push_unit(job, &unit).await?;
            }
        }

        let tail = encoder.finish()?;
        if !tail.is_empty() {
            self.push_unit(job, &tail).await?;
        }

        if let Some(chunk) = job.accumulator.finish() {
            self.send_chunk(job, chunk).await?;
        }

        Ok(())
    }

    async fn push_unit(&self, job: &mut UploadJob, unit: &[u8]) -> Result<()> {
        for chunk in job.accumulator.append(unit) {
            self.send_chunk(job, chunk).await?;
        }
        Ok(())
    }

    async fn send_chunk(&self, job: &mut UploadJob, chunk: Bytes) -> Result<()> {
        let part = job.part_number;
        let message = Message::json(&json!({ "data": encode_base64(&chunk) }))?
            .with_property(PROP_MULTIPART, "1")
            .with_property(PROP_JOB_ID, job.job_id.to_string())
            .with_property(PROP_FILENAME, job.base_filename.as_str())
            .with_property(PROP_PART, part.to_string())
            .with_property(PROP_GZIPPED, "1");

        self.sink
            .send_message(&self.config.output_name, message)
            .await
            .map_err(|e| GatewayError::Upload {
                message: format!("sending part {} failed: {}", part, e),
            })?;

        job.part_number += 1;
        job.total_bytes += chunk.len() as u64;
        info!(
            "Sent part {} of job {} ({} bytes, {} total)",
            part,
            job.job_id,
            chunk.len(),
            job.total_bytes
        );
        Ok(())
    }

    async fn complete(&self, job: UploadJob, outcome: Result<()>) -> UploadStatus {
        let (status_code, status_message) = match outcome {
            Ok(()) => (
                200,
                format!(
                    "LF Payload, JobId: {}, st: 200, sz: {}, fn: {}",
                    job.job_id, job.total_bytes, job.base_filename
                ),
            ),
            Err(e) => {
                error!("Error during upload pipeline processing: {}", e);
                (500, format!("Error during upload pipeline processing: {}", e))
            }
        };

        let status = UploadStatus {
            job_id: job.job_id,
            filename: job.base_filename,
            status_code,
            status_message,
            total_compressed_bytes: job.total_bytes,
            parts_sent: job.part_number,
        };

        let telemetry = StatusTelemetry {
            ji: status.job_id.to_string(),
            filename: &status.filename,
            st: status.status_code.to_string(),
            sm: &status.status_message,
            sz: status.total_compressed_bytes.to_string(),
        };

        let sent = match Message::json(&json!({ EV_LARGE_PAYLOAD_STATUS: telemetry })) {
            Ok(message) => self.sink.send_message(&self.config.output_name, message).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            error!("Error sending large payload status for job {}: {}", status.job_id, e);
        }

        info!("{}", status.status_message);
        status
    }
}
