//! Example media worker for workerlink
//!
//! Claims every audio stream of the source and asks the host to resample it to
//! 16 kHz mono signed 32-bit samples. Each audio frame is answered with
//! `{"job_id": <id>, "pts": <pts>, "result":"OK"}`.
//!
//! Frame counts are kept per job handle. `ending_process` carries no handle,
//! so it reports and forgets every job counted so far.
//!
//! # Building
//!
//! ```bash
//! cargo build --release -p audio-worker
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use workerlink_abi::{
    FilterSpec, FrameContext, FrameKind, InitProcessContext, JobHandle, Logger, MediaWorker,
    ParameterDescriptor, ParameterKind, StreamKind, Worker, WorkerError, WorkerManifest,
};

const DEFAULT_SAMPLE_RATE: u32 = 16_000;

#[derive(Default)]
pub struct AudioWorker {
    frames: Mutex<BTreeMap<JobHandle, u64>>,
}

impl AudioWorker {
    fn frames(&self) -> MutexGuard<'_, BTreeMap<JobHandle, u64>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Audio frames acknowledged so far for `job`
    pub fn frame_count(&self, job: JobHandle) -> u64 {
        self.frames().get(&job).copied().unwrap_or(0)
    }

    fn resample_filter(sample_rate: u32) -> FilterSpec {
        FilterSpec::new("aformat")
            .label("aformat_filter")
            .parameter("sample_rates", sample_rate.to_string())
            .parameter("sample_fmts", "s32")
            .parameter("channel_layouts", "mono")
    }
}

impl Worker for AudioWorker {
    fn manifest() -> WorkerManifest {
        WorkerManifest::new("audio", env!("CARGO_PKG_VERSION"))
            .short_description("Resamples audio streams")
            .description("Claims audio streams, converts them to mono s32 and acknowledges every frame.")
            .parameter(ParameterDescriptor::optional(
                "sample_rate",
                "Target sample rate",
                ParameterKind::Integer,
            ))
    }

    fn init(&self, logger: &Logger) {
        logger.info("audio worker ready");
    }
}

impl MediaWorker for AudioWorker {
    fn init_process(&self, context: &mut InitProcessContext<'_>) -> Result<(), WorkerError> {
        let sample_rate = context
            .parameters
            .get_parsed::<u32>("sample_rate")?
            .unwrap_or(DEFAULT_SAMPLE_RATE);
        if sample_rate == 0 {
            return Err(WorkerError::invalid_parameter("sample_rate", "must be positive"));
        }

        let streams: Vec<_> = context.format().streams().collect();
        context
            .logger
            .debug(&format!("source has {} streams", streams.len()));

        let filter = Self::resample_filter(sample_rate);
        for stream in &streams {
            match stream.kind {
                Some(StreamKind::Audio) => {
                    context.claim_with_filter(stream, &filter)?;
                    context.logger.info(&format!(
                        "claimed audio stream {} ({} Hz, {} channels)",
                        stream.index, stream.sample_rate, stream.channels
                    ));
                }
                _ => context
                    .logger
                    .debug(&format!("stream {} passes through", stream.index)),
            }
        }

        if context.claimed().is_empty() {
            context.logger.warn("source has no audio stream");
        }
        self.frames().insert(context.parameters.job(), 0);
        Ok(())
    }

    fn process_frame(&self, context: &FrameContext<'_>) -> Result<String, WorkerError> {
        match context.frame.kind() {
            FrameKind::Audio { .. } => {
                *self.frames().entry(context.parameters.job()).or_default() += 1;
                Ok(format!(
                    r#"{{"job_id": {}, "pts": {}, "result":"OK"}}"#,
                    context.job_id,
                    context.frame.pts()
                ))
            }
            FrameKind::Video { width, height } => Err(WorkerError::processing(format!(
                "unexpected {}x{} picture on stream {}",
                width, height, context.stream_index
            ))),
            FrameKind::Unknown => Err(WorkerError::processing(format!(
                "frame on stream {} carries neither picture nor samples",
                context.stream_index
            ))),
        }
    }

    fn ending_process(&self, logger: &Logger) {
        let counts = std::mem::take(&mut *self.frames());
        for (job, frames) in counts {
            logger.info(&format!("{}: processed {} audio frames", job, frames));
        }
    }
}

workerlink_abi::export_media_worker!(AudioWorker);
