//! Traits implemented by worker authors
//!
//! A worker is a `Default` value living in a `static` inside the library. The
//! export macros in [`crate::export`] wire it to the C entry points.

use crate::abi::{StreamDescriptorHandle, StreamKind};
use crate::context::{FilterSpec, Logger, Parameters, Progress, StreamGraphBuilder};
use crate::error::WorkerError;
use crate::media::{FormatContext, Frame, StreamInfo};
use crate::registry::WorkerManifest;
use std::os::raw::c_uint;

/// Identity and one-time setup shared by every worker
pub trait Worker: Default + Send + Sync + 'static {
    /// Name, descriptions, version and parameters. Called once per loaded library.
    fn manifest() -> WorkerManifest;

    /// Runs at most once, before any job. Cannot fail.
    fn init(&self, _logger: &Logger) {}
}

/// A worker that runs a whole job in one call
pub trait GenericWorker: Worker {
    fn process(&self, job: &JobContext) -> Result<ProcessOutput, WorkerError>;
}

/// A worker that negotiates streams and then handles one frame at a time
pub trait MediaWorker: Worker {
    /// Claim the streams this worker wants, optionally with a filter chain each.
    fn init_process(&self, context: &mut InitProcessContext<'_>) -> Result<(), WorkerError>;

    /// Handle one frame and return the message handed back to the host.
    fn process_frame(&self, context: &FrameContext<'_>) -> Result<String, WorkerError>;

    fn ending_process(&self, _logger: &Logger) {}
}

/// Result of a successful generic job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub message: String,
    pub output_paths: Vec<String>,
}

impl ProcessOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output_paths: Vec::new(),
        }
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_paths.push(path.into());
        self
    }
}

/// Capabilities available to [`GenericWorker::process`]
#[derive(Debug)]
pub struct JobContext {
    pub parameters: Parameters,
    pub progress: Progress,
    pub logger: Logger,
}

/// Capabilities available to [`MediaWorker::init_process`]
pub struct InitProcessContext<'a> {
    pub parameters: Parameters,
    pub logger: Logger,
    format: FormatContext<'a>,
    graph: StreamGraphBuilder<'a>,
    claimed: Vec<(c_uint, StreamDescriptorHandle)>,
}

impl<'a> InitProcessContext<'a> {
    pub fn new(
        parameters: Parameters,
        logger: Logger,
        format: FormatContext<'a>,
        graph: StreamGraphBuilder<'a>,
    ) -> Self {
        Self {
            parameters,
            logger,
            format,
            graph,
            claimed: Vec::new(),
        }
    }

    pub fn format(&self) -> &FormatContext<'a> {
        &self.format
    }

    /// Direct access to the host builder callbacks
    pub fn graph(&self) -> &StreamGraphBuilder<'a> {
        &self.graph
    }

    /// Request an output descriptor for `stream` and record it as claimed.
    pub fn claim(&mut self, stream: &StreamInfo) -> Result<StreamDescriptorHandle, WorkerError> {
        let kind = stream.kind.ok_or_else(|| {
            WorkerError::StreamConfiguration(format!(
                "stream {} has no known kind",
                stream.index
            ))
        })?;
        self.claim_as(stream.index, kind)
    }

    pub fn claim_as(
        &mut self,
        index: c_uint,
        kind: StreamKind,
    ) -> Result<StreamDescriptorHandle, WorkerError> {
        if self.claimed.iter().any(|(claimed, _)| *claimed == index) {
            return Err(WorkerError::StreamConfiguration(format!(
                "stream {} already claimed",
                index
            )));
        }
        let descriptor = self.graph.new_stream_descriptor(index, kind)?;
        self.claimed.push((index, descriptor));
        Ok(descriptor)
    }

    /// Claim `stream` and attach `filter` as its filter chain.
    pub fn claim_with_filter(
        &mut self,
        stream: &StreamInfo,
        filter: &FilterSpec,
    ) -> Result<StreamDescriptorHandle, WorkerError> {
        let descriptor = self.claim(stream)?;
        self.graph.attach_filter(descriptor, filter)?;
        Ok(descriptor)
    }

    pub fn claimed(&self) -> Vec<StreamDescriptorHandle> {
        self.claimed.iter().map(|(_, handle)| *handle).collect()
    }
}

/// Capabilities available to [`MediaWorker::process_frame`]
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub parameters: Parameters,
    pub logger: Logger,
    pub job_id: u64,
    pub stream_index: c_uint,
    pub frame: Frame<'a>,
}
