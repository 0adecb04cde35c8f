//! Driving a worker through a job
//!
//! Generic workers run in one [`run_process`] call. Media workers go through a
//! [`MediaSession`], which enforces the call order
//! `Declared → Initialized → StreamsConfigured → Processing → Ended`.

use crate::callbacks;
use crate::error::{HostError, Result};
use crate::graph::{GraphScope, StreamDescriptor};
use crate::job::{JobGuard, JobResult, JobStatus};
use crate::library::WorkerLibrary;
use crate::source::{FrameData, MediaSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;
use std::str::FromStr;
use tracing::{debug, info, warn};
use workerlink_abi::abi::symbols;
use workerlink_abi::marshal::{take_owned_c_string, take_owned_c_string_array};
use workerlink_abi::{StreamDescriptorHandle, STATUS_OK};

fn failure_message(function: &str, code: c_int, message: Option<String>) -> String {
    match message {
        Some(message) if !message.is_empty() => message,
        _ => format!("{} function returned error code: {}", function, code),
    }
}

/// Run a generic job to completion
pub fn run_process(library: &WorkerLibrary, job: &JobGuard) -> Result<JobResult> {
    let process = library.symbols().process.ok_or_else(|| HostError::MissingSymbol {
        path: library.path().to_path_buf(),
        symbol: symbols::PROCESS.to_string(),
    })?;
    library.ensure_initialized();
    info!(job_id = job.job_id(), "Starting job");

    let mut message: *mut c_char = ptr::null_mut();
    let mut output_paths: *mut *mut c_char = ptr::null_mut();
    // SAFETY: the handles are registered for the guard's lifetime and both
    // out-parameters are valid for writes
    let (code, message, output_paths) = unsafe {
        let code = process(
            job.job_handle(),
            job.channel_handle(),
            callbacks::get_parameter_value,
            Some(callbacks::progress),
            callbacks::logger,
            &mut message,
            &mut output_paths,
        );
        (
            code,
            take_owned_c_string(message),
            take_owned_c_string_array(output_paths),
        )
    };

    let result = if code == STATUS_OK {
        info!(job_id = job.job_id(), outputs = output_paths.len(), "Job completed");
        JobResult {
            job_id: job.job_id(),
            status: JobStatus::Completed,
            message: message.unwrap_or_default(),
            output_paths,
            progressions: job.progressions(),
        }
    } else {
        let message = failure_message(symbols::PROCESS, code, message);
        warn!(job_id = job.job_id(), code, "Job failed: {}", message);
        if !output_paths.is_empty() {
            warn!(job_id = job.job_id(), "Discarding output paths of a failed job");
        }
        JobResult {
            job_id: job.job_id(),
            status: JobStatus::Error,
            message,
            output_paths: Vec::new(),
            progressions: job.progressions(),
        }
    };
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Declared,
    Initialized,
    StreamsConfigured,
    Processing,
    Ended,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Declared => "declared",
            LifecycleState::Initialized => "initialized",
            LifecycleState::StreamsConfigured => "streams configured",
            LifecycleState::Processing => "processing",
            LifecycleState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// What the host does when a frame fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFailurePolicy {
    /// Record the failure and keep going
    #[default]
    Skip,
    /// End the session and report the failure
    Abort,
}

impl FromStr for FrameFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(FrameFailurePolicy::Skip),
            "abort" => Ok(FrameFailurePolicy::Abort),
            other => Err(format!(
                "unknown frame failure policy '{}' (expected skip or abort)",
                other
            )),
        }
    }
}

/// Message returned for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FrameOutcome {
    Json(Value),
    Text(String),
}

impl FrameOutcome {
    pub fn parse(message: String) -> Self {
        match serde_json::from_str::<Value>(&message) {
            Ok(value) if value.is_object() || value.is_array() => FrameOutcome::Json(value),
            _ => FrameOutcome::Text(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub stream_index: u32,
    pub pts: i64,
    pub code: i32,
    pub outcome: FrameOutcome,
}

impl FrameReport {
    pub fn is_success(&self) -> bool {
        self.code == STATUS_OK
    }
}

/// Everything a media session produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaReport {
    pub job_id: u64,
    pub descriptors: Vec<StreamDescriptor>,
    pub frames: Vec<FrameReport>,
    /// Frames for streams the worker did not claim
    pub passed_through: usize,
    pub failed: usize,
}

/// One media job in progress
#[derive(Debug)]
pub struct MediaSession<'a> {
    library: &'a WorkerLibrary,
    job: &'a JobGuard,
    policy: FrameFailurePolicy,
    state: LifecycleState,
    descriptors: Vec<StreamDescriptor>,
}

impl<'a> MediaSession<'a> {
    pub fn new(library: &'a WorkerLibrary, job: &'a JobGuard, policy: FrameFailurePolicy) -> Result<Self> {
        if !library.is_media() {
            return Err(HostError::MissingSymbol {
                path: library.path().to_path_buf(),
                symbol: symbols::INIT_PROCESS.to_string(),
            });
        }
        Ok(Self {
            library,
            job,
            policy,
            state: LifecycleState::Declared,
            descriptors: Vec::new(),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn descriptors(&self) -> &[StreamDescriptor] {
        &self.descriptors
    }

    pub fn is_claimed(&self, stream_index: u32) -> bool {
        self.descriptors.iter().any(|d| d.index == stream_index)
    }

    fn expect_state(&self, operation: &'static str, allowed: &[LifecycleState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(HostError::InvalidTransition {
                operation,
                state: self.state,
            })
        }
    }

    fn missing(&self, symbol: &str) -> HostError {
        HostError::MissingSymbol {
            path: self.library.path().to_path_buf(),
            symbol: symbol.to_string(),
        }
    }

    pub fn init(&mut self) -> Result<()> {
        self.expect_state("init", &[LifecycleState::Declared])?;
        self.library.ensure_initialized();
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    /// Let the worker claim streams of `source`. On failure the session ends
    /// without `ending_process`.
    pub fn configure_streams(&mut self, source: &MediaSource) -> Result<&[StreamDescriptor]> {
        self.expect_state("configure streams", &[LifecycleState::Initialized])?;
        let init_process = self
            .library
            .symbols()
            .init_process
            .ok_or_else(|| self.missing(symbols::INIT_PROCESS))?;

        match self.negotiate(init_process, source) {
            Ok(descriptors) => {
                for descriptor in &descriptors {
                    debug!(
                        job_id = self.job.job_id(),
                        "Stream {} ({}) claimed with filters [{}]",
                        descriptor.index,
                        descriptor.kind,
                        descriptor.filter_chain()
                    );
                }
                self.descriptors = descriptors;
                self.state = LifecycleState::StreamsConfigured;
                Ok(&self.descriptors)
            }
            Err(error) => {
                warn!(job_id = self.job.job_id(), "Stream configuration failed: {}", error);
                self.state = LifecycleState::Ended;
                Err(error)
            }
        }
    }

    fn negotiate(
        &self,
        init_process: workerlink_abi::abi::InitProcessFn,
        source: &MediaSource,
    ) -> Result<Vec<StreamDescriptor>> {
        source.validate()?;
        let view = source.format_context();
        let nb_streams = view.nb_streams();
        let format_context = view.as_raw();
        let table = callbacks::init_process_callbacks();
        let mut returned = vec![StreamDescriptorHandle::NULL; nb_streams];
        let mut count: c_uint = 0;

        let scope = GraphScope::enter(nb_streams)?;
        // SAFETY: every pointer refers to a local that outlives the call, and
        // `returned` has one slot per input stream
        let code = unsafe {
            init_process(
                self.job.job_handle(),
                &table,
                &format_context,
                returned.as_mut_ptr(),
                &mut count,
            )
        };
        let graph = scope.finish();

        if code != STATUS_OK {
            return Err(HostError::InitProcessFailed { code });
        }
        let reported = count as usize;
        graph.resolve(&returned[..reported.min(nb_streams)], reported)
    }

    /// Hand one frame of a claimed stream to the worker
    pub fn process_frame(&mut self, frame: &FrameData) -> Result<FrameReport> {
        self.expect_state(
            "process a frame",
            &[LifecycleState::StreamsConfigured, LifecycleState::Processing],
        )?;
        if !self.is_claimed(frame.stream_index) {
            return Err(HostError::UnclaimedStream(frame.stream_index));
        }
        let process_frame = self
            .library
            .symbols()
            .process_frame
            .ok_or_else(|| self.missing(symbols::PROCESS_FRAME))?;
        self.state = LifecycleState::Processing;

        let raw = frame.as_raw();
        let mut message: *mut c_char = ptr::null_mut();
        // SAFETY: `raw` borrows `frame`, which outlives the call
        let (code, message) = unsafe {
            let code = process_frame(
                self.job.job_handle(),
                callbacks::get_parameter_value,
                callbacks::logger,
                self.job.job_id(),
                frame.stream_index,
                &raw,
                &mut message,
            );
            (code, take_owned_c_string(message))
        };

        if code == STATUS_OK {
            return Ok(FrameReport {
                stream_index: frame.stream_index,
                pts: frame.pts,
                code,
                outcome: FrameOutcome::parse(message.unwrap_or_default()),
            });
        }

        let message = failure_message(symbols::PROCESS_FRAME, code, message);
        match self.policy {
            FrameFailurePolicy::Skip => {
                warn!(
                    job_id = self.job.job_id(),
                    "Frame at pts {} on stream {} failed: {}", frame.pts, frame.stream_index, message
                );
                Ok(FrameReport {
                    stream_index: frame.stream_index,
                    pts: frame.pts,
                    code,
                    outcome: FrameOutcome::parse(message),
                })
            }
            FrameFailurePolicy::Abort => {
                self.end()?;
                Err(HostError::FrameFailed {
                    stream_index: frame.stream_index,
                    pts: frame.pts,
                    message,
                })
            }
        }
    }

    /// Call `ending_process`; valid once streams are configured
    pub fn end(&mut self) -> Result<()> {
        self.expect_state(
            "end",
            &[LifecycleState::StreamsConfigured, LifecycleState::Processing],
        )?;
        let ending_process = self
            .library
            .symbols()
            .ending_process
            .ok_or_else(|| self.missing(symbols::ENDING_PROCESS))?;
        // SAFETY: `ending_process` only receives the host logger
        unsafe { ending_process(callbacks::logger) };
        self.state = LifecycleState::Ended;
        Ok(())
    }

    /// Run the whole lifecycle over `source`
    pub fn run(
        library: &'a WorkerLibrary,
        job: &'a JobGuard,
        source: &MediaSource,
        policy: FrameFailurePolicy,
    ) -> Result<MediaReport> {
        let mut session = Self::new(library, job, policy)?;
        session.init()?;
        session.configure_streams(source)?;

        let mut frames = Vec::new();
        let mut passed_through = 0;
        for frame in &source.frames {
            if !session.is_claimed(frame.stream_index) {
                passed_through += 1;
                continue;
            }
            frames.push(session.process_frame(frame)?);
        }
        session.end()?;

        let failed = frames.iter().filter(|f| !f.is_success()).count();
        info!(
            job_id = job.job_id(),
            frames = frames.len(),
            failed,
            passed_through,
            "Media job finished"
        );
        Ok(MediaReport {
            job_id: job.job_id(),
            descriptors: session.descriptors,
            frames,
            passed_through,
            failed,
        })
    }
}
