//! Host-side error types

use crate::lifecycle::LifecycleState;
use std::os::raw::c_int;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading workers and running jobs
#[derive(Error, Debug)]
pub enum HostError {
    /// Worker directory is not a directory
    #[error("Worker directory is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Failed to load a library from file
    #[error("Failed to load worker from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// A required symbol is not exported
    #[error("Worker library {path} does not export '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: String },

    /// Two libraries in one catalog report the same name
    #[error("Duplicate worker name: {0}")]
    DuplicateWorker(String),

    /// The worker's parameter table is unusable
    #[error("Invalid parameter descriptor from worker '{worker}': {message}")]
    InvalidDescriptor { worker: String, message: String },

    /// The worker's version is not SemVer
    #[error("Worker '{worker}' reports an invalid version '{version}': {message}")]
    InvalidVersion {
        worker: String,
        version: String,
        message: String,
    },

    /// A lifecycle call made out of order
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },

    /// `init_process` returned non-zero
    #[error("init_process failed with code {code}")]
    InitProcessFailed { code: c_int },

    /// The worker misused the stream graph builder
    #[error("Worker broke the stream graph contract: {}", violations.join("; "))]
    ContractViolation { violations: Vec<String> },

    /// A frame was offered for a stream the worker did not claim
    #[error("Stream {0} was not claimed by the worker")]
    UnclaimedStream(u32),

    /// A frame failed under the abort policy
    #[error("Frame at pts {pts} on stream {stream_index} failed: {message}")]
    FrameFailed {
        stream_index: u32,
        pts: i64,
        message: String,
    },

    /// A job or source description that cannot be run
    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

pub type Result<T> = std::result::Result<T, HostError>;
