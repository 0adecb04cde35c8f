//! Host side of the workerlink calling convention
//!
//! Loads worker libraries, reads their descriptor tables and drives jobs through
//! them. The capability callbacks handed to workers are plain `extern "C"`
//! functions backed by process-wide job/channel registries and a per-thread
//! stream graph.
//!
//! ```rust,ignore
//! use workerlink_host::{Job, JobGuard, WorkerLibrary, run_process};
//!
//! let library = WorkerLibrary::from_env()?;
//! let job = JobGuard::register(
//!     Job::new(1)
//!         .with_parameter("source_path", "/data/in.bin")
//!         .with_parameter("destination_path", "/data/out.bin"),
//! );
//! let result = run_process(&library, &job)?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```

pub mod callbacks;
pub mod description;
pub mod error;
pub mod graph;
pub mod job;
pub mod library;
pub mod lifecycle;
pub mod loader;
pub mod source;

pub use description::{validate_semver, WorkerDescription};
pub use error::{HostError, Result};
pub use graph::{Filter, GraphScope, StreamDescriptor, StreamGraph};
pub use job::{Job, JobGuard, JobParameter, JobProgression, JobResult, JobStatus};
pub use library::{WorkerKind, WorkerLibrary, WorkerSymbols};
pub use lifecycle::{
    run_process, FrameFailurePolicy, FrameOutcome, FrameReport, LifecycleState, MediaReport,
    MediaSession,
};
pub use loader::{
    expand_tilde, library_path_from_env, LoadStats, LoadedWorker, WorkerCatalog,
    DEFAULT_WORKER_LIBRARY, WORKER_LIBRARY_ENV,
};
pub use source::{FormatContextView, FrameData, MediaSource, SourceStream};
