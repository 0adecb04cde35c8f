//! Binary contract for workerlink workers
//!
//! A worker is a dynamic library (`.so` on Linux, `.dylib` on macOS, `.dll` on
//! Windows) exposing a fixed set of C symbols. This crate holds both sides of
//! that contract: the raw `#[repr(C)]` types in [`abi`] that hosts and workers
//! agree on, and a small SDK that lets a worker be written as a Rust trait
//! implementation.
//!
//! # For Worker Authors
//!
//! Add the crate as a dependency and build a `cdylib`:
//!
//! ```toml
//! [lib]
//! crate-type = ["cdylib", "rlib"]
//!
//! [dependencies]
//! workerlink-abi = "0.2"
//! ```
//!
//! Then implement [`Worker`] plus either [`GenericWorker`] or [`MediaWorker`]:
//!
//! ```rust,ignore
//! use workerlink_abi::{
//!     GenericWorker, JobContext, ParameterDescriptor, ParameterKind, ProcessOutput, Worker,
//!     WorkerError, WorkerManifest,
//! };
//!
//! #[derive(Default)]
//! struct Touch;
//!
//! impl Worker for Touch {
//!     fn manifest() -> WorkerManifest {
//!         WorkerManifest::new("touch", "1.0.0")
//!             .short_description("Creates an empty file")
//!             .parameter(ParameterDescriptor::required("path", "Path", ParameterKind::String))
//!     }
//! }
//!
//! impl GenericWorker for Touch {
//!     fn process(&self, job: &JobContext) -> Result<ProcessOutput, WorkerError> {
//!         let path = job.parameters.require("path")?;
//!         std::fs::write(&path, b"")?;
//!         Ok(ProcessOutput::new("created").with_output_path(path))
//!     }
//! }
//!
//! workerlink_abi::export_generic_worker!(Touch);
//! ```
//!
//! # For Host Applications
//!
//! Use the `workerlink-host` crate, which loads libraries and drives the lifecycle.

pub mod abi;
pub mod context;
pub mod error;
pub mod export;
pub mod marshal;
pub mod media;
pub mod parameter;
pub mod registry;
pub mod worker;

// Re-export commonly used types
pub use abi::{
    ChannelHandle, FilterHandle, InitProcessCallbacks, JobHandle, RawFormatContext, RawFrame,
    RawParameterDescriptor, RawStreamInfo, StreamDescriptorHandle, StreamKind, STATUS_OK,
};
pub use context::{FilterSpec, LogLevel, Logger, Parameters, Progress, StreamGraphBuilder};
pub use error::{AbiError, WorkerError};
pub use media::{FormatContext, Frame, FrameKind, StreamInfo};
pub use parameter::{ParameterDescriptor, ParameterKind};
pub use registry::{DescriptorRegistry, WorkerManifest};
pub use worker::{
    FrameContext, GenericWorker, InitProcessContext, JobContext, MediaWorker, ProcessOutput,
    Worker,
};
