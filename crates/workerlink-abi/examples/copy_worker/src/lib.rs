//! Example generic worker for workerlink
//!
//! Copies `source_path` to `destination_path` and reports the copy as its only
//! output.
//!
//! # Building
//!
//! ```bash
//! cargo build --release -p copy-worker
//! ```
//!
//! # Running
//!
//! ```bash
//! # Linux
//! WORKER_LIBRARY_FILE=target/release/libcopy_worker.so \
//!     workerlink process --job-id 1 --param source_path=in.bin --param destination_path=out.bin
//! ```

use std::fs;
use std::path::Path;
use workerlink_abi::{
    GenericWorker, JobContext, Logger, ParameterDescriptor, ParameterKind, ProcessOutput, Worker,
    WorkerError, WorkerManifest,
};

#[derive(Default)]
pub struct CopyWorker;

impl Worker for CopyWorker {
    fn manifest() -> WorkerManifest {
        WorkerManifest::new("copy", env!("CARGO_PKG_VERSION"))
            .short_description("Copies a file")
            .description("Copies the file at source_path to destination_path, creating parent directories as needed.")
            .parameter(ParameterDescriptor::required(
                "source_path",
                "Source path",
                ParameterKind::String,
            ))
            .parameter(ParameterDescriptor::required(
                "destination_path",
                "Destination path",
                ParameterKind::String,
            ))
    }

    fn init(&self, logger: &Logger) {
        logger.info("copy worker ready");
    }
}

impl GenericWorker for CopyWorker {
    fn process(&self, job: &JobContext) -> Result<ProcessOutput, WorkerError> {
        let source = job.parameters.require("source_path")?;
        let destination = job.parameters.require("destination_path")?;

        if !Path::new(&source).is_file() {
            return Err(WorkerError::invalid_parameter(
                "source_path",
                format!("{} is not a file", source),
            ));
        }
        job.progress.report(50);

        if let Some(parent) = Path::new(&destination).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = fs::copy(&source, &destination)?;
        job.logger
            .debug(&format!("copied {} bytes from {} to {}", bytes, source, destination));

        Ok(ProcessOutput::new(format!("copied {} bytes", bytes)).with_output_path(destination))
    }
}

workerlink_abi::export_generic_worker!(CopyWorker);
