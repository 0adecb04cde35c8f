pub mod host_config;

pub use host_config::{HostConfig, LoggingConfig, MediaConfig, WorkerConfig};
