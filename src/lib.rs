//! workerlink command line host
//!
//! Configuration loading and the `workerlink` subcommands. The calling convention
//! lives in `workerlink-abi`; loading and driving workers in `workerlink-host`.

pub mod cli;
pub mod config;
pub mod test_utils;

pub use workerlink_abi as abi;
pub use workerlink_host as host;
