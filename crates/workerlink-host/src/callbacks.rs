//! Host capabilities handed to workers as C function pointers

use crate::graph;
use crate::job::{lookup_parameter, record_progress};
use std::os::raw::c_char;
use std::ptr;
use tracing::{debug, error, info, trace, warn};
use workerlink_abi::marshal::{borrow_c_str, into_owned_c_string};
use workerlink_abi::{ChannelHandle, InitProcessCallbacks, JobHandle, LogLevel};

/// Routes worker log lines into `tracing` under the `workerlink::worker` target.
/// Unknown levels are dropped.
pub extern "C" fn logger(level: *const c_char, message: *const c_char) {
    // SAFETY: the worker keeps both strings alive for the duration of the call
    let (level, message) = unsafe { (borrow_c_str(level), borrow_c_str(message)) };
    let message = message.unwrap_or_default();
    match level.as_deref().map(str::parse::<LogLevel>) {
        Some(Ok(LogLevel::Trace)) => trace!(target: "workerlink::worker", "[Worker] {}", message),
        Some(Ok(LogLevel::Debug)) => debug!(target: "workerlink::worker", "[Worker] {}", message),
        Some(Ok(LogLevel::Info)) => info!(target: "workerlink::worker", "[Worker] {}", message),
        Some(Ok(LogLevel::Warn)) => warn!(target: "workerlink::worker", "[Worker] {}", message),
        Some(Ok(LogLevel::Error)) => error!(target: "workerlink::worker", "[Worker] {}", message),
        _ => {}
    }
}

/// Hands the worker a C-allocated copy of the value, or null. The worker frees it.
pub extern "C" fn get_parameter_value(job: JobHandle, key: *const c_char) -> *mut c_char {
    // SAFETY: as for `logger`
    let Some(key) = (unsafe { borrow_c_str(key) }) else {
        return ptr::null_mut();
    };
    match lookup_parameter(job, &key) {
        Some(value) => into_owned_c_string(&value),
        None => ptr::null_mut(),
    }
}

pub extern "C" fn progress(channel: ChannelHandle, percentage: u8) {
    record_progress(channel, percentage);
}

/// Callback table for `init_process`
pub fn init_process_callbacks() -> InitProcessCallbacks {
    InitProcessCallbacks {
        get_parameter_value,
        logger,
        new_stream_descriptor: graph::new_stream_descriptor,
        new_filter: graph::new_filter,
        add_filter_parameter: graph::add_filter_parameter,
        add_descriptor_filter: graph::add_descriptor_filter,
    }
}
