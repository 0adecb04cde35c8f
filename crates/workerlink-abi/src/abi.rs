//! ABI-stable types for the worker interface
//!
//! This module defines the binary contract between a host process and a worker
//! library. Everything that crosses the boundary is either a plain integer, a
//! NUL-terminated C string, a `#[repr(C)]` struct declared here, or a function
//! pointer whose signature is declared here.
//!
//! Ownership of each pointer is fixed per signature:
//!
//! | Value | Allocated by | Freed by |
//! |-------|--------------|----------|
//! | `get_name`/`get_version`/... return values | module (static) | never |
//! | strings inside [`RawParameterDescriptor`] | module (static) | never |
//! | the [`RawParameterDescriptor`] buffer | host | host |
//! | parameter getter return value | host (C allocator) | module |
//! | `message` and `output_paths` outputs | module (C allocator) | host |
//! | [`RawFormatContext`], [`RawFrame`] | host | host, after the call returns |
//! | logger/builder string arguments | caller | caller, after the call returns |

use crate::error::AbiError;
use abi_stable::StableAbi;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::os::raw::{c_char, c_int, c_uint};

/// Return code for a successful lifecycle call
pub const STATUS_OK: c_int = 0;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(StableAbi, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Token that is never issued by a host
            pub const NULL: Self = Self(0);

            /// Wrap a raw token. Tokens are minted by hosts only.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn as_raw(self) -> u64 {
                self.0
            }

            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

opaque_handle!(
    /// Capability token identifying one job. Owned by the host for the job's
    /// lifetime; a module may hand it back to callbacks but must not interpret it.
    JobHandle
);

opaque_handle!(
    /// Capability token identifying a job's progress channel.
    ChannelHandle
);

opaque_handle!(
    /// Host-owned output stream descriptor created during `init_process`.
    StreamDescriptorHandle
);

opaque_handle!(
    /// Host-owned filter node created during `init_process`.
    FilterHandle
);

/// Media kind of a stream.
///
/// Crosses the boundary as a `u32`; values outside the table are rejected by
/// [`StreamKind::try_from`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video = 0,
    Audio = 1,
    Data = 2,
    Subtitle = 3,
}

impl StreamKind {
    pub const fn as_raw(self) -> c_uint {
        self as c_uint
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Data => "data",
            StreamKind::Subtitle => "subtitle",
        }
    }
}

impl TryFrom<c_uint> for StreamKind {
    type Error = AbiError;

    fn try_from(value: c_uint) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StreamKind::Video),
            1 => Ok(StreamKind::Audio),
            2 => Ok(StreamKind::Data),
            3 => Ok(StreamKind::Subtitle),
            other => Err(AbiError::UnknownStreamKind(other)),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared worker parameter, as written by `get_parameters`.
///
/// All pointers reference module-static storage and stay valid for the
/// lifetime of the loaded library.
#[repr(C)]
#[derive(StableAbi, Debug, Clone, Copy)]
pub struct RawParameterDescriptor {
    pub identifier: *const c_char,
    pub label: *const c_char,
    /// Number of entries behind `kind`
    pub kind_size: usize,
    pub kind: *const *const c_char,
    /// Non-zero when the parameter is required
    pub required: c_int,
}

impl RawParameterDescriptor {
    /// Zeroed slot, used by hosts to pre-fill the buffer handed to `get_parameters`
    pub const fn empty() -> Self {
        Self {
            identifier: std::ptr::null(),
            label: std::ptr::null(),
            kind_size: 0,
            kind: std::ptr::null(),
            required: 0,
        }
    }
}

/// One entry of the source's stream table.
#[repr(C)]
#[derive(StableAbi, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStreamInfo {
    pub index: c_uint,
    /// A [`StreamKind`] value; anything else is a stream the demuxer could not classify
    pub kind: c_uint,
    pub width: c_uint,
    pub height: c_uint,
    pub sample_rate: c_uint,
    pub channels: c_uint,
}

/// Read-only description of the source being processed.
#[repr(C)]
#[derive(StableAbi, Debug, Clone, Copy)]
pub struct RawFormatContext {
    pub nb_streams: c_uint,
    /// `nb_streams` entries, in stream index order
    pub streams: *const RawStreamInfo,
}

/// One decoded media unit, valid only during the `process_frame` call that received it.
///
/// Picture frames carry non-zero `width`/`height`; audio frames carry non-zero
/// `sample_rate`/`channels`.
#[repr(C)]
#[derive(StableAbi, Debug, Clone, Copy)]
pub struct RawFrame {
    pub pts: i64,
    pub width: c_uint,
    pub height: c_uint,
    pub sample_rate: c_uint,
    pub channels: c_uint,
    pub nb_samples: c_uint,
    pub data: *const u8,
    pub data_len: usize,
}

// ============================================================================
// Host-supplied callbacks
// ============================================================================

/// Log through the host. `level` is one of `trace`, `debug`, `info`, `warn`, `error`.
pub type LoggerCallback = extern "C" fn(level: *const c_char, message: *const c_char);

/// Resolve a job parameter. Returns a C-allocated string the module must free,
/// or null when the job has no value for `key`.
pub type GetParameterValueCallback =
    extern "C" fn(job: JobHandle, key: *const c_char) -> *mut c_char;

/// Report job progress, `percentage` in `0..=100`.
pub type ProgressCallback = extern "C" fn(channel: ChannelHandle, percentage: u8);

/// Declare intent to handle input stream `index` as a [`StreamKind`] value.
/// Returns [`StreamDescriptorHandle::NULL`] when the host rejects the request.
pub type NewStreamDescriptorCallback =
    extern "C" fn(index: c_uint, kind: c_uint) -> StreamDescriptorHandle;

/// Create a detached filter node. `label` may be null.
pub type NewFilterCallback =
    extern "C" fn(name: *const c_char, label: *const c_char) -> FilterHandle;

/// Append one parameter to a filter that is not attached yet.
pub type AddFilterParameterCallback =
    extern "C" fn(filter: FilterHandle, key: *const c_char, value: *const c_char);

/// Attach a fully parametrized filter to the end of a descriptor's filter chain.
pub type AddDescriptorFilterCallback =
    extern "C" fn(descriptor: StreamDescriptorHandle, filter: FilterHandle);

/// Capabilities handed to `init_process`. Borrowed for the duration of the call,
/// and the builder callbacks only work on the thread that made it.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InitProcessCallbacks {
    pub get_parameter_value: GetParameterValueCallback,
    pub logger: LoggerCallback,
    pub new_stream_descriptor: NewStreamDescriptorCallback,
    pub new_filter: NewFilterCallback,
    pub add_filter_parameter: AddFilterParameterCallback,
    pub add_descriptor_filter: AddDescriptorFilterCallback,
}

impl fmt::Debug for InitProcessCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitProcessCallbacks").finish_non_exhaustive()
    }
}

// ============================================================================
// Module entry points
// ============================================================================

pub type GetStringFn = unsafe extern "C" fn() -> *const c_char;

pub type GetParametersSizeFn = unsafe extern "C" fn() -> c_uint;

/// `parameters` must have room for exactly `get_parameters_size()` entries.
/// A smaller buffer is a contract violation and is not checked.
pub type GetParametersFn = unsafe extern "C" fn(parameters: *mut RawParameterDescriptor);

pub type InitFn = unsafe extern "C" fn(logger: LoggerCallback);

/// `output_descriptors` has room for `format_context.nb_streams` handles.
pub type InitProcessFn = unsafe extern "C" fn(
    job: JobHandle,
    callbacks: *const InitProcessCallbacks,
    format_context: *const RawFormatContext,
    output_descriptors: *mut StreamDescriptorHandle,
    output_descriptors_size: *mut c_uint,
) -> c_int;

pub type ProcessFrameFn = unsafe extern "C" fn(
    job: JobHandle,
    get_parameter_value: GetParameterValueCallback,
    logger: LoggerCallback,
    job_id: u64,
    stream_index: c_uint,
    frame: *const RawFrame,
    message: *mut *mut c_char,
) -> c_int;

pub type EndingProcessFn = unsafe extern "C" fn(logger: LoggerCallback);

/// `output_paths` receives a C-allocated, null-terminated array of C-allocated strings.
pub type ProcessFn = unsafe extern "C" fn(
    job: JobHandle,
    channel: ChannelHandle,
    get_parameter_value: GetParameterValueCallback,
    progress: Option<ProgressCallback>,
    logger: LoggerCallback,
    message: *mut *mut c_char,
    output_paths: *mut *mut *mut c_char,
) -> c_int;

/// Exported symbol names
pub mod symbols {
    pub const GET_NAME: &str = "get_name";
    pub const GET_SHORT_DESCRIPTION: &str = "get_short_description";
    pub const GET_DESCRIPTION: &str = "get_description";
    pub const GET_VERSION: &str = "get_version";
    pub const GET_PARAMETERS_SIZE: &str = "get_parameters_size";
    pub const GET_PARAMETERS: &str = "get_parameters";
    pub const INIT: &str = "init";
    pub const INIT_PROCESS: &str = "init_process";
    pub const PROCESS_FRAME: &str = "process_frame";
    pub const ENDING_PROCESS: &str = "ending_process";
    pub const PROCESS: &str = "process";
}
