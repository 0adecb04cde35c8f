//! Hand-written workers speaking the raw C contract
//!
//! These bypass the SDK glue so tests can produce both well-behaved and
//! contract-breaking call sequences.

#![allow(dead_code)]

use std::convert::TryFrom;
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use workerlink_abi::abi::{
    GetParameterValueCallback, InitProcessCallbacks, InitProcessFn, LoggerCallback, ProcessFn,
    ProgressCallback, RawFormatContext, RawFrame, RawParameterDescriptor,
};
use workerlink_abi::marshal::{
    into_owned_c_string, into_owned_c_string_array, set_out_string, take_owned_c_string,
};
use workerlink_abi::{ChannelHandle, JobHandle, StreamDescriptorHandle, StreamKind};
use workerlink_host::{WorkerLibrary, WorkerSymbols};

pub static ENDINGS: AtomicUsize = AtomicUsize::new(0);
pub static INITS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn name() -> *const c_char {
    c"raw-worker".as_ptr()
}

unsafe extern "C" fn short_description() -> *const c_char {
    c"Test worker".as_ptr()
}

unsafe extern "C" fn description() -> *const c_char {
    c"Worker written against the raw calling convention".as_ptr()
}

unsafe extern "C" fn version() -> *const c_char {
    c"1.2.0".as_ptr()
}

unsafe extern "C" fn bad_version() -> *const c_char {
    c"one.two".as_ptr()
}

unsafe extern "C" fn no_string() -> *const c_char {
    std::ptr::null()
}

struct StaticTable([RawParameterDescriptor; 2]);

// SAFETY: every pointer refers to a `'static` C string literal
unsafe impl Sync for StaticTable {}

struct StaticKinds([*const c_char; 1]);
unsafe impl Sync for StaticKinds {}

static STRING_KIND: StaticKinds = StaticKinds([c"string".as_ptr()]);
static UNKNOWN_KIND: StaticKinds = StaticKinds([c"float".as_ptr()]);

static PARAMETERS: StaticTable = StaticTable([
    RawParameterDescriptor {
        identifier: c"source_path".as_ptr(),
        label: c"Source path".as_ptr(),
        kind_size: 1,
        kind: STRING_KIND.0.as_ptr(),
        required: 1,
    },
    RawParameterDescriptor {
        identifier: c"destination_path".as_ptr(),
        label: c"Destination path".as_ptr(),
        kind_size: 1,
        kind: STRING_KIND.0.as_ptr(),
        required: 1,
    },
]);

static BAD_PARAMETERS: StaticTable = StaticTable([
    RawParameterDescriptor {
        identifier: c"ratio".as_ptr(),
        label: c"Ratio".as_ptr(),
        kind_size: 1,
        kind: UNKNOWN_KIND.0.as_ptr(),
        required: 0,
    },
    RawParameterDescriptor {
        identifier: c"".as_ptr(),
        label: c"".as_ptr(),
        kind_size: 0,
        kind: ptr::null(),
        required: 0,
    },
]);

unsafe extern "C" fn parameters_size() -> c_uint {
    2
}

unsafe extern "C" fn parameters(buffer: *mut RawParameterDescriptor) {
    ptr::copy_nonoverlapping(PARAMETERS.0.as_ptr(), buffer, 2);
}

unsafe extern "C" fn bad_parameters(buffer: *mut RawParameterDescriptor) {
    ptr::copy_nonoverlapping(BAD_PARAMETERS.0.as_ptr(), buffer, 2);
}

unsafe extern "C" fn init(logger: LoggerCallback) {
    INITS.fetch_add(1, Ordering::SeqCst);
    logger(c"info".as_ptr(), c"raw worker ready".as_ptr());
}

unsafe fn get(getter: GetParameterValueCallback, job: JobHandle, key: &std::ffi::CStr) -> Option<String> {
    take_owned_c_string(getter(job, key.as_ptr()))
}

/// Copies `source_path` to `destination_path`, reporting 0, 50 and 100 percent
pub unsafe extern "C" fn copy_process(
    job: JobHandle,
    channel: ChannelHandle,
    get_parameter_value: GetParameterValueCallback,
    progress: Option<ProgressCallback>,
    logger: LoggerCallback,
    message: *mut *mut c_char,
    output_paths: *mut *mut *mut c_char,
) -> c_int {
    let report = |percentage| {
        if let Some(progress) = progress {
            progress(channel, percentage);
        }
    };
    report(0);

    let Some(source) = get(get_parameter_value, job, c"source_path") else {
        set_out_string(message, "missing parameter source_path");
        return 1;
    };
    let Some(destination) = get(get_parameter_value, job, c"destination_path") else {
        set_out_string(message, "missing parameter destination_path");
        return 1;
    };
    report(50);

    if let Err(e) = std::fs::copy(&source, &destination) {
        set_out_string(message, &format!("copy failed: {}", e));
        return 2;
    }
    logger(c"debug".as_ptr(), c"copied".as_ptr());

    match into_owned_c_string_array(&[destination]) {
        Ok(paths) => *output_paths = paths,
        Err(_) => return 3,
    }
    set_out_string(message, "copy complete");
    report(100);
    0
}

/// Fails without setting a message
pub unsafe extern "C" fn silent_failing_process(
    _job: JobHandle,
    _channel: ChannelHandle,
    _get_parameter_value: GetParameterValueCallback,
    _progress: Option<ProgressCallback>,
    _logger: LoggerCallback,
    _message: *mut *mut c_char,
    _output_paths: *mut *mut *mut c_char,
) -> c_int {
    9
}

/// Claims audio streams with `aformat` resampling to 16 kHz mono s32
pub unsafe extern "C" fn audio_init_process(
    _job: JobHandle,
    callbacks: *const InitProcessCallbacks,
    format_context: *const RawFormatContext,
    output_descriptors: *mut StreamDescriptorHandle,
    output_descriptors_size: *mut c_uint,
) -> c_int {
    let callbacks = &*callbacks;
    let context = &*format_context;
    let streams = std::slice::from_raw_parts(context.streams, context.nb_streams as usize);

    let mut count = 0usize;
    for stream in streams {
        if StreamKind::try_from(stream.kind) != Ok(StreamKind::Audio) {
            continue;
        }
        let descriptor = (callbacks.new_stream_descriptor)(stream.index, stream.kind);
        if descriptor.is_null() {
            return 1;
        }
        let filter = (callbacks.new_filter)(c"aformat".as_ptr(), c"aformat_filter".as_ptr());
        (callbacks.add_filter_parameter)(filter, c"sample_rates".as_ptr(), c"16000".as_ptr());
        (callbacks.add_filter_parameter)(filter, c"sample_fmts".as_ptr(), c"s32".as_ptr());
        (callbacks.add_filter_parameter)(filter, c"channel_layouts".as_ptr(), c"mono".as_ptr());
        (callbacks.add_descriptor_filter)(descriptor, filter);
        *output_descriptors.add(count) = descriptor;
        count += 1;
    }
    *output_descriptors_size = count as c_uint;
    (callbacks.logger)(c"info".as_ptr(), c"streams configured".as_ptr());
    0
}

/// Returns success after breaking the builder contract
pub unsafe extern "C" fn misbehaving_init_process(
    _job: JobHandle,
    callbacks: *const InitProcessCallbacks,
    format_context: *const RawFormatContext,
    output_descriptors: *mut StreamDescriptorHandle,
    output_descriptors_size: *mut c_uint,
) -> c_int {
    let callbacks = &*callbacks;
    let nb_streams = (*format_context).nb_streams;

    // index past the end of the stream table
    let _ = (callbacks.new_stream_descriptor)(nb_streams, StreamKind::Audio.as_raw());

    let descriptor = (callbacks.new_stream_descriptor)(0, StreamKind::Video.as_raw());
    let filter = (callbacks.new_filter)(c"scale".as_ptr(), ptr::null());
    (callbacks.add_descriptor_filter)(descriptor, filter);
    (callbacks.add_filter_parameter)(filter, c"w".as_ptr(), c"640".as_ptr());

    *output_descriptors = descriptor;
    *output_descriptors_size = 1;
    0
}

pub unsafe extern "C" fn failing_init_process(
    _job: JobHandle,
    callbacks: *const InitProcessCallbacks,
    _format_context: *const RawFormatContext,
    _output_descriptors: *mut StreamDescriptorHandle,
    output_descriptors_size: *mut c_uint,
) -> c_int {
    ((*callbacks).logger)(c"error".as_ptr(), c"cannot handle this source".as_ptr());
    *output_descriptors_size = 0;
    7
}

/// Reports `{"job_id": .., "pts": .., "result":"OK"}` for audio frames
pub unsafe extern "C" fn audio_process_frame(
    _job: JobHandle,
    _get_parameter_value: GetParameterValueCallback,
    _logger: LoggerCallback,
    job_id: u64,
    _stream_index: c_uint,
    frame: *const RawFrame,
    message: *mut *mut c_char,
) -> c_int {
    let frame = &*frame;
    if frame.sample_rate == 0 || frame.channels == 0 {
        *message = into_owned_c_string("not an audio frame");
        return 1;
    }
    let text = format!(r#"{{"job_id": {}, "pts": {}, "result":"OK"}}"#, job_id, frame.pts);
    *message = into_owned_c_string(&text);
    0
}

pub unsafe extern "C" fn silent_failing_process_frame(
    _job: JobHandle,
    _get_parameter_value: GetParameterValueCallback,
    _logger: LoggerCallback,
    _job_id: u64,
    _stream_index: c_uint,
    _frame: *const RawFrame,
    _message: *mut *mut c_char,
) -> c_int {
    4
}

pub unsafe extern "C" fn ending_process(logger: LoggerCallback) {
    ENDINGS.fetch_add(1, Ordering::SeqCst);
    logger(c"info".as_ptr(), c"ending".as_ptr());
}

pub fn base_symbols() -> WorkerSymbols {
    WorkerSymbols {
        get_name: name,
        get_short_description: short_description,
        get_description: description,
        get_version: version,
        get_parameters_size: parameters_size,
        get_parameters: parameters,
        init: Some(init),
        init_process: None,
        process_frame: None,
        ending_process: None,
        process: None,
    }
}

pub fn generic_library(process: ProcessFn) -> WorkerLibrary {
    WorkerLibrary::from_symbols(WorkerSymbols {
        process: Some(process),
        ..base_symbols()
    })
    .unwrap()
}

pub fn media_symbols(init_process: InitProcessFn) -> WorkerSymbols {
    WorkerSymbols {
        init_process: Some(init_process),
        process_frame: Some(audio_process_frame),
        ending_process: Some(ending_process),
        ..base_symbols()
    }
}

pub fn media_library(init_process: InitProcessFn) -> WorkerLibrary {
    WorkerLibrary::from_symbols(media_symbols(init_process)).unwrap()
}

pub fn with_bad_version(symbols: WorkerSymbols) -> WorkerSymbols {
    WorkerSymbols {
        get_version: bad_version,
        ..symbols
    }
}

pub fn with_no_name(symbols: WorkerSymbols) -> WorkerSymbols {
    WorkerSymbols {
        get_name: no_string,
        ..symbols
    }
}

pub fn with_bad_parameters(symbols: WorkerSymbols) -> WorkerSymbols {
    WorkerSymbols {
        get_parameters: bad_parameters,
        ..symbols
    }
}
