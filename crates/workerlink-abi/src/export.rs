//! Entry-point glue between the C symbol surface and the worker traits
//!
//! Worker crates do not call these functions directly; the
//! [`export_generic_worker!`](crate::export_generic_worker) and
//! [`export_media_worker!`](crate::export_media_worker) macros generate the
//! `#[no_mangle]` symbols that forward here. Every trait call runs under
//! `catch_unwind` so a panic never unwinds into the host.

use crate::abi::{
    ChannelHandle, GetParameterValueCallback, InitProcessCallbacks, JobHandle, LoggerCallback,
    ProgressCallback, RawFormatContext, RawFrame, RawParameterDescriptor, StreamDescriptorHandle,
    STATUS_OK,
};
use crate::context::{Logger, Parameters, Progress, StreamGraphBuilder};
use crate::error::WorkerError;
use crate::marshal::{into_owned_c_string_array, set_out_string};
use crate::media::{FormatContext, Frame};
use crate::registry::DescriptorRegistry;
use crate::worker::{FrameContext, GenericWorker, InitProcessContext, JobContext, MediaWorker, Worker};
use std::any::Any;
use std::os::raw::{c_char, c_int, c_uint};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Descriptor registry of a worker, or why its manifest was rejected
pub type RegistryResult = Result<DescriptorRegistry, WorkerError>;

/// Build the descriptor registry for `W`.
///
/// A rejected manifest makes every descriptor export return null or zero, and
/// `init` logs the reason.
pub fn build_registry<W: Worker>() -> RegistryResult {
    guarded(|| Ok(DescriptorRegistry::new(W::manifest())?))
}

/// One descriptor string, or null when the manifest was rejected
pub fn descriptor_string(
    registry: &RegistryResult,
    field: fn(&DescriptorRegistry) -> *const c_char,
) -> *const c_char {
    registry.as_ref().map_or(ptr::null(), field)
}

pub fn parameters_size(registry: &RegistryResult) -> c_uint {
    registry.as_ref().map_or(0, DescriptorRegistry::parameters_size)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn guarded<T>(f: impl FnOnce() -> Result<T, WorkerError>) -> Result<T, WorkerError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub fn init<W: Worker>(worker: &W, registry: &RegistryResult, logger: LoggerCallback) {
    let logger = Logger::new(logger);
    if let Err(error) = registry {
        logger.error(&format!("worker manifest rejected: {}", error));
        return;
    }
    if let Err(error) = guarded(|| {
        worker.init(&logger);
        Ok(())
    }) {
        logger.error(&format!("init failed: {}", error));
    }
}

/// # Safety
///
/// `buffer` must have room for `parameters_size(registry)` entries.
pub unsafe fn get_parameters(registry: &RegistryResult, buffer: *mut RawParameterDescriptor) {
    if let Ok(registry) = registry {
        registry.write_parameters(buffer);
    }
}

/// # Safety
///
/// `message` and `output_paths` must be null or valid for a pointer-sized write.
#[allow(clippy::too_many_arguments)]
pub unsafe fn process<W: GenericWorker>(
    worker: &W,
    job: JobHandle,
    channel: ChannelHandle,
    get_parameter_value: GetParameterValueCallback,
    progress: Option<ProgressCallback>,
    logger: LoggerCallback,
    message: *mut *mut c_char,
    output_paths: *mut *mut *mut c_char,
) -> c_int {
    if !output_paths.is_null() {
        *output_paths = ptr::null_mut();
    }

    let context = JobContext {
        parameters: Parameters::new(job, get_parameter_value),
        progress: Progress::new(channel, progress),
        logger: Logger::new(logger),
    };
    context.progress.report(0);

    let result = guarded(|| {
        let output = worker.process(&context)?;
        let paths = into_owned_c_string_array(&output.output_paths)?;
        Ok((output.message, paths))
    });

    match result {
        Ok((text, paths)) => {
            if output_paths.is_null() {
                drop(crate::marshal::take_owned_c_string_array(paths));
            } else {
                *output_paths = paths;
            }
            set_out_string(message, &text);
            context.progress.report(100);
            STATUS_OK
        }
        Err(error) => {
            context.logger.error(&error.to_string());
            set_out_string(message, &error.to_string());
            error.code()
        }
    }
}

/// # Safety
///
/// Pointer arguments must follow the `init_process` contract: `callbacks` and
/// `format_context` readable for the call, `output_descriptors` sized for
/// `nb_streams` handles, `output_descriptors_size` writable.
pub unsafe fn init_process<W: MediaWorker>(
    worker: &W,
    job: JobHandle,
    callbacks: *const InitProcessCallbacks,
    format_context: *const RawFormatContext,
    output_descriptors: *mut StreamDescriptorHandle,
    output_descriptors_size: *mut c_uint,
) -> c_int {
    if !output_descriptors_size.is_null() {
        *output_descriptors_size = 0;
    }
    let callbacks = match callbacks.as_ref() {
        Some(callbacks) => callbacks,
        None => return WorkerError::StreamConfiguration("no callbacks".to_string()).code(),
    };

    let logger = Logger::new(callbacks.logger);
    let format = FormatContext::from_raw(format_context);
    let nb_streams = format.nb_streams();

    let result = guarded(|| {
        let mut context = InitProcessContext::new(
            Parameters::new(job, callbacks.get_parameter_value),
            logger,
            format,
            StreamGraphBuilder::new(callbacks),
        );
        worker.init_process(&mut context)?;
        let claimed = context.claimed();
        if claimed.len() > nb_streams {
            return Err(WorkerError::StreamConfiguration(format!(
                "claimed {} streams out of {}",
                claimed.len(),
                nb_streams
            )));
        }
        Ok(claimed)
    });

    match result {
        Ok(claimed) => {
            if !output_descriptors.is_null() {
                for (i, handle) in claimed.iter().enumerate() {
                    *output_descriptors.add(i) = *handle;
                }
            }
            if !output_descriptors_size.is_null() {
                *output_descriptors_size = claimed.len() as c_uint;
            }
            STATUS_OK
        }
        Err(error) => {
            logger.error(&format!("init_process failed: {}", error));
            error.code()
        }
    }
}

/// # Safety
///
/// `frame` must be null or valid for the call; `message` null or writable.
#[allow(clippy::too_many_arguments)]
pub unsafe fn process_frame<W: MediaWorker>(
    worker: &W,
    job: JobHandle,
    get_parameter_value: GetParameterValueCallback,
    logger: LoggerCallback,
    job_id: u64,
    stream_index: c_uint,
    frame: *const RawFrame,
    message: *mut *mut c_char,
) -> c_int {
    let result = guarded(|| {
        let frame = Frame::from_raw(frame)
            .ok_or_else(|| WorkerError::processing("null frame"))?;
        worker.process_frame(&FrameContext {
            parameters: Parameters::new(job, get_parameter_value),
            logger: Logger::new(logger),
            job_id,
            stream_index,
            frame,
        })
    });

    match result {
        Ok(text) => {
            set_out_string(message, &text);
            STATUS_OK
        }
        Err(error) => {
            set_out_string(message, &error.to_string());
            error.code()
        }
    }
}

pub fn ending_process<W: MediaWorker>(worker: &W, logger: LoggerCallback) {
    let logger = Logger::new(logger);
    if let Err(error) = guarded(|| {
        worker.ending_process(&logger);
        Ok(())
    }) {
        logger.error(&format!("ending_process failed: {}", error));
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __export_worker_common {
    ($worker:ty) => {
        fn __workerlink_worker() -> &'static $worker {
            static WORKER: ::std::sync::OnceLock<$worker> = ::std::sync::OnceLock::new();
            WORKER.get_or_init(<$worker as ::std::default::Default>::default)
        }

        fn __workerlink_registry() -> &'static $crate::export::RegistryResult {
            static REGISTRY: ::std::sync::OnceLock<$crate::export::RegistryResult> =
                ::std::sync::OnceLock::new();
            REGISTRY.get_or_init($crate::export::build_registry::<$worker>)
        }

        #[no_mangle]
        pub unsafe extern "C" fn get_name() -> *const ::std::os::raw::c_char {
            $crate::export::descriptor_string(
                __workerlink_registry(),
                $crate::registry::DescriptorRegistry::name,
            )
        }

        #[no_mangle]
        pub unsafe extern "C" fn get_short_description() -> *const ::std::os::raw::c_char {
            $crate::export::descriptor_string(
                __workerlink_registry(),
                $crate::registry::DescriptorRegistry::short_description,
            )
        }

        #[no_mangle]
        pub unsafe extern "C" fn get_description() -> *const ::std::os::raw::c_char {
            $crate::export::descriptor_string(
                __workerlink_registry(),
                $crate::registry::DescriptorRegistry::description,
            )
        }

        #[no_mangle]
        pub unsafe extern "C" fn get_version() -> *const ::std::os::raw::c_char {
            $crate::export::descriptor_string(
                __workerlink_registry(),
                $crate::registry::DescriptorRegistry::version,
            )
        }

        #[no_mangle]
        pub unsafe extern "C" fn get_parameters_size() -> ::std::os::raw::c_uint {
            $crate::export::parameters_size(__workerlink_registry())
        }

        #[no_mangle]
        pub unsafe extern "C" fn get_parameters(
            parameters: *mut $crate::abi::RawParameterDescriptor,
        ) {
            $crate::export::get_parameters(__workerlink_registry(), parameters)
        }

        #[no_mangle]
        pub unsafe extern "C" fn init(logger: $crate::abi::LoggerCallback) {
            static INIT: ::std::sync::Once = ::std::sync::Once::new();
            INIT.call_once(|| {
                $crate::export::init(__workerlink_worker(), __workerlink_registry(), logger)
            });
        }
    };
}

/// Export a [`GenericWorker`](crate::worker::GenericWorker) as a worker library.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Copy;
/// impl Worker for Copy { /* ... */ }
/// impl GenericWorker for Copy { /* ... */ }
///
/// workerlink_abi::export_generic_worker!(Copy);
/// ```
#[macro_export]
macro_rules! export_generic_worker {
    ($worker:ty) => {
        $crate::__export_worker_common!($worker);

        #[no_mangle]
        pub unsafe extern "C" fn process(
            job: $crate::abi::JobHandle,
            channel: $crate::abi::ChannelHandle,
            get_parameter_value: $crate::abi::GetParameterValueCallback,
            progress: ::std::option::Option<$crate::abi::ProgressCallback>,
            logger: $crate::abi::LoggerCallback,
            message: *mut *mut ::std::os::raw::c_char,
            output_paths: *mut *mut *mut ::std::os::raw::c_char,
        ) -> ::std::os::raw::c_int {
            $crate::export::process(
                __workerlink_worker(),
                job,
                channel,
                get_parameter_value,
                progress,
                logger,
                message,
                output_paths,
            )
        }
    };
}

/// Export a [`MediaWorker`](crate::worker::MediaWorker) as a worker library.
#[macro_export]
macro_rules! export_media_worker {
    ($worker:ty) => {
        $crate::__export_worker_common!($worker);

        #[no_mangle]
        pub unsafe extern "C" fn init_process(
            job: $crate::abi::JobHandle,
            callbacks: *const $crate::abi::InitProcessCallbacks,
            format_context: *const $crate::abi::RawFormatContext,
            output_descriptors: *mut $crate::abi::StreamDescriptorHandle,
            output_descriptors_size: *mut ::std::os::raw::c_uint,
        ) -> ::std::os::raw::c_int {
            $crate::export::init_process(
                __workerlink_worker(),
                job,
                callbacks,
                format_context,
                output_descriptors,
                output_descriptors_size,
            )
        }

        #[no_mangle]
        pub unsafe extern "C" fn process_frame(
            job: $crate::abi::JobHandle,
            get_parameter_value: $crate::abi::GetParameterValueCallback,
            logger: $crate::abi::LoggerCallback,
            job_id: u64,
            stream_index: ::std::os::raw::c_uint,
            frame: *const $crate::abi::RawFrame,
            message: *mut *mut ::std::os::raw::c_char,
        ) -> ::std::os::raw::c_int {
            $crate::export::process_frame(
                __workerlink_worker(),
                job,
                get_parameter_value,
                logger,
                job_id,
                stream_index,
                frame,
                message,
            )
        }

        #[no_mangle]
        pub unsafe extern "C" fn ending_process(logger: $crate::abi::LoggerCallback) {
            $crate::export::ending_process(__workerlink_worker(), logger)
        }
    };
}
