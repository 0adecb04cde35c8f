//! A worker whose manifest cannot be published must still load without taking
//! the host down.

use std::os::raw::c_char;
use std::sync::Mutex;
use workerlink_abi::marshal::borrow_c_str;
use workerlink_abi::{
    GenericWorker, JobContext, ParameterDescriptor, ParameterKind, ProcessOutput,
    RawParameterDescriptor, Worker, WorkerError, WorkerManifest,
};

#[derive(Default)]
pub struct DuplicateParameters;

impl Worker for DuplicateParameters {
    fn manifest() -> WorkerManifest {
        WorkerManifest::new("duplicate", "1.0.0")
            .parameter(ParameterDescriptor::required("a", "First", ParameterKind::String))
            .parameter(ParameterDescriptor::required("a", "Again", ParameterKind::String))
    }
}

impl GenericWorker for DuplicateParameters {
    fn process(&self, _job: &JobContext) -> Result<ProcessOutput, WorkerError> {
        Ok(ProcessOutput::new("unreachable"))
    }
}

workerlink_abi::export_generic_worker!(DuplicateParameters);

static LOGGED: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

extern "C" fn logger(level: *const c_char, message: *const c_char) {
    let (level, message) = unsafe { (borrow_c_str(level), borrow_c_str(message)) };
    LOGGED.lock().unwrap().push((
        level.unwrap_or_default().into_owned(),
        message.unwrap_or_default().into_owned(),
    ));
}

#[test]
fn test_rejected_manifest_exports_nothing() {
    unsafe {
        assert!(get_name().is_null());
        assert!(get_short_description().is_null());
        assert!(get_description().is_null());
        assert!(get_version().is_null());
        assert_eq!(0, get_parameters_size());

        let mut untouched = [RawParameterDescriptor::empty()];
        get_parameters(untouched.as_mut_ptr());
        assert!(untouched[0].identifier.is_null());
    }
}

#[test]
fn test_init_logs_rejection() {
    unsafe { init(logger) };
    let logged = LOGGED.lock().unwrap();
    assert_eq!(1, logged.len());
    assert_eq!("error", logged[0].0);
    assert!(logged[0].1.contains("declared more than once"));
}
