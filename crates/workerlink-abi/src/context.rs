//! Safe wrappers over host-supplied callbacks

use crate::abi::{
    ChannelHandle, FilterHandle, GetParameterValueCallback, InitProcessCallbacks, JobHandle,
    LoggerCallback, ProgressCallback, StreamDescriptorHandle, StreamKind,
};
use crate::error::WorkerError;
use crate::marshal::{take_owned_c_string, to_c_string, to_c_string_lossy};
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_uint;
use std::ptr;
use std::str::FromStr;
use std::sync::atomic::{AtomicI16, Ordering};

/// Severity accepted by the host logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub const fn as_c_str(self) -> &'static CStr {
        match self {
            LogLevel::Trace => c"trace",
            LogLevel::Debug => c"debug",
            LogLevel::Info => c"info",
            LogLevel::Warn => c"warn",
            LogLevel::Error => c"error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host logger
#[derive(Clone, Copy)]
pub struct Logger {
    callback: LoggerCallback,
}

impl Logger {
    pub fn new(callback: LoggerCallback) -> Self {
        Self { callback }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let message = to_c_string_lossy(message);
        (self.callback)(level.as_c_str().as_ptr(), message.as_ptr());
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Logger")
    }
}

/// Job parameters resolved through the host getter
#[derive(Clone, Copy)]
pub struct Parameters {
    job: JobHandle,
    getter: GetParameterValueCallback,
}

impl Parameters {
    pub fn new(job: JobHandle, getter: GetParameterValueCallback) -> Self {
        Self { job, getter }
    }

    pub fn job(&self) -> JobHandle {
        self.job
    }

    /// Value of `key`, or `None` when the job does not carry it.
    pub fn get(&self, key: &str) -> Option<String> {
        let key = to_c_string(key).ok()?;
        let value = (self.getter)(self.job, key.as_ptr());
        // SAFETY: the getter hands over a C-allocated string or null
        unsafe { take_owned_c_string(value) }
    }

    pub fn require(&self, key: &str) -> Result<String, WorkerError> {
        self.get(key)
            .ok_or_else(|| WorkerError::MissingParameter(key.to_string()))
    }

    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, WorkerError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e: T::Err| WorkerError::invalid_parameter(key, e.to_string())),
        }
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters").field("job", &self.job).finish()
    }
}

/// Progress channel of a job; a no-op when the host did not supply a callback.
///
/// Reports reach the host strictly increasing: anything not above the last
/// forwarded value is dropped.
pub struct Progress {
    channel: ChannelHandle,
    callback: Option<ProgressCallback>,
    // -1 until the first report
    last: AtomicI16,
}

impl Progress {
    pub fn new(channel: ChannelHandle, callback: Option<ProgressCallback>) -> Self {
        Self {
            channel,
            callback,
            last: AtomicI16::new(-1),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.callback.is_some()
    }

    /// Last value forwarded to the host
    pub fn last_reported(&self) -> Option<u8> {
        u8::try_from(self.last.load(Ordering::SeqCst)).ok()
    }

    /// Forward `percentage` (clamped to 100). Returns whether it was sent.
    pub fn report(&self, percentage: u8) -> bool {
        let Some(callback) = self.callback else {
            return false;
        };
        let percentage = percentage.min(100);
        let previous = self.last.fetch_max(i16::from(percentage), Ordering::SeqCst);
        if i16::from(percentage) <= previous {
            return false;
        }
        callback(self.channel, percentage);
        true
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("channel", &self.channel)
            .field("connected", &self.is_connected())
            .field("last", &self.last_reported())
            .finish()
    }
}

/// A filter to create and attach in one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub name: String,
    pub label: Option<String>,
    pub parameters: Vec<(String, String)>,
}

impl FilterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            parameters: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }
}

/// Stream/filter graph builder, valid only inside `init_process`
pub struct StreamGraphBuilder<'a> {
    callbacks: &'a InitProcessCallbacks,
}

impl<'a> StreamGraphBuilder<'a> {
    pub fn new(callbacks: &'a InitProcessCallbacks) -> Self {
        Self { callbacks }
    }

    pub fn new_stream_descriptor(
        &self,
        index: c_uint,
        kind: StreamKind,
    ) -> Result<StreamDescriptorHandle, WorkerError> {
        let handle = (self.callbacks.new_stream_descriptor)(index, kind.as_raw());
        if handle.is_null() {
            return Err(WorkerError::StreamConfiguration(format!(
                "host refused a {} descriptor for stream {}",
                kind, index
            )));
        }
        Ok(handle)
    }

    pub fn new_filter(&self, name: &str, label: Option<&str>) -> Result<FilterHandle, WorkerError> {
        let name_c = c_arg(name)?;
        let label_c = label.map(c_arg).transpose()?;
        let handle = (self.callbacks.new_filter)(
            name_c.as_ptr(),
            label_c.as_ref().map_or(ptr::null(), |l| l.as_ptr()),
        );
        if handle.is_null() {
            return Err(WorkerError::StreamConfiguration(format!(
                "host refused filter '{}'",
                name
            )));
        }
        Ok(handle)
    }

    pub fn add_filter_parameter(
        &self,
        filter: FilterHandle,
        key: &str,
        value: &str,
    ) -> Result<(), WorkerError> {
        let key = c_arg(key)?;
        let value = c_arg(value)?;
        (self.callbacks.add_filter_parameter)(filter, key.as_ptr(), value.as_ptr());
        Ok(())
    }

    pub fn add_descriptor_filter(&self, descriptor: StreamDescriptorHandle, filter: FilterHandle) {
        (self.callbacks.add_descriptor_filter)(descriptor, filter);
    }

    /// Create `spec`, add its parameters in order, then attach it to `descriptor`.
    pub fn attach_filter(
        &self,
        descriptor: StreamDescriptorHandle,
        spec: &FilterSpec,
    ) -> Result<FilterHandle, WorkerError> {
        let filter = self.new_filter(&spec.name, spec.label.as_deref())?;
        for (key, value) in &spec.parameters {
            self.add_filter_parameter(filter, key, value)?;
        }
        self.add_descriptor_filter(descriptor, filter);
        Ok(filter)
    }
}

fn c_arg(value: &str) -> Result<CString, WorkerError> {
    to_c_string(value).map_err(|e| WorkerError::StreamConfiguration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{borrow_c_str, into_owned_c_string};
    use std::os::raw::c_char;
    use std::sync::atomic::AtomicU8;

    extern "C" fn getter(job: JobHandle, key: *const c_char) -> *mut c_char {
        let key = unsafe { borrow_c_str(key) }.unwrap_or_default();
        match (job.as_raw(), &*key) {
            (1, "limit") => into_owned_c_string("42"),
            (1, "name") => into_owned_c_string("clip"),
            (1, "bad") => into_owned_c_string("forty-two"),
            _ => ptr::null_mut(),
        }
    }

    static LAST_PROGRESS: AtomicU8 = AtomicU8::new(0);

    extern "C" fn progress(_channel: ChannelHandle, percentage: u8) {
        LAST_PROGRESS.store(percentage, Ordering::SeqCst);
    }

    #[test]
    fn test_parameters() {
        let params = Parameters::new(JobHandle::from_raw(1), getter);
        assert_eq!(Some("clip".to_string()), params.get("name"));
        assert_eq!(None, params.get("missing"));
        assert_eq!(Some(42u32), params.get_parsed("limit").unwrap());
        assert!(params.get_parsed::<u32>("bad").is_err());
        assert_eq!(
            WorkerError::MissingParameter("missing".to_string()),
            params.require("missing").unwrap_err()
        );
    }

    #[test]
    fn test_parameters_are_partitioned_by_job() {
        let params = Parameters::new(JobHandle::from_raw(2), getter);
        assert_eq!(None, params.get("name"));
    }

    #[test]
    fn test_progress_is_clamped_and_increasing() {
        let progress = Progress::new(ChannelHandle::from_raw(1), Some(progress));
        assert_eq!(None, progress.last_reported());
        assert!(progress.report(0));
        assert!(progress.report(40));
        assert!(!progress.report(40));
        assert!(!progress.report(10));
        assert_eq!(40, LAST_PROGRESS.load(Ordering::SeqCst));

        assert!(progress.report(250));
        assert_eq!(100, LAST_PROGRESS.load(Ordering::SeqCst));
        assert!(!progress.report(100));
        assert_eq!(Some(100), progress.last_reported());

        let disconnected = Progress::new(ChannelHandle::NULL, None);
        assert!(!disconnected.is_connected());
        assert!(!disconnected.report(10));
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(Ok(LogLevel::Warn), "warn".parse());
        assert!("fatal".parse::<LogLevel>().is_err());
        assert_eq!(c"error", LogLevel::Error.as_c_str());
    }

    #[test]
    fn test_filter_spec_builder() {
        let spec = FilterSpec::new("aformat")
            .label("aformat_filter")
            .parameter("sample_rates", "16000")
            .parameter("sample_fmts", "s32");
        assert_eq!(Some("aformat_filter".to_string()), spec.label);
        assert_eq!(("sample_fmts".to_string(), "s32".to_string()), spec.parameters[1]);
    }
}
