//! Jobs, their parameters and the handle registries backing the callbacks

use crate::error::{HostError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tracing::{debug, warn};
use workerlink_abi::{ChannelHandle, JobHandle};

/// One job parameter as carried in a job message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameter {
    pub id: String,
    #[serde(rename = "type", default = "default_parameter_type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

fn default_parameter_type() -> String {
    "string".to_string()
}

impl JobParameter {
    /// The value as handed to a worker: strings verbatim, `null` as empty,
    /// everything else as JSON text.
    pub fn value_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// A unit of work addressed to one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: u64,
    #[serde(default)]
    pub parameters: Vec<JobParameter>,
}

impl Job {
    pub fn new(job_id: u64) -> Self {
        Self {
            job_id,
            parameters: Vec::new(),
        }
    }

    /// Parse a job message such as
    /// `{"job_id": 7, "parameters": [{"id": "source_path", "type": "string", "value": "/a"}]}`.
    pub fn from_message(message: &str) -> Result<Self> {
        let job: Job = serde_json::from_str(message)
            .map_err(|e| HostError::InvalidJob(format!("malformed job message: {}", e)))?;
        job.validate()?;
        Ok(job)
    }

    pub fn with_parameter(mut self, id: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let kind = match &value {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "integer",
            Value::Array(_) => "array_of_strings",
            _ => "string",
        };
        self.parameters.push(JobParameter {
            id: id.into(),
            kind: kind.to_string(),
            value,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for parameter in &self.parameters {
            if parameter.id.is_empty() {
                return Err(HostError::InvalidJob("parameter with empty id".to_string()));
            }
            if !seen.insert(parameter.id.as_str()) {
                return Err(HostError::InvalidJob(format!(
                    "parameter '{}' given more than once",
                    parameter.id
                )));
            }
        }
        Ok(())
    }

    pub fn parameter_value(&self, key: &str) -> Option<String> {
        self.parameters
            .iter()
            .find(|p| p.id == key)
            .map(JobParameter::value_string)
    }
}

/// One progress report received from a worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgression {
    pub job_id: u64,
    pub progression: u8,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Error,
}

/// Outcome of a generic job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: u64,
    pub status: JobStatus,
    pub message: String,
    pub output_paths: Vec<String>,
    pub progressions: Vec<JobProgression>,
}

impl JobResult {
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[derive(Debug)]
struct ProgressChannel {
    job_id: u64,
    reports: Mutex<Vec<JobProgression>>,
}

type Table<T> = RwLock<HashMap<u64, Arc<T>>>;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn jobs() -> &'static Table<Job> {
    static JOBS: OnceLock<Table<Job>> = OnceLock::new();
    JOBS.get_or_init(Default::default)
}

fn channels() -> &'static Table<ProgressChannel> {
    static CHANNELS: OnceLock<Table<ProgressChannel>> = OnceLock::new();
    CHANNELS.get_or_init(Default::default)
}

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// Registration of a job in the process-wide handle tables.
///
/// The handles stay valid until the guard is dropped.
#[derive(Debug)]
pub struct JobGuard {
    job: Arc<Job>,
    job_handle: JobHandle,
    channel_handle: ChannelHandle,
}

impl JobGuard {
    pub fn register(job: Job) -> Self {
        let job = Arc::new(job);
        let job_handle = JobHandle::from_raw(next_handle());
        let channel_handle = ChannelHandle::from_raw(next_handle());

        if let Ok(mut table) = jobs().write() {
            table.insert(job_handle.as_raw(), job.clone());
        }
        if let Ok(mut table) = channels().write() {
            table.insert(
                channel_handle.as_raw(),
                Arc::new(ProgressChannel {
                    job_id: job.job_id,
                    reports: Mutex::new(Vec::new()),
                }),
            );
        }
        debug!(job_id = job.job_id, %job_handle, %channel_handle, "Registered job");

        Self {
            job,
            job_handle,
            channel_handle,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_id(&self) -> u64 {
        self.job.job_id
    }

    pub fn job_handle(&self) -> JobHandle {
        self.job_handle
    }

    pub fn channel_handle(&self) -> ChannelHandle {
        self.channel_handle
    }

    /// Progress reports received so far, in arrival order
    pub fn progressions(&self) -> Vec<JobProgression> {
        channel(self.channel_handle)
            .and_then(|c| c.reports.lock().ok().map(|r| r.clone()))
            .unwrap_or_default()
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Ok(mut table) = jobs().write() {
            table.remove(&self.job_handle.as_raw());
        }
        if let Ok(mut table) = channels().write() {
            table.remove(&self.channel_handle.as_raw());
        }
    }
}

fn channel(handle: ChannelHandle) -> Option<Arc<ProgressChannel>> {
    channels().read().ok()?.get(&handle.as_raw()).cloned()
}

/// Resolve a parameter for a registered job
pub fn lookup_parameter(handle: JobHandle, key: &str) -> Option<String> {
    let job = jobs().read().ok()?.get(&handle.as_raw()).cloned();
    match job {
        Some(job) => job.parameter_value(key),
        None => {
            warn!("Parameter '{}' requested for unknown job {}", key, handle);
            None
        }
    }
}

/// Record a progress report. Returns false for an unknown channel.
pub fn record_progress(handle: ChannelHandle, percentage: u8) -> bool {
    let Some(channel) = channel(handle) else {
        warn!("Progress reported on unknown channel {}", handle);
        return false;
    };
    let progression = JobProgression {
        job_id: channel.job_id,
        progression: percentage.min(100),
        datetime: Utc::now(),
    };
    debug!(job_id = channel.job_id, progression = progression.progression, "Job progress");
    if let Ok(mut reports) = channel.reports.lock() {
        reports.push(progression);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message() {
        let job = Job::from_message(
            r#"{"job_id": 7, "parameters": [
                {"id": "source_path", "type": "string", "value": "/tmp/in"},
                {"id": "count", "type": "integer", "value": 3},
                {"id": "flags", "type": "array_of_strings", "value": ["a", "b"]},
                {"id": "empty", "type": "string", "value": null}
            ]}"#,
        )
        .unwrap();
        assert_eq!(7, job.job_id);
        assert_eq!(Some("/tmp/in".to_string()), job.parameter_value("source_path"));
        assert_eq!(Some("3".to_string()), job.parameter_value("count"));
        assert_eq!(Some(r#"["a","b"]"#.to_string()), job.parameter_value("flags"));
        assert_eq!(Some(String::new()), job.parameter_value("empty"));
        assert_eq!(None, job.parameter_value("missing"));
    }

    #[test]
    fn test_from_message_rejects_duplicates() {
        let result = Job::from_message(
            r#"{"job_id": 1, "parameters": [{"id": "a", "value": "x"}, {"id": "a", "value": "y"}]}"#,
        );
        assert!(matches!(result, Err(HostError::InvalidJob(_))));
        assert!(Job::from_message("not json").is_err());
    }

    #[test]
    fn test_registry_lookup_and_cleanup() {
        let guard = JobGuard::register(Job::new(11).with_parameter("name", "clip"));
        let handle = guard.job_handle();
        assert_eq!(Some("clip".to_string()), lookup_parameter(handle, "name"));
        assert_ne!(guard.job_handle().as_raw(), guard.channel_handle().as_raw());

        drop(guard);
        assert_eq!(None, lookup_parameter(handle, "name"));
    }

    #[test]
    fn test_progress_is_recorded_per_channel() {
        let first = JobGuard::register(Job::new(1));
        let second = JobGuard::register(Job::new(2));

        assert!(record_progress(first.channel_handle(), 10));
        assert!(record_progress(first.channel_handle(), 120));
        assert!(record_progress(second.channel_handle(), 50));
        assert!(!record_progress(ChannelHandle::NULL, 50));

        let reports: Vec<u8> = first.progressions().iter().map(|p| p.progression).collect();
        assert_eq!(vec![10, 100], reports);
        assert_eq!(2, second.progressions()[0].job_id);
    }

    #[test]
    fn test_job_status_serialization() {
        assert_eq!("\"completed\"", serde_json::to_string(&JobStatus::Completed).unwrap());
        assert_eq!("\"error\"", serde_json::to_string(&JobStatus::Error).unwrap());
    }
}
