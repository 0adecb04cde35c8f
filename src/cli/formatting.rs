//! JSON shapes printed by the CLI

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use workerlink_host::{LoadStats, WorkerDescription};

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

/// Description plus the JSON schema of its parameters
pub fn describe_output(description: &WorkerDescription) -> Value {
    json!({
        "worker": description,
        "parameters_schema": description.parameters_schema(),
    })
}

pub fn scan_output(dir: &Path, stats: &LoadStats, workers: &[WorkerDescription]) -> Value {
    let workers: Vec<Value> = workers
        .iter()
        .map(|w| {
            json!({
                "name": w.name,
                "version": w.version,
                "kind": w.kind,
                "short_description": w.short_description,
            })
        })
        .collect();

    json!({
        "directory": dir.display().to_string(),
        "total": stats.total,
        "loaded": stats.loaded,
        "failed": stats.failed,
        "workers": workers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_output_counts() {
        let stats = LoadStats {
            total: 3,
            loaded: 1,
            failed: 2,
        };
        let value = scan_output(Path::new("/opt/workers"), &stats, &[]);
        assert_eq!(value["directory"], "/opt/workers");
        assert_eq!(value["failed"], 2);
        assert_eq!(value["workers"], json!([]));
    }
}
