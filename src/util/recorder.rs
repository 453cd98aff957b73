// External imports
use chrono::Local;
use serde_json::{json, Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

// Internal imports
use crate::error::Result;

/// Experiment-tracking hook. The training loops talk to a recorder
/// unconditionally; callers that do not track anything inject
/// [`NullRecorder`].
pub trait Recorder {
    /// Records named scalar values for one training step. Failures are
    /// swallowed by implementations; metric logging must never abort a
    /// training run.
    fn log_metrics(&self, step: usize, values: &[(&str, f64)]);

    /// Registers a produced file (checkpoints) under a named artifact
    /// subdirectory.
    fn log_artifact(&self, local_path: &Path, artifact_path: &str) -> Result<()>;
}

/// Discards everything.
#[derive(Debug, Default, Clone)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn log_metrics(&self, _step: usize, _values: &[(&str, f64)]) {}

    fn log_artifact(&self, _local_path: &Path, _artifact_path: &str) -> Result<()> {
        Ok(())
    }
}

/// Appends metrics to a JSON-lines file and copies artifacts under the
/// recorder's root directory.
#[derive(Debug, Clone)]
pub struct FileRecorder {
    root: PathBuf,
}

impl FileRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metrics_path(&self) -> PathBuf {
        self.root.join("metrics.jsonl")
    }
}

impl Recorder for FileRecorder {
    fn log_metrics(&self, step: usize, values: &[(&str, f64)]) {
        let mut record = Map::new();
        record.insert("step".into(), json!(step));
        record.insert(
            "time".into(),
            json!(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        for (name, value) in values {
            record.insert((*name).to_string(), json!(value));
        }
        let line = Value::Object(record).to_string();

        let appended = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.metrics_path())
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = appended {
            log::warn!("failed to append metrics: {}", e);
        }
    }

    fn log_artifact(&self, local_path: &Path, artifact_path: &str) -> Result<()> {
        let target_dir = self.root.join(artifact_path);
        fs::create_dir_all(&target_dir)?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "artifact".into());
        fs::copy(local_path, target_dir.join(file_name))?;
        Ok(())
    }
}
