use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::AppConfig;
use crate::errors::AppResult;

const HISTORY_FILE_NAME: &str = "sync-history.jsonl";

/// Append-only JSONL journal of sync runs, kept next to the registry file.
///
/// Events are queued in memory and written on [`RunHistory::flush`]. When the
/// active file would grow past `max_file_bytes` it is renamed with a
/// timestamp suffix and older rotations beyond `max_file_count` are pruned.
#[derive(Clone)]
pub struct RunHistory {
    enabled: bool,
    queue: Arc<Mutex<Vec<HistoryEvent>>>,
    path: PathBuf,
    max_file_bytes: u64,
    max_file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl RunHistory {
    pub fn new<P: AsRef<Path>>(data_dir: P, config: &AppConfig) -> Self {
        Self {
            enabled: config.history_enabled,
            queue: Arc::new(Mutex::new(Vec::new())),
            path: data_dir.as_ref().join(HISTORY_FILE_NAME),
            max_file_bytes: config.history_max_bytes,
            max_file_count: config.history_max_files.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            queue: Arc::new(Mutex::new(Vec::new())),
            path: PathBuf::from(HISTORY_FILE_NAME),
            max_file_bytes: 0,
            max_file_count: 1,
        }
    }

    pub fn record(&self, name: impl Into<String>, payload: serde_json::Value) {
        if !self.enabled {
            return;
        }
        self.queue.lock().push(HistoryEvent {
            name: name.into(),
            timestamp: Utc::now(),
            payload,
        });
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            return Ok(());
        }

        let mut encoded = Vec::with_capacity(queue.len());
        let mut incoming = 0_u64;
        for event in queue.iter() {
            let line = serde_json::to_vec(event)?;
            incoming += (line.len() + 1) as u64;
            encoded.push(line);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed(incoming)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for line in &encoded {
            file.write_all(line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        queue.clear();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if current_size == 0 || current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count <= 1 {
            fs::remove_file(&self.path)?;
            return Ok(());
        }

        let rotated = self.path.with_file_name(format!(
            "{}-{}.jsonl",
            self.stem(),
            Utc::now().format("%Y%m%d%H%M%S%3f")
        ));
        fs::rename(&self.path, rotated)?;
        self.prune_rotations()
    }

    fn prune_rotations(&self) -> AppResult<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let prefix = format!("{}-", self.stem());
        let mut rotations = fs::read_dir(parent)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                (name.starts_with(&prefix) && name.ends_with(".jsonl")).then(|| entry.path())
            })
            .collect::<Vec<_>>();

        // Suffixes are timestamps, so name order is age order.
        rotations.sort();
        let allowed = self.max_file_count.saturating_sub(1);
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for path in rotations.into_iter().take(excess) {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "sync-history".into())
    }
}
