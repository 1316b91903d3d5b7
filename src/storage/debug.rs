//! Raw response dumps for post-mortem inspection.
//!
//! Files are named `<category>_<key>.html`. Writes are synchronous and
//! best-effort: a failed write is logged and otherwise ignored.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct DebugSink {
    dir: Option<PathBuf>,
}

impl DebugSink {
    /// Sink writing into `dir`, created if missing. Falls back to a
    /// disabled sink when the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Debug directory unavailable, dumps disabled");
            return Self::disabled();
        }
        Self { dir: Some(dir) }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn write(&self, category: &str, key: &str, body: &str) {
        let Some(dir) = &self.dir else { return };
        let path = dir.join(format!("{category}_{key}.html"));
        match fs::write(&path, body) {
            Ok(()) => debug!(path = %path.display(), "Debug dump written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Debug dump failed"),
        }
    }

    /// Dump keyed by the current time in milliseconds.
    pub fn write_timestamped(&self, category: &str, body: &str) {
        self.write(category, &Utc::now().timestamp_millis().to_string(), body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_named_dump() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DebugSink::new(dir.path());
        sink.write("nosubid", "440", "<html/>");

        let written = fs::read_to_string(dir.path().join("nosubid_440.html")).unwrap();
        assert_eq!(written, "<html/>");
    }

    #[test]
    fn test_write_timestamped_dump() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DebugSink::new(dir.path());
        sink.write_timestamped("noappid", "<a/>");

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("noappid_"));
        assert!(names[0].ends_with(".html"));
    }

    #[test]
    fn test_disabled_sink_writes_nothing() {
        let sink = DebugSink::disabled();
        assert!(!sink.is_enabled());
        sink.write("x", "1", "body");
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DebugSink::new(dir.path());
        drop(dir);
        sink.write("gone", "1", "body");
    }
}
