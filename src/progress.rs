//! Indexing progress events, their sinks, and logging helpers that keep
//! progress bars pinned.

use crate::error::Result;
use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

pub fn add_progress_bar(len: u64) -> ProgressBar {
    multi_progress().add(ProgressBar::new(len))
}

/// One progress report from an indexing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion in [0, 100]
    pub percent: f64,
    pub message: String,
    pub total_tables: usize,
    pub processed_tables: usize,
}

impl ProgressEvent {
    pub fn new(
        percent: f64,
        message: impl Into<String>,
        total_tables: usize,
        processed_tables: usize,
    ) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0),
            message: message.into(),
            total_tables,
            processed_tables,
        }
    }
}

/// Receiver of progress events
///
/// Sinks must not fail the pass: reporting problems are theirs to log.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Forwards every event to several sinks in order
#[derive(Default)]
pub struct Fanout<'a> {
    sinks: Vec<&'a dyn ProgressSink>,
}

impl<'a> Fanout<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for Fanout<'_> {
    fn report(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.report(event);
        }
    }
}

/// Terminal progress bar on the shared multi-progress display
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new(message: &str) -> Self {
        let bar = add_progress_bar(100);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}% {msg}",
        ) {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

impl ProgressSink for TerminalProgress {
    fn report(&self, event: &ProgressEvent) {
        self.bar.set_position(event.percent.floor() as u64);
        self.bar.set_message(event.message.clone());
    }
}

/// Latest progress event as persisted for pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(flatten)]
    pub event: ProgressEvent,
    pub updated_at: String,
}

/// Writes each event to a JSON file, replacing the previous snapshot
///
/// The file is written beside the index so that other processes can poll it
/// while the pass still holds its write transaction.
pub struct ProgressFile {
    path: PathBuf,
    // serializes writers sharing the temp file
    lock: Mutex<()>,
}

impl ProgressFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, event: &ProgressEvent) -> Result<()> {
        let snapshot = ProgressSnapshot {
            event: event.clone(),
            updated_at: Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Read the last snapshot, `None` when no pass has reported yet
    pub fn read(path: &Path) -> Result<Option<ProgressSnapshot>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

impl ProgressSink for ProgressFile {
    fn report(&self, event: &ProgressEvent) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match self.write(event) {
            Ok(()) => debug!(percent = event.percent, "Progress snapshot written"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to write progress snapshot"),
        }
    }
}

#[derive(Default, Clone)]
pub struct LogWriterFactory;

pub struct LogWriter {
    buffer: String,
}

impl LogWriter {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn println(line: &str) {
        let _ = multi_progress().println(line.to_string());
    }

    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let line = self.buffer.trim_end_matches('\n').trim_end_matches('\r');
        Self::println(line);
        self.buffer.clear();
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));

        while let Some(idx) = self.buffer.find('\n') {
            Self::println(self.buffer[..idx].trim_end_matches('\r'));
            self.buffer.drain(..idx + 1);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer();
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counter(Mutex<usize>);

    impl ProgressSink for Counter {
        fn report(&self, _event: &ProgressEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_event_percent_clamped() {
        assert_eq!(ProgressEvent::new(140.0, "x", 0, 0).percent, 100.0);
        assert_eq!(ProgressEvent::new(-3.0, "x", 0, 0).percent, 0.0);
    }

    #[test]
    fn test_progress_file_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("progress_default.json");
        assert!(ProgressFile::read(&path).unwrap().is_none());

        let sink = ProgressFile::new(&path);
        sink.report(&ProgressEvent::new(10.0, "Found 4 tables", 4, 0));
        sink.report(&ProgressEvent::new(35.0, "Processing table dbo.T", 4, 2));

        let snapshot = ProgressFile::read(&path).unwrap().unwrap();
        assert_eq!(snapshot.event.percent, 35.0);
        assert_eq!(snapshot.event.processed_tables, 2);
        assert!(!tmp.path().join("progress_default.json.tmp").exists());
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Counter::default();
        let b = Counter::default();
        let fanout = Fanout::new().with(&a).with(&b).with(&NoProgress);
        fanout.report(&ProgressEvent::new(5.0, "Connecting to database...", 0, 0));
        assert_eq!(*a.0.lock().unwrap(), 1);
        assert_eq!(*b.0.lock().unwrap(), 1);
    }
}
