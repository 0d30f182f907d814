//! Append-only record of every broadcast message.
//!
//! The relay only needs two operations from its history: append one line
//! per broadcast and read everything back for a replay request. Callers are
//! expected to serialize appends; [`crate::broadcast::Broadcaster`] does so
//! under its own lock so the stored order matches delivery order.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

pub trait MessageLog: Send + Sync {
    /// Persists a single message as one line.
    fn append(&self, line: &str) -> io::Result<()>;

    /// Returns every stored message, oldest first.
    fn read_all(&self) -> io::Result<Vec<String>>;
}

/// Line-per-message text file, opened in append mode for every write.
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageLog for FileLog {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // One write per line keeps a concurrent reader from seeing half a message.
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        file.write_all(record.as_bytes())?;
        file.flush()
    }

    fn read_all(&self) -> io::Result<Vec<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        BufReader::new(file).lines().collect()
    }
}

/// Volatile history, handy for tests and for running without a disk.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessageLog for MemoryLog {
    fn append(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }

    fn read_all(&self) -> io::Result<Vec<String>> {
        Ok(self.lines())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_log_reads_back_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = FileLog::new(dir.path().join("messages.txt"));

        log.append("alice joined the chat!").expect("append");
        log.append("alice: hello").expect("append");
        log.append("alice left the chat!").expect("append");

        assert_eq!(
            log.read_all().expect("read"),
            vec![
                "alice joined the chat!".to_string(),
                "alice: hello".to_string(),
                "alice left the chat!".to_string(),
            ]
        );
    }

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = FileLog::new(dir.path().join("never-written.txt"));
        assert!(log.read_all().expect("read").is_empty());
    }

    #[test]
    fn file_log_keeps_existing_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("messages.txt");
        std::fs::write(&path, "bob: earlier\n").expect("seed file");

        let log = FileLog::new(&path);
        log.append("bob: later").expect("append");

        assert_eq!(
            log.read_all().expect("read"),
            vec!["bob: earlier".to_string(), "bob: later".to_string()]
        );
    }

    #[test]
    fn append_to_unwritable_path_reports_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = FileLog::new(dir.path().join("missing-dir").join("messages.txt"));
        assert!(log.append("lost").is_err());
    }
}
