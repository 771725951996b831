//! Log capture for TUI mode
//!
//! Tracing output would corrupt the alternate screen, so in TUI mode the
//! subscriber writes into a [`LogFeed`] instead. The app drains it once per
//! frame and surfaces the newest warning in the status bar.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Lines kept before the oldest are discarded.
const FEED_CAPACITY: usize = 200;

/// Severity parsed back out of a formatted log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Other,
    Warn,
    Error,
}

impl Severity {
    fn of(line: &str) -> Self {
        if line.contains(" ERROR ") || line.starts_with("ERROR") {
            Severity::Error
        } else if line.contains(" WARN ") || line.starts_with("WARN") {
            Severity::Warn
        } else {
            Severity::Other
        }
    }
}

/// Shared, bounded queue of formatted log lines.
#[derive(Clone, Default)]
pub struct LogFeed {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl LogFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, evicting the oldest at capacity. A poisoned lock is
    /// recovered since losing log lines beats panicking in the writer.
    pub fn push(&self, line: String) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= FEED_CAPACITY {
            guard.pop_front();
        }
        guard.push_back(line);
    }

    /// Take all pending lines, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.drain(..).collect()
    }

    /// Drain and return the most recent warning or error, if any arrived.
    pub fn latest_problem(&self) -> Option<(Severity, String)> {
        self.drain()
            .into_iter()
            .rev()
            .map(|line| (Severity::of(&line), line))
            .find(|(sev, _)| *sev >= Severity::Warn)
            .map(|(sev, line)| (sev, strip_level_prefix(&line).to_string()))
    }
}

/// Drop the timestamp and level so only the message shows in the status bar.
fn strip_level_prefix(line: &str) -> &str {
    for marker in [" ERROR ", " WARN "] {
        if let Some(pos) = line.find(marker) {
            return line[pos + marker.len()..].trim_start();
        }
    }
    line
}

/// Writer that splits bytes into lines and pushes them onto a feed.
pub struct FeedWriter {
    feed: LogFeed,
    pending: Vec<u8>,
}

impl Write for FeedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.feed
                .push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            self.feed
                .push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
        }
        Ok(())
    }
}

impl Drop for FeedWriter {
    fn drop(&mut self) {
        let _ = Write::flush(self);
    }
}

impl<'a> MakeWriter<'a> for LogFeed {
    type Writer = FeedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FeedWriter {
            feed: self.clone(),
            pending: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_capacity() {
        let feed = LogFeed::new();
        for i in 0..250 {
            feed.push(format!("line {}", i));
        }
        let lines = feed.drain();
        assert_eq!(lines.len(), 200);
        assert_eq!(lines[0], "line 50");
        assert!(feed.drain().is_empty());
    }

    #[test]
    fn test_writer_splits_lines_and_flushes_tail() {
        let feed = LogFeed::new();
        {
            let mut w = feed.make_writer();
            write!(w, "one\ntwo\nthr").unwrap();
            assert_eq!(feed.drain(), vec!["one", "two"]);
        }
        assert_eq!(feed.drain(), vec!["thr"]);
    }

    #[test]
    fn test_latest_problem_prefers_newest_warning() {
        let feed = LogFeed::new();
        feed.push("2024-01-01T00:00:00Z  WARN Channel disconnected: reset".into());
        feed.push("2024-01-01T00:00:01Z ERROR History fetch for bob failed".into());
        feed.push("2024-01-01T00:00:02Z  INFO Connected".into());

        let (sev, msg) = feed.latest_problem().unwrap();
        assert_eq!(sev, Severity::Error);
        assert_eq!(msg, "History fetch for bob failed");
        assert!(feed.latest_problem().is_none());
    }

    #[test]
    fn test_info_only_is_not_a_problem() {
        let feed = LogFeed::new();
        feed.push("2024-01-01T00:00:00Z  INFO all good".into());
        assert!(feed.latest_problem().is_none());
    }
}
