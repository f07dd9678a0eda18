//! Log tailing for captured service output
//!
//! Reads the history of a capture file and follows it as it grows, across rotations
//! performed by [`crate::rotation::RotatingWriter`].

use crate::constants::{HISTORY_BLOCK_SIZE, LOG_FOLLOW_INTERVAL};
use crate::error::{Result, ServyError};
use crate::rotation::rotated_path;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Which stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogType {
    StdOut,
    StdErr,
}

impl std::str::FromStr for LogType {
    type Err = ServyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stdout" | "out" => Ok(LogType::StdOut),
            "stderr" | "err" => Ok(LogType::StdErr),
            _ => Err(ServyError::LogError(format!("invalid log type '{}'", s))),
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogType::StdOut => f.write_str("OUT"),
            LogType::StdErr => f.write_str("ERR"),
        }
    }
}

/// One observed line of output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub id: u64,
    pub text: String,
    pub log_type: LogType,
    pub timestamp: DateTime<Local>,
}

/// Tail of a file plus the position to resume following from
#[derive(Debug, Clone)]
pub struct LogHistory {
    pub lines: Vec<LogLine>,
    /// Byte offset just past the last complete line
    pub offset: u64,
    /// Creation time of the file the offset refers to
    pub created: Option<SystemTime>,
}

/// Incremental reader over one capture file.
///
/// Keeps the byte offset already consumed and the creation time of the file it belongs
/// to. A changed creation time, or a file shorter than the offset, means the writer
/// rotated: the rest of the followed file and every file rotated out after it are
/// drained before reading the new active file from its start.
#[derive(Debug)]
pub struct TailCursor {
    path: PathBuf,
    offset: u64,
    created: Option<SystemTime>,
    pending: Vec<u8>,
}

fn created_at(meta: &fs::Metadata) -> Option<SystemTime> {
    meta.created().ok()
}

/// Read everything from `offset` to the current end of `path`
fn read_from(path: &Path, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read `path` backwards in blocks until `max_lines` complete lines are covered.
/// Returns those bytes, starting on a line boundary, and the offset just past the last
/// complete line.
fn read_tail(path: &Path, max_lines: usize) -> std::io::Result<(Vec<u8>, u64)> {
    let mut file = File::open(path)?;
    let mut start = file.metadata()?.len();
    let mut buf = Vec::new();
    let mut newlines = 0usize;

    while start > 0 && newlines <= max_lines {
        let size = HISTORY_BLOCK_SIZE.min(start);
        start -= size;
        let mut block = vec![0u8; size as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut block)?;
        newlines += block.iter().filter(|&&b| b == b'\n').count();
        block.extend_from_slice(&buf);
        buf = block;
    }

    // leave an unterminated last line for the follower
    let complete = buf.iter().rposition(|&b| b == b'\n').map_or(0, |pos| pos + 1);
    buf.truncate(complete);
    if start > 0 {
        // the first line was cut by the block boundary
        let first = buf.iter().position(|&b| b == b'\n').map_or(buf.len(), |pos| pos + 1);
        buf.drain(..first);
    }
    Ok((buf, start + complete as u64))
}

/// Move complete lines out of `pending`, leaving any partial tail in place
fn take_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let mut raw: Vec<u8> = pending.drain(..=pos).collect();
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        lines.push(String::from_utf8_lossy(&raw).into_owned());
    }
    lines
}

impl TailCursor {
    pub fn new(path: impl Into<PathBuf>, offset: u64, created: Option<SystemTime>) -> Self {
        TailCursor {
            path: path.into(),
            offset,
            created,
            pending: Vec::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Return the complete lines that appeared since the last poll.
    /// A missing or unreadable file yields nothing.
    pub fn poll(&mut self) -> Vec<String> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(_) => return Vec::new(),
        };
        let created = created_at(&meta);

        let mut lines = Vec::new();
        let recreated = match (self.created, created) {
            (Some(old), Some(new)) => old != new,
            _ => false,
        };
        if recreated || meta.len() < self.offset {
            lines.extend(self.drain_rotated());
            self.offset = 0;
            self.created = created;
        } else if self.created.is_none() {
            self.created = created;
        }

        match read_from(&self.path, self.offset) {
            Ok(buf) => {
                self.offset += buf.len() as u64;
                self.pending.extend_from_slice(&buf);
                lines.extend(take_lines(&mut self.pending));
            }
            Err(e) => {
                tracing::trace!("{} not readable: {}", self.path.display(), e);
            }
        }
        lines
    }

    /// Finish the file we were following, then every file rotated out after it,
    /// oldest first
    fn drain_rotated(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        match self.find_followed() {
            Some(n) => {
                lines.extend(self.read_complete(n, self.offset));
                for newer in (1..n).rev() {
                    lines.extend(self.read_complete(newer, 0));
                }
            }
            None => {
                tracing::debug!(
                    "Rotated predecessor of {} not found, continuing from new file",
                    self.path.display()
                );
                lines.extend(self.flush_pending());
            }
        }
        lines
    }

    /// Index of the rotated file that used to be the active one. Matched by creation
    /// time; without creation times only `<path>.1` is considered.
    fn find_followed(&self) -> Option<u32> {
        let mut n = 1;
        loop {
            let meta = fs::metadata(rotated_path(&self.path, n)).ok()?;
            match (self.created, created_at(&meta)) {
                (Some(old), Some(prev)) if old == prev => return Some(n),
                (Some(_), Some(_)) => n += 1,
                _ => return (n == 1 && meta.len() >= self.offset).then_some(n),
            }
        }
    }

    /// Read a rotated file from `offset` to its end. The file is complete, so its
    /// unterminated tail is a line of its own.
    fn read_complete(&mut self, n: u32, offset: u64) -> Vec<String> {
        let path = rotated_path(&self.path, n);
        let mut lines = Vec::new();
        match read_from(&path, offset) {
            Ok(buf) => {
                self.pending.extend_from_slice(&buf);
                lines.extend(take_lines(&mut self.pending));
            }
            Err(e) => {
                tracing::debug!("Could not drain {}: {}", path.display(), e);
            }
        }
        lines.extend(self.flush_pending());
        lines
    }

    fn flush_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&tail);
        Some(text.trim_end_matches('\r').to_string())
    }
}

/// Builds [`LogLine`]s with ids that increase across history and live lines
pub struct LogTailer {
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl Default for LogTailer {
    fn default() -> Self {
        Self::new(LOG_FOLLOW_INTERVAL)
    }
}

impl LogTailer {
    pub fn new(poll_interval: Duration) -> Self {
        LogTailer {
            poll_interval,
            next_id: AtomicU64::new(1),
        }
    }

    fn line(&self, text: String, log_type: LogType) -> LogLine {
        LogLine {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            text,
            log_type,
            timestamp: Local::now(),
        }
    }

    /// Last `max_lines` complete lines of `path`, with the offset and creation time to
    /// resume from. A missing file is an empty history at offset 0.
    pub fn get_history(&self, path: &Path, log_type: LogType, max_lines: usize) -> Result<LogHistory> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LogHistory {
                    lines: Vec::new(),
                    offset: 0,
                    created: None,
                });
            }
            Err(e) => return Err(ServyError::Io(e)),
        };

        let (mut buf, offset) = read_tail(path, max_lines)?;
        let texts = take_lines(&mut buf);
        let skip = texts.len().saturating_sub(max_lines);
        let lines = texts
            .into_iter()
            .skip(skip)
            .map(|text| self.line(text, log_type))
            .collect();

        Ok(LogHistory {
            lines,
            offset,
            created: created_at(&meta),
        })
    }

    /// Follow `path` from `offset` until `cancel` fires or the receiver goes away
    pub async fn run_from_position(
        &self,
        path: &Path,
        log_type: LogType,
        offset: u64,
        created: Option<SystemTime>,
        cancel: CancellationToken,
        tx: mpsc::Sender<LogLine>,
    ) -> Result<()> {
        let mut cursor = TailCursor::new(path, offset, created);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            for text in cursor.poll() {
                if tx.send(self.line(text, log_type)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Print the tail of a capture file and optionally keep following it
pub async fn show_logs(
    path: &Path,
    log_type: LogType,
    lines: usize,
    follow: bool,
    poll_interval: Duration,
) -> Result<()> {
    let tailer = LogTailer::new(poll_interval);
    let history = tailer.get_history(path, log_type, lines)?;

    println!("=== {} ({}) ===", path.display(), log_type);
    if history.lines.is_empty() && history.offset == 0 {
        println!("Log file not found or empty");
    }
    for line in &history.lines {
        println!("{}", line.text);
    }

    if !follow {
        return Ok(());
    }

    println!("\n=== Following {} (Ctrl+C to stop) ===", path.display());
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<LogLine>(256);

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c.cancel();
    });

    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("[{}] {}", line.timestamp.format("%H:%M:%S"), line.text);
        }
    });

    tailer
        .run_from_position(path, log_type, history.offset, history.created, cancel, tx)
        .await?;
    let _ = printer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::{RotatingWriter, RotationPolicy};
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn history_returns_last_lines_and_resume_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        append(&path, "one\r\ntwo\nthree\npart");

        let tailer = LogTailer::default();
        let history = tailer.get_history(&path, LogType::StdOut, 2).unwrap();
        let texts: Vec<_> = history.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
        assert_eq!(history.offset, "one\r\ntwo\nthree\n".len() as u64);
        assert!(history.lines[0].id < history.lines[1].id);

        let missing = tailer.get_history(&dir.path().join("nope.log"), LogType::StdErr, 10).unwrap();
        assert!(missing.lines.is_empty());
        assert_eq!(missing.offset, 0);
    }

    #[test]
    fn poll_emits_appended_lines_and_holds_partial_ones() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        append(&path, "old\n");

        let mut cursor = TailCursor::new(&path, 4, None);
        assert!(cursor.poll().is_empty());

        append(&path, "new 1\nnew ");
        assert_eq!(cursor.poll(), vec!["new 1"]);
        append(&path, "2\n");
        assert_eq!(cursor.poll(), vec!["new 2"]);
        assert_eq!(cursor.offset(), fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn missing_file_is_no_data() {
        let dir = TempDir::new().unwrap();
        let mut cursor = TailCursor::new(dir.path().join("gone.log"), 0, None);
        assert!(cursor.poll().is_empty());
    }

    #[test]
    fn rotation_neither_drops_nor_repeats_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let writer = RotatingWriter::open(&path, RotationPolicy { max_bytes: 64, max_rotations: 0 }).unwrap();

        let history = LogTailer::default().get_history(&path, LogType::StdOut, 10).unwrap();
        let mut cursor = TailCursor::new(&path, history.offset, history.created);
        let mut seen = Vec::new();

        for i in 0..5 {
            writer.write(format!("line {:04}\n", i).as_bytes()).unwrap();
        }
        writer.flush().unwrap();
        seen.extend(cursor.poll());

        std::thread::sleep(Duration::from_millis(20));
        // 50 bytes so far; the seventh line forces a rotation
        for i in 5..7 {
            writer.write(format!("line {:04}\n", i).as_bytes()).unwrap();
        }
        writer.flush().unwrap();
        seen.extend(cursor.poll());

        writer.write(b"line 0007\n").unwrap();
        writer.flush().unwrap();
        seen.extend(cursor.poll());

        let expected: Vec<String> = (0..8).map(|i| format!("line {:04}", i)).collect();
        assert!(rotated_path(&path, 1).exists());
        assert_eq!(seen, expected);
    }

    #[test]
    fn several_rotations_between_polls_keep_every_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let writer = RotatingWriter::open(&path, RotationPolicy { max_bytes: 20, max_rotations: 0 }).unwrap();

        let history = LogTailer::default().get_history(&path, LogType::StdOut, 10).unwrap();
        let mut cursor = TailCursor::new(&path, history.offset, history.created);

        writer.write(b"line 0000\n").unwrap();
        let mut seen = cursor.poll();

        std::thread::sleep(Duration::from_millis(20));
        // two lines per file: lines 2 and 4 each start a new one
        for i in 1..6 {
            writer.write(format!("line {:04}\n", i).as_bytes()).unwrap();
        }
        writer.flush().unwrap();
        seen.extend(cursor.poll());

        let expected: Vec<String> = (0..6).map(|i| format!("line {:04}", i)).collect();
        assert!(rotated_path(&path, 2).exists());
        assert_eq!(seen, expected);
    }

    #[test]
    fn history_of_a_long_file_reads_only_the_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        let mut content = String::new();
        for i in 0..5000 {
            content.push_str(&format!("entry number {:05}\n", i));
        }
        content.push_str("unfinished");
        append(&path, &content);

        let history = LogTailer::default().get_history(&path, LogType::StdOut, 3).unwrap();
        let texts: Vec<_> = history.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["entry number 04997", "entry number 04998", "entry number 04999"]);
        assert_eq!(history.offset, (content.len() - "unfinished".len()) as u64);

        let everything = LogTailer::default().get_history(&path, LogType::StdOut, 10_000).unwrap();
        assert_eq!(everything.lines.len(), 5000);
        assert_eq!(everything.lines[0].text, "entry number 00000");
    }

    #[tokio::test]
    async fn show_logs_prints_history_without_following() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        append(&path, "ready\n");

        show_logs(&path, LogType::StdOut, 10, false, Duration::from_millis(20)).await.unwrap();
        show_logs(&dir.path().join("none.log"), LogType::StdErr, 10, false, Duration::from_millis(20))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn run_from_position_streams_until_cancelled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("err.log");
        append(&path, "before\n");

        let tailer = std::sync::Arc::new(LogTailer::new(Duration::from_millis(20)));
        let history = tailer.get_history(&path, LogType::StdErr, 10).unwrap();
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let task = {
            let tailer = tailer.clone();
            let path = path.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tailer
                    .run_from_position(&path, LogType::StdErr, history.offset, history.created, cancel, tx)
                    .await
            })
        };

        append(&path, "after\n");
        let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.text, "after");
        assert_eq!(line.log_type, LogType::StdErr);
        assert!(line.id > history.lines[0].id);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
