// crates/core/src/reader.rs
//! Incremental reader for append-only session log files.
//!
//! A [`LogReader`] tracks the byte offset of the last complete line it has
//! consumed, so successive calls to [`LogReader::read_new`] return only the
//! messages appended since the previous call. A trailing line with no `\n`
//! (the producer is mid-append) is never emitted; it is picked up on the next
//! read once the line is complete. Truncation resets the offset to 0.
//!
//! Malformed lines are skipped and logged; one bad line never fails the rest
//! of the file.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ParseError;
use crate::types::{LogRecord, Message};

/// Derive the project id from a session log path.
///
/// Logs live at `{root}/{project}/{session}.jsonl`, so the project id is the
/// name of the file's parent directory.
pub fn project_id_from_path(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Tracks a byte offset into one session log for incremental reads.
pub struct LogReader {
    path: PathBuf,
    project_id: String,
    /// Byte offset of the end of the last complete line consumed.
    offset: u64,
    /// Lines consumed so far, for line numbers in skip warnings.
    lines_seen: usize,
}

impl LogReader {
    /// Create a reader positioned at the start of the file. The first
    /// `read_new` call returns the file's full message history.
    pub fn new(path: PathBuf) -> Self {
        let project_id = project_id_from_path(&path);
        Self {
            path,
            project_id,
            offset: 0,
            lines_seen: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read all complete lines appended since the last call and parse them
    /// into messages.
    ///
    /// Blocking file I/O; callers on an async runtime wrap this in
    /// `spawn_blocking`.
    pub fn read_new(&mut self) -> Result<Vec<Message>, ParseError> {
        let mut file =
            std::fs::File::open(&self.path).map_err(|e| ParseError::io(&self.path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| ParseError::io(&self.path, e))?
            .len();

        // Truncation: the file is now shorter than our position. Reset and
        // re-read from the start; downstream grouping dedups by uuid.
        if file_len < self.offset {
            warn!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = file_len,
                "Session log truncated; re-reading from start"
            );
            self.offset = 0;
            self.lines_seen = 0;
        }

        if file_len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| ParseError::io(&self.path, e))?;
        let mut buf = Vec::with_capacity((file_len - self.offset) as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| ParseError::io(&self.path, e))?;

        Ok(self.parse_complete_lines(&buf))
    }

    /// Parse the complete lines of `bytes`, advancing the offset past them.
    fn parse_complete_lines(&mut self, bytes: &[u8]) -> Vec<Message> {
        // Everything up to and including the last newline is complete; the
        // remainder is a partial append and stays unconsumed.
        let complete = match memchr::memrchr(b'\n', bytes) {
            Some(pos) => &bytes[..=pos],
            None => return Vec::new(),
        };
        self.offset += complete.len() as u64;

        let mut messages = Vec::new();
        for raw in complete.split(|&b| b == b'\n') {
            if raw.is_empty() {
                continue;
            }
            self.lines_seen += 1;

            let line = String::from_utf8_lossy(raw);
            match serde_json::from_str::<LogRecord>(&line) {
                Ok(record) => messages.push(Message::from_record(record, &self.project_id)),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = self.lines_seen,
                        error = %e,
                        "Skipping malformed log line"
                    );
                }
            }
        }
        messages
    }
}

/// Parse a whole session log in one pass.
///
/// Equivalent to a fresh [`LogReader`] read; re-reading the same unchanged
/// file yields an identical message sequence.
pub fn read_messages(path: &Path) -> Result<Vec<Message>, ParseError> {
    LogReader::new(path.to_path_buf()).read_new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use std::io::Write;

    fn record_line(uuid: &str, role: &str, content: &str, ts: &str) -> String {
        format!(
            r#"{{"uuid":"{uuid}","type":"{role}","content":"{content}","timestamp":"{ts}","sessionId":"s1"}}"#
        )
    }

    /// Create `{root}/{project}/session.jsonl` with the given lines.
    fn write_log(dir: &Path, lines: &[String]) -> PathBuf {
        let project_dir = dir.join("demo-project");
        std::fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join("s1.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn test_reads_messages_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_log(
            tmp.path(),
            &[
                record_line("u1", "user", "hello", "2024-01-01T00:00:00Z"),
                record_line("a1", "assistant", "hi", "2024-01-01T00:00:01Z"),
            ],
        );

        let mut reader = LogReader::new(path);
        let messages = reader.read_new().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].uuid, "u1");
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].uuid, "a1");
        assert_eq!(messages[0].project_id, "demo-project");
    }

    #[test]
    fn test_rereading_unchanged_file_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_log(
            tmp.path(),
            &[
                record_line("u1", "user", "hello", "2024-01-01T00:00:00Z"),
                record_line("a1", "assistant", "hi", "2024-01-01T00:00:01Z"),
            ],
        );

        let first = read_messages(&path).unwrap();
        let second = read_messages(&path).unwrap();
        assert_eq!(first, second);

        // An already-caught-up reader returns nothing.
        let mut reader = LogReader::new(path);
        reader.read_new().unwrap();
        assert!(reader.read_new().unwrap().is_empty());
    }

    #[test]
    fn test_incremental_read_returns_only_appended_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_log(
            tmp.path(),
            &[record_line("u1", "user", "hello", "2024-01-01T00:00:00Z")],
        );

        let mut reader = LogReader::new(path.clone());
        assert_eq!(reader.read_new().unwrap().len(), 1);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(
            f,
            "{}",
            record_line("a1", "assistant", "hi", "2024-01-01T00:00:01Z")
        )
        .unwrap();

        let messages = reader.read_new().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].uuid, "a1");
    }

    #[test]
    fn test_partial_final_line_not_emitted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_log(
            tmp.path(),
            &[record_line("u1", "user", "hello", "2024-01-01T00:00:00Z")],
        );
        // A line the producer has not finished writing.
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, r#"{{"uuid":"a1","type":"assist"#).unwrap();

        let mut reader = LogReader::new(path.clone());
        let messages = reader.read_new().unwrap();
        assert_eq!(messages.len(), 1, "partial line must not be emitted");
        let offset_after_complete = reader.offset();

        // Completing the line makes it visible on the next read.
        writeln!(
            f,
            r#"ant","content":"hi","timestamp":"2024-01-01T00:00:01Z","sessionId":"s1"}}"#
        )
        .unwrap();
        let messages = reader.read_new().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].uuid, "a1");
        assert!(reader.offset() > offset_after_complete);
    }

    #[test]
    fn test_malformed_line_skipped_rest_of_file_parses() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_log(
            tmp.path(),
            &[
                record_line("u1", "user", "hello", "2024-01-01T00:00:00Z"),
                "{not valid json".to_string(),
                record_line("a1", "assistant", "hi", "2024-01-01T00:00:01Z"),
            ],
        );

        let messages = read_messages(&path).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].uuid, "u1");
        assert_eq!(messages[1].uuid, "a1");
    }

    #[test]
    fn test_truncation_resets_offset() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_log(
            tmp.path(),
            &[
                record_line("u1", "user", "hello", "2024-01-01T00:00:00Z"),
                record_line("a1", "assistant", "hi", "2024-01-01T00:00:01Z"),
            ],
        );

        let mut reader = LogReader::new(path.clone());
        assert_eq!(reader.read_new().unwrap().len(), 2);

        // Rewrite the file shorter than the reader's position.
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "{}",
            record_line("u2", "user", "again", "2024-01-02T00:00:00Z")
        )
        .unwrap();

        let messages = reader.read_new().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].uuid, "u2");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mut reader = LogReader::new(tmp.path().join("p").join("gone.jsonl"));
        assert!(matches!(
            reader.read_new(),
            Err(ParseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_project_id_from_path() {
        let path = Path::new("/data/projects/my-proj/abc.jsonl");
        assert_eq!(project_id_from_path(path), "my-proj");
    }
}
