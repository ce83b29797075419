//! Segment files
//!
//! A segment is one file of the journal, `log<N>.data`, holding a contiguous
//! range of append-order records. `log<N>.ignore` is a zero-length marker
//! written while segment `N` is being deleted.
//!
//! Every append is followed by a durable flush before it is acknowledged.
//! Every structural change to the directory is followed by a durable flush
//! of the directory itself.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use super::errors::{JournalError, JournalResult};
use super::record::JournalEntry;
use crate::crash_point::{maybe_crash, points};

/// Filename prefix shared by data files and ignore markers
const SEGMENT_PREFIX: &str = "log";

/// Extension of segment data files
pub const DATA_EXTENSION: &str = ".data";

/// Extension of deletion markers
pub const IGNORE_EXTENSION: &str = ".ignore";

// ============================================================================
// Segment Naming
// ============================================================================

/// Kind of file found in the journal directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFileKind {
    Data,
    Ignore,
}

/// Data filename for a segment (e.g. "log42.data")
pub fn data_filename(sequence: u64) -> String {
    format!("{}{}{}", SEGMENT_PREFIX, sequence, DATA_EXTENSION)
}

/// Ignore marker filename for a segment (e.g. "log42.ignore")
pub fn ignore_filename(sequence: u64) -> String {
    format!("{}{}{}", SEGMENT_PREFIX, sequence, IGNORE_EXTENSION)
}

/// Parse a journal filename.
///
/// Returns the sequence number and file kind, or None if the name does not
/// belong to the journal.
pub fn parse_segment_filename(name: &str) -> Option<(u64, SegmentFileKind)> {
    let rest = name.strip_prefix(SEGMENT_PREFIX)?;

    let (digits, kind) = if let Some(digits) = rest.strip_suffix(DATA_EXTENSION) {
        (digits, SegmentFileKind::Data)
    } else if let Some(digits) = rest.strip_suffix(IGNORE_EXTENSION) {
        (digits, SegmentFileKind::Ignore)
    } else {
        return None;
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    digits.parse::<u64>().ok().map(|sequence| (sequence, kind))
}

// ============================================================================
// Segment Discovery
// ============================================================================

/// Journal files found in a directory, sorted ascending
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirectoryListing {
    pub data: BTreeSet<u64>,
    pub ignore: BTreeSet<u64>,
}

impl DirectoryListing {
    /// Highest sequence number of any journal file
    pub fn max_sequence(&self) -> Option<u64> {
        let data = self.data.iter().next_back().copied();
        let ignore = self.ignore.iter().next_back().copied();
        data.max(ignore)
    }
}

/// Scan a directory for data files and ignore markers.
///
/// Files that do not match the naming scheme are skipped.
pub async fn discover(dir: &Path) -> JournalResult<DirectoryListing> {
    let mut listing = DirectoryListing::default();

    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        JournalError::io(format!("Failed to read journal directory {}", dir.display()), e)
    })?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| JournalError::io("Failed to read journal directory entry", e))?
    {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };

        match parse_segment_filename(name) {
            Some((sequence, SegmentFileKind::Data)) => {
                listing.data.insert(sequence);
            }
            Some((sequence, SegmentFileKind::Ignore)) => {
                listing.ignore.insert(sequence);
            }
            None => warn!(file = name, "Skipping unrecognised file in journal directory"),
        }
    }

    Ok(listing)
}

// ============================================================================
// Durable Directory Operations
// ============================================================================

/// Durably flush directory metadata (fsync on the directory itself).
///
/// # Errors
///
/// Returns `DirectoryFlush` (FATAL) on failure.
pub async fn sync_directory(dir: &Path) -> JournalResult<()> {
    let handle = File::open(dir)
        .await
        .map_err(|e| JournalError::directory_flush(dir, e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| JournalError::directory_flush(dir, e))
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> JournalResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JournalError::io(
            format!("Failed to remove {}", path.display()),
            e,
        )),
    }
}

/// Create a zero-length ignore marker for a segment
pub async fn write_ignore_marker(dir: &Path, sequence: u64) -> JournalResult<PathBuf> {
    let path = dir.join(ignore_filename(sequence));
    File::create(&path).await.map_err(|e| {
        JournalError::io(format!("Failed to create ignore marker {}", path.display()), e)
    })?;
    Ok(path)
}

// ============================================================================
// Reading
// ============================================================================

/// One line read back from a data file
#[derive(Debug)]
pub enum SegmentLine {
    /// A complete, decoded record
    Record(JournalEntry),
    /// A complete line holding only whitespace
    Blank,
    /// Bytes after the last newline, left by an append that never finished.
    /// `offset` is where the intact prefix of the file ends.
    Torn { offset: u64, bytes: u64 },
}

/// Sequential reader over the records of one data file.
///
/// Lines are read as raw bytes and only decoded once their terminating
/// newline has been seen, so a tail cut anywhere (including inside a
/// multi-byte character) is reported as `Torn` rather than as corruption.
pub struct SegmentReader {
    path: PathBuf,
    reader: BufReader<File>,
    buf: Vec<u8>,
    offset: u64,
    line_number: u64,
    done: bool,
}

impl SegmentReader {
    /// Open a data file for reading from the start
    pub async fn open(path: &Path) -> JournalResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| JournalError::io(format!("Failed to open {}", path.display()), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            buf: Vec::new(),
            offset: 0,
            line_number: 0,
            done: false,
        })
    }

    /// Bytes consumed by complete lines so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next line. Returns `None` at end of file or after a torn tail.
    ///
    /// # Errors
    ///
    /// - `Corruption` for a complete line that is not UTF-8 or not a record
    /// - `Io` if the file cannot be read
    pub async fn next_line(&mut self) -> JournalResult<Option<SegmentLine>> {
        if self.done {
            return Ok(None);
        }

        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| JournalError::io(format!("Failed to read {}", self.path.display()), e))?;
        if read == 0 {
            self.done = true;
            return Ok(None);
        }
        self.line_number += 1;

        if self.buf.last() != Some(&b'\n') {
            self.done = true;
            return Ok(Some(SegmentLine::Torn {
                offset: self.offset,
                bytes: read as u64,
            }));
        }
        self.offset += read as u64;

        let text = std::str::from_utf8(&self.buf)
            .map_err(|e| JournalError::corruption(&self.path, self.line_number, e.to_string()))?
            .trim_end();
        if text.is_empty() {
            return Ok(Some(SegmentLine::Blank));
        }

        JournalEntry::decode(text)
            .map(|entry| Some(SegmentLine::Record(entry)))
            .map_err(|reason| JournalError::corruption(&self.path, self.line_number, reason))
    }
}

// ============================================================================
// Segment
// ============================================================================

/// An open segment of the journal
#[derive(Debug)]
pub struct Segment {
    /// Sequence number, strictly increasing across segments
    pub sequence: u64,
    /// Path to the data file
    pub path: PathBuf,
    /// Handle opened for read + append
    file: File,
    /// Cumulative size in bytes
    pub size: u64,
    /// Messages whose SENDING record lives here and have no completion yet
    pub open_messages: u64,
    /// Appends currently in progress
    pub pending_writes: u64,
    /// Set once the deletion protocol has started
    pub deleting: bool,
    /// Number of upcoming appends to fail before touching the file
    #[cfg(test)]
    pub(crate) fail_appends: u32,
}

impl Segment {
    /// Create a new, empty segment and durably flush it.
    ///
    /// The caller is responsible for flushing the directory afterwards.
    pub async fn create(dir: &Path, sequence: u64) -> JournalResult<Self> {
        let path = dir.join(data_filename(sequence));

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                JournalError::io(format!("Failed to create segment {}", path.display()), e)
            })?;

        file.sync_all().await.map_err(|e| {
            JournalError::io(format!("Failed to sync new segment {}", path.display()), e)
        })?;

        Ok(Self::from_file(sequence, path, file, 0))
    }

    /// Open an existing segment for read + append
    pub async fn open(dir: &Path, sequence: u64) -> JournalResult<Self> {
        let path = dir.join(data_filename(sequence));

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                JournalError::io(format!("Failed to open segment {}", path.display()), e)
            })?;

        let size = file
            .metadata()
            .await
            .map_err(|e| JournalError::io("Failed to read segment metadata", e))?
            .len();

        Ok(Self::from_file(sequence, path, file, size))
    }

    fn from_file(sequence: u64, path: PathBuf, file: File, size: u64) -> Self {
        Self {
            sequence,
            path,
            file,
            size,
            open_messages: 0,
            pending_writes: 0,
            deleting: false,
            #[cfg(test)]
            fail_appends: 0,
        }
    }

    /// Returns true if no message is open and no append is in progress
    pub fn is_idle(&self) -> bool {
        self.open_messages == 0 && self.pending_writes == 0
    }

    /// Append one encoded record and durably flush it.
    ///
    /// On failure the segment is truncated back to its previous length so a
    /// retry never leaves a torn record behind.
    pub async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.pending_writes += 1;
        let result = self.append_inner(bytes).await;
        self.pending_writes -= 1;

        match result {
            Ok(()) => {
                self.size += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.file.set_len(self.size).await {
                    warn!(
                        segment = self.sequence,
                        error = %rollback,
                        "Failed to roll back partial append"
                    );
                }
                Err(e)
            }
        }
    }

    async fn append_inner(&mut self, bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if self.fail_appends > 0 {
            self.fail_appends -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "injected append failure"));
        }

        maybe_crash(points::JOURNAL_BEFORE_APPEND);
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        maybe_crash(points::JOURNAL_BEFORE_FSYNC);
        self.file.sync_all().await?;
        maybe_crash(points::JOURNAL_AFTER_FSYNC);
        Ok(())
    }

    /// Cut the data file to `len` bytes and durably flush it
    pub async fn truncate(&mut self, len: u64) -> JournalResult<()> {
        self.file.set_len(len).await.map_err(|e| {
            JournalError::io(format!("Failed to truncate {}", self.path.display()), e)
        })?;
        self.file.sync_all().await.map_err(|e| {
            JournalError::io(format!("Failed to sync {}", self.path.display()), e)
        })?;
        self.size = len;
        Ok(())
    }

    /// Close the file handle, returning the data file path
    pub fn close(self) -> PathBuf {
        drop(self.file);
        self.path
    }
}
