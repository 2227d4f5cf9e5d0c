//! Memory-mapped, statically partitioned parallel TSV ingestion.
//!
//! The reader maps a whole file read-only, carves the mapping into
//! `threads` line-respecting byte ranges, parses each range on its own
//! rayon task, and reassembles the per-chunk record lists by chunk index so
//! the final sequence matches file order for any thread count.
//!
//! Row-level failures never escape this module: a malformed line is skipped
//! and recorded in a mutex-guarded warning buffer that keeps the first few
//! messages verbatim and counts the rest.

use crate::error::{FileAccessError, RowParseError};
use crate::records::RecordParse;
use memchr::memchr;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Maximum number of row warnings reported verbatim; the rest are only
/// counted.
const MAX_REPORTED_WARNINGS: usize = 5;

/// A row predicate over the projected fields. Returning `Err` skips the row
/// with a warning, exactly like a parse failure.
pub type RowPredicate = Box<dyn Fn(&[&str]) -> Result<bool, RowParseError> + Send + Sync>;

/// Builder-style reader for one file. `read()` consumes the reader, so a
/// file can only be loaded once per instance by construction.
pub struct TsvReader<R: RecordParse> {
    path: PathBuf,
    projection: Vec<usize>,
    predicate: Option<RowPredicate>,
    threads: usize,
    // fn() -> R keeps the reader Send + Sync regardless of R's auto traits.
    _record: PhantomData<fn() -> R>,
}

struct WarningBuffer {
    kept: Vec<String>,
    total: usize,
}

impl WarningBuffer {
    fn push(&mut self, line: &str, error: &RowParseError) {
        self.total += 1;
        if self.kept.len() < MAX_REPORTED_WARNINGS {
            let shown = if line.is_empty() { "<empty line>" } else { line };
            self.kept.push(format!("skipped row '{shown}': {error}"));
        }
    }
}

impl<R: RecordParse> TsvReader<R> {
    /// Creates a reader for `path`.
    ///
    /// `projection` is an ordered list of column indices to retain (empty =
    /// retain all fields). A projected index beyond a row's field count
    /// yields an empty field for that row rather than dropping the row.
    pub fn new(path: impl AsRef<Path>, projection: Vec<usize>, threads: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            projection,
            predicate: None,
            threads: threads.max(1),
            _record: PhantomData,
        }
    }

    /// Attaches a row predicate evaluated on the projected fields.
    pub fn with_predicate(mut self, predicate: RowPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Maps the file and parses it in parallel, returning records in file
    /// order.
    ///
    /// Fails before any task is spawned if the path is missing, not a
    /// regular file, unopenable, or empty. The mapping is dropped on every
    /// exit path when this call returns.
    pub fn read(self) -> Result<Vec<R>, FileAccessError> {
        let mmap = map_file(&self.path)?;
        let data: &[u8] = &mmap;

        let ranges = chunk_ranges(data, self.threads);
        let warnings = Mutex::new(WarningBuffer {
            kept: Vec::new(),
            total: 0,
        });

        // Indexed parallel map: rayon's collect preserves the input order,
        // which is what guarantees file order independent of scheduling.
        let chunk_records: Vec<Vec<R>> = ranges
            .par_iter()
            .map(|range| self.parse_chunk(&data[range.clone()], &warnings))
            .collect();

        let total_records: usize = chunk_records.iter().map(Vec::len).sum();
        let mut records = Vec::with_capacity(total_records);
        for chunk in chunk_records {
            records.extend(chunk);
        }

        let warnings = warnings.into_inner().unwrap_or_else(|e| e.into_inner());
        if warnings.total > 0 {
            log::warn!(
                "{} row(s) skipped while reading '{}':",
                warnings.total,
                self.path.display()
            );
            for message in &warnings.kept {
                log::warn!("  {message}");
            }
            let suppressed = warnings.total.saturating_sub(warnings.kept.len());
            if suppressed > 0 {
                log::warn!("  ({suppressed} warning(s) suppressed)");
            }
        }

        Ok(records)
    }

    /// Parses one byte range of the mapping. Runs on a worker task; the
    /// record list is task-local until the merge, only the warning buffer
    /// is shared.
    fn parse_chunk(&self, chunk: &[u8], warnings: &Mutex<WarningBuffer>) -> Vec<R> {
        let mut records = Vec::new();
        let mut offset = 0;

        while offset < chunk.len() {
            let line_end = match memchr(b'\n', &chunk[offset..]) {
                Some(pos) => offset + pos,
                None => chunk.len(),
            };
            let mut line_bytes = &chunk[offset..line_end];
            if line_bytes.ends_with(b"\r") {
                line_bytes = &line_bytes[..line_bytes.len() - 1];
            }
            offset = line_end + 1;

            let line = String::from_utf8_lossy(line_bytes);
            match self.parse_line(&line) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(error) => {
                    let mut buffer = warnings.lock().unwrap_or_else(|e| e.into_inner());
                    buffer.push(&line, &error);
                }
            }
        }

        records
    }

    /// Splits, projects, filters and parses a single line. `Ok(None)` means
    /// the row was filtered out by the predicate.
    fn parse_line(&self, line: &str) -> Result<Option<R>, RowParseError> {
        // Both tabs and spaces separate fields (one supported format mixes
        // them); consecutive delimiters count as a single separator.
        let fields: Vec<&str> = line
            .split(|c: char| c == '\t' || c == ' ')
            .filter(|field| !field.is_empty())
            .collect();

        let projected: Vec<&str> = if self.projection.is_empty() {
            fields
        } else {
            self.projection
                .iter()
                .map(|&i| fields.get(i).copied().unwrap_or(""))
                .collect()
        };

        if let Some(predicate) = &self.predicate {
            if !predicate(&projected)? {
                return Ok(None);
            }
        }

        R::parse(&projected).map(Some)
    }
}

/// Opens and memory-maps `path` read-only, with all precondition checks
/// done before mapping.
fn map_file(path: &Path) -> Result<Mmap, FileAccessError> {
    let file = File::open(path).map_err(|source| FileAccessError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let metadata = file.metadata().map_err(|source| FileAccessError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(FileAccessError::NotRegularFile {
            path: path.to_path_buf(),
        });
    }
    if metadata.len() == 0 {
        return Err(FileAccessError::Empty {
            path: path.to_path_buf(),
        });
    }

    // Safety: the mapping is read-only and private; we never hand out
    // references that outlive the `Mmap` owned by `read()`.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| FileAccessError::Mmap {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    let _ = mmap.advise(memmap2::Advice::Sequential);

    Ok(mmap)
}

/// Splits `data` into `threads` contiguous, line-respecting byte ranges.
///
/// Every boundary except the last is snapped forward to just past the next
/// newline at or after the equal-size candidate offset, so no line is torn
/// across two ranges. The final range always extends to the end of the
/// file. Ranges can be empty when the file has fewer lines than threads.
fn chunk_ranges(data: &[u8], threads: usize) -> Vec<Range<usize>> {
    let len = data.len();
    let chunk_size = len / threads;
    let mut ranges = Vec::with_capacity(threads);
    let mut start = 0usize;

    for i in 0..threads {
        let end = if i == threads - 1 {
            len
        } else {
            let candidate = (start + chunk_size).min(len);
            match memchr(b'\n', &data[candidate..]) {
                Some(pos) => candidate + pos + 1,
                None => len,
            }
        };
        ranges.push(start..end);
        start = end;
    }

    ranges
}
