//! Everything related to reading new bytes for a given cursor.

use std::io::{self, SeekFrom};
use std::iter::IntoIterator;
use std::path::{Path, PathBuf};
use std::slice::Iter;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::parser::{self, Record};

const READ_CHUNK: usize = 64 * 1024;

/// Batch of records captured for a given source path by one read.
///
/// May be empty: a read that only saw an incomplete trailing line still
/// produces a (recordless) batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Batch {
    /// The path from where the records were read.
    source: PathBuf,
    /// The batched list of parsed records.
    records: Vec<Record>,
}

impl Batch {
    pub(crate) fn new(source: PathBuf, records: Vec<Record>) -> Self {
        Batch { source, records }
    }

    /// Returns a reference to the file from where the records were read.
    pub fn source(&self) -> &Path {
        self.source.as_path()
    }

    /// Returns a slice of the parsed records.
    pub fn records(&self) -> &[Record] {
        self.records.as_slice()
    }

    /// Returns an iterator over the slice of records.
    pub fn iter(&self) -> Iter<Record> {
        self.records().iter()
    }

    /// Returns the number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the number of records in the batch is zero.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the internal components that make up a `Batch`.
    pub fn into_inner(self) -> (PathBuf, Vec<Record>) {
        let Batch { source, records } = self;

        (source, records)
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Outcome of one window read: the parsed records plus the number of
/// window bytes covered by complete lines.
#[derive(Debug, Default)]
pub(crate) struct TailRead {
    pub records: Vec<Record>,
    pub consumed: u64,
}

/// Reads the window `[watermark, watermark + window)` of `path`, feeding
/// accumulated bytes through the parser chunk by chunk.
///
/// Nothing is committed here: the caller advances its cursor by the
/// returned `consumed` count once the whole window has been handled, so
/// an abandoned read never moves a watermark. A partial trailing line at
/// the end of the window is discarded and not counted as consumed; the
/// read triggered by the write completing it picks it up again.
pub(crate) async fn read_window(path: PathBuf, watermark: u64, window: u64) -> io::Result<TailRead> {
    tracing::debug!(path = %path.display(), watermark, window, "reading journal window");

    let mut file = File::open(&path).await?;
    file.seek(SeekFrom::Start(watermark)).await?;

    // Bounding the read to the window avoids racing a writer that is
    // appending while we read; anything past it is delivered by the next
    // notification.
    let mut source = file.take(window);

    let mut read = TailRead::default();
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = source.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..n]);

        let parsed = parser::parse_complete_lines(&pending);
        read.consumed += parsed.consumed as u64;
        read.records.extend(parsed.records);
        pending.drain(..parsed.consumed);
    }

    if !pending.is_empty() {
        tracing::trace!(
            path = %path.display(),
            held_back = pending.len(),
            "incomplete trailing line held back"
        );
    }

    Ok(read)
}
