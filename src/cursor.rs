//! Per-file tracking state and change classification.

use std::fs::Metadata;
use std::time::SystemTime;

/// Identifies the underlying storage allocation behind a path, so that a
/// file silently replaced at the same path can be detected. Inode
/// numbers are reused eagerly after an unlink, so the birth time is part
/// of the identity wherever the filesystem reports one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FileIdentity {
    device: u64,
    inode: u64,
    created: u128,
}

impl FileIdentity {
    #[cfg(unix)]
    fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileIdentity {
            device: metadata.dev(),
            inode: metadata.ino(),
            created: creation_nanos(metadata),
        }
    }

    // Windows has no stable inode equivalent in std; a file recreated at
    // the same path gets a fresh creation time, which is close enough.
    #[cfg(not(unix))]
    fn from_metadata(metadata: &Metadata) -> Self {
        FileIdentity {
            device: 0,
            inode: 0,
            created: creation_nanos(metadata),
        }
    }
}

// Zero when the filesystem reports no birth time; identity then falls
// back to (device, inode) alone.
fn creation_nanos(metadata: &Metadata) -> u128 {
    metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// One stat result, reduced to the fields classification cares about.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FileStat {
    pub identity: FileIdentity,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileStat {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        FileStat {
            identity: FileIdentity::from_metadata(metadata),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// How a fresh stat relates to what a cursor last saw.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Disposition {
    /// Cursor is tombstoned; never touch it again.
    Ignore,
    /// Same path, different underlying file. The cursor can no longer be
    /// trusted and must be tombstoned.
    Replaced,
    /// The file got longer; assume append and schedule a read.
    Grew,
    /// Same identity, same size. Deliberately a no-op even when mtime
    /// differs, to tolerate writers that touch mtime without appending.
    Unchanged,
}

/// Tracked state for one journal file path.
#[derive(Debug)]
pub(crate) struct FileCursor {
    identity: FileIdentity,
    last_known_size: u64,
    last_known_modified: Option<SystemTime>,
    watermark: u64,
    tombstoned: bool,
}

impl FileCursor {
    /// Starts tracking a file at the given watermark (0 to deliver
    /// existing content, or the current size to deliver forward growth
    /// only).
    pub fn track(stat: &FileStat, watermark: u64) -> Self {
        FileCursor {
            identity: stat.identity,
            last_known_size: stat.size,
            last_known_modified: stat.modified,
            watermark,
            tombstoned: false,
        }
    }

    pub fn classify(&self, stat: &FileStat) -> Disposition {
        if self.tombstoned {
            Disposition::Ignore
        } else if stat.identity != self.identity {
            Disposition::Replaced
        } else if stat.size > self.last_known_size {
            Disposition::Grew
        } else {
            Disposition::Unchanged
        }
    }

    /// Updates size/mtime bookkeeping from a stat, regardless of which
    /// classification branch was taken.
    pub fn record_stat(&mut self, stat: &FileStat) {
        self.last_known_size = stat.size;
        self.last_known_modified = stat.modified;
    }

    /// Advances the watermark past bytes that have been parsed and
    /// delivered.
    pub fn advance(&mut self, consumed: u64) {
        self.watermark += consumed;
        debug_assert!(self.watermark <= self.last_known_size);
    }

    pub fn tombstone(&mut self) {
        self.tombstoned = true;
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn last_known_size(&self) -> u64 {
        self.last_known_size
    }
}
