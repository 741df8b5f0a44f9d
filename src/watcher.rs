//! The public-facing coordinator: owns the cursor map, classifies
//! notifications and drives reads.

use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Debug, Formatter};
use std::fs::Metadata;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;
use std::time::SystemTime;

use futures_util::future::{poll_fn, BoxFuture};
use futures_util::stream::Stream as FuturesStream;
use tracing::{debug, trace};

use crate::cursor::{Disposition, FileCursor, FileStat};
use crate::events::{DirectoryEvents, Error, FileNotification, NotificationKind};
use crate::reader::{self, Batch, TailRead};

/// Default cap on simultaneously tracked journal files.
pub const DEFAULT_MAX_TRACKED_FILES: usize = 3;

/// Returns `true` for filenames following the journal naming convention:
/// basename starting with `Journal.` and a `.log` extension.
pub fn is_journal_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => name,
        None => return false,
    };

    name.starts_with("Journal.") && path.extension().map_or(false, |ext| ext == "log")
}

/// The platform-conventional Elite Dangerous save-game directory, if a
/// home directory can be determined.
pub fn default_journal_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join("Saved Games")
            .join("Frontier Developments")
            .join("Elite Dangerous")
    })
}

/// Constructor-level configuration for a [`JournalWatcher`].
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    directory: PathBuf,
    max_tracked_files: usize,
    ignore_initial: bool,
    filter: fn(&Path) -> bool,
}

impl WatcherConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        WatcherConfig {
            directory: directory.into(),
            max_tracked_files: DEFAULT_MAX_TRACKED_FILES,
            ignore_initial: false,
            filter: is_journal_file,
        }
    }

    /// Caps the number of simultaneously tracked files. Qualifying files
    /// beyond the cap are simply never tracked.
    pub fn max_tracked_files(mut self, max: usize) -> Self {
        self.max_tracked_files = max;
        self
    }

    /// When `true`, files whose mtime predates watcher start deliver only
    /// forward growth; existing content is not read retroactively.
    pub fn ignore_initial(mut self, ignore: bool) -> Self {
        self.ignore_initial = ignore;
        self
    }

    /// Replaces the default [`is_journal_file`] filename filter.
    pub fn filter(mut self, filter: fn(&Path) -> bool) -> Self {
        self.filter = filter;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Consumer-facing events, delivered in order by [`JournalWatcher`].
#[derive(Debug)]
pub enum WatcherEvent {
    /// Watching has begun.
    Started,
    /// One completed read-and-parse cycle for one file. The batch may be
    /// empty (e.g. only an incomplete trailing line was seen).
    Data(Batch),
    /// The preceding [`Data`](WatcherEvent::Data) batch is fully
    /// processed.
    Finished { source: PathBuf },
    /// A recoverable, file-scoped IO error. Parse failures are never
    /// reported here. The affected file is no longer tracked; all other
    /// files continue being watched.
    Error { source: PathBuf, error: io::Error },
    /// Watching has fully ceased; no further `Data` will be delivered.
    Stopped,
}

/// In-flight work for one notification. Kept on the watcher rather than
/// inside a `next_event` future, so a poll that gets abandoned (as every
/// pending `Stream` poll is) resumes where it left off instead of losing
/// the notification.
enum ReadState {
    Idle,
    /// Waiting on the stat for a created/changed notification.
    Stat {
        path: PathBuf,
        stat_fut: BoxFuture<'static, io::Result<Metadata>>,
    },
    /// Waiting on the window read scheduled for the path.
    Read {
        path: PathBuf,
        stat: FileStat,
        watermark: u64,
        read_fut: BoxFuture<'static, io::Result<TailRead>>,
    },
}

impl Debug for ReadState {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        match self {
            ReadState::Idle => f.write_str("Idle"),
            ReadState::Stat { path, .. } => f
                .debug_struct("Stat")
                .field("path", path)
                .finish_non_exhaustive(),
            ReadState::Read { path, .. } => f
                .debug_struct("Read")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Watches a directory of journal files and multiplexes them into a
/// single ordered stream of [`WatcherEvent`]s.
///
/// All notification handling and reading happens inside
/// [`next_event`](JournalWatcher::next_event), on the caller's task, so
/// at most one read is ever in flight and watermark updates are never
/// raced.
///
/// Records within one file are delivered in file order. No ordering is
/// guaranteed across different files.
#[derive(Debug)]
pub struct JournalWatcher {
    config: WatcherConfig,
    events: Option<DirectoryEvents>,
    cursors: HashMap<PathBuf, FileCursor>,
    /// Notifications awaiting handling (initial scan and live watch).
    backlog: VecDeque<FileNotification>,
    /// Events produced but not yet handed to the consumer.
    pending: VecDeque<WatcherEvent>,
    state: ReadState,
    started_at: SystemTime,
    stopped: bool,
}

impl JournalWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        JournalWatcher {
            config,
            events: None,
            cursors: HashMap::new(),
            backlog: VecDeque::new(),
            pending: VecDeque::new(),
            state: ReadState::Idle,
            started_at: SystemTime::now(),
            stopped: false,
        }
    }

    /// Begins watching the configured directory. Files already present
    /// are picked up by an initial scan, newest first. Idempotent: a
    /// no-op if already started.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.events.is_some() {
            return Ok(());
        }

        debug!(directory = %self.config.directory.display(), "start");

        // Register the watch before scanning so nothing created in
        // between is missed; a duplicate notification classifies as
        // unchanged.
        let events = DirectoryEvents::new(&self.config.directory)?;
        self.started_at = SystemTime::now();
        self.stopped = false;
        self.scan_existing()?;
        self.events = Some(events);
        self.pending.push_back(WatcherEvent::Started);

        Ok(())
    }

    /// Stops watching. Already-produced batches are still delivered,
    /// then [`WatcherEvent::Stopped`] is the final event. Idempotent.
    pub fn stop(&mut self) {
        debug!("stop");

        if self.events.take().is_some() {
            self.backlog.clear();
            // Abandon any in-flight stat or read; nothing has been
            // committed for it.
            self.state = ReadState::Idle;
            self.pending.push_back(WatcherEvent::Stopped);
        }
        self.stopped = true;
    }

    /// Whether [`stop`](JournalWatcher::stop) has been called (or the
    /// watch backend has gone away).
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Waits for the next consumer-facing event. Returns `None` once
    /// stopped and fully drained.
    ///
    /// Cancel-safe: in-flight work lives on the watcher, not in the
    /// returned future, so dropping the future mid-poll (a `select!`
    /// arm, a `Stream` poll) resumes cleanly on the next call.
    pub async fn next_event(&mut self) -> Option<WatcherEvent> {
        poll_fn(|cx| self.poll_next_event(cx)).await
    }

    fn poll_next_event(&mut self, cx: &mut task::Context<'_>) -> task::Poll<Option<WatcherEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return task::Poll::Ready(Some(event));
            }

            if self.stopped {
                return task::Poll::Ready(None);
            }

            match &mut self.state {
                ReadState::Idle => {
                    if let Some(notification) = self.backlog.pop_front() {
                        self.begin_notification(notification);
                        continue;
                    }

                    let events = match self.events.as_mut() {
                        Some(events) => events,
                        None => return task::Poll::Ready(None),
                    };
                    match Pin::new(events).poll_next(cx) {
                        task::Poll::Ready(Some(notification)) => {
                            self.backlog.push_back(notification);
                        }
                        // Watch backend went away; treat as a stop.
                        task::Poll::Ready(None) => self.stop(),
                        task::Poll::Pending => return task::Poll::Pending,
                    }
                }
                ReadState::Stat { path, stat_fut } => match stat_fut.as_mut().poll(cx) {
                    task::Poll::Ready(result) => {
                        let path = std::mem::take(path);
                        self.state = ReadState::Idle;
                        self.finish_stat(path, result);
                    }
                    task::Poll::Pending => return task::Poll::Pending,
                },
                ReadState::Read {
                    path,
                    stat,
                    watermark,
                    read_fut,
                } => match read_fut.as_mut().poll(cx) {
                    task::Poll::Ready(result) => {
                        let path = std::mem::take(path);
                        let stat = *stat;
                        let watermark = *watermark;
                        self.state = ReadState::Idle;
                        self.finish_read(path, stat, watermark, result);
                    }
                    task::Poll::Pending => return task::Poll::Pending,
                },
            }
        }
    }

    /// Queues a synthetic `Created` notification for every qualifying
    /// file already in the directory, newest filename first so the cap
    /// keeps the most recent journals.
    fn scan_existing(&mut self) -> Result<(), Error> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.config.directory)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| (self.config.filter)(path))
            .collect();
        paths.sort();

        for path in paths.into_iter().rev() {
            self.backlog.push_back(FileNotification {
                path,
                kind: NotificationKind::Created,
            });
        }

        Ok(())
    }

    fn active_cursors(&self) -> usize {
        self.cursors
            .values()
            .filter(|cursor| !cursor.is_tombstoned())
            .count()
    }

    /// Synchronous head of notification handling; schedules a stat for
    /// anything that is not a removal.
    fn begin_notification(&mut self, notification: FileNotification) {
        let FileNotification { path, kind } = notification;

        if !(self.config.filter)(&path) {
            return;
        }

        if kind == NotificationKind::Removed {
            if let Some(cursor) = self.cursors.get_mut(&path) {
                if !cursor.is_tombstoned() {
                    debug!(path = %path.display(), "tracked file removed, burying");
                    cursor.tombstone();
                }
            }
            return;
        }

        let stat_fut = Box::pin(tokio::fs::metadata(path.clone()));
        self.state = ReadState::Stat { path, stat_fut };
    }

    /// Classifies a completed stat and schedules the window read, if one
    /// is due.
    fn finish_stat(&mut self, path: PathBuf, result: io::Result<Metadata>) {
        let stat = match result {
            Ok(metadata) => FileStat::from_metadata(&metadata),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                // Vanished between notification and stat.
                if let Some(cursor) = self.cursors.get_mut(&path) {
                    cursor.tombstone();
                }
                return;
            }
            Err(error) => {
                if let Some(cursor) = self.cursors.get_mut(&path) {
                    cursor.tombstone();
                }
                self.pending
                    .push_back(WatcherEvent::Error { source: path, error });
                return;
            }
        };

        let watermark = match self.cursors.get_mut(&path) {
            None => {
                if self.active_cursors() >= self.config.max_tracked_files {
                    trace!(path = %path.display(), "tracked-file budget reached, ignoring");
                    return;
                }

                let watermark = if self.config.ignore_initial
                    && stat.modified.map_or(false, |mtime| mtime < self.started_at)
                {
                    stat.size
                } else {
                    0
                };

                debug!(path = %path.display(), watermark, "tracking new journal file");

                // An empty window (zero-length file, or existing content
                // being skipped) schedules no read; the first growth
                // notification does.
                if watermark >= stat.size {
                    self.cursors.insert(path, FileCursor::track(&stat, watermark));
                    return;
                }
                watermark
            }
            Some(cursor) => match cursor.classify(&stat) {
                Disposition::Ignore => return,
                Disposition::Replaced => {
                    debug!(path = %path.display(), "file replaced at path, burying");
                    cursor.tombstone();
                    return;
                }
                Disposition::Grew => cursor.watermark(),
                Disposition::Unchanged => {
                    cursor.record_stat(&stat);
                    return;
                }
            },
        };

        let read_fut = Box::pin(reader::read_window(
            path.clone(),
            watermark,
            stat.size - watermark,
        ));
        self.state = ReadState::Read {
            path,
            stat,
            watermark,
            read_fut,
        };
    }

    /// Commits a completed window read: cursor bookkeeping first, then
    /// the consumer-facing events.
    fn finish_read(
        &mut self,
        path: PathBuf,
        stat: FileStat,
        watermark: u64,
        result: io::Result<TailRead>,
    ) {
        match result {
            Ok(read) => {
                let cursor = self
                    .cursors
                    .entry(path.clone())
                    .or_insert_with(|| FileCursor::track(&stat, watermark));
                cursor.record_stat(&stat);
                cursor.advance(read.consumed);
                self.pending
                    .push_back(WatcherEvent::Data(Batch::new(path.clone(), read.records)));
                self.pending
                    .push_back(WatcherEvent::Finished { source: path });
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                // Vanished between stat and open; not a consumer-visible
                // error.
                if let Some(cursor) = self.cursors.get_mut(&path) {
                    cursor.tombstone();
                }
            }
            Err(error) => {
                let cursor = self
                    .cursors
                    .entry(path.clone())
                    .or_insert_with(|| FileCursor::track(&stat, watermark));
                cursor.tombstone();
                self.pending
                    .push_back(WatcherEvent::Error { source: path, error });
            }
        }
    }
}

impl FuturesStream for JournalWatcher {
    type Item = WatcherEvent;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        self.get_mut().poll_next_event(cx)
    }
}
