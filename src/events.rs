//! Everything related to watching a journal directory for file
//! creations, modifications and deletions.

use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;

use futures_util::pin_mut;
use futures_util::stream::Stream as FuturesStream;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

/// What happened to a file, reduced to the three cases the coordinator
/// cares about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotificationKind {
    Created,
    Changed,
    Removed,
}

/// One filesystem notification for one path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileNotification {
    pub path: PathBuf,
    pub kind: NotificationKind,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The directory watch could not be registered.
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supplies change notifications for a single directory, and can be
/// polled to receive them.
///
/// Internally, `DirectoryEvents` contains a [`notify::Watcher`] from
/// where filesystem events are proxied and flattened into one
/// [`FileNotification`] per affected path. Events that imply neither
/// creation, content change nor removal (e.g. access events) are dropped
/// here.
pub struct DirectoryEvents {
    // Held for its Drop; the watch ends when this is dropped.
    _inner: notify::RecommendedWatcher,
    directory: PathBuf,
    backlog: VecDeque<FileNotification>,
    event_stream: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
}

impl Debug for DirectoryEvents {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("DirectoryEvents")
            .field("directory", &self.directory)
            .field("backlog", &self.backlog)
            .finish()
    }
}

impl DirectoryEvents {
    /// Constructs a new `DirectoryEvents` watching `directory`
    /// non-recursively.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, Error> {
        let directory = directory.into();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = notify::recommended_watcher(move |res| {
            // The only way `send` can fail is if the receiver is dropped,
            // and `DirectoryEvents` controls both ends.
            let _ = tx.send(res);
        })
        .map_err(|source| Error::Watch {
            path: directory.clone(),
            source,
        })?;

        inner
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|source| Error::Watch {
                path: directory.clone(),
                source,
            })?;

        Ok(DirectoryEvents {
            _inner: inner,
            directory,
            backlog: VecDeque::new(),
            event_stream: rx,
        })
    }

    /// The directory this instance is watching.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Waits for the next notification. Returns `None` once the watch
    /// backend has shut down.
    pub async fn next_notification(&mut self) -> Option<FileNotification> {
        loop {
            if let Some(notification) = self.backlog.pop_front() {
                return Some(notification);
            }

            match self.event_stream.recv().await? {
                Ok(event) => self.enqueue(event),
                Err(err) => {
                    // Backend errors are rare and not tied to a tracked
                    // file; log and keep watching.
                    tracing::warn!(%err, "watch backend error");
                }
            }
        }
    }

    fn enqueue(&mut self, event: notify::Event) {
        let kind = match classify_event_kind(&event.kind) {
            Some(kind) => kind,
            None => return,
        };

        for path in event.paths {
            self.backlog.push_back(FileNotification { path, kind });
        }
    }
}

fn classify_event_kind(kind: &EventKind) -> Option<NotificationKind> {
    match kind {
        EventKind::Create(_) => Some(NotificationKind::Created),
        // A rename is a removal under the old name and a creation under
        // the new one.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(NotificationKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(NotificationKind::Created),
        EventKind::Modify(_) => Some(NotificationKind::Changed),
        EventKind::Remove(_) => Some(NotificationKind::Removed),
        _ => None,
    }
}

impl FuturesStream for DirectoryEvents {
    type Item = FileNotification;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        use core::future::Future;

        let fut = self.next_notification();
        pin_mut!(fut);
        fut.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    #[test]
    fn missing_directory_fails_to_watch() {
        let tmp_dir = tempdir().expect("Failed to create tempdir");
        let gone = tmp_dir.path().join("no-such-subdir");

        assert!(DirectoryEvents::new(&gone).is_err());
    }

    #[tokio::test]
    async fn created_file_produces_notification() {
        let tmp_dir = tempdir().expect("Failed to create tempdir");
        let mut events = DirectoryEvents::new(tmp_dir.path()).unwrap();

        let file_path = tmp_dir.path().join("Journal.01.log");
        let mut file = tokio::fs::File::create(&file_path).await.unwrap();
        file.write_all(b"{}\n").await.unwrap();
        file.sync_all().await.unwrap();

        let notification = timeout(Duration::from_secs(5), events.next_notification())
            .await
            .expect("timed out waiting for notification")
            .expect("watch backend closed");

        assert!(notification.path.ends_with("Journal.01.log"));
        assert!(matches!(
            notification.kind,
            NotificationKind::Created | NotificationKind::Changed
        ));
    }

    #[test]
    fn rename_kinds_map_to_remove_and_create() {
        assert_eq!(
            classify_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(NotificationKind::Removed)
        );
        assert_eq!(
            classify_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(NotificationKind::Created)
        );
        assert_eq!(
            classify_event_kind(&EventKind::Access(notify::event::AccessKind::Read)),
            None
        );
    }
}
