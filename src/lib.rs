//! A library providing asynchronous tailing of Elite Dangerous journal
//! files as structured JSON records.
//!
//! A [`JournalWatcher`] watches one save-game directory, tracks the
//! journal files inside it (append-only JSON-lines files the game keeps
//! writing to), and multiplexes their growth into a single stream of
//! [`WatcherEvent`]s. Each tracked file carries a byte watermark so a
//! line is delivered at most once, file replacement is detected via file
//! identity, and a half-written trailing line is held back until the
//! write that completes it.
//!
//! Also available is the underlying directory event-stream (driven by
//! [`notify`](https://crates.io/crates/notify)) as [`DirectoryEvents`].
//!
//! ## Example
//!
//! ```no_run
//! use journalmux::{JournalWatcher, WatcherConfig, WatcherEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), journalmux::Error> {
//!     let directory = journalmux::default_journal_directory()
//!         .expect("no home directory");
//!     let mut watcher = JournalWatcher::new(WatcherConfig::new(directory));
//!     watcher.start()?;
//!
//!     while let Some(event) = watcher.next_event().await {
//!         match event {
//!             WatcherEvent::Data(batch) => {
//!                 for record in batch.iter() {
//!                     println!("{}: {}", batch.source().display(), record);
//!                 }
//!             }
//!             WatcherEvent::Error { source, error } => {
//!                 eprintln!("{}: {}", source.display(), error);
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Caveats
//!
//! Watermarks are not persisted across process restarts; a restarted
//! watcher re-reads from wherever its configuration says to start. When
//! a journal file is replaced in place (same path, new underlying file),
//! the path stops being tracked rather than risking duplicate delivery.

mod cursor;
mod events;
mod parser;
mod reader;
mod watcher;

pub use events::{DirectoryEvents, Error, FileNotification, NotificationKind};
pub use parser::Record;
pub use reader::Batch;
pub use watcher::{
    default_journal_directory, is_journal_file, JournalWatcher, WatcherConfig, WatcherEvent,
    DEFAULT_MAX_TRACKED_FILES,
};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
