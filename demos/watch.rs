//! Crude CLI consumer: tails a journal directory and prints each
//! record's timestamp and event name.
//!
//! Usage:
//!     watch [/path/to/journal/dir]
//!
//! Defaults to the platform-conventional Elite Dangerous save-game
//! directory.

use journalmux::{JournalWatcher, WatcherConfig, WatcherEvent};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let directory = match std::env::args().nth(1) {
        Some(arg) => arg.into(),
        None => journalmux::default_journal_directory()
            .ok_or("could not determine a home directory; pass a directory argument")?,
    };

    let mut watcher = JournalWatcher::new(WatcherConfig::new(directory));
    watcher.start()?;

    while let Some(event) = watcher.next_event().await {
        match event {
            WatcherEvent::Started => eprintln!("watching..."),
            WatcherEvent::Data(batch) => {
                for record in batch.iter() {
                    let timestamp = record.get("timestamp").and_then(|v| v.as_str());
                    let name = record.get("event").and_then(|v| v.as_str());
                    println!(
                        "{} {}",
                        timestamp.unwrap_or("-"),
                        name.unwrap_or("(unnamed)")
                    );
                }
            }
            WatcherEvent::Finished { .. } => {}
            WatcherEvent::Error { source, error } => {
                eprintln!("{}: {}", source.display(), error);
            }
            WatcherEvent::Stopped => break,
        }
    }

    Ok(())
}
