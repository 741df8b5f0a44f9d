use std::time::Duration;

use futures_util::StreamExt;
use journalmux::{JournalWatcher, WatcherConfig, WatcherEvent};
use serde_json::json;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

async fn next_event(watcher: &mut JournalWatcher) -> WatcherEvent {
    timeout(EVENT_TIMEOUT, watcher.next_event())
        .await
        .expect("timed out waiting for watcher event")
        .expect("watcher quiesced unexpectedly")
}

/// Waits for the given records to arrive, tolerating empty batches and
/// duplicate notifications along the way.
async fn collect_records(watcher: &mut JournalWatcher, expected: usize) -> Vec<serde_json::Value> {
    let mut records = Vec::new();
    while records.len() < expected {
        if let WatcherEvent::Data(batch) = next_event(watcher).await {
            records.extend(batch.into_iter());
        }
    }
    records
}

#[tokio::test]
async fn tails_journal_growth() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("Journal.2026-08-25T101010.01.log");

    let mut file = tokio::fs::File::create(&logfile).await.unwrap();
    file.write_all(b"{\"a\":1}\n{\"b\":2}\n").await.unwrap();
    file.sync_all().await.unwrap();

    let mut watcher = JournalWatcher::new(WatcherConfig::new(logdir.path()));
    watcher.start().unwrap();

    assert!(matches!(next_event(&mut watcher).await, WatcherEvent::Started));

    // Existing content arrives via the initial scan.
    let records = collect_records(&mut watcher, 2).await;
    assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);

    // Appended content arrives via the live watch.
    file.write_all(b"{\"c\":3}\n").await.unwrap();
    file.sync_all().await.unwrap();

    let records = collect_records(&mut watcher, 1).await;
    assert_eq!(records, vec![json!({"c": 3})]);

    drop(watcher);
}

#[tokio::test]
async fn stream_impl_delivers_existing_file() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("Journal.01.log");
    tokio::fs::write(&logfile, b"{\"a\":1}\n{\"b\":2}\n")
        .await
        .unwrap();

    let mut watcher = JournalWatcher::new(WatcherConfig::new(logdir.path()));
    watcher.start().unwrap();

    // Drive the watcher through `Stream` polling only; every pending
    // poll abandons and re-creates the in-flight future.
    let mut records = Vec::new();
    while records.len() < 2 {
        let event = timeout(EVENT_TIMEOUT, watcher.next())
            .await
            .expect("timed out waiting for watcher event")
            .expect("watcher quiesced unexpectedly");
        if let WatcherEvent::Data(batch) = event {
            records.extend(batch.into_iter());
        }
    }
    assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);

    drop(watcher);
}

#[tokio::test]
async fn stop_quiesces_the_event_stream() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("Journal.01.log");

    let mut watcher = JournalWatcher::new(WatcherConfig::new(logdir.path()));
    watcher.start().unwrap();
    assert!(matches!(next_event(&mut watcher).await, WatcherEvent::Started));

    watcher.stop();
    assert!(matches!(next_event(&mut watcher).await, WatcherEvent::Stopped));
    assert!(watcher.next_event().await.is_none());

    // A file written after the stopped event produces nothing.
    tokio::fs::write(&logfile, b"{\"a\":1}\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(watcher.next_event().await.is_none());
}
