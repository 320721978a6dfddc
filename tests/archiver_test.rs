mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{card, RecordingBoard};
use job_relay::archiver::{archive_stale, ArchiveReport, ArchiveSettings};
use std::time::Duration;

const PAUSE: Duration = Duration::from_millis(1000);

fn settings() -> ArchiveSettings {
    ArchiveSettings {
        batch_size: 10,
        pause: PAUSE,
    }
}

#[tokio::test(start_paused = true)]
async fn closes_stale_cards_in_paced_batches() {
    let now = Utc::now();
    let mut cards: Vec<_> = (0..25)
        .map(|i| card(&format!("stale-{i}"), now - ChronoDuration::days(10)))
        .collect();
    cards.push(card("fresh", now - ChronoDuration::days(1)));
    let board = RecordingBoard::with_cards(cards);
    board.fail_close("stale-3").await;

    let report = archive_stale(&board, ChronoDuration::days(7), now, settings())
        .await
        .unwrap();

    assert_eq!(
        report,
        ArchiveReport {
            stale: 25,
            closed: 24,
            batches: 3
        }
    );

    let calls = board.close_calls().await;
    assert_eq!(calls.len(), 25, "every stale card is attempted");
    assert!(calls.iter().all(|(id, _)| id != "fresh"));
    assert_eq!(board.max_in_flight(), 10);

    // three distinct start times, one per batch, separated by the pause
    let mut starts: Vec<_> = calls.iter().map(|(_, at)| *at).collect();
    starts.dedup();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= PAUSE);
    }
    let per_batch: Vec<usize> = starts
        .iter()
        .map(|s| calls.iter().filter(|(_, at)| at == s).count())
        .collect();
    assert_eq!(per_batch, vec![10, 10, 5]);
}

#[tokio::test(start_paused = true)]
async fn failed_card_does_not_stop_its_batch() {
    let now = Utc::now();
    let cards: Vec<_> = (0..10)
        .map(|i| card(&format!("c{i}"), now - ChronoDuration::days(8)))
        .collect();
    let board = RecordingBoard::with_cards(cards);
    board.fail_close("c0").await;

    let report = archive_stale(&board, ChronoDuration::days(7), now, settings())
        .await
        .unwrap();
    assert_eq!(report.closed, 9);
    assert_eq!(report.batches, 1);

    let cards = board.cards.lock().await.clone();
    assert!(!cards.iter().find(|c| c.id == "c0").unwrap().closed);
    assert_eq!(cards.iter().filter(|c| c.closed).count(), 9);
}

#[tokio::test(start_paused = true)]
async fn nothing_to_archive() {
    let now = Utc::now();
    let board = RecordingBoard::with_cards(vec![card("fresh", now - ChronoDuration::days(6))]);

    let report = archive_stale(&board, ChronoDuration::days(7), now, settings())
        .await
        .unwrap();
    assert_eq!(report, ArchiveReport::default());
    assert!(board.close_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn listing_failure_is_reported() {
    let board = RecordingBoard::default().failing_setup();
    let result = archive_stale(&board, ChronoDuration::days(7), Utc::now(), settings()).await;
    assert!(result.is_err());
}
