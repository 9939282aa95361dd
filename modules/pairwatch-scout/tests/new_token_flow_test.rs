//! End-to-end runs of the new-token pipeline against in-memory seams.
//!
//! Each test drives `Pipeline::run_cycle` with scripted feed responses and
//! checks what reaches the sink and what survives in the seen file.

use std::sync::Arc;
use std::time::Duration;

use gmgn_client::FetchOutcome;
use pairwatch_scout::testing::{pairs_body, MockFeed, MockRotator, MockSink};
use pairwatch_scout::{Pipeline, PipelineSettings, TokenFilter};

fn settings(width: usize) -> PipelineSettings {
    PipelineSettings {
        fetch_width: width,
        load_batch_size: 50,
        sleep_min: Duration::ZERO,
        sleep_max: Duration::ZERO,
        error_cooldown: Duration::ZERO,
    }
}

fn pipeline(feed: Vec<FetchOutcome>, sink: Arc<MockSink>, filter: TokenFilter, width: usize) -> Pipeline {
    Pipeline::new(
        Arc::new(MockRotator::new()),
        Arc::new(MockFeed::new(feed)),
        sink,
        filter,
        settings(width),
    )
}

fn loaded_addresses(sink: &MockSink) -> Vec<String> {
    sink.rows()
        .iter()
        .map(|r| r["address"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn seen_tokens_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let seen_path = dir.path().join("seen.json");

    let sink = Arc::new(MockSink::new());
    let mut first = pipeline(
        vec![FetchOutcome::Success(pairs_body(&["0xAA", "0xaa ", "0xBB"]))],
        sink.clone(),
        TokenFilter::open(&seen_path, 100),
        1,
    );
    let stats = first.run_cycle().await.unwrap();
    assert_eq!(stats.loaded, 2);
    drop(first);

    let restarted_sink = Arc::new(MockSink::new());
    let mut second = pipeline(
        vec![FetchOutcome::Success(pairs_body(&["0xAA", "0xBB", "0xCC"]))],
        restarted_sink.clone(),
        TokenFilter::open(&seen_path, 100),
        1,
    );
    let stats = second.run_cycle().await.unwrap();

    assert_eq!((stats.raw, stats.new, stats.loaded), (3, 1, 1));
    assert_eq!(loaded_addresses(&restarted_sink), vec!["0xCC"]);
}

#[tokio::test]
async fn parallel_fetches_are_deduplicated_across_responses() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MockSink::new());
    let mut pipeline = pipeline(
        vec![
            FetchOutcome::Success(pairs_body(&["0x1", "0x2"])),
            FetchOutcome::Success(pairs_body(&["0x2", "0x3"])),
            FetchOutcome::RetryableFailure("timeout".into()),
        ],
        sink.clone(),
        TokenFilter::open(dir.path().join("seen.json"), 100),
        3,
    );

    let stats = pipeline.run_cycle().await.unwrap();

    assert_eq!(stats.raw, 4);
    assert_eq!(stats.new, 3);
    let mut addresses = loaded_addresses(&sink);
    addresses.sort();
    assert_eq!(addresses, vec!["0x1", "0x2", "0x3"]);
}

#[tokio::test]
async fn tracking_stays_bounded_over_many_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MockSink::new());

    let batches: Vec<Vec<String>> = (0..3)
        .map(|c| (0..30).map(|i| format!("0x{c}{i:02}")).collect())
        .collect();
    let feed = batches
        .iter()
        .map(|b| {
            let refs: Vec<&str> = b.iter().map(String::as_str).collect();
            FetchOutcome::Success(pairs_body(&refs))
        })
        .collect();

    let mut pipeline = pipeline(
        feed,
        sink.clone(),
        TokenFilter::open(dir.path().join("seen.json"), 50),
        1,
    );

    for _ in 0..3 {
        let stats = pipeline.run_cycle().await.unwrap();
        assert_eq!(stats.new, 30);
        assert!(pipeline.filter().seen().len() <= 50);
    }

    assert_eq!(pipeline.filter().seen().len(), 50);
    assert_eq!(sink.rows().len(), 90);
}

#[tokio::test]
async fn empty_feed_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MockSink::new());
    let mut pipeline = pipeline(
        vec![FetchOutcome::RetryableFailure("blocked".into())],
        sink.clone(),
        TokenFilter::open(dir.path().join("seen.json"), 100),
        1,
    );

    let stats = pipeline.run_cycle().await.unwrap();

    assert_eq!((stats.raw, stats.new, stats.loaded), (0, 0, 0));
    assert_eq!(sink.load_calls(), 0);
}
