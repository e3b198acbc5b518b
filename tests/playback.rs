//! Playback scheduler integration tests.
//!
//! These drive the scheduler against a real on-disk store with a recording
//! sink and short intervals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use recap::{
    Catalog, CatalogError, Category, DisplayError, DisplaySink, Item, ItemKind, ProgressLedger,
    Scheduler, SchedulerError, StartOutcome, Store,
};

const TICK: Duration = Duration::from_millis(50);

/// Sink that records every shown item name
#[derive(Default)]
struct RecordingSink {
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

#[async_trait]
impl DisplaySink for RecordingSink {
    async fn show(&self, category: &str, item: &Item) -> Result<bool, DisplayError> {
        self.shown
            .lock()
            .unwrap()
            .push((category.to_string(), item.name.to_string()));
        Ok(true)
    }
}

struct Harness {
    catalog: Catalog,
    ledger: ProgressLedger,
    sink: Arc<RecordingSink>,
    scheduler: Scheduler,
    _temp: TempDir,
}

fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(&temp.path().join("test.redb")).unwrap());
    let catalog = Catalog::new(Arc::clone(&store));
    let ledger = ProgressLedger::new(Arc::clone(&store));
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(
        catalog.clone(),
        ledger.clone(),
        Arc::clone(&sink) as Arc<dyn DisplaySink>,
        TICK,
    );
    Harness {
        catalog,
        ledger,
        sink,
        scheduler,
        _temp: temp,
    }
}

fn text_item(name: &str) -> Item {
    Item {
        name: name.to_string(),
        kind: ItemKind::Text,
        content: name.as_bytes().to_vec(),
    }
}

fn quotes_category(names: &[&str]) -> Category {
    Category {
        name: "quotes".to_string(),
        items: names.iter().map(|n| text_item(n)).collect(),
    }
}

/// Poll until the condition holds or the deadline passes
async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_end_to_end_playback() {
    let h = harness();
    h.catalog
        .ingest(&[quotes_category(&["q1", "q2", "q3"])])
        .unwrap();

    let outcome = h.scheduler.start("quotes", true).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { remaining: 3 });

    // Immediate display of the first item, before the first interval.
    assert!(wait_until(|| h.sink.count() == 1, TICK * 2).await);
    assert_eq!(h.ledger.get("quotes").unwrap(), Some(0));

    assert!(wait_until(|| h.sink.count() == 2, TICK * 4).await);
    assert_eq!(h.ledger.get("quotes").unwrap(), Some(1));

    assert!(wait_until(|| h.sink.count() == 3, TICK * 4).await);
    assert_eq!(h.ledger.get("quotes").unwrap(), Some(2));

    // Last item displayed: the task removes itself.
    assert!(
        wait_until_async(|| h.scheduler.active_categories(), Vec::is_empty, TICK * 4).await
    );

    let shown = h.sink.shown();
    let names: Vec<&str> = shown.iter().map(|(_, name)| name.as_str()).collect();
    assert_eq!(names, vec!["q1", "q2", "q3"]);
    assert!(shown.iter().all(|(cat, _)| cat == "quotes"));
}

/// Poll an async source until the predicate holds on its output
async fn wait_until_async<T, Fut>(
    mut source: impl FnMut() -> Fut,
    predicate: impl Fn(&T) -> bool,
    timeout: Duration,
) -> bool
where
    Fut: std::future::Future<Output = T>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate(&source().await) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_non_immediate_start_waits_one_interval() {
    let h = harness();
    h.catalog
        .ingest(&[quotes_category(&["q1", "q2"])])
        .unwrap();

    // Use a long interval so the pre-tick window is easy to observe.
    let scheduler = Scheduler::new(
        h.catalog.clone(),
        h.ledger.clone(),
        Arc::clone(&h.sink) as Arc<dyn DisplaySink>,
        Duration::from_millis(300),
    );

    scheduler.start("quotes", false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(h.sink.count(), 0, "nothing should show before the first interval");

    assert!(wait_until(|| h.sink.count() == 1, Duration::from_millis(600)).await);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_resume_starts_at_next_index() {
    let h = harness();
    h.catalog
        .ingest(&[quotes_category(&["q1", "q2", "q3"])])
        .unwrap();

    // Progress persisted at index 0: playback must resume at index 1.
    h.ledger.set("quotes", 0).unwrap();

    let outcome = h.scheduler.start("quotes", true).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { remaining: 2 });

    assert!(wait_until(|| h.sink.count() >= 1, TICK * 4).await);
    assert_eq!(h.sink.shown()[0].1, "q2");
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_progress() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("test.redb");

    // First process lifetime: show one item, then shut down.
    {
        let store = Arc::new(Store::open(&db_path).unwrap());
        let catalog = Catalog::new(Arc::clone(&store));
        catalog
            .ingest(&[quotes_category(&["q1", "q2", "q3"])])
            .unwrap();

        let ledger = ProgressLedger::new(Arc::clone(&store));
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Scheduler::new(
            catalog,
            ledger.clone(),
            Arc::clone(&sink) as Arc<dyn DisplaySink>,
            Duration::from_secs(60),
        );

        scheduler.start("quotes", true).await.unwrap();
        assert!(wait_until(|| sink.count() == 1, Duration::from_secs(2)).await);
        assert_eq!(ledger.get("quotes").unwrap(), Some(0));

        // Shutdown preserves progress.
        scheduler.shutdown().await;
        assert_eq!(ledger.get("quotes").unwrap(), Some(0));
    }

    // Second process lifetime: resume_all picks the category back up at q2.
    let store = Arc::new(Store::open(&db_path).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(
        Catalog::new(Arc::clone(&store)),
        ProgressLedger::new(Arc::clone(&store)),
        Arc::clone(&sink) as Arc<dyn DisplaySink>,
        TICK,
    );

    let resumed = scheduler.resume_all().await.unwrap();
    assert_eq!(resumed, vec!["quotes".to_string()]);

    assert!(wait_until(|| sink.count() >= 1, TICK * 6).await);
    assert_eq!(sink.shown()[0].1, "q2");
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_cancel_clears_progress_and_restarts_from_zero() {
    let h = harness();
    h.catalog
        .ingest(&[quotes_category(&["q1", "q2", "q3"])])
        .unwrap();

    h.scheduler.start("quotes", true).await.unwrap();
    assert!(wait_until(|| h.sink.count() >= 1, TICK * 4).await);

    let was_running = h.scheduler.cancel("quotes").await.unwrap();
    assert!(was_running);
    assert!(h.ledger.all().unwrap().is_empty());
    assert!(h.scheduler.active_categories().await.is_empty());

    // A fresh start begins at the first item again.
    h.scheduler.start("quotes", true).await.unwrap();
    let before = h.sink.count();
    assert!(wait_until(|| h.sink.count() > before, TICK * 4).await);
    assert_eq!(h.sink.shown()[before].1, "q1");
}

#[tokio::test]
async fn test_concurrent_starts_yield_one_task() {
    let h = harness();
    h.catalog
        .ingest(&[quotes_category(&["q1", "q2", "q3"])])
        .unwrap();

    let (a, b) = tokio::join!(
        h.scheduler.start("quotes", false),
        h.scheduler.start("quotes", false),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let started = outcomes
        .iter()
        .filter(|o| matches!(o, StartOutcome::Started { .. }))
        .count();
    let rejected = outcomes
        .iter()
        .filter(|o| matches!(o, StartOutcome::AlreadyRunning))
        .count();
    assert_eq!(started, 1);
    assert_eq!(rejected, 1);
    assert_eq!(h.scheduler.active_categories().await, vec!["quotes"]);
}

#[tokio::test]
async fn test_empty_category_is_a_no_op() {
    let h = harness();
    h.catalog
        .ingest(&[Category {
            name: "empty".to_string(),
            items: vec![],
        }])
        .unwrap();

    let outcome = h.scheduler.start("empty", true).await.unwrap();
    assert_eq!(outcome, StartOutcome::NoItems);
    assert!(h.scheduler.active_categories().await.is_empty());
    assert!(h.ledger.all().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_category_start_fails() {
    let h = harness();
    let result = h.scheduler.start("never-ingested", true).await;
    assert!(matches!(
        result,
        Err(SchedulerError::Catalog(CatalogError::UnknownCategory(_)))
    ));
}

#[tokio::test]
async fn test_exhaustion_preserves_progress_and_stops_ticks() {
    let h = harness();
    h.catalog.ingest(&[quotes_category(&["only"])]).unwrap();

    h.scheduler.start("quotes", true).await.unwrap();
    assert!(
        wait_until_async(|| h.scheduler.active_categories(), Vec::is_empty, TICK * 6).await
    );

    assert_eq!(h.sink.count(), 1);
    assert_eq!(h.ledger.get("quotes").unwrap(), Some(0));

    // No further displays after exhaustion.
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(h.sink.count(), 1);

    // Starting a fully played category is a distinct no-op.
    let outcome = h.scheduler.start("quotes", true).await.unwrap();
    assert_eq!(outcome, StartOutcome::Finished);
}

#[tokio::test]
async fn test_display_failure_still_advances() {
    struct FailingSink;

    #[async_trait]
    impl DisplaySink for FailingSink {
        async fn show(&self, _category: &str, item: &Item) -> Result<bool, DisplayError> {
            Err(DisplayError(format!("cannot render {}", item.name)))
        }
    }

    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(&temp.path().join("test.redb")).unwrap());
    let catalog = Catalog::new(Arc::clone(&store));
    catalog
        .ingest(&[quotes_category(&["q1", "q2"])])
        .unwrap();
    let ledger = ProgressLedger::new(Arc::clone(&store));

    let scheduler = Scheduler::new(
        catalog,
        ledger.clone(),
        Arc::new(FailingSink),
        TICK,
    );

    scheduler.start("quotes", true).await.unwrap();
    assert!(
        wait_until_async(|| scheduler.active_categories(), Vec::is_empty, TICK * 8).await
    );

    // Both items were attempted and counted as shown.
    assert_eq!(ledger.get("quotes").unwrap(), Some(1));
}

#[tokio::test]
async fn test_sink_has_more_false_stops_playback() {
    struct OneShotSink;

    #[async_trait]
    impl DisplaySink for OneShotSink {
        async fn show(&self, _category: &str, _item: &Item) -> Result<bool, DisplayError> {
            Ok(false)
        }
    }

    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(&temp.path().join("test.redb")).unwrap());
    let catalog = Catalog::new(Arc::clone(&store));
    catalog
        .ingest(&[quotes_category(&["q1", "q2", "q3"])])
        .unwrap();
    let ledger = ProgressLedger::new(Arc::clone(&store));

    let scheduler = Scheduler::new(catalog, ledger.clone(), Arc::new(OneShotSink), TICK);

    scheduler.start("quotes", true).await.unwrap();
    assert!(
        wait_until_async(|| scheduler.active_categories(), Vec::is_empty, TICK * 6).await
    );

    // The first display was persisted before the sink's stop signal applied.
    assert_eq!(ledger.get("quotes").unwrap(), Some(0));
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let h = harness();
    h.catalog
        .ingest(&[quotes_category(&["q1", "q2", "q3", "q4"])])
        .unwrap();

    h.scheduler.start("quotes", true).await.unwrap();

    let mut last_seen: i64 = -1;
    let deadline = tokio::time::Instant::now() + TICK * 12;
    while tokio::time::Instant::now() < deadline {
        if let Some(index) = h.ledger.get("quotes").unwrap() {
            let index = index as i64;
            assert!(index >= last_seen, "cursor must never move backwards");
            last_seen = index;
        }
        if h.scheduler.active_categories().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.ledger.get("quotes").unwrap(), Some(3));
}
