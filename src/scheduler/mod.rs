//! Playback scheduler: one timer task per active category.
//!
//! Each started category owns an independent tokio task that, on every tick,
//! shows the next item through the display sink, persists the new cursor in
//! the progress ledger, and then either keeps going, stops because the
//! category is exhausted, or stops because it was cancelled. Tasks share
//! nothing but the durable store; the scheduler serializes all mutations of
//! the active-task set through one async mutex, so at most one task per
//! category can ever exist.
//!
//! Consistency note: the cursor is persisted after the sink is invoked, and
//! neither a sink failure nor a persistence failure stops the task. A crash
//! between display and persist can therefore re-show one item on restart
//! (at-least-once display).

pub mod sink;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::catalog::{validate_name, Catalog, CatalogError, Item};
use crate::progress::ProgressLedger;
use crate::store::StoreError;

pub use sink::{ConsoleSink, DisplayError, DisplaySink};

/// Default playback interval between items
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Errors reported by the scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a `start` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A playback task was spawned; `remaining` items are still unplayed
    Started { remaining: usize },

    /// The category already has an active task
    AlreadyRunning,

    /// The category has no items to play
    NoItems,

    /// Every item has already been played and progress was never reset
    Finished,
}

/// Why a playback task exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    Exhausted,
    Cancelled,
}

struct ActivePlayback {
    gen: u64,
    stop_tx: mpsc::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

type ActiveSet = Arc<Mutex<HashMap<String, ActivePlayback>>>;

/// Per-category playback state machine driver
pub struct Scheduler {
    catalog: Catalog,
    ledger: ProgressLedger,
    sink: Arc<dyn DisplaySink>,
    interval: Duration,
    active: ActiveSet,
    generation: AtomicU64,
}

impl Scheduler {
    pub fn new(
        catalog: Catalog,
        ledger: ProgressLedger,
        sink: Arc<dyn DisplaySink>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            ledger,
            sink,
            interval,
            active: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Start playback for a category. At most one task per category may be
    /// active: a second start while one is running reports `AlreadyRunning`
    /// and changes nothing. With `immediate`, the first item is shown before
    /// the first interval elapses instead of after it.
    pub async fn start(
        &self,
        category: &str,
        immediate: bool,
    ) -> Result<StartOutcome, SchedulerError> {
        validate_name(category)?;

        let items = self.catalog.items_of(category)?;
        if items.is_empty() {
            return Ok(StartOutcome::NoItems);
        }

        let next = match self.ledger.get(category)? {
            Some(last) => last as usize + 1,
            None => 0,
        };
        if next >= items.len() {
            return Ok(StartOutcome::Finished);
        }
        let remaining = items.len() - next;

        // Hold the lock across the check and the insert so concurrent starts
        // for the same category resolve first-wins.
        let mut active = self.active.lock().await;
        if active.contains_key(category) {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let gen = self.generation.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let task = PlaybackTask {
            category: category.to_string(),
            items,
            next,
            gen,
            ledger: self.ledger.clone(),
            sink: Arc::clone(&self.sink),
            interval: self.interval,
            active: Arc::clone(&self.active),
        };
        let handle = tokio::spawn(task.run(stop_rx, immediate));

        active.insert(
            category.to_string(),
            ActivePlayback {
                gen,
                stop_tx,
                handle,
            },
        );
        info!(%category, remaining, immediate, "playback started");

        Ok(StartOutcome::Started { remaining })
    }

    /// Cancel playback for a category and clear its recorded progress, so a
    /// later start begins again at the first item. Returns whether a task
    /// was actually running. Clearing progress for a category with no active
    /// task is allowed; it resets a finished category for replay.
    pub async fn cancel(&self, category: &str) -> Result<bool, SchedulerError> {
        validate_name(category)?;

        let entry = self.active.lock().await.remove(category);
        let was_running = entry.is_some();
        if let Some(entry) = entry {
            // Cooperative stop: the task finishes any in-flight display,
            // observes the signal, and exits without scheduling another
            // tick. Waiting for it keeps a final progress write from
            // landing after the clear below.
            let _ = entry.stop_tx.send(()).await;
            let _ = entry.handle.await;
        }

        self.ledger.clear(category)?;
        info!(%category, was_running, "playback cancelled, progress cleared");
        Ok(was_running)
    }

    /// Start every category whose recorded progress still has unplayed
    /// items. Called once on startup; categories whose items can no longer
    /// be found are skipped with a warning. Returns the started names.
    pub async fn resume_all(&self) -> Result<Vec<String>, SchedulerError> {
        let progress = self.ledger.all()?;
        let mut resumed = Vec::new();

        for category in progress.into_keys() {
            match self.start(&category, false).await {
                Ok(StartOutcome::Started { remaining }) => {
                    info!(%category, remaining, "resumed playback");
                    resumed.push(category);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%category, error = %e, "failed to resume category");
                }
            }
        }

        resumed.sort();
        Ok(resumed)
    }

    /// Names of categories with an active playback task
    pub async fn active_categories(&self) -> Vec<String> {
        let active = self.active.lock().await;
        let mut names: Vec<String> = active.keys().cloned().collect();
        names.sort();
        names
    }

    /// Abort all playback tasks without clearing any progress, so the next
    /// process start resumes where each category left off.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, ActivePlayback)> =
            self.active.lock().await.drain().collect();

        for (category, entry) in entries {
            entry.handle.abort();
            let _ = entry.handle.await;
            info!(%category, "playback task stopped for shutdown");
        }
    }
}

/// State owned by one category's playback task
struct PlaybackTask {
    category: String,
    items: Vec<Item>,
    next: usize,
    gen: u64,
    ledger: ProgressLedger,
    sink: Arc<dyn DisplaySink>,
    interval: Duration,
    active: ActiveSet,
}

impl PlaybackTask {
    async fn run(mut self, mut stop_rx: mpsc::Receiver<()>, immediate: bool) {
        if immediate && !self.show_next().await {
            self.finish(ExitReason::Exhausted).await;
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; consume it so the
        // first timed display happens one full interval from now.
        ticker.tick().await;

        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.show_next().await {
                        break ExitReason::Exhausted;
                    }
                }
                _ = stop_rx.recv() => break ExitReason::Cancelled,
            }
        };

        self.finish(reason).await;
    }

    /// Show the item at the cursor and advance. Returns false when the
    /// category has nothing further to play.
    async fn show_next(&mut self) -> bool {
        if self.next >= self.items.len() {
            return false;
        }
        let item = &self.items[self.next];

        // Display outcome does not gate advancement: an attempted display
        // counts as shown.
        let has_more = match self.sink.show(&self.category, item).await {
            Ok(more) => more,
            Err(e) => {
                warn!(
                    category = %self.category,
                    item = %item.name,
                    error = %e,
                    "display failed, advancing anyway"
                );
                true
            }
        };

        if let Err(e) = self.ledger.set(&self.category, self.next as u32) {
            // The in-memory cursor still advances; a crash before the next
            // successful persist re-shows this item on restart.
            error!(
                category = %self.category,
                index = self.next,
                error = %e,
                "failed to persist playback progress"
            );
        }
        self.next += 1;

        self.next < self.items.len() && has_more
    }

    /// Finalization for every exit path: drop this task from the active set.
    /// The generation guard keeps a stale task from evicting a successor
    /// started after it was cancelled.
    async fn finish(&self, reason: ExitReason) {
        let mut active = self.active.lock().await;
        if active.get(&self.category).map(|a| a.gen) == Some(self.gen) {
            active.remove(&self.category);
        }
        match reason {
            ExitReason::Exhausted => {
                info!(category = %self.category, "all items played, task removed")
            }
            ExitReason::Cancelled => {
                info!(category = %self.category, "playback task cancelled")
            }
        }
    }
}
