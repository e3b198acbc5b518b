//! recap - persistent reminder playback engine
//!
//! recap stores categorized reminder items (text, images, links) in an
//! embedded transactional database and plays them back one at a time on a
//! fixed interval, one independent timer task per category. The last played
//! index of every category is persisted after each display, so playback
//! resumes where it left off after a restart.
//!
//! # Architecture
//!
//! - `store`: durable store adapter over redb (buckets, scoped transactions)
//! - `catalog`: category → item repository with persisted insertion order
//! - `progress`: durable per-category playback cursor
//! - `scheduler`: per-category timer tasks, cancellation, resume
//! - `feed`: HTTP/file catalog source feeding ingestion
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Ingest a catalog and play a category
//! recap ingest catalog.json
//! recap play quotes --immediate
//!
//! # Inspect state
//! recap categories
//! recap progress
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod feed;
pub mod progress;
pub mod scheduler;
pub mod store;

// Re-export main types at crate root for convenience
pub use catalog::{Catalog, CatalogError, Category, IngestReport, Item, ItemKind};
pub use progress::ProgressLedger;
pub use scheduler::{
    ConsoleSink, DisplayError, DisplaySink, Scheduler, SchedulerError, StartOutcome,
};
pub use store::{Bucket, Store, StoreError};
