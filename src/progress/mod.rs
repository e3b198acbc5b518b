//! Durable per-category playback cursor.
//!
//! The ledger is a dumb durable map {category → last played index}; absence
//! means the category has never been started. Indexes are persisted as
//! decimal text so the database stays inspectable. Bounds checking is the
//! scheduler's job, not the ledger's.

use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{Bucket, Store, StoreError};

const PROGRESS: &str = "progress";

/// Progress ledger over the durable store
#[derive(Clone)]
pub struct ProgressLedger {
    store: Arc<Store>,
}

impl ProgressLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn bucket() -> Bucket {
        Bucket::new(&[PROGRESS])
    }

    /// All recorded cursors. Records that fail to parse are skipped with a
    /// warning rather than failing the whole read.
    pub fn all(&self) -> Result<HashMap<String, u32>, StoreError> {
        self.store.read(|r| {
            let mut progress = HashMap::new();
            for (key, value) in r.scan(&Self::bucket())? {
                let category = match String::from_utf8(key) {
                    Ok(name) => name,
                    Err(_) => {
                        tracing::warn!("skipping progress record with non-UTF-8 category key");
                        continue;
                    }
                };
                match std::str::from_utf8(&value).ok().and_then(|s| s.parse().ok()) {
                    Some(index) => {
                        progress.insert(category, index);
                    }
                    None => {
                        tracing::warn!(%category, "skipping unparseable progress record");
                    }
                }
            }
            Ok(progress)
        })
    }

    /// The cursor for one category, if any
    pub fn get(&self, category: &str) -> Result<Option<u32>, StoreError> {
        self.store.read(|r| {
            let value = r.get(&Self::bucket(), category.as_bytes())?;
            Ok(value
                .and_then(|v| String::from_utf8(v).ok())
                .and_then(|s| s.parse().ok()))
        })
    }

    /// Record that `index` was the last played item of `category`,
    /// overwriting any prior value. One atomic transaction.
    pub fn set(&self, category: &str, index: u32) -> Result<(), StoreError> {
        self.store.write(|w| {
            w.put(
                &Self::bucket(),
                category.as_bytes(),
                index.to_string().as_bytes(),
            )
        })
    }

    /// Remove the cursor for `category` entirely. Clearing an absent record
    /// succeeds silently. One atomic transaction.
    pub fn clear(&self, category: &str) -> Result<(), StoreError> {
        self.store
            .write(|w| w.delete(&Self::bucket(), category.as_bytes()))
    }
}
