//! Catalog of reminder categories and their playable items.
//!
//! The catalog maps {category → {item → (kind, content)}} onto the durable
//! store. Playback order is first-insertion order: every new item name is
//! assigned a monotonic per-category sequence number, and the big-endian
//! sequence key makes the store's lexicographic scan return items exactly in
//! the order they were first ingested. Re-ingesting an existing item name
//! overwrites its kind and content without touching its position.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Bucket, Store, StoreError, WriteView};

/// Registry of category names that have been explicitly ingested. Kept
/// separate from the item buckets so internal namespaces (progress, counters)
/// never surface as categories.
const REGISTRY: &str = "categories";

/// Per-category insertion-order index: u64 big-endian seq → item name.
const ORDER: &str = "order";

/// Per-item record bucket holding the `kind` and `content` keys.
const ITEM: &str = "item";

/// Per-category insertion sequence counters.
const SEQ: &str = "seq";

const KIND_KEY: &[u8] = b"kind";
const CONTENT_KEY: &[u8] = b"content";

/// Errors reported by the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("category and item names cannot be empty")]
    EmptyName,

    #[error("category and item names cannot contain NUL bytes")]
    InvalidName,

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("corrupt catalog record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The kind of content an item carries. Stored as a lowercase string;
/// unrecognized kinds are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    Text,
    Image,
    Link,
    Other(String),
}

impl ItemKind {
    /// Parse a kind string, case-insensitively
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "link" => Self::Link,
            other => Self::Other(other.to_string()),
        }
    }

    /// Lowercase string form, as persisted
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Link => "link",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ItemKind {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ItemKind> for String {
    fn from(kind: ItemKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One playable unit of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Item name, unique within its category
    pub name: String,

    /// Content kind (text, image, link, ...)
    pub kind: ItemKind,

    /// Opaque content bytes
    pub content: Vec<u8>,
}

/// A named group of items, as handed to `ingest`
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub items: Vec<Item>,
}

/// Summary of an ingest batch
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Categories written successfully
    pub categories: usize,

    /// Items upserted across successful categories
    pub items: usize,

    /// Names of categories whose transaction failed
    pub failed: Vec<String>,
}

/// Catalog repository over the durable store
#[derive(Clone)]
pub struct Catalog {
    store: Arc<Store>,
}

impl Catalog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// All ingested category names, lexicographically ordered
    pub fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        let registry = Bucket::new(&[REGISTRY]);
        self.store.read(|r| {
            let mut names = Vec::new();
            for (key, _) in r.scan(&registry)? {
                let name = String::from_utf8(key)
                    .map_err(|_| CatalogError::Corrupt("category name is not UTF-8".into()))?;
                names.push(name);
            }
            Ok(names)
        })
    }

    /// Items of a category in first-insertion order. Fails with
    /// `UnknownCategory` if the category has never been ingested.
    pub fn items_of(&self, category: &str) -> Result<Vec<Item>, CatalogError> {
        validate_name(category)?;

        let registry = Bucket::new(&[REGISTRY]);
        let order = Bucket::new(&[ORDER, category]);

        self.store.read(|r| {
            if r.get(&registry, category.as_bytes())?.is_none() {
                return Err(CatalogError::UnknownCategory(category.to_string()));
            }

            let mut items = Vec::new();
            for (_, name_bytes) in r.scan(&order)? {
                let name = String::from_utf8(name_bytes)
                    .map_err(|_| CatalogError::Corrupt("item name is not UTF-8".into()))?;
                let item_bucket = Bucket::new(&[ITEM, category, name.as_str()]);

                let kind_bytes = r.get(&item_bucket, KIND_KEY)?.ok_or_else(|| {
                    CatalogError::Corrupt(format!("item {category}/{name} has no kind record"))
                })?;
                let kind = ItemKind::parse(&String::from_utf8_lossy(&kind_bytes));
                let content = r.get(&item_bucket, CONTENT_KEY)?.unwrap_or_default();

                items.push(Item {
                    name,
                    kind,
                    content,
                });
            }
            Ok(items)
        })
    }

    /// Ingest a batch of categories, one write transaction per category.
    /// A failing category aborts only its own transaction; the rest of the
    /// batch proceeds and the failure is reported in the returned summary.
    pub fn ingest(&self, categories: &[Category]) -> Result<IngestReport, CatalogError> {
        for category in categories {
            validate_name(&category.name)?;
            for item in &category.items {
                validate_name(&item.name)?;
            }
        }

        let mut report = IngestReport::default();
        for category in categories {
            match self.ingest_category(category) {
                Ok(count) => {
                    report.categories += 1;
                    report.items += count;
                }
                Err(e) => {
                    tracing::warn!(category = %category.name, error = %e, "category ingest failed");
                    report.failed.push(category.name.clone());
                }
            }
        }
        Ok(report)
    }

    fn ingest_category(&self, category: &Category) -> Result<usize, CatalogError> {
        let registry = Bucket::new(&[REGISTRY]);
        let order = Bucket::new(&[ORDER, category.name.as_str()]);
        let seq_bucket = Bucket::new(&[SEQ]);

        self.store.write(|w| {
            w.put(
                &registry,
                category.name.as_bytes(),
                Utc::now().to_rfc3339().as_bytes(),
            )?;

            for item in &category.items {
                let item_bucket = Bucket::new(&[ITEM, category.name.as_str(), item.name.as_str()]);

                // Only a first-time name gets an order entry; upserts keep
                // the original position.
                if w.get(&item_bucket, KIND_KEY)?.is_none() {
                    let seq = next_seq(w, &seq_bucket, &category.name)?;
                    w.put(&order, &seq.to_be_bytes(), item.name.as_bytes())?;
                }

                w.put(&item_bucket, KIND_KEY, item.kind.as_str().as_bytes())?;
                w.put(&item_bucket, CONTENT_KEY, &item.content)?;
            }
            Ok(category.items.len())
        })
    }
}

/// Allocate the next insertion sequence number for a category
fn next_seq(
    w: &mut WriteView<'_>,
    seq_bucket: &Bucket,
    category: &str,
) -> Result<u64, CatalogError> {
    let current = match w.get(seq_bucket, category.as_bytes())? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CatalogError::Corrupt(format!("bad sequence counter for {category}")))?;
            u64::from_be_bytes(raw)
        }
        None => 0,
    };
    w.put(seq_bucket, category.as_bytes(), &(current + 1).to_be_bytes())?;
    Ok(current)
}

/// Reject empty names and names the key encoding cannot represent
pub(crate) fn validate_name(name: &str) -> Result<(), CatalogError> {
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    if name.as_bytes().contains(&0) {
        return Err(CatalogError::InvalidName);
    }
    Ok(())
}
