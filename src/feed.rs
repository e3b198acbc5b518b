//! Catalog feed: external source of categories and items.
//!
//! The feed format is a JSON array of categories, each with a list of items:
//!
//! ```json
//! [{"name": "quotes", "items": [{"name": "q1", "type": "text", "content": "..."}]}]
//! ```
//!
//! Fetching and ingesting are caller-driven (CLI); the scheduler never talks
//! to the feed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Category, Item, ItemKind};

/// Errors reported while loading a feed
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read feed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse feed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Wire form of a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryFeed {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemFeed>,
}

/// Wire form of an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFeed {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub content: String,
}

impl From<CategoryFeed> for Category {
    fn from(feed: CategoryFeed) -> Self {
        Category {
            name: feed.name,
            items: feed
                .items
                .into_iter()
                .map(|item| Item {
                    name: item.name,
                    kind: ItemKind::parse(&item.kind),
                    content: item.content.into_bytes(),
                })
                .collect(),
        }
    }
}

/// Fetch a catalog from an HTTP feed
pub async fn fetch_catalog(url: &str) -> Result<Vec<Category>, FeedError> {
    let feed: Vec<CategoryFeed> = reqwest::get(url)
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(feed.into_iter().map(Into::into).collect())
}

/// Read a catalog from a local JSON file
pub async fn read_catalog_file(path: &Path) -> Result<Vec<Category>, FeedError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let feed: Vec<CategoryFeed> = serde_json::from_str(&raw)?;
    Ok(feed.into_iter().map(Into::into).collect())
}
