//! Display sink boundary.
//!
//! The scheduler hands each due item to a sink and moves on; rendering
//! failures are the sink's to report but never stop playback.

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::{Item, ItemKind};

/// A sink-reported rendering failure. Non-fatal to scheduling.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DisplayError(pub String);

/// Consumer that renders one item to the user.
///
/// The returned bool reports whether the sink believes more items remain for
/// the category; the scheduler uses it only as a secondary exhaustion signal
/// on top of its own index arithmetic. Sinks without that knowledge should
/// return true.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn show(&self, category: &str, item: &Item) -> Result<bool, DisplayError>;
}

/// Sink that renders items to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

#[async_trait]
impl DisplaySink for ConsoleSink {
    async fn show(&self, category: &str, item: &Item) -> Result<bool, DisplayError> {
        let body = match &item.kind {
            ItemKind::Text | ItemKind::Link => {
                let text = std::str::from_utf8(&item.content).map_err(|_| {
                    DisplayError(format!("{} content of {} is not UTF-8", item.kind, item.name))
                })?;
                text.to_string()
            }
            ItemKind::Image => format!("[image, {} bytes]", item.content.len()),
            ItemKind::Other(kind) => format!("[this is a/an {kind}]"),
        };

        println!("[{category}] {}: {body}", item.name);
        Ok(true)
    }
}
