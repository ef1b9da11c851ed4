//! 🔬 Extractors — where the payload comes from.
//!
//! The sink has the record. The extractor has the content. The worker introduces
//! them to each other, once per item, and then goes back to pretending it doesn't
//! care how the conversation went. (It does. It counts the failures.)
//!
//! Same trait → concrete impls → enum dispatcher → `from_config` pattern as the sinks.
//! Ancient proverb: "He who hardcodes the extractor, re-extracts in production." 🦆

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::ExtractorConfig;
use crate::common::OwnerContext;

pub(crate) mod http;
pub(crate) mod in_mem;

pub use http::{HttpExtractor, HttpExtractorConfig};
pub use in_mem::InMemoryExtractor;

/// 🔬 Compute the payload for one item.
///
/// # Contract 📜
/// - One call per item whose record exists. Errors are per-item: the worker swaps in
///   an empty payload and moves on.
/// - `&self`, `Send + Sync`: one extractor serves every worker at once.
#[async_trait]
pub trait Extractor: std::fmt::Debug + Send + Sync {
    async fn extract(&self, owner: &OwnerContext, item_id: &str) -> Result<String>;
}

/// 🎭 The many faces of an Extractor, resolved from config.
#[derive(Debug, Clone)]
pub enum ExtractorBackend {
    InMemory(InMemoryExtractor),
    Http(HttpExtractor),
}

impl ExtractorBackend {
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        Ok(match config {
            ExtractorConfig::InMemory(()) => ExtractorBackend::InMemory(InMemoryExtractor::new()),
            ExtractorConfig::Http(http) => ExtractorBackend::Http(HttpExtractor::new(http.clone())?),
        })
    }
}

#[async_trait]
impl Extractor for ExtractorBackend {
    async fn extract(&self, owner: &OwnerContext, item_id: &str) -> Result<String> {
        match self {
            ExtractorBackend::InMemory(e) => e.extract(owner, item_id).await,
            ExtractorBackend::Http(e) => e.extract(owner, item_id).await,
        }
    }
}
