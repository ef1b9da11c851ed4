//! 📦 A canned extractor for tests and dry runs. Knows a fixed map of item → payload.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::common::OwnerContext;
use crate::extractors::Extractor;

/// 🔬 Looks payloads up in a map. Items in the failure set always error.
/// Items it has never heard of get a generated payload, `"payload:<item_id>"`,
/// so dry runs don't need a fixture for every single item.
#[derive(Debug, Default, Clone)]
pub struct InMemoryExtractor {
    payloads: Arc<RwLock<HashMap<String, String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(self, item_id: impl Into<String>, payload: impl Into<String>) -> Self {
        self.payloads
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(item_id.into(), payload.into());
        self
    }

    pub fn failing_on(self, item_id: impl Into<String>) -> Self {
        self.failing
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(item_id.into());
        self
    }

    /// 📊 How many times `extract` was called. Tests count these.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Extractor for InMemoryExtractor {
    async fn extract(&self, _owner: &OwnerContext, item_id: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let failing = self
            .failing
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(item_id);
        if failing {
            return Err(anyhow!("💀 extraction for item '{item_id}' was rigged to fail"));
        }
        let payload = self
            .payloads
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| format!("payload:{item_id}"));
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_known_unknown_and_cursed_items_all_behave() {
        let extractor = InMemoryExtractor::new()
            .with_payload("known", "hello")
            .failing_on("cursed");
        let owner = OwnerContext::default();

        assert_eq!(extractor.extract(&owner, "known").await.ok().as_deref(), Some("hello"));
        assert_eq!(
            extractor.extract(&owner, "stranger").await.ok().as_deref(),
            Some("payload:stranger")
        );
        assert!(extractor.extract(&owner, "cursed").await.is_err());
        assert_eq!(extractor.calls(), 3);
    }
}
