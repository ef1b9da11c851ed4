//! 🔌 Backends — where the records actually live.
//!
//! 🕳️ A Sink holds the records we enrich. We ask it for a pile of them at once
//! (multi-get), we hand back a pile of enriched ones at once (bulk write), and
//! in between we try very hard not to talk to it.
//!
//! 🎭 Same casting agency as always: a trait, a couple of concrete sinks, and an
//! enum that dispatches to them so the supervisor never has to know whether the
//! records sit in RAM or in a cluster of overworked Elasticsearch nodes.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::SinkConfig;
use crate::common::SinkRecord;

pub(crate) mod elasticsearch;
pub(crate) mod in_mem;

pub use elasticsearch::{ElasticsearchSink, ElasticsearchSinkConfig};
pub use in_mem::InMemorySink;

/// 🕳️ The external store holding records to enrich.
///
/// # Contract 📜
/// - `multi_get` fetches many ids in one call. Missing ids are simply absent from
///   the map. Absent is an answer, not an error.
/// - `bulk_write` is all-or-nothing from the caller's point of view. Partial success
///   is the sink's own business to collapse into `Ok` or `Err`.
/// - `&self`, `Send + Sync`: one sink is shared by every worker at once.
#[async_trait]
pub trait Sink: std::fmt::Debug + Send + Sync {
    /// 📥 Fetch the current records for `ids`. One call per chunk.
    async fn multi_get(&self, ids: &[String]) -> Result<HashMap<String, SinkRecord>>;
    /// 📤 Write every record back in one request.
    async fn bulk_write(&self, records: Vec<SinkRecord>) -> Result<()>;
}

/// 🎭 The many faces of a Sink, resolved from config.
#[derive(Debug, Clone)]
pub enum SinkBackend {
    InMemory(InMemorySink),
    Elasticsearch(ElasticsearchSink),
}

impl SinkBackend {
    /// 🔧 Build the configured sink. Elasticsearch checks the index exists up front,
    /// so a typo fails here and not ten thousand records later.
    pub async fn from_config(config: &SinkConfig) -> Result<Self> {
        Ok(match config {
            SinkConfig::InMemory(()) => SinkBackend::InMemory(InMemorySink::new()),
            SinkConfig::Elasticsearch(es) => {
                SinkBackend::Elasticsearch(ElasticsearchSink::new(es.clone()).await?)
            }
        })
    }
}

#[async_trait]
impl Sink for SinkBackend {
    async fn multi_get(&self, ids: &[String]) -> Result<HashMap<String, SinkRecord>> {
        match self {
            SinkBackend::InMemory(sink) => sink.multi_get(ids).await,
            SinkBackend::Elasticsearch(sink) => sink.multi_get(ids).await,
        }
    }

    async fn bulk_write(&self, records: Vec<SinkRecord>) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.bulk_write(records).await,
            SinkBackend::Elasticsearch(sink) => sink.bulk_write(records).await,
        }
    }
}
