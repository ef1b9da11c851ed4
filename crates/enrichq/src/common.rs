// ai
//! 📦 Common data structures — the building blocks of enrichq
//!
//! 🎬 COLD OPEN — INT. MAIL INDEX — 3:47 AM
//!
//! A record sits in the sink. It has a subject. It has a sender. It does not
//! have a body, because the body lives somewhere else and nobody has fetched it
//! yet. The record is waiting. The record has been waiting since Tuesday.
//!
//! ✅ Then a `Job` shows up, holding an `item_id`, a `sink_record_id` and a
//! `group_key`, like a courier with a clipboard. It knows where the record is.
//! It knows who owns it. It gets one retry if the record hasn't shown up yet.
//! One. We are generous, not infinite. 🦆
//!
//! This module defines the humble structs that ferry enrichment work from the
//! producers to the workers and back into the sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 🔒 Who owns the item. Passed to the sink and the extractor untouched.
///
/// Three numbers walk into a tuple. None of them change. Ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct OwnerContext {
    pub tenant_id: i64,
    pub user_id: i64,
    pub account_id: i64,
}

impl OwnerContext {
    pub fn new(tenant_id: i64, user_id: i64, account_id: i64) -> Self {
        Self {
            tenant_id,
            user_id,
            account_id,
        }
    }
}

/// 🎯 One unit of enrichment work.
///
/// Immutable once created, with the single exception of `retry_count`, which
/// goes from 0 to 1 exactly once via [`Job::into_retry`] and then never moves
/// again. Like a teenager's bedroom door: opens once, slams, stays shut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// 📂 Jobs sharing this key get chunked together (folder, bucket, whatever).
    pub group_key: String,
    pub owner: OwnerContext,
    /// 🔧 The item the extractor knows about.
    pub item_id: String,
    /// 🔧 The key the sink stores the record under. May differ from `item_id`.
    pub sink_record_id: String,
    #[serde(default)]
    pub retry_count: u32,
}

impl Job {
    /// 🚀 A fresh job, zero retries spent.
    pub fn new(
        group_key: impl Into<String>,
        owner: OwnerContext,
        item_id: impl Into<String>,
        sink_record_id: impl Into<String>,
    ) -> Self {
        Self {
            group_key: group_key.into(),
            owner,
            item_id: item_id.into(),
            sink_record_id: sink_record_id.into(),
            retry_count: 0,
        }
    }

    /// 🔄 Spend the one and only retry.
    ///
    /// Returns the job with `retry_count = 1` on the first miss, `None` once the
    /// budget is gone. There is no third act.
    pub fn into_retry(self) -> Option<Self> {
        if self.retry_count >= 1 {
            return None;
        }
        Some(Self {
            retry_count: 1,
            ..self
        })
    }
}

/// 📄 A record as the sink holds it: an id plus an opaque JSON document.
///
/// Absent vs. present is meaningful. Absent = "upstream hasn't materialized it
/// yet", which is why a miss gets one retry instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SinkRecord {
    pub id: String,
    pub doc: Map<String, Value>,
}

impl SinkRecord {
    pub fn new(id: impl Into<String>, doc: Map<String, Value>) -> Self {
        Self { id: id.into(), doc }
    }

    /// 🧬 Overwrite `field` with `payload`. Running it twice changes nothing the
    /// second time, which is the whole point.
    pub fn merge_payload(&mut self, field: &str, payload: String) {
        self.doc.insert(field.to_string(), Value::String(payload));
    }

    /// 🔍 Peek at the payload field, if it's a string.
    pub fn payload(&self, field: &str) -> Option<&str> {
        self.doc.get(field).and_then(Value::as_str)
    }
}

/// 📦 A bounded, ordered, non-empty slice of same-group jobs.
///
/// The unit of admission and of worker execution. Never split once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub group_key: String,
    pub jobs: Vec<Job>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 🔧 The ids to multi-get, in job order, duplicates collapsed.
    pub fn sink_record_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::with_capacity(self.jobs.len());
        self.jobs
            .iter()
            .filter(|job| seen.insert(job.sink_record_id.as_str()))
            .map(|job| job.sink_record_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a_job() -> Job {
        Job::new("INBOX", OwnerContext::new(1, 2, 0), "item-1", "rec-1")
    }

    #[test]
    fn the_one_where_a_job_gets_exactly_one_second_chance() {
        let job = a_job();
        assert_eq!(job.retry_count, 0);

        let retried = job.into_retry().expect("💀 first miss must earn a retry");
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.item_id, "item-1");

        assert!(
            retried.into_retry().is_none(),
            "💀 the retry budget is one. not two. not 'one more'."
        );
    }

    #[test]
    fn the_one_where_merging_twice_is_the_same_as_merging_once() {
        let mut doc = Map::new();
        doc.insert("subject".into(), Value::String("hi".into()));
        let mut record = SinkRecord::new("rec-1", doc);

        record.merge_payload("content", "body text".into());
        let once = record.clone();
        record.merge_payload("content", "body text".into());

        assert_eq!(record, once);
        assert_eq!(record.payload("content"), Some("body text"));
        assert_eq!(record.doc.get("subject"), Some(&Value::String("hi".into())));
    }

    #[test]
    fn the_one_where_duplicate_record_ids_get_fetched_once() {
        let mut twin = a_job();
        twin.item_id = "item-2".into();
        let chunk = Chunk {
            group_key: "INBOX".into(),
            jobs: vec![a_job(), twin],
        };
        assert_eq!(chunk.sink_record_ids(), vec!["rec-1".to_string()]);
    }

    #[test]
    fn the_one_where_jobs_deserialize_without_a_retry_count() {
        let raw = r#"{"group_key":"g","owner":{"tenant_id":1,"user_id":2,"account_id":3},"item_id":"i","sink_record_id":"r"}"#;
        let job: Job = serde_json::from_str(raw).expect("💀 job json should parse");
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.owner, OwnerContext::new(1, 2, 3));
    }
}
