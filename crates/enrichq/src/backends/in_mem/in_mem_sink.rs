use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::Sink;
use crate::common::SinkRecord;

/// 📦 A sink that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// Records live in a `HashMap` behind an `Arc<Mutex<...>>`. Every bulk write is also
/// appended to a log so tests can assert "exactly one write, with exactly these ten
/// records" without squinting.
///
/// 🧠 Knowledge graph:
/// - `insert_after_misses` parks a record that only becomes visible after N fetches
///   asked for it and came back empty. Upstream lag, simulated.
/// - `set_fail_writes(true)` makes every bulk write fail. For the sad-path tests.
///
/// Clone-able because tests need to peek inside after handing a clone to the supervisor.
/// The `Arc` means everyone shares the same map. The borrow checker approved. Barely.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    records: Arc<Mutex<HashMap<String, SinkRecord>>>,
    /// 🔒 id → (record, misses left before it shows up)
    not_yet_materialized: Arc<Mutex<HashMap<String, (SinkRecord, usize)>>>,
    bulk_writes: Arc<Mutex<Vec<Vec<SinkRecord>>>>,
    multi_get_calls: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemorySink {
    /// 🚀 An empty sink, full of potential, unmarred by records.
    pub fn new() -> Self {
        Self::default()
    }

    /// 📥 Put a record in, visible immediately.
    pub async fn insert(&self, record: SinkRecord) {
        self.records.lock().await.insert(record.id.clone(), record);
    }

    /// ⏳ Put a record in that stays invisible for the next `misses` fetches of its id.
    pub async fn insert_after_misses(&self, record: SinkRecord, misses: usize) {
        if misses == 0 {
            self.insert(record).await;
            return;
        }
        self.not_yet_materialized
            .lock()
            .await
            .insert(record.id.clone(), (record, misses));
    }

    /// 🔍 Current state of one record.
    pub async fn get(&self, id: &str) -> Option<SinkRecord> {
        self.records.lock().await.get(id).cloned()
    }

    /// 📜 Every bulk write that made it through, in arrival order.
    pub async fn bulk_writes(&self) -> Vec<Vec<SinkRecord>> {
        self.bulk_writes.lock().await.clone()
    }

    pub fn multi_get_calls(&self) -> usize {
        self.multi_get_calls.load(Ordering::Acquire)
    }

    /// 💀 Flip the "every bulk write explodes" switch.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn multi_get(&self, ids: &[String]) -> Result<HashMap<String, SinkRecord>> {
        self.multi_get_calls.fetch_add(1, Ordering::AcqRel);

        let mut records = self.records.lock().await;
        let mut lagging = self.not_yet_materialized.lock().await;
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = records.get(id) {
                found.insert(id.clone(), record.clone());
                continue;
            }
            // ⏳ a miss counts down the lag; at zero it lands for the next caller
            if let Some((_, misses_left)) = lagging.get_mut(id) {
                *misses_left -= 1;
                if *misses_left == 0 {
                    if let Some((record, _)) = lagging.remove(id) {
                        records.insert(id.clone(), record);
                    }
                }
            }
        }
        Ok(found)
    }

    async fn bulk_write(&self, batch: Vec<SinkRecord>) -> Result<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            bail!(
                "💀 The in-memory sink was told to fail writes, and it is nothing if not obedient. \
                 {} record(s) bounced.",
                batch.len()
            );
        }
        // 🔒 The Mutex is load-bearing. Do not remove. I know it looks optional. It isn't.
        let mut records = self.records.lock().await;
        for record in &batch {
            records.insert(record.id.clone(), record.clone());
        }
        drop(records);
        self.bulk_writes.lock().await.push(batch);
        Ok(())
    }
}
