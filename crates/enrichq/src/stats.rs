// AI
//! 📊 stats.rs — "Is it doing anything?" — every operator, every time, forever.
//!
//! 🚀 Lock-free counters bumped by the loop and the workers, a plain snapshot for
//! assertions and logs, and a table so comfy it has lumbar support for the CLI.
//!
//! ⚠️ Watching these numbers will not make them go up faster. We've tried.

use std::sync::atomic::{AtomicU64, Ordering};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;

/// 📊 Counters for everything that can happen to a job or a chunk.
#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    pub(crate) jobs_enqueued: AtomicU64,
    pub(crate) chunks_pooled: AtomicU64,
    pub(crate) chunks_inline: AtomicU64,
    pub(crate) records_written: AtomicU64,
    pub(crate) requeued: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) extractor_failures: AtomicU64,
    pub(crate) bulk_write_failures: AtomicU64,
    pub(crate) multi_get_failures: AtomicU64,
    pub(crate) chunks_cancelled: AtomicU64,
    pub(crate) jobs_discarded: AtomicU64,
}

/// 📸 A frozen moment of `DispatchStats`. Plain numbers, no atomics, no feelings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub jobs_enqueued: u64,
    pub chunks_pooled: u64,
    pub chunks_inline: u64,
    pub records_written: u64,
    pub requeued: u64,
    pub dropped: u64,
    pub extractor_failures: u64,
    pub bulk_write_failures: u64,
    pub multi_get_failures: u64,
    pub chunks_cancelled: u64,
    pub jobs_discarded: u64,
}

impl DispatchStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            jobs_enqueued: load(&self.jobs_enqueued),
            chunks_pooled: load(&self.chunks_pooled),
            chunks_inline: load(&self.chunks_inline),
            records_written: load(&self.records_written),
            requeued: load(&self.requeued),
            dropped: load(&self.dropped),
            extractor_failures: load(&self.extractor_failures),
            bulk_write_failures: load(&self.bulk_write_failures),
            multi_get_failures: load(&self.multi_get_failures),
            chunks_cancelled: load(&self.chunks_cancelled),
            jobs_discarded: load(&self.jobs_discarded),
        }
    }
}

impl StatsSnapshot {
    fn rows(&self) -> [(&'static str, u64); 11] {
        [
            ("📥 jobs enqueued", self.jobs_enqueued),
            ("🧵 chunks on pool", self.chunks_pooled),
            ("🏃 chunks inline", self.chunks_inline),
            ("✅ records written", self.records_written),
            ("🔄 requeued", self.requeued),
            ("🗑️ dropped", self.dropped),
            ("🔬 extractor failures", self.extractor_failures),
            ("💀 bulk write failures", self.bulk_write_failures),
            ("📡 multi-get failures", self.multi_get_failures),
            ("🛑 chunks cancelled", self.chunks_cancelled),
            ("🚮 jobs discarded", self.jobs_discarded),
        ]
    }

    /// 🍽️ Render as a two-column table for humans at terminals.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["metric", "count"]);
        for (label, value) in self.rows() {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_counters_freeze_into_a_snapshot() {
        let stats = DispatchStats::default();
        DispatchStats::bump(&stats.requeued);
        DispatchStats::add(&stats.records_written, 10);

        let snap = stats.snapshot();
        assert_eq!(snap.requeued, 1);
        assert_eq!(snap.records_written, 10);
        assert_eq!(snap.dropped, 0);
    }

    #[test]
    fn the_one_where_the_table_mentions_every_metric() {
        let snap = StatsSnapshot {
            records_written: 1234,
            ..StatsSnapshot::default()
        };
        let rendered = snap.render_table();
        assert!(rendered.contains("records written"));
        assert!(rendered.contains("1234"));
        assert!(rendered.contains("jobs discarded"));
    }
}
