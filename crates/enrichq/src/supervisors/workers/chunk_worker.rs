//! 🎬 *[a chunk arrives. fifty jobs. one folder. the worker cracks its knuckles.]*
//!
//! 🔬 The ChunkWorker — one chunk in, at most one bulk write out.
//!
//! ```text
//!   multi_get(ids) ──▶ missing? ──▶ retry 0 → requeue with retry 1
//!        │                     └──▶ retry 1 → drop + warn
//!        ▼
//!   extract(owner, item) ──err──▶ empty payload + warn
//!        ▼
//!   merge into record ──▶ one bulk_write for the whole chunk
//! ```
//!
//! The slot permit rides along inside the worker and is dropped when `run` returns,
//! whatever happened on the way. Cancellation is checked before every extractor call
//! and before the bulk write.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::WorkerContext;
use crate::admission::SlotPermit;
use crate::common::{Chunk, SinkRecord};
use crate::stats::DispatchStats;

/// 📋 What happened to one chunk. Mostly for tests and debug logs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ChunkOutcome {
    pub(crate) written: usize,
    pub(crate) requeued: usize,
    pub(crate) dropped: usize,
    pub(crate) extractor_failures: usize,
    pub(crate) write_failed: bool,
    pub(crate) cancelled: bool,
}

#[derive(Debug)]
pub(crate) struct ChunkWorker {
    chunk: Chunk,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
    /// 🎫 `None` only on the caller-runs path when no slot could be had.
    permit: Option<SlotPermit>,
}

impl ChunkWorker {
    pub(crate) fn new(
        chunk: Chunk,
        ctx: Arc<WorkerContext>,
        cancel: CancellationToken,
        permit: Option<SlotPermit>,
    ) -> Self {
        Self {
            chunk,
            ctx,
            cancel,
            permit,
        }
    }

    /// 🚀 Process the chunk. Never returns an error: everything that can go wrong
    /// in here is logged, counted, and contained.
    pub(crate) async fn run(self) -> ChunkOutcome {
        let ChunkWorker {
            chunk,
            ctx,
            cancel,
            permit,
        } = self;
        let slot = permit.as_ref().map(SlotPermit::index);
        trace!(
            "🔬 chunk '{}' ({} jobs) starting in slot {:?}",
            chunk.group_key,
            chunk.len(),
            slot
        );

        let outcome = process(chunk, &ctx, &cancel).await;
        if outcome.cancelled {
            DispatchStats::bump(&ctx.stats.chunks_cancelled);
        }
        // 🗑️ permit dropped here, slot released no matter how we got here
        drop(permit);
        outcome
    }
}

async fn process(chunk: Chunk, ctx: &WorkerContext, cancel: &CancellationToken) -> ChunkOutcome {
    let mut outcome = ChunkOutcome::default();
    if cancel.is_cancelled() {
        outcome.cancelled = true;
        return outcome;
    }

    // 📥 step 1: one multi-get for the whole chunk
    let ids = chunk.sink_record_ids();
    let mut current = match ctx.sink.multi_get(&ids).await {
        Ok(found) => found,
        Err(err) => {
            // 💀 a failed fetch is a chunk-level failure; like a failed write, it is not retried
            error!(
                "💀 multi-get for chunk '{}' ({} ids) failed, chunk skipped: {err:#}",
                chunk.group_key,
                ids.len()
            );
            DispatchStats::bump(&ctx.stats.multi_get_failures);
            return outcome;
        }
    };

    let mut bulk: Vec<SinkRecord> = Vec::with_capacity(current.len());
    for job in chunk.jobs {
        // 🔍 step 2: absent record → one retry, then the door
        let Some(record) = current.get(&job.sink_record_id) else {
            let item_id = job.item_id.clone();
            match job.into_retry() {
                Some(retry) => match ctx.intake.add(retry) {
                    Ok(()) => {
                        outcome.requeued += 1;
                        DispatchStats::bump(&ctx.stats.requeued);
                        trace!("🔄 item '{item_id}' not in sink yet, requeued for its one retry");
                    }
                    Err(err) => {
                        outcome.dropped += 1;
                        DispatchStats::bump(&ctx.stats.dropped);
                        warn!("⚠️ item '{item_id}' missed and could not be requeued: {err:#}");
                    }
                },
                None => {
                    outcome.dropped += 1;
                    DispatchStats::bump(&ctx.stats.dropped);
                    warn!("⚠️ item '{item_id}' still missing after its retry, dropping it");
                }
            }
            continue;
        };
        let mut record = record.clone();

        // 🛑 step boundary: before the extractor
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        // 🔬 step 3: extract, and shrug at failures
        let payload = match ctx.extractor.extract(&job.owner, &job.item_id).await {
            Ok(payload) => payload,
            Err(err) => {
                outcome.extractor_failures += 1;
                DispatchStats::bump(&ctx.stats.extractor_failures);
                warn!(
                    "⚠️ extraction failed for item '{}', merging an empty payload: {err:#}",
                    job.item_id
                );
                String::new()
            }
        };

        // 🧬 step 4: merge and stash for the bulk
        record.merge_payload(&ctx.payload_field, payload);
        current.insert(job.sink_record_id, record.clone());
        bulk.push(record);
    }

    if bulk.is_empty() {
        return outcome;
    }

    // 🛑 step boundary: before the bulk write
    if cancel.is_cancelled() {
        outcome.cancelled = true;
        return outcome;
    }

    // 📤 step 5: exactly one bulk write. Failure is logged, not retried.
    let count = bulk.len();
    match ctx.sink.bulk_write(bulk).await {
        Ok(()) => {
            outcome.written = count;
            DispatchStats::add(&ctx.stats.records_written, count);
            debug!("✅ chunk '{}' wrote {count} record(s)", chunk.group_key);
        }
        Err(err) => {
            outcome.write_failed = true;
            DispatchStats::bump(&ctx.stats.bulk_write_failures);
            error!(
                "💀 bulk write for chunk '{}' ({count} record(s)) failed, not retrying: {err:#}",
                chunk.group_key
            );
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySink;
    use crate::common::{Job, OwnerContext};
    use crate::extractors::{Extractor, InMemoryExtractor};
    use crate::intake::{IntakeReceiver, intake_queue};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FIELD: &str = "content";

    fn context(
        sink: &InMemorySink,
        extractor: &InMemoryExtractor,
    ) -> (Arc<WorkerContext>, IntakeReceiver) {
        context_with(sink, Arc::new(extractor.clone()))
    }

    fn context_with(
        sink: &InMemorySink,
        extractor: Arc<dyn Extractor>,
    ) -> (Arc<WorkerContext>, IntakeReceiver) {
        let (tx, rx) = intake_queue();
        let ctx = Arc::new(WorkerContext {
            sink: Arc::new(sink.clone()),
            extractor,
            intake: tx,
            stats: Arc::new(DispatchStats::default()),
            payload_field: FIELD.to_string(),
        });
        (ctx, rx)
    }

    fn job(item: &str) -> Job {
        Job::new("INBOX", OwnerContext::new(1, 1, 0), item, format!("rec-{item}"))
    }

    fn chunk_of(items: &[&str]) -> Chunk {
        Chunk {
            group_key: "INBOX".into(),
            jobs: items.iter().map(|i| job(i)).collect(),
        }
    }

    async fn seed(sink: &InMemorySink, items: &[&str]) {
        for item in items {
            let mut doc = Map::new();
            doc.insert("subject".into(), Value::String(format!("subject {item}")));
            sink.insert(SinkRecord::new(format!("rec-{item}"), doc)).await;
        }
    }

    #[tokio::test]
    async fn the_one_where_item_x_fails_and_the_other_nine_dont_care() {
        let items = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];
        let sink = InMemorySink::new();
        seed(&sink, &items).await;
        let extractor = InMemoryExtractor::new().failing_on("7");
        let (ctx, _rx) = context(&sink, &extractor);

        let outcome = ChunkWorker::new(chunk_of(&items), ctx, CancellationToken::new(), None)
            .run()
            .await;

        assert_eq!(outcome.written, 10);
        assert_eq!(outcome.extractor_failures, 1);
        let writes = sink.bulk_writes().await;
        assert_eq!(writes.len(), 1, "📤 exactly one bulk write per chunk");
        assert_eq!(writes[0].len(), 10);
        for record in &writes[0] {
            let expected = if record.id == "rec-7" {
                String::new()
            } else {
                format!("payload:{}", record.id.trim_start_matches("rec-"))
            };
            assert_eq!(record.payload(FIELD), Some(expected.as_str()));
            assert!(record.doc.contains_key("subject"), "🧬 merge keeps the rest of the doc");
        }
    }

    #[tokio::test]
    async fn the_one_where_a_missing_record_gets_requeued_once() {
        let sink = InMemorySink::new();
        seed(&sink, &["here"]).await;
        let extractor = InMemoryExtractor::new();
        let (ctx, rx) = context(&sink, &extractor);

        let chunk = chunk_of(&["here", "ghost"]);
        let outcome = ChunkWorker::new(chunk, ctx, CancellationToken::new(), None)
            .run()
            .await;

        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.requeued, 1);
        let drained = rx.try_drain_all();
        assert_eq!(drained.jobs.len(), 1);
        assert_eq!(drained.jobs[0].item_id, "ghost");
        assert_eq!(drained.jobs[0].retry_count, 1);
    }

    #[tokio::test]
    async fn the_one_where_the_second_miss_is_the_last_miss() {
        let sink = InMemorySink::new();
        let extractor = InMemoryExtractor::new();
        let (ctx, rx) = context(&sink, &extractor);
        let mut retried = job("ghost");
        retried.retry_count = 1;

        let outcome = ChunkWorker::new(
            Chunk {
                group_key: "INBOX".into(),
                jobs: vec![retried],
            },
            ctx,
            CancellationToken::new(),
            None,
        )
        .run()
        .await;

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.requeued, 0);
        assert!(rx.try_drain_all().is_empty(), "🚫 no third act");
        assert!(sink.bulk_writes().await.is_empty(), "📤 nothing to write, nothing written");
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn the_one_where_the_bulk_write_fails_and_nobody_retries() {
        let sink = InMemorySink::new();
        seed(&sink, &["a", "b"]).await;
        sink.set_fail_writes(true);
        let extractor = InMemoryExtractor::new();
        let (ctx, rx) = context(&sink, &extractor);

        let chunk = chunk_of(&["a", "b"]);
        let outcome = ChunkWorker::new(chunk, Arc::clone(&ctx), CancellationToken::new(), None)
            .run()
            .await;

        assert!(outcome.write_failed);
        assert_eq!(outcome.written, 0);
        assert!(rx.try_drain_all().is_empty(), "🔄 write failures are never requeued");
        assert_eq!(ctx.stats.snapshot().bulk_write_failures, 1);
    }

    #[tokio::test]
    async fn the_one_where_cancellation_stops_before_the_extractor() {
        let sink = InMemorySink::new();
        seed(&sink, &["a"]).await;
        let extractor = InMemoryExtractor::new();
        let (ctx, _rx) = context(&sink, &extractor);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = ChunkWorker::new(chunk_of(&["a"]), ctx, token, None).run().await;

        assert!(outcome.cancelled);
        assert_eq!(extractor.calls(), 0);
        assert!(sink.bulk_writes().await.is_empty());
    }

    /// 🛑 An extractor that pulls the plug on its own chunk at the `cancel_on`-th call.
    #[derive(Debug)]
    struct SelfSabotagingExtractor {
        token: CancellationToken,
        cancel_on: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for SelfSabotagingExtractor {
        async fn extract(&self, _owner: &OwnerContext, item_id: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
            if call == self.cancel_on {
                self.token.cancel();
            }
            Ok(format!("payload:{item_id}"))
        }
    }

    async fn run_with_mid_chunk_cancel(
        items: &[&str],
        cancel_on: usize,
    ) -> (ChunkOutcome, Arc<SelfSabotagingExtractor>, InMemorySink, usize) {
        let sink = InMemorySink::new();
        seed(&sink, items).await;
        let admission = crate::admission::AdmissionController::new(1);
        let token = admission.chunk_token();
        let extractor = Arc::new(SelfSabotagingExtractor {
            token: token.clone(),
            cancel_on,
            calls: AtomicUsize::new(0),
        });
        let (ctx, _rx) = context_with(&sink, extractor.clone());
        let permit = admission.try_acquire(&token);
        assert_eq!(admission.occupied(), 1);

        let outcome = ChunkWorker::new(chunk_of(items), ctx, token, permit).run().await;
        (outcome, extractor, sink, admission.occupied())
    }

    #[tokio::test]
    async fn the_one_where_cancellation_lands_between_two_extractions() {
        let (outcome, extractor, sink, occupied) =
            run_with_mid_chunk_cancel(&["a", "b", "c"], 1).await;

        assert!(outcome.cancelled);
        let calls = extractor.calls.load(Ordering::Acquire);
        assert_eq!(calls, 1, "🛑 item b never reaches the extractor");
        assert!(sink.bulk_writes().await.is_empty());
        assert_eq!(occupied, 0, "🗑️ the slot comes back on the cancelled path too");
    }

    #[tokio::test]
    async fn the_one_where_cancellation_lands_right_before_the_bulk_write() {
        let (outcome, extractor, sink, occupied) = run_with_mid_chunk_cancel(&["a", "b"], 2).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.written, 0);
        assert_eq!(extractor.calls.load(Ordering::Acquire), 2, "🔬 every item was extracted");
        assert!(sink.bulk_writes().await.is_empty(), "📤 but nothing was written");
        assert_eq!(occupied, 0);
    }

    #[tokio::test]
    async fn the_one_where_the_slot_comes_back_no_matter_what() {
        let sink = InMemorySink::new();
        sink.set_fail_writes(true);
        seed(&sink, &["a"]).await;
        let extractor = InMemoryExtractor::new();
        let (ctx, _rx) = context(&sink, &extractor);
        let admission = crate::admission::AdmissionController::new(1);
        let token = admission.chunk_token();
        let permit = admission.try_acquire(&token);
        assert_eq!(admission.occupied(), 1);

        ChunkWorker::new(chunk_of(&["a"]), ctx, token, permit).run().await;
        assert_eq!(admission.occupied(), 0);
    }

    #[tokio::test]
    async fn the_one_where_running_it_twice_lands_in_the_same_place() {
        let items = ["a", "b", "c"];
        let sink = InMemorySink::new();
        seed(&sink, &items).await;
        let extractor = InMemoryExtractor::new().with_payload("b", "bee");
        let (ctx, _rx) = context(&sink, &extractor);

        ChunkWorker::new(chunk_of(&items), Arc::clone(&ctx), CancellationToken::new(), None)
            .run()
            .await;
        let mut first = Vec::new();
        for item in items {
            first.push(sink.get(&format!("rec-{item}")).await);
        }

        ChunkWorker::new(chunk_of(&items), ctx, CancellationToken::new(), None)
            .run()
            .await;
        let mut second = Vec::new();
        for item in items {
            second.push(sink.get(&format!("rec-{item}")).await);
        }

        assert_eq!(first, second);
        assert_eq!(
            second[1].as_ref().and_then(|r| r.payload(FIELD)),
            Some("bee")
        );
    }
}
