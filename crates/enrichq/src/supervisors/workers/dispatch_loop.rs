//! 🎬 *[camera pans across an empty queue. somewhere, a producer presses enter.]*
//!
//! 🔄 The DispatchLoop — the single consumer. One task, run-to-completion iterations.
//!
//! ```text
//!   IDLE ──drain──▶ DRAINED ──▶ GROUPING ──▶ DISPATCHING ──▶ IDLE
//!                      │                          ▲    │
//!                      │                          └────┘ (more sub-batches)
//!                      └── poison + nothing left ──▶ STOPPED
//! ```
//!
//! 🧠 Knowledge graph:
//! - Chunks get a slot and go to the pool (`tokio::spawn` into a `JoinSet`), or, when
//!   every slot is taken, run right here on the loop: caller-runs. Before running
//!   inline, the loop waits for one pooled chunk to finish and takes its slot, so the
//!   number of running chunks never exceeds the slot count. Intake stalls meanwhile.
//!   That stall is the backpressure.
//! - After the poison, the loop stops blocking on the queue: it waits for in-flight
//!   chunks (they may requeue retries), drains what's left without waiting, and only
//!   stops when a look at the queue comes back empty.
//! - In discard mode with termination requested, drained jobs are counted and dropped.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use futures::FutureExt;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::{ChunkOutcome, ChunkWorker, Worker, WorkerContext};
use crate::admission::AdmissionController;
use crate::app_config::{DispatcherConfig, ShutdownMode};
use crate::common::{Chunk, Job};
use crate::grouping::{group_and_chunk, split_oversized};
use crate::intake::{Drained, IntakeReceiver};
use crate::stats::DispatchStats;

/// 🎭 Where the loop is in its little life.
#[derive(Debug)]
enum LoopState {
    Idle,
    Drained(Drained),
    Grouping(VecDeque<Vec<Job>>),
    Dispatching {
        chunks: Vec<Chunk>,
        remaining: VecDeque<Vec<Job>>,
    },
    Stopped,
}

#[derive(Debug)]
pub(crate) struct DispatchLoop {
    rx: IntakeReceiver,
    admission: Arc<AdmissionController>,
    ctx: Arc<WorkerContext>,
    config: DispatcherConfig,
    terminating: Arc<AtomicBool>,
    in_flight: JoinSet<ChunkOutcome>,
    shutdown_seen: bool,
}

impl DispatchLoop {
    pub(crate) fn new(
        rx: IntakeReceiver,
        admission: Arc<AdmissionController>,
        ctx: Arc<WorkerContext>,
        config: DispatcherConfig,
        terminating: Arc<AtomicBool>,
    ) -> Self {
        Self {
            rx,
            admission,
            ctx,
            config,
            terminating,
            in_flight: JoinSet::new(),
            shutdown_seen: false,
        }
    }

    fn discarding(&self) -> bool {
        self.config.shutdown_mode == ShutdownMode::Discard
            && self.terminating.load(Ordering::Acquire)
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        info!(
            "🚀 dispatch loop up: chunks of ≤{}, ≤{} at once",
            self.config.max_chunk_size,
            self.admission.capacity()
        );
        let mut state = LoopState::Idle;
        loop {
            state = match state {
                LoopState::Idle => self.idle().await,
                LoopState::Drained(drained) => self.drained(drained).await,
                LoopState::Grouping(mut sub_batches) => match sub_batches.pop_front() {
                    Some(batch) => LoopState::Dispatching {
                        chunks: group_and_chunk(batch, self.config.max_chunk_size),
                        remaining: sub_batches,
                    },
                    None => LoopState::Idle,
                },
                LoopState::Dispatching { chunks, remaining } => {
                    for chunk in chunks {
                        self.dispatch(chunk).await;
                    }
                    if remaining.is_empty() {
                        LoopState::Idle
                    } else {
                        LoopState::Grouping(remaining)
                    }
                }
                LoopState::Stopped => break,
            };
        }
        info!("🏁 dispatch loop stopped");
        Ok(())
    }

    async fn idle(&mut self) -> LoopState {
        if !self.shutdown_seen {
            return LoopState::Drained(self.rx.drain_all().await);
        }
        // ☠️ poison already consumed: never block on the queue again
        self.reap_all().await;
        let drained = self.rx.try_drain_all();
        if !drained.jobs.is_empty() {
            return LoopState::Drained(drained);
        }
        // 🔒 nothing in flight, nothing queued: close the door, then one last look for
        // anything that slipped in between the drain and the close
        self.rx.close();
        let drained = self.rx.try_drain_all();
        if drained.jobs.is_empty() {
            LoopState::Stopped
        } else {
            LoopState::Drained(drained)
        }
    }

    async fn drained(&mut self, drained: Drained) -> LoopState {
        self.shutdown_seen |= drained.shutdown_seen;
        if self.discarding() {
            if !drained.jobs.is_empty() {
                DispatchStats::add(&self.ctx.stats.jobs_discarded, drained.jobs.len());
                debug!("🗑️ discarding {} queued job(s) on shutdown", drained.jobs.len());
            }
            return LoopState::Idle;
        }
        if drained.jobs.is_empty() {
            return LoopState::Idle;
        }
        trace!("📦 drained {} job(s)", drained.jobs.len());
        LoopState::Grouping(
            split_oversized(drained.jobs, self.config.drain_batch_threshold).into(),
        )
    }

    /// 🎯 Pool if a slot is free, caller-runs otherwise.
    async fn dispatch(&mut self, chunk: Chunk) {
        self.reap_finished();
        let token = self.admission.chunk_token();
        match self.admission.try_acquire(&token) {
            Some(permit) => {
                trace!("🧵 chunk '{}' → pool, slot {}", chunk.group_key, permit.index());
                DispatchStats::bump(&self.ctx.stats.chunks_pooled);
                let worker = ChunkWorker::new(chunk, Arc::clone(&self.ctx), token, Some(permit));
                self.in_flight.spawn(worker.run());
            }
            None => self.caller_runs(chunk, token).await,
        }
    }

    /// 🏃 Saturated: wait for one pooled chunk to finish, take its slot, and run this
    /// chunk right here on the loop.
    async fn caller_runs(&mut self, chunk: Chunk, token: CancellationToken) {
        if let Some(finished) = self.in_flight.join_next().await {
            Self::log_join(finished);
        }
        let permit = self.admission.try_acquire(&token);
        if permit.is_none() {
            debug!("⚠️ no slot even after a pooled chunk finished; running unslotted");
        }
        trace!("🏃 chunk '{}' → caller-runs", chunk.group_key);
        DispatchStats::bump(&self.ctx.stats.chunks_inline);
        let worker = ChunkWorker::new(chunk, Arc::clone(&self.ctx), token, permit);
        // 💀 a panicking chunk must not take the loop down with it
        if AssertUnwindSafe(worker.run()).catch_unwind().await.is_err() {
            error!("💀 an inline chunk panicked; the loop carries on");
        }
    }

    fn reap_finished(&mut self) {
        while let Some(finished) = self.in_flight.try_join_next() {
            Self::log_join(finished);
        }
    }

    async fn reap_all(&mut self) {
        while let Some(finished) = self.in_flight.join_next().await {
            Self::log_join(finished);
        }
    }

    fn log_join(finished: Result<ChunkOutcome, JoinError>) {
        match finished {
            Ok(outcome) => trace!(
                "✅ pooled chunk done: {} written, {} requeued, {} dropped, \
                 {} extractor failure(s), write failed: {}, cancelled: {}",
                outcome.written,
                outcome.requeued,
                outcome.dropped,
                outcome.extractor_failures,
                outcome.write_failed,
                outcome.cancelled
            ),
            Err(err) if err.is_panic() => error!("💀 a pooled chunk panicked: {err}"),
            Err(err) => debug!("🛑 a pooled chunk was aborted: {err}"),
        }
    }
}

impl Worker for DispatchLoop {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}
