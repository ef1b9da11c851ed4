//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where chunks toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module — the lifecycle controller. It owns the intake queue,
//! the slot table, and the one dispatch loop task. Producers talk to it. Workers
//! never see it.
//!
//! ⚠️ DO NOT MAKE `workers` PUB EVER
//! 🔒 Like Fight Club, but for async tasks. First rule: you don't pub the workers.

mod workers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admission::AdmissionController;
use crate::app_config::{DispatcherConfig, ShutdownMode};
use crate::backends::Sink;
use crate::common::Job;
use crate::extractors::Extractor;
use crate::intake::{IntakeReceiver, IntakeSender, intake_queue};
use crate::stats::{DispatchStats, StatsSnapshot};
use workers::{DispatchLoop, Worker, WorkerContext};

/// 🏁 How a `stop()` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// ✅ The loop reached STOPPED on its own inside the timeout.
    Graceful,
    /// ⏱️ The timeout hit; everything was cancelled and the loop task aborted.
    ForcedAfterTimeout,
    /// 🔁 Somebody already stopped it. Nothing to do.
    AlreadyStopped,
    /// 💤 `start()` was never called. Queued jobs stay where they are.
    NeverStarted,
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
///
/// `add` / `add_all` are safe from any number of tasks or threads at once, before,
/// during, and after `stop()`. After `stop()` they return an error instead of
/// quietly feeding a queue nobody reads.
#[derive(Debug)]
pub struct Supervisor {
    config: DispatcherConfig,
    intake: IntakeSender,
    /// 🔒 handed to the loop on `start()`; `None` afterwards
    receiver: Mutex<Option<IntakeReceiver>>,
    admission: Arc<AdmissionController>,
    ctx: Arc<WorkerContext>,
    stats: Arc<DispatchStats>,
    terminating: Arc<AtomicBool>,
    loop_handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Supervisor {
    /// 🚀 Birth of a Supervisor. Config errors are fatal right here, not later.
    pub fn new(
        config: DispatcherConfig,
        sink: Arc<dyn Sink>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        config
            .validate()
            .context("💀 Refusing to build a supervisor from a broken dispatcher config")?;

        let (intake, receiver) = intake_queue();
        let stats = Arc::new(DispatchStats::default());
        let ctx = Arc::new(WorkerContext {
            sink,
            extractor,
            intake: intake.clone(),
            stats: Arc::clone(&stats),
            payload_field: config.payload_field.clone(),
        });
        Ok(Self {
            admission: AdmissionController::new(config.max_concurrent_chunks),
            config,
            intake,
            receiver: Mutex::new(Some(receiver)),
            ctx,
            stats,
            terminating: Arc::new(AtomicBool::new(false)),
            loop_handle: Mutex::new(None),
        })
    }

    /// 🧵 Launch the dispatch loop on its own task. Outside a tokio runtime this is an
    /// error, and the supervisor can still be started later from inside one.
    pub fn start(&self) -> Result<()> {
        if self.terminating.load(Ordering::Acquire) {
            bail!("💀 This supervisor was already stopped. Supervisors don't do sequels.");
        }
        tokio::runtime::Handle::try_current()
            .context("💀 start() needs a tokio runtime to spawn the dispatch loop on")?;
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .context("💀 start() called twice. One dispatch loop per supervisor, please.")?;

        let dispatch_loop = DispatchLoop::new(
            receiver,
            Arc::clone(&self.admission),
            Arc::clone(&self.ctx),
            self.config.clone(),
            Arc::clone(&self.terminating),
        );
        let handle = dispatch_loop.start();
        *self.loop_handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!("🚀 supervisor started");
        Ok(())
    }

    /// 📥 Enqueue one job. Never blocks.
    pub fn add(&self, job: Job) -> Result<()> {
        if self.terminating.load(Ordering::Acquire) {
            bail!(
                "💀 The supervisor is stopping; job for item '{}' was turned away at the door.",
                job.item_id
            );
        }
        self.intake.add(job)?;
        DispatchStats::bump(&self.stats.jobs_enqueued);
        Ok(())
    }

    /// 📥 Enqueue many, in order. Stops at the first refusal and reports how far it got.
    pub fn add_all(&self, jobs: impl IntoIterator<Item = Job>) -> Result<usize> {
        let mut added = 0;
        for job in jobs {
            self.add(job)
                .with_context(|| format!("💀 add_all gave up after {added} job(s)"))?;
            added += 1;
        }
        Ok(added)
    }

    /// 🛑 Stop the pipeline. Idempotent; safe alongside concurrent `add` calls.
    ///
    /// Drain mode: raise the flag, send the poison, wait up to `timeout` for the loop
    /// to finish everything queued before the poison. Discard mode: cancel every
    /// in-flight chunk first, then the same. Either way, a timeout cancels everything
    /// and aborts the loop task instead of waiting forever.
    pub async fn stop(&self, timeout: Duration) -> Result<StopOutcome> {
        let handle = self.loop_handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut handle) = handle else {
            let was_terminating = self.terminating.swap(true, Ordering::AcqRel);
            return Ok(if was_terminating || self.is_started() {
                StopOutcome::AlreadyStopped
            } else {
                StopOutcome::NeverStarted
            });
        };

        // 🛑 discard: cancel, then flag, then poison. drain: flag, then poison.
        if self.config.shutdown_mode == ShutdownMode::Discard {
            self.admission.cancel_all();
        }
        self.terminating.store(true, Ordering::Release);
        if !self.intake.shutdown() {
            debug!("☠️ poison not delivered; the loop is already gone");
        }

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => {
                result.context("💀 The dispatch loop exited with an error")?;
                info!("🏁 supervisor stopped gracefully");
                Ok(StopOutcome::Graceful)
            }
            Ok(Err(join_err)) => {
                Err(join_err).context("💀 The dispatch loop task panicked or was aborted")
            }
            Err(_elapsed) => {
                warn!(
                    "⏱️ dispatch loop didn't stop within {timeout:?}; \
                     cancelling chunks and aborting it"
                );
                self.admission.cancel_all();
                handle.abort();
                // 🗑️ aborted tasks drop their JoinSet, which aborts pooled chunks too
                let _ = handle.await;
                Ok(StopOutcome::ForcedAfterTimeout)
            }
        }
    }

    /// 🛑 `stop` with the configured timeout.
    pub async fn shutdown(&self) -> Result<StopOutcome> {
        self.stop(self.config.stop_timeout()).await
    }

    fn is_started(&self) -> bool {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 📊 Items waiting in the intake queue right now.
    pub fn pending(&self) -> usize {
        self.intake.pending()
    }

    /// 🎟️ Slots held right now.
    pub fn running_chunks(&self) -> usize {
        self.admission.occupied()
    }

    /// 📈 The most slots ever held at once.
    pub fn peak_running_chunks(&self) -> usize {
        self.admission.high_water_mark()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}
