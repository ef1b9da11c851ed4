//! ✉️ The Intake Queue — where producers drop jobs and walk away whistling.
//!
//! Unbounded, multi-producer, single-consumer. Producers never block. The dispatch
//! loop is the only one who ever drains it. The poison pill is a real enum variant,
//! not a magic object we compare by address like it's 2004. 🦆
//!
//! 🧠 Knowledge graph:
//! - `IntakeSender` is cloned into the supervisor (producers) and every worker (requeues).
//! - `IntakeReceiver` is owned by the dispatch loop. Nobody else touches it.
//! - A drained batch can hold the poison AND real jobs. The loop processes the jobs first.

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender, TryRecvError};

use crate::common::Job;

/// 🎭 What travels through the queue: real work, or the polite request to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Intake {
    Job(Job),
    Shutdown,
}

/// 📦 One drain's worth of stuff. Poison is stripped out and reported as a flag.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Drained {
    pub(crate) jobs: Vec<Job>,
    pub(crate) shutdown_seen: bool,
}

impl Drained {
    fn push(&mut self, item: Intake) {
        match item {
            Intake::Job(job) => self.jobs.push(job),
            Intake::Shutdown => self.shutdown_seen = true,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty() && !self.shutdown_seen
    }
}

/// 🚀 Build a fresh queue. One sender to clone around, one receiver to rule them all.
pub(crate) fn intake_queue() -> (IntakeSender, IntakeReceiver) {
    let (tx, rx) = async_channel::unbounded();
    (IntakeSender { tx }, IntakeReceiver { rx })
}

/// 📥 The producer end. Cheap to clone, never blocks.
#[derive(Debug, Clone)]
pub(crate) struct IntakeSender {
    tx: Sender<Intake>,
}

impl IntakeSender {
    /// 📥 Enqueue one job. Fails only if the loop is gone and took the receiver with it.
    pub(crate) fn add(&self, job: Job) -> Result<()> {
        self.tx.try_send(Intake::Job(job)).map_err(|err| {
            anyhow!(
                "💀 The intake queue is closed; the dispatch loop has left the building. \
                 Job for item '{}' was not enqueued.",
                match err.into_inner() {
                    Intake::Job(job) => job.item_id,
                    Intake::Shutdown => String::from("<shutdown>"),
                }
            )
        })
    }

    /// ☠️ Send the poison. Returns false if nobody is listening anymore.
    pub(crate) fn shutdown(&self) -> bool {
        self.tx.try_send(Intake::Shutdown).is_ok()
    }

    /// 📊 How many items are sitting in the queue right now.
    pub(crate) fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// 📤 The consumer end. Owned by the dispatch loop, exclusively.
#[derive(Debug)]
pub(crate) struct IntakeReceiver {
    rx: Receiver<Intake>,
}

impl IntakeReceiver {
    /// ⏳ Wait for at least one item, then take everything currently queued.
    ///
    /// If every sender is gone the channel is closed; we treat that as poison so
    /// the loop can't wait forever on a queue nobody can write to.
    pub(crate) async fn drain_all(&self) -> Drained {
        let mut drained = Drained::default();
        match self.rx.recv().await {
            Ok(first) => {
                drained.push(first);
                self.drain_ready_into(&mut drained);
            }
            Err(_) => drained.shutdown_seen = true,
        }
        drained
    }

    /// 🏃 Take whatever is there right now, possibly nothing. Never waits.
    pub(crate) fn try_drain_all(&self) -> Drained {
        let mut drained = Drained::default();
        self.drain_ready_into(&mut drained);
        drained
    }

    /// 🔒 Lock the door. Later sends fail; what is already queued can still be drained.
    pub(crate) fn close(&self) -> bool {
        self.rx.close()
    }

    fn drain_ready_into(&self, drained: &mut Drained) {
        loop {
            match self.rx.try_recv() {
                Ok(item) => drained.push(item),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    drained.shutdown_seen = true;
                    break;
                }
            }
        }
    }
}
