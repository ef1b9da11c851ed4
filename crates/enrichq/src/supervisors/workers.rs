//! 🧵 Workers: the backbone of enrichq, the unsung heroes, the ones who actually
//! do the work while the Supervisor takes all the credit in the sprint retro.
//!
//! Two kinds live here:
//! - `DispatchLoop` — the one long-lived task. Drains, groups, chunks, admits.
//! - `ChunkWorker` — short-lived. Fetches, extracts, merges, writes one chunk, leaves.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::backends::Sink;
use crate::extractors::Extractor;
use crate::intake::IntakeSender;
use crate::stats::DispatchStats;

mod chunk_worker;
mod dispatch_loop;

pub(super) use chunk_worker::{ChunkOutcome, ChunkWorker};
pub(super) use dispatch_loop::DispatchLoop;

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" — Seinfeld, on Rust
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify.
    fn start(self) -> JoinHandle<Result<()>>;
}

/// 🧰 Everything a chunk worker needs, shared by all of them behind one `Arc`.
#[derive(Debug)]
pub(crate) struct WorkerContext {
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) extractor: Arc<dyn Extractor>,
    /// 🔄 for putting missed jobs back in line
    pub(crate) intake: IntakeSender,
    pub(crate) stats: Arc<DispatchStats>,
    pub(crate) payload_field: String,
}
