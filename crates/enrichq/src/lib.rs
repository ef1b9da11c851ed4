//! 📬 enrichq — grouped batch enrichment.
//!
//! Producers drop jobs in. A single loop drains them, groups them by key, cuts the
//! groups into chunks, and hands each chunk to a bounded pool (or runs it in place
//! when the pool is full). Each chunk fetches its records in one call, asks the
//! extractor for a payload per job, merges, and writes everything back in one call.
//!
//! 🦆 The duck supervises the supervisor. Nobody supervises the duck.

mod admission;
mod intake;

pub mod app_config;
pub mod backends;
pub mod common;
pub mod extractors;
pub mod grouping;
pub mod job_file;
pub mod stats;
pub mod supervisors;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::SinkBackend;
use crate::common::Job;
use crate::extractors::ExtractorBackend;
use crate::stats::StatsSnapshot;
use crate::supervisors::{StopOutcome, Supervisor};

pub use crate::common::{Chunk, OwnerContext, SinkRecord};

/// 🚀 One-shot run: build the backends, start a supervisor, feed it every job,
/// stop it with the configured timeout, hand back the numbers.
pub async fn run(app_config: AppConfig, jobs: Vec<Job>) -> Result<StatsSnapshot> {
    let sink = SinkBackend::from_config(&app_config.sink_config)
        .await
        .context("💀 Couldn't build the sink. Check the sink_config section.")?;
    let extractor = ExtractorBackend::from_config(&app_config.extractor_config)
        .context("💀 Couldn't build the extractor. Check the extractor_config section.")?;

    let supervisor = Supervisor::new(app_config.dispatcher, Arc::new(sink), Arc::new(extractor))?;
    supervisor.start()?;
    let added = supervisor.add_all(jobs)?;
    info!("📥 {added} job(s) handed to the dispatcher");

    match supervisor.shutdown().await? {
        StopOutcome::ForcedAfterTimeout => {
            warn!("⏱️ stop timed out; some chunks were cancelled mid-flight")
        }
        outcome => info!("🏁 dispatcher finished: {outcome:?}"),
    }
    Ok(supervisor.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::OwnerContext;

    #[tokio::test]
    async fn the_one_where_the_in_memory_stack_runs_end_to_end() -> Result<()> {
        // 🧪 the in-memory sink starts empty, so every job is a miss twice over
        let jobs = vec![
            Job::new("INBOX", OwnerContext::new(1, 1, 0), "a", "rec-a"),
            Job::new("SENT", OwnerContext::new(1, 1, 0), "b", "rec-b"),
        ];
        let stats = run(AppConfig::default(), jobs).await?;
        assert_eq!(stats.jobs_enqueued, 2);
        assert_eq!(stats.requeued, 2);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.records_written, 0);
        Ok(())
    }
}
