// ai
//! 🗂️ Grouper + Chunker — the sorting hat of the dispatcher.
//!
//! 🎬 *[a drained batch hits the table. 4,000 jobs. twelve folders. zero organization.]*
//!
//! Pure functions, no I/O, no locks, no feelings. Jobs come in as one flat list,
//! leave as ordered groups, then as bounded chunks. First-seen order is sacred:
//! the first key we meet is the first group we emit, and inside a group the jobs
//! keep the order they arrived in. 🦆
//!
//! ```text
//!   [a1 b1 a2 c1 a3]  ──group──▶  a:[a1 a2 a3]  b:[b1]  c:[c1]
//!                     ──chunk(2)▶ [a1 a2] [a3] [b1] [c1]
//! ```

use std::collections::HashMap;

use crate::common::{Chunk, Job};

/// 📂 Partition jobs by `group_key`, keys in first-seen order, jobs in arrival order.
///
/// One pass, one HashMap lookup per job. O(n), as promised on the box.
pub fn group(jobs: Vec<Job>) -> Vec<(String, Vec<Job>)> {
    let mut slot_by_key: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Job>)> = Vec::new();

    for job in jobs {
        match slot_by_key.get(&job.group_key) {
            Some(&slot) => groups[slot].1.push(job),
            None => {
                slot_by_key.insert(job.group_key.clone(), groups.len());
                groups.push((job.group_key.clone(), vec![job]));
            }
        }
    }
    groups
}

/// ✂️ Slice one group into contiguous chunks of at most `max_chunk_size`.
///
/// `max_chunk_size == 0` is a configuration bug that validation already rejected;
/// reaching this with a zero is a programming error, so we assert.
pub fn chunk(group_key: &str, jobs: Vec<Job>, max_chunk_size: usize) -> Vec<Chunk> {
    assert!(max_chunk_size > 0, "💀 max_chunk_size must be > 0");

    let mut chunks = Vec::with_capacity(jobs.len().div_ceil(max_chunk_size));
    let mut jobs = jobs.into_iter().peekable();
    while jobs.peek().is_some() {
        let slice: Vec<Job> = jobs.by_ref().take(max_chunk_size).collect();
        chunks.push(Chunk {
            group_key: group_key.to_string(),
            jobs: slice,
        });
    }
    chunks
}

/// 🔪 Soft cap on a single drain: break an oversized batch into sub-batches of at
/// most `threshold` jobs so one iteration never groups the whole universe at once.
pub fn split_oversized(batch: Vec<Job>, threshold: usize) -> Vec<Vec<Job>> {
    if threshold == 0 || batch.len() <= threshold {
        return vec![batch];
    }
    let mut sub_batches = Vec::with_capacity(batch.len().div_ceil(threshold));
    let mut batch = batch.into_iter().peekable();
    while batch.peek().is_some() {
        sub_batches.push(batch.by_ref().take(threshold).collect());
    }
    sub_batches
}

/// 🏭 group → chunk, the whole assembly line in one call.
pub fn group_and_chunk(jobs: Vec<Job>, max_chunk_size: usize) -> Vec<Chunk> {
    group(jobs)
        .into_iter()
        .flat_map(|(key, jobs)| chunk(&key, jobs, max_chunk_size))
        .collect()
}
