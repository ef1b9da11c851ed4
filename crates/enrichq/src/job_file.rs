// ai
//! 📂 job_file.rs — one job per line, newline-delimited JSON, no brackets, no drama.
//!
//! ```text
//! {"group_key":"INBOX","owner":{"tenant_id":1,"user_id":2,"account_id":0},"item_id":"m-1","sink_record_id":"r-1"}
//! ```
//!
//! Blank lines (and a trailing `\r`) are skipped. A bad line fails the whole load
//! with its 1-based line number, because "somewhere in the file" is not a location.

use anyhow::{Context, Result};
use memchr::memchr_iter;

use crate::common::Job;

/// 📜 Parse an NDJSON buffer into jobs, in file order.
pub fn parse_jobs(bytes: &[u8]) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    let mut start = 0;
    let ends = memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));
    for (line_no, end) in ends.enumerate() {
        if start > bytes.len() {
            break;
        }
        let line = trim_line(&bytes[start..end]);
        start = end + 1;
        if line.is_empty() {
            continue;
        }
        let job: Job = serde_json::from_slice(line)
            .with_context(|| format!("💀 Line {} of the job file is not a valid job", line_no + 1))?;
        jobs.push(job);
    }
    Ok(jobs)
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.trim_ascii()
}
