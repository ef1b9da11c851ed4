//! 🚀 enrichq-cli — the front door, the mail slot, the "leave it on the porch" of enrichq.
//!
//! 🎬 *[narrator voice]* "It all started with a file full of jobs..."
//! 📦 Thin CLI wrapper: sets up logging, loads config, reads the job file, and
//! lets the library do the heavy lifting. Prints a table at the end so you can
//! feel something. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 📬 Enrich a file of jobs against the configured sink and extractor.
#[derive(Parser, Debug)]
#[clap(about = "Grouped batch enrichment dispatcher")]
struct Args {
    /// 🔧 TOML config file. Optional; `ENRICHQ_*` env vars work too.
    #[clap(short, long, default_value = "enrichq.toml")]
    config: PathBuf,

    /// 📂 NDJSON file, one job per line.
    #[clap(short, long)]
    jobs: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like a service isn't reachable. \
                Double-check that Elasticsearch and the extractor endpoint are actually \
                running. If you're using Docker, `docker ps` is your friend. ☕"
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }

    // ✅ Pop the champagne. 🍾
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    // 🔒 A missing config file is fine (env vars + defaults); an unreadable path is not
    let config_file = args
        .config
        .try_exists()
        .with_context(|| {
            format!(
                "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
                args.config.display()
            )
        })?
        .then_some(args.config.as_path());

    let app_config = enrichq::app_config::load_config(config_file)
        .context("💀 In enrichq-cli, we couldn't load the config. Take a look at the file and the ENRICHQ_* env vars.")?;

    let bytes = tokio::fs::read(&args.jobs)
        .await
        .with_context(|| format!("💀 Couldn't read the job file '{}'", args.jobs.display()))?;
    let jobs = enrichq::job_file::parse_jobs(&bytes)
        .with_context(|| format!("💀 The job file '{}' didn't parse", args.jobs.display()))?;
    info!("📂 loaded {} job(s) from '{}'", jobs.len(), args.jobs.display());

    let stats = enrichq::run(app_config, jobs).await?;
    println!("{}", stats.render_table());
    Ok(())
}
