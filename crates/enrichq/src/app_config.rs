//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `DispatcherConfig` — chunk size, concurrency, drain cap, stop timeout, shutdown mode.
//!   Threaded explicitly into the supervisor. No lazy global. No static. No surprises.
//! - `SinkConfig` / `ExtractorConfig` — which backend, and how to reach it.
//! - `validate()` is where a zero chunk size goes to die, loudly, before anything starts.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::ElasticsearchSinkConfig;
use crate::extractors::HttpExtractorConfig;

/// 📦 One struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub extractor_config: ExtractorConfig,
}

/// 🕳️ Where the records live.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    InMemory(()),
    Elasticsearch(ElasticsearchSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::InMemory(())
    }
}

/// 🔬 Where the payloads come from.
#[derive(Debug, Deserialize, Clone)]
pub enum ExtractorConfig {
    InMemory(()),
    Http(HttpExtractorConfig),
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig::InMemory(())
    }
}

/// 🛑 What `stop()` does with work that hasn't finished yet.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// ✅ Finish everything queued before the poison, then stop. Cancel only on timeout.
    #[default]
    Drain,
    /// 🗑️ Cancel in-flight chunks first, throw away whatever is still queued.
    Discard,
}

/// 🎛️ The dispatcher's knobs.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// ✂️ Max jobs per chunk. One multi-get and one bulk write per chunk.
    #[serde(default = "default_max_chunk_size", alias = "chunk_size")]
    pub max_chunk_size: usize,
    /// 🎟️ Max chunks running at once on the pool.
    #[serde(default = "default_max_concurrent_chunks", alias = "max_workers")]
    pub max_concurrent_chunks: usize,
    /// 🔪 Soft cap on one drained batch before it gets split. 0 = never split.
    #[serde(default = "default_drain_batch_threshold")]
    pub drain_batch_threshold: usize,
    /// ⏱️ How long `stop()` waits for the loop before pulling the plug.
    #[serde(default = "default_stop_timeout_millis")]
    pub stop_timeout_millis: u64,
    #[serde(default)]
    pub shutdown_mode: ShutdownMode,
    /// 🧬 The record field the payload is merged into.
    #[serde(default = "default_payload_field")]
    pub payload_field: String,
}

fn default_max_chunk_size() -> usize {
    50
}

fn default_max_concurrent_chunks() -> usize {
    4
}

fn default_drain_batch_threshold() -> usize {
    1000
}

fn default_stop_timeout_millis() -> u64 {
    10_000
}

fn default_payload_field() -> String {
    String::from("content")
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            drain_batch_threshold: default_drain_batch_threshold(),
            stop_timeout_millis: default_stop_timeout_millis(),
            shutdown_mode: ShutdownMode::default(),
            payload_field: default_payload_field(),
        }
    }
}

impl DispatcherConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_millis)
    }

    /// 💀 Fatal configuration errors. Caught before a single task is spawned.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_chunk_size == 0 {
            bail!("💀 max_chunk_size must be > 0. A chunk of nothing is a philosophy, not a batch.");
        }
        if self.max_concurrent_chunks == 0 {
            bail!("💀 max_concurrent_chunks must be > 0. Zero workers is a vacation, not a pool.");
        }
        if self.payload_field.is_empty() {
            bail!("💀 payload_field must not be empty. The payload needs somewhere to live.");
        }
        Ok(())
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 `ENRICHQ_*` env vars form the base layer (nested keys split on `__`, so
/// `ENRICHQ_DISPATCHER__MAX_CHUNK_SIZE=10` works). A TOML file, if given, is merged on
/// top and wins on conflicts. The result is validated before it's returned.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("ENRICHQ_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ENRICHQ_*). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ENRICHQ_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .dispatcher
        .validate()
        .context("💀 The configuration parsed, but it doesn't make sense")?;
    Ok(app_config)
}
