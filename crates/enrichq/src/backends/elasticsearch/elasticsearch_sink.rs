use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::backends::Sink;
use crate::common::SinkRecord;

// 🚰 ElasticsearchSinkConfig — "What's the DEAL with index names?" — Jerry Seinfeld, DevOps edition.
// One index per sink. The records to enrich all live there; the enriched ones go back there.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchSinkConfig {
    /// 📡 Where the cluster lives. Scheme + host + port. Yes, all of it.
    pub url: String,
    /// 🔒 Username. The bouncer at the club. Except the club is a database.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key — the velvet rope variant. Wins over basic auth when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 📦 The index holding the records.
    pub index: String,
    /// ⏱️ Per-request timeout. Bulk bodies can be meaty; we're not monsters.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// 📡 Sink over one Elasticsearch index: `_mget` in, `_bulk` out.
///
/// Cheap to clone; `reqwest::Client` is an `Arc` on the inside and the config is small.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    sink_config: ElasticsearchSinkConfig,
}

#[derive(Debug, Deserialize)]
struct MgetResponse {
    docs: Vec<MgetDoc>,
}

#[derive(Debug, Deserialize)]
struct MgetDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
}

impl ElasticsearchSink {
    /// 🚀 Build the client and make sure the index exists.
    ///
    /// Writing into a nonexistent index is a skill issue we catch at init time,
    /// not a million records deep. You're welcome.
    pub async fn new(config: ElasticsearchSinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a cursed TLS setup. Either way: tragic.")?;

        let sink = Self {
            client,
            sink_config: config,
        };

        let index_url = sink.index_url();
        let response = sink
            .authorize(sink.client.get(&index_url))
            .send()
            .await
            .context("💀 Reached out to check if the index exists. Got ghosted. The network is giving us the silent treatment.")?;
        if !response.status().is_success() {
            anyhow::bail!(
                "💀 Index '{}' answered with {}. We knocked. We waited. Create it, or check your spelling.",
                index_url,
                response.status()
            );
        }
        debug!("✅ Index exists and is accepting visitors — welcome mat is out, cluster is home");
        Ok(sink)
    }

    fn base_url(&self) -> &str {
        self.sink_config.url.trim_end_matches('/')
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url(), self.sink_config.index)
    }

    /// 🔒 Auth priority: API key wins over basic auth. This is not a democracy.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.sink_config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.sink_config.username {
            request.basic_auth(username, self.sink_config.password.as_ref())
        } else {
            request
        }
    }

    /// 📦 Render records as `_bulk` NDJSON: one `index` action line, one source line each.
    fn render_bulk(&self, records: &[SinkRecord]) -> Result<String> {
        let mut body = String::new();
        for record in records {
            let action = serde_json::json!({
                "index": { "_index": self.sink_config.index, "_id": record.id }
            });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(
                &serde_json::to_string(&record.doc)
                    .context("💀 A record refused to become JSON. It was JSON a minute ago.")?,
            );
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    async fn multi_get(&self, ids: &[String]) -> Result<HashMap<String, SinkRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mget_url = format!("{}/_mget", self.index_url());
        let response = self
            .authorize(self.client.post(&mget_url))
            .header("Content-Type", "application/json")
            .body(serde_json::json!({ "ids": ids }).to_string())
            .send()
            .await
            .context("💀 The _mget request never made it. The network is not vibing with it.")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("💀 _mget answered, then mumbled. Couldn't read the body.")?;
        if !status.is_success() {
            anyhow::bail!("💀 _mget came back {status}. The cluster said: '{body}'");
        }
        let parsed: MgetResponse = serde_json::from_str(&body)
            .context("💀 _mget responded in a dialect of JSON we don't speak")?;

        let found: HashMap<String, SinkRecord> = parsed
            .docs
            .into_iter()
            .filter(|doc| doc.found)
            .map(|doc| {
                let record = SinkRecord::new(doc.id.clone(), doc.source.unwrap_or_default());
                (doc.id, record)
            })
            .collect();
        trace!("📥 _mget asked for {} ids, found {}", ids.len(), found.len());
        Ok(found)
    }

    async fn bulk_write(&self, records: Vec<SinkRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body = self.render_bulk(&records)?;
        let bulk_url = format!("{}/_bulk", self.base_url());
        let response = self
            .authorize(self.client.post(&bulk_url))
            // ⚠️ application/x-ndjson, not application/json. ES cares. Deeply.
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("💀 The bulk request never made it to Elasticsearch. Check connectivity, check timeouts, check your feelings.")?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("💀 _bulk came back {status}. The response body read: '{text}'");
        }
        let parsed: BulkResponse = serde_json::from_str(&text)
            .context("💀 _bulk responded, but not in any shape we recognize")?;
        if parsed.errors {
            // 🎭 partial success is still failure from where we sit
            anyhow::bail!("💀 _bulk reported item-level errors; treating the whole write as failed");
        }
        debug!("📡 Yeeted {} enriched record(s) into the Elasticsearch void", records.len());
        Ok(())
    }
}
