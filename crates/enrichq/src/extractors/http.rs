//! 📡 An extractor that asks a remote service for the payload.
//!
//! POSTs `{tenant_id, user_id, account_id, item_id}` as JSON, takes the response body
//! verbatim as the payload. Non-2xx is an error. That's the whole protocol. It fits
//! on a napkin. We checked. 🦆

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::common::OwnerContext;
use crate::extractors::Extractor;

#[derive(Debug, Deserialize, Clone)]
pub struct HttpExtractorConfig {
    /// 📡 The extraction endpoint. The whole URL, path included.
    pub url: String,
    /// ⏱️ One slow item should not hold a whole chunk hostage forever.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    tenant_id: i64,
    user_id: i64,
    account_id: i64,
    item_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: reqwest::Client,
    config: HttpExtractorConfig,
}

impl HttpExtractor {
    pub fn new(config: HttpExtractorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("💀 The extractor's HTTP client refused to be born.")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, owner: &OwnerContext, item_id: &str) -> Result<String> {
        let request = ExtractRequest {
            tenant_id: owner.tenant_id,
            user_id: owner.user_id,
            account_id: owner.account_id,
            item_id,
        };
        let body = serde_json::to_string(&request).context("💀 couldn't serialize extract request")?;
        let response = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("💀 extract request for item '{item_id}' never arrived"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("💀 extract response for item '{item_id}' was unreadable"))?;
        if !status.is_success() {
            anyhow::bail!("💀 extractor answered {status} for item '{item_id}': '{text}'");
        }
        trace!("🔬 extracted {} bytes for item '{item_id}'", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor_for(server: &MockServer) -> Result<HttpExtractor> {
        HttpExtractor::new(HttpExtractorConfig {
            url: format!("{}/extract", server.uri()),
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn the_one_where_the_body_is_the_payload() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(body_json(serde_json::json!({
                "tenant_id": 1, "user_id": 2, "account_id": 0, "item_id": "42"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("Dear team, ..."))
            .expect(1)
            .mount(&server)
            .await;

        let payload = extractor_for(&server)?
            .extract(&OwnerContext::new(1, 2, 0), "42")
            .await?;
        assert_eq!(payload, "Dear team, ...");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_500_is_an_error_not_a_payload() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = extractor_for(&server)?
            .extract(&OwnerContext::default(), "42")
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
