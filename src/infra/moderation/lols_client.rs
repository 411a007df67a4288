use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;

use crate::core::moderation::{ClassificationError, ReputationSource, ReputationVerdict};

pub const DEFAULT_REPUTATION_URL: &str = "https://api.lols.bot";

/// Client for a lols.bot-style reputation service (`GET /account?id=<user id>`).
pub struct LolsReputationClient {
    client: Client,
    base_url: String,
}

/// Wire format of the account lookup. Only `banned` drives decisions.
#[derive(Debug, Deserialize)]
struct BanInfo {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    user_id: Option<i64>,
    banned: bool,
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    offenses: Option<u32>,
    #[serde(default)]
    spam_factor: Option<f64>,
}

impl LolsReputationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClassificationError> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", HeaderValue::from_static("GatekeeperBot/0.3"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ClassificationError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn parse(body: &str) -> Result<ReputationVerdict, ClassificationError> {
        let info: BanInfo = serde_json::from_str(body)
            .map_err(|e| ClassificationError::MalformedResponse(e.to_string()))?;

        if !info.ok {
            tracing::debug!(user_id = ?info.user_id, "Reputation service answered with ok=false");
        }
        if info.banned {
            tracing::debug!(user_id = ?info.user_id, when = ?info.when, "Account listed as spammer");
        }

        Ok(ReputationVerdict {
            banned: info.banned,
            offenses: info.offenses.unwrap_or_default(),
            spam_factor: info.spam_factor.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ReputationSource for LolsReputationClient {
    async fn lookup(&self, user_id: u64) -> Result<ReputationVerdict, ClassificationError> {
        let url = format!("{}/account", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("id", user_id.to_string())])
            .send()
            .await
            .map_err(|e| ClassificationError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClassificationError::Request(format!(
                "reputation service returned {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ClassificationError::Request(e.to_string()))?;

        Self::parse(&body)
    }
}
