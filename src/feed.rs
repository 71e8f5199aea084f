use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, REFERER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::warn;

use crate::address::Address;
use crate::config::AppConfig;
use crate::errors::{excerpt, AppError, AppResult};

const TOURNAMENT_ENDPOINT: &str = "/tournament_requests";
const QUERY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const RETRY_BASE_DELAY_SECS: u64 = 5;
const MAX_BODY_EXCERPT: usize = 200;

/// A tournament as delivered by the federation feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub club: Club,
    #[serde(default)]
    pub rules: Option<Rules>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub endowment: i64,
}

impl Tournament {
    /// Upstream-reported endowment, or the sum of per-table endowments when
    /// the feed reports zero (it serializes a missing value as 0).
    pub fn total_endowment(&self) -> i64 {
        if self.endowment != 0 || self.tables.is_empty() {
            return self.endowment;
        }
        self.tables.iter().map(|table| table.endowment).sum()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub department: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default)]
    pub identifier: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    #[serde(default)]
    pub age_min: i32,
    #[serde(default)]
    pub age_max: i32,
    #[serde(default)]
    pub points: i32,
    #[serde(default)]
    pub ranking: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub endowment: i64,
}

/// Seam between the refresh pipeline and the upstream feed, so the pipeline
/// can be exercised against canned tournament lists.
#[async_trait]
pub trait TournamentSource: Send + Sync {
    async fn fetch(
        &self,
        after: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
        max_retries: u32,
    ) -> AppResult<Vec<Tournament>>;
}

/// HTTP client for the federation tournament feed.
pub struct FeedClient {
    http: Client,
    base_url: String,
    referer: String,
}

impl FeedClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.feed_base_url.clone(),
            referer: config.feed_referer.clone(),
        })
    }

    async fn fetch_once(
        &self,
        after: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Tournament>> {
        let url = format!("{}{}", self.base_url, TOURNAMENT_ENDPOINT);
        let mut request = self
            .http
            .get(&url)
            .query(&[(
                "startDate[after]",
                after.format(QUERY_DATE_FORMAT).to_string(),
            )])
            .query(&[("itemsPerPage", "999999"), ("order[startDate]", "asc")])
            .header(ACCEPT, "application/json")
            .header(REFERER, &self.referer);
        if let Some(before) = before {
            request = request.query(&[(
                "startDate[before]",
                before.format(QUERY_DATE_FORMAT).to_string(),
            )]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_feed_body(&body)
    }
}

#[async_trait]
impl TournamentSource for FeedClient {
    async fn fetch(
        &self,
        after: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
        max_retries: u32,
    ) -> AppResult<Vec<Tournament>> {
        let attempts = max_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let retry = u64::from(attempt - 1);
                let delay = Duration::from_secs(RETRY_BASE_DELAY_SECS * retry * retry);
                warn!(attempt, attempts, ?delay, "retrying feed fetch");
                sleep(delay).await;
            }
            match self.fetch_once(after, before).await {
                Ok(tournaments) => return Ok(tournaments),
                Err(err) => {
                    warn!(attempt, %err, "feed fetch attempt failed");
                    let terminal = !err.is_transient();
                    last_err = Some(err);
                    // Upstream application errors will not heal on retry.
                    if terminal {
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::Config("feed fetch made no attempts".into())))
    }
}

/// The feed answers with one of three shapes: a bare tournament array, a
/// Hydra collection wrapping the array in `hydra:member`, or a Hydra error
/// object. Anything else is reported with a bounded excerpt of the body.
fn parse_feed_body(body: &str) -> AppResult<Vec<Tournament>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|err| AppError::Parse(format!("tournament array: {err}")));
    }

    let object = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        _ => {
            return Err(AppError::Parse(format!(
                "unrecognized feed response: {}",
                excerpt(trimmed, MAX_BODY_EXCERPT)
            )))
        }
    };

    if let Some(member) = object.get("hydra:member") {
        return serde_json::from_value(member.clone())
            .map_err(|err| AppError::Parse(format!("hydra:member collection: {err}")));
    }

    for key in ["hydra:description", "hydra:title"] {
        if let Some(Value::String(message)) = object.get(key) {
            return Err(AppError::Upstream(message.clone()));
        }
    }

    Err(AppError::Parse(format!(
        "unexpected feed object: {}",
        excerpt(trimmed, MAX_BODY_EXCERPT)
    )))
}
