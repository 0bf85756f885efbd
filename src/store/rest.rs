use super::*;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const VOTES_TABLE: &str = "votes";
const OVERRIDE_TABLE: &str = "override_settings";
const PLAYED_TABLE: &str = "played_tracks";
const SERVER_TIME_RPC: &str = "get_server_time";

/// Connection settings for the hosted database REST API
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Project base URL, e.g. `https://xyz.example.co`
    pub base_url: String,
    /// Service key, sent both as `apikey` and as bearer token
    pub api_key: String,
    pub timeout: Duration,
}

/// Store client for a PostgREST-style table API
pub struct RestStore {
    config: RestStoreConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct OverrideRow {
    key: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct PlayedRow<'a> {
    track_id: &'a str,
    played_at: DateTime<Utc>,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn rpc_url(&self, function: &str) -> String {
        format!(
            "{}/rest/v1/rpc/{}",
            self.config.base_url.trim_end_matches('/'),
            function
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        check_status(response).await
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> StoreResult<T> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Fetch a list, dropping rows that do not decode instead of failing the batch
    async fn fetch_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        builder: RequestBuilder,
    ) -> StoreResult<Vec<T>> {
        let rows: Vec<serde_json::Value> = self.fetch_json(builder).await?;
        Ok(decode_rows(table, rows))
    }
}

fn decode_rows<T: serde::de::DeserializeOwned>(
    table: &str,
    rows: Vec<serde_json::Value>,
) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(table, "Skipping malformed row: {}", e);
                None
            }
        })
        .collect()
}

/// Map HTTP status codes onto the store error taxonomy
async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{}: {}", status, body);
    Err(classify_status(status, detail))
}

fn classify_status(status: StatusCode, detail: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Permission(detail),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Network(detail)
        }
        _ => StoreError::Rejected(detail),
    }
}

#[async_trait]
impl VoteStore for RestStore {
    async fn votes_for_voter(&self, voter_id: &str) -> StoreResult<Vec<VoteRecord>> {
        let request = self.client.get(self.table_url(VOTES_TABLE)).query(&[
            ("select", "*".to_string()),
            ("voter_id", format!("eq.{}", voter_id)),
        ]);
        self.fetch_rows(VOTES_TABLE, request).await
    }

    async fn all_votes(&self) -> StoreResult<Vec<VoteRecord>> {
        let request = self
            .client
            .get(self.table_url(VOTES_TABLE))
            .query(&[("select", "*"), ("order", "created_at.asc")]);
        self.fetch_rows(VOTES_TABLE, request).await
    }

    async fn insert_vote(&self, record: VoteRecord) -> StoreResult<()> {
        let request = self
            .client
            .post(self.table_url(VOTES_TABLE))
            .header("Prefer", "return=minimal")
            .json(&[record]);
        self.send(request).await.map(|_| ())
    }

    async fn delete_vote(&self, track_id: &str, voter_id: &str) -> StoreResult<()> {
        let request = self.client.delete(self.table_url(VOTES_TABLE)).query(&[
            ("track_id", format!("eq.{}", track_id)),
            ("voter_id", format!("eq.{}", voter_id)),
        ]);
        self.send(request).await.map(|_| ())
    }

    async fn delete_all_votes(&self) -> StoreResult<()> {
        // Unfiltered deletes are refused by the API, so match every row explicitly
        let request = self
            .client
            .delete(self.table_url(VOTES_TABLE))
            .query(&[("track_id", "not.is.null")]);
        self.send(request).await.map(|_| ())
    }

    async fn override_enabled(&self) -> StoreResult<bool> {
        let request = self.client.get(self.table_url(OVERRIDE_TABLE)).query(&[
            ("select", "key,enabled".to_string()),
            ("key", format!("eq.{}", VOTING_OVERRIDE_KEY)),
        ]);
        let rows: Vec<OverrideRow> = self.fetch_json(request).await?;
        Ok(rows.first().map(|row| row.enabled).unwrap_or(false))
    }

    async fn set_override(&self, enabled: bool) -> StoreResult<()> {
        let row = OverrideRow {
            key: VOTING_OVERRIDE_KEY.to_string(),
            enabled,
        };
        let request = self
            .client
            .post(self.table_url(OVERRIDE_TABLE))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);
        self.send(request).await.map(|_| ())
    }

    async fn played_tracks(&self) -> StoreResult<Vec<PlayedTrack>> {
        let request = self
            .client
            .get(self.table_url(PLAYED_TABLE))
            .query(&[("select", "*")]);
        self.fetch_rows(PLAYED_TABLE, request).await
    }

    async fn mark_played(&self, track_id: &str) -> StoreResult<()> {
        let row = PlayedRow {
            track_id,
            played_at: Utc::now(),
        };
        let request = self
            .client
            .post(self.table_url(PLAYED_TABLE))
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&[row]);
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl TimeSource for RestStore {
    async fn server_now(&self) -> StoreResult<DateTime<Utc>> {
        let request = self
            .client
            .post(self.rpc_url(SERVER_TIME_RPC))
            .json(&serde_json::json!({}));
        let raw: String = self.fetch_json(request).await?;
        parse_instant(&raw)
            .ok_or_else(|| StoreError::Decode(format!("unparsable server time: {}", raw)))
    }
}
