use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info_span, instrument};

use crate::config::Config;
use crate::error::ApiError;
use crate::model::{MatchListEnvelope, Page, Sport, SportsEnvelope};
use crate::query_cache::{QueryKey, StatusFilter};

/// Parameters of one `matchList` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    pub timezone: String,
    pub status: StatusFilter,
    pub tournament_ids: Vec<u64>,
    pub limit: u32,
    pub offset: u32,
}

impl MatchQuery {
    pub fn from_key(key: &QueryKey, offset: u32, limit: u32) -> Self {
        Self {
            timezone: key.timezone().to_string(),
            status: key.status(),
            tournament_ids: key.tournament_ids().to_vec(),
            limit,
            offset,
        }
    }

    /// Query string pairs. `status` and `tournament_ids` are left out when
    /// the list is unfiltered.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("timezone", self.timezone.clone())];
        if let Some(status) = self.status.as_query_param() {
            params.push(("status", status.to_string()));
        }
        if !self.tournament_ids.is_empty() {
            let ids: Vec<String> = self.tournament_ids.iter().map(u64::to_string).collect();
            params.push(("tournament_ids", ids.join(",")));
        }
        params.push(("limit", self.limit.to_string()));
        params.push(("offset", self.offset.to_string()));
        params
    }
}

/// Parameters of one `AllSportsAndLeagues` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SportsQuery {
    pub search: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl SportsQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("search", search.to_string()));
        }
        params.push(("limit", self.limit.to_string()));
        params.push(("offset", self.offset.to_string()));
        params
    }
}

/// The fetch functions the cache layer is fed with. Implementations must
/// return typed [`ApiError`]s only.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<Page, ApiError>;

    async fn fetch_sports(&self, query: &SportsQuery) -> Result<Vec<Sport>, ApiError>;
}

/// HTTP client for the sports API.
///
/// ureq is blocking, so every call runs on the blocking pool and is raced
/// against the request ceiling.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
    timeout: Duration,
}

struct RawResponse {
    status: u16,
    body: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), agent, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T>(&self, path: &str, params: Vec<(&'static str, String)>) -> Result<(u16, T), ApiError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.endpoint(path);
        let agent = self.agent.clone();
        let task = tokio::task::spawn_blocking(move || Self::call(&agent, &url, &params));

        let raw = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => return Err(ApiError::network(format!("request task failed: {}", join_err))),
            Err(_) => return Err(ApiError::network(format!("request timed out after {}ms", self.timeout.as_millis()))),
        };

        if !(200..300).contains(&raw.status) {
            let message = error_message(&raw.body).unwrap_or_else(|| format!("HTTP {}", raw.status));
            error!(status = raw.status, message = %message, path, "API returned an error status");
            return Err(ApiError::server(raw.status, message));
        }

        serde_json::from_str::<T>(&raw.body)
            .map(|decoded| (raw.status, decoded))
            .map_err(|e| ApiError::parse(format!("invalid {} body: {}", path, e)))
    }

    fn call(agent: &ureq::Agent, url: &str, params: &[(&'static str, String)]) -> Result<RawResponse, ApiError> {
        let _span = info_span!("api_fetch", url = %url).entered();
        let mut request = agent
            .get(url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");
        for (name, value) in params {
            request = request.query(*name, value.as_str());
        }

        let response = request.call().map_err(|e| match e {
            ureq::Error::Timeout(_) => ApiError::network("request timed out"),
            other => ApiError::network(other.to_string()),
        })?;
        let status = response.status().as_u16();
        let mut body_reader = response.into_body();
        let body = body_reader
            .read_to_string()
            .map_err(|e| ApiError::network(format!("failed to read response body: {}", e)))?;
        debug!(status, bytes = body.len(), "Received response");
        Ok(RawResponse { status, body })
    }
}

/// Pull `message` out of an error body, if it is JSON and has one.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

#[async_trait]
impl MatchSource for ApiClient {
    #[instrument(level = "info", skip(self), fields(offset = query.offset, limit = query.limit))]
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<Page, ApiError> {
        let (status, envelope) = self.get_json::<MatchListEnvelope>("matchList", query.to_params()).await?;
        Page::from_envelope(envelope, query.offset, query.limit, status)
    }

    #[instrument(level = "info", skip(self))]
    async fn fetch_sports(&self, query: &SportsQuery) -> Result<Vec<Sport>, ApiError> {
        let (status, envelope) = self.get_json::<SportsEnvelope>("AllSportsAndLeagues", query.to_params()).await?;
        envelope.into_sports(status)
    }
}
