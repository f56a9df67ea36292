use std::sync::Arc;

use http::StatusCode;
use metrics::{counter, histogram};
use reqwest::header;
use tracing::{debug, warn};

use crate::api::{AttributionError, MatchError, MatchOutcome};
use crate::config::MatchClientConfig;
use crate::platform::Connectivity;
use crate::request::AttributionRequest;
use crate::response::AttributionResult;
use crate::token::{TenantCredentials, TENANT_TOKEN_HEADER};

const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const ACCEPT: &str = "application/json";

/// Build the HTTP client used for match calls.
///
/// Connect and read phases get separate timeouts. Idle connections are not pooled, so every
/// call opens its own connection and drops it when the response has been read.
pub fn build_http_client(config: &MatchClientConfig) -> reqwest::Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(CONTENT_TYPE),
    );
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .pool_max_idle_per_host(0)
        .build()
}

/// `<base_url>/match`, tolerating a base with or without a trailing slash.
pub fn match_endpoint(base_url: &str) -> Result<reqwest::Url, url::ParseError> {
    let base = format!("{}/", base_url.trim_end_matches('/'));

    reqwest::Url::parse(&base)?.join("match")
}

/// Client for the remote match service. Each call is a single attempt.
#[derive(Clone)]
pub struct MatchClient {
    http_client: reqwest::Client,
    endpoint: reqwest::Url,
    credentials: Arc<TenantCredentials>,
    connectivity: Arc<dyn Connectivity>,
}

impl MatchClient {
    pub fn new(
        config: &MatchClientConfig,
        credentials: Arc<TenantCredentials>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, AttributionError> {
        let endpoint = match_endpoint(&config.base_url).map_err(|e| {
            AttributionError::InvalidArgument(format!(
                "match base url {} is not valid: {}",
                config.base_url, e
            ))
        })?;
        let http_client = build_http_client(config)?;

        Ok(Self {
            http_client,
            endpoint,
            credentials,
            connectivity,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    /// Send `request` to the match service and interpret the answer.
    ///
    /// Nothing is sent when the device is offline. A 200 response is parsed into an
    /// `AttributionResult` whose fields may each be missing; any other status fails with
    /// `"<status> - <body>"`.
    pub async fn match_request(&self, request: &AttributionRequest) -> MatchOutcome {
        if !self.connectivity.is_online() {
            warn!("skipping match request: no connectivity");
            counter!("attribution_match_total", "outcome" => "no_connectivity").increment(1);
            return Err(MatchError::NoConnectivity);
        }

        let now = tokio::time::Instant::now();
        let outcome = self.send(request).await;
        let elapsed = now.elapsed().as_secs_f64();

        histogram!("attribution_match_duration_seconds").record(elapsed);

        match &outcome {
            Ok(result) => {
                debug!(?result, elapsed, "match request succeeded");
                counter!("attribution_match_total", "outcome" => "success").increment(1);
            }
            Err(e) => {
                warn!(elapsed, "match request failed: {}", e);
                counter!("attribution_match_total", "outcome" => e.label()).increment(1);
            }
        }

        outcome
    }

    async fn send(&self, request: &AttributionRequest) -> MatchOutcome {
        let token = self.credentials.token()?;
        let body = serde_json::to_vec(&request.to_payload())
            .map_err(|e| MatchError::Serialize(e.to_string()))?;

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header(TENANT_TOKEN_HEADER, token)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(MatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        AttributionResult::from_json(&body).map_err(|e| MatchError::Decode(e.to_string()))
    }
}
