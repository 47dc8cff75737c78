pub mod auth;
pub mod sharepoint;
pub mod users;

use crate::error::{Result, SweepError};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// SharePoint REST answers with OData "nometadata" JSON when asked this way
pub const SHAREPOINT_ACCEPT: &str = "application/json;odata=nometadata";

/// Default retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30000;
const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff with jitter for exponential backoff
    fn backoff(&self, attempt: u32) -> Duration {
        let base_backoff = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_backoff = base_backoff.min(self.max_backoff_ms);

        let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
        let jitter = if jitter_range > 0 {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
        } else {
            0
        };

        let floor = self.initial_backoff_ms.min(100) as i64;
        Duration::from_millis((capped_backoff as i64 + jitter).max(floor) as u64)
    }
}

/// Build the shared HTTP client used by every session
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("permsweep/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Bearer-authenticated REST client with retry support
///
/// Used for Graph (`base_url` = `https://graph.microsoft.com/v1.0`) and for one
/// SharePoint site (`base_url` = `{site}/_api`). A client is tied to exactly one
/// access token; sessions for a different resource get their own client.
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    accept: Option<&'static str>,
    retry: RetryPolicy,
}

impl GraphClient {
    pub fn new(client: Client, access_token: String) -> Self {
        Self {
            client,
            access_token,
            base_url: GRAPH_API_BASE.to_string(),
            accept: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Client scoped to one SharePoint site's REST API
    pub fn for_site(client: Client, access_token: String, site_url: &str) -> Self {
        Self {
            client,
            access_token,
            base_url: format!("{}/_api", site_url.trim_end_matches('/')),
            accept: Some(SHAREPOINT_ACCEPT),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// GET an endpoint (relative to the base URL) or an absolute URL such as a nextLink
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        let resp = self.execute(Method::GET, &url, None, &[]).await?;
        Ok(resp.json::<T>().await?)
    }

    /// POST where the response body is irrelevant (SharePoint actions, MERGE/DELETE tunnelling)
    pub async fn post_action(
        &self,
        endpoint: &str,
        body: Option<&serde_json::Value>,
        headers: &[(&str, &str)],
    ) -> Result<()> {
        let url = self.url(endpoint);
        self.execute(Method::POST, &url, body, headers).await?;
        Ok(())
    }

    /// Send a request, retrying on 429 (honouring Retry-After), 5xx and connection errors
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let max_retries = self.retry.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_retries {
            tracing::debug!(%method, url, attempt, "API request");

            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.access_token);
            if let Some(accept) = self.accept {
                request = request.header(reqwest::header::ACCEPT, accept);
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            if let Some(body) = body {
                request = match self.accept {
                    Some(accept) => request
                        .header(reqwest::header::CONTENT_TYPE, accept)
                        .body(body.to_string()),
                    None => request.json(body),
                };
            }

            let is_last = attempt + 1 >= max_retries;

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS && !is_last {
                        let wait_time = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| self.retry.backoff(attempt));

                        tracing::warn!(
                            url,
                            "Rate limited (429). Retrying in {:?} (attempt {}/{})",
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }

                    if status.is_server_error() && !is_last {
                        let wait_time = self.retry.backoff(attempt);
                        tracing::warn!(
                            url,
                            "Server error ({}). Retrying in {:?} (attempt {}/{})",
                            status,
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = resp.text().await.unwrap_or_default();
                        return Err(SweepError::ApiError {
                            status: status.as_u16(),
                            message: crate::error::enhance_api_error(&error_text),
                        });
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    if !is_last {
                        let wait_time = self.retry.backoff(attempt);
                        tracing::warn!(
                            url,
                            "Connection error: {}. Retrying in {:?} (attempt {}/{})",
                            e,
                            wait_time,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(|e| e.into()).unwrap_or_else(|| SweepError::ApiError {
            status: 0,
            message: format!("{} {} failed after {} retries", method, url, max_retries),
        }))
    }
}

// ============================================================================
// Pagination Helpers
// ============================================================================

/// One page of an OData collection
///
/// Graph uses `@odata.nextLink`; SharePoint REST in nometadata mode uses `odata.nextLink`.
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", alias = "odata.nextLink", default)]
    pub next_link: Option<String>,
}

impl GraphClient {
    /// Fetch all pages of a paginated endpoint, following nextLink until absent
    pub async fn get_all_pages<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = self.url(endpoint);

        loop {
            let response: PaginatedResponse<T> = self.get(&current_url).await?;
            all_items.extend(response.value);

            match response.next_link {
                Some(next) => current_url = self.url(&next),
                None => break,
            }
        }

        Ok(all_items)
    }
}
