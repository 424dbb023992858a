//! Management API client implementation.
//!
//! This module provides the REST client used to list, create, patch and
//! delete resources on a tenant's management API.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::ApiError;
use crate::planner::Patch;
use crate::resource::{Resource, ResourceKind};

use super::api::{ApiResult, ResourceApi};
use super::types::{create_payload, remote_id_from_wire, resource_from_wire};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Upper bound on a server-requested rate-limit wait.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Page size used when listing resources.
pub const PAGE_SIZE: usize = 50;

/// Safety bound on the number of pages read in one listing.
const MAX_PAGES: usize = 10_000;

/// REST client for the management API.
#[derive(Debug, Clone)]
pub struct HttpResourceApi {
    /// HTTP client.
    client: Client,
    /// Base URL, ending with a slash.
    base_url: String,
    /// Bearer token.
    token: String,
    /// Request timeout, reported on timeouts.
    timeout_secs: u64,
    /// Base delay between retries.
    retry_delay: Duration,
}

/// A single request, rebuilt on every attempt.
struct Call<'a> {
    method: Method,
    url: String,
    query: Vec<(&'static str, String)>,
    body: Option<&'a Value>,
    remote_id: Option<&'a str>,
}

impl Call<'_> {
    /// Whether sending the request twice has the same effect as once.
    fn is_idempotent(&self) -> bool {
        self.method != Method::POST
    }
}

/// Outcome of a failed attempt.
enum Failure {
    /// The request may be sent again if the error is transient.
    Retry(ApiError),
    /// The server may already have acted on the request.
    Final(ApiError),
}

impl From<ApiError> for Failure {
    fn from(error: ApiError) -> Self {
        Self::Retry(error)
    }
}

impl HttpResourceApi {
    /// Creates a client for `https://{domain}/api/v2/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(domain: &str, token: &str) -> ApiResult<Self> {
        Self::with_timeout(domain, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(domain: &str, token: &str, timeout_secs: u64) -> ApiResult<Self> {
        let domain = domain.trim_end_matches('/');
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            format!("{domain}/api/v2/")
        } else {
            format!("https://{domain}/api/v2/")
        };
        Self::build(base_url, token, timeout_secs)
    }

    /// Creates a client against an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_base_url(base_url: &str, token: &str) -> ApiResult<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Self::build(base_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Sets the base delay between retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(base_url: String, token: &str, timeout_secs: u64) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
            timeout_secs,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.base_url, kind.collection_path())
    }

    fn resource_url(&self, kind: ResourceKind, remote_id: &str) -> String {
        format!("{}/{remote_id}", self.collection_url(kind))
    }

    /// Sends a request, retrying transient failures.
    async fn send(&self, call: &Call<'_>) -> ApiResult<Option<Value>> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = last_error
                    .as_ref()
                    .and_then(ApiError::retry_delay_secs)
                    .map_or(self.retry_delay * attempt, |secs| {
                        Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS))
                    });
                debug!("Retry attempt {attempt} of {MAX_RETRIES} in {delay:?}");
                tokio::time::sleep(delay).await;
            }

            match self.send_once(call).await {
                Ok(result) => return Ok(result),
                Err(Failure::Retry(e)) if e.is_retryable() => {
                    warn!("{} {} failed: {e}", call.method, call.url);
                    last_error = Some(e);
                }
                Err(Failure::Retry(e) | Failure::Final(e)) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::network("Max retries exceeded")))
    }

    /// Sends a single request.
    ///
    /// A non-idempotent request is only retried when it never reached the
    /// server or the server refused it with a rate limit.
    async fn send_once(&self, call: &Call<'_>) -> Result<Option<Value>, Failure> {
        trace!("{} {} {:?}", call.method, call.url, call.query);

        let mut request = self
            .client
            .request(call.method.clone(), &call.url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/json");
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(body) = call.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let error = self.transport_error(&e);
            if call.is_idempotent() || e.is_connect() {
                Failure::Retry(error)
            } else {
                Failure::Final(error)
            }
        })?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited { retry_after_secs }.into());
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::AuthenticationFailed {
                message: error_message(status, &body),
            }
            .into());
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                remote_id: call.remote_id.unwrap_or(&call.url).to_string(),
            }
            .into());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::request(status.as_u16(), error_message(status, &body)).into());
        }

        // The server accepted the request; resending could repeat its effect.
        let bytes = response.bytes().await.map_err(|e| {
            let error = self.transport_error(&e);
            if call.is_idempotent() {
                Failure::Retry(error)
            } else {
                Failure::Final(error)
            }
        })?;
        if bytes.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            Failure::Final(ApiError::invalid_response(format!(
                "Failed to parse response: {e}"
            )))
        })
    }

    fn transport_error(&self, error: &reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout {
                after_secs: self.timeout_secs,
            }
        } else {
            ApiError::network(format!("Request failed: {error}"))
        }
    }
}

/// Extracts the API's error message from a JSON error body, if any.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            }
        })
}

#[async_trait]
impl ResourceApi for HttpResourceApi {
    async fn list(&self, kind: ResourceKind) -> ApiResult<Vec<Resource>> {
        let mut resources = Vec::new();

        for page in 0..MAX_PAGES {
            let call = Call {
                method: Method::GET,
                url: self.collection_url(kind),
                query: vec![("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())],
                body: None,
                remote_id: None,
            };

            let items = match self.send(&call).await? {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(ApiError::invalid_response(format!(
                        "expected a JSON array listing {kind} resources"
                    )));
                }
                None => Vec::new(),
            };

            let count = items.len();
            for item in items {
                resources.push(resource_from_wire(kind, item)?);
            }

            debug!("Listed page {page} of {kind}: {count} item(s)");
            if count < PAGE_SIZE {
                return Ok(resources);
            }
        }

        Err(ApiError::invalid_response(format!(
            "listing {kind} resources exceeded {MAX_PAGES} pages"
        )))
    }

    async fn create(&self, resource: &Resource) -> ApiResult<String> {
        let body = create_payload(resource);
        let call = Call {
            method: Method::POST,
            url: self.collection_url(resource.kind),
            query: Vec::new(),
            body: Some(&body),
            remote_id: None,
        };

        let response = self
            .send(&call)
            .await?
            .ok_or_else(|| ApiError::invalid_response("empty create response"))?;
        remote_id_from_wire(resource.kind, &response)
    }

    async fn update(&self, kind: ResourceKind, remote_id: &str, patch: &Patch) -> ApiResult<()> {
        let body = serde_json::to_value(patch)
            .map_err(|e| ApiError::invalid_response(format!("Failed to encode patch: {e}")))?;
        let call = Call {
            method: Method::PATCH,
            url: self.resource_url(kind, remote_id),
            query: Vec::new(),
            body: Some(&body),
            remote_id: Some(remote_id),
        };

        self.send(&call).await.map(|_| ())
    }

    async fn delete(&self, kind: ResourceKind, remote_id: &str) -> ApiResult<()> {
        let call = Call {
            method: Method::DELETE,
            url: self.resource_url(kind, remote_id),
            query: Vec::new(),
            body: None,
            remote_id: Some(remote_id),
        };

        self.send(&call).await.map(|_| ())
    }
}
