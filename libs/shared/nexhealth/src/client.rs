use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 250;

/// Failures from the external scheduling API, classified by response status
/// so callers can map them onto caller-facing error codes.
#[derive(Error, Debug)]
pub enum NexHealthError {
    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Request rejected as invalid: {0}")]
    Validation(String),

    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response shape: {0}")]
    Decode(String),
}

impl NexHealthError {
    /// Transport failures and server-side errors are safe to retry for
    /// idempotent reads. Everything else is a definitive answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            NexHealthError::Transport(_) => true,
            NexHealthError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub struct NexHealthClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NexHealthClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.nexhealth_base_url.clone(),
            api_key: config.nexhealth_api_key.clone(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.Nexhealth+json;version=2"),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }

        headers
    }

    fn classify_status(status: StatusCode, body: String) -> NexHealthError {
        match status.as_u16() {
            400 | 422 => NexHealthError::Validation(body),
            401 | 403 => NexHealthError::Auth(body),
            409 => NexHealthError::Conflict(body),
            code => NexHealthError::Api {
                status: code,
                message: body,
            },
        }
    }

    async fn execute<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T, NexHealthError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.get_headers());

        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body_data) = body {
            req = req.json(body_data);
        }

        let response = req
            .send()
            .await
            .map_err(|e| NexHealthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("NexHealth API error ({}): {}", status, error_text);
            return Err(Self::classify_status(status, error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| NexHealthError::Decode(e.to_string()))
    }

    /// Idempotent read with bounded retry and doubling backoff. Writes never
    /// come through here; a duplicate booking is worse than a failed one.
    pub async fn get<T>(&self, path: &str, query: &[(String, String)]) -> Result<T, NexHealthError>
    where
        T: DeserializeOwned,
    {
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut last_error = None;

        for attempt in 1..=RETRY_ATTEMPTS {
            match self.execute(Method::GET, path, query, None).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    warn!(
                        "GET {} failed (attempt {}/{}): {}, retrying in {:?}",
                        path, attempt, RETRY_ATTEMPTS, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| NexHealthError::Transport("retries exhausted".to_string())))
    }

    /// Single-shot write. Status classification is the caller's contract:
    /// 409 means the slot went away, 400/422 a payload problem, 401 bad
    /// credentials.
    pub async fn post<T>(
        &self,
        path: &str,
        query: &[(String, String)],
        body: &Value,
    ) -> Result<T, NexHealthError>
    where
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, query, Some(body)).await
    }
}
