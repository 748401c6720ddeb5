use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use shared_config::AppConfig;

/// Terminal or in-flight disposition of one call, written after every
/// booking-relevant turn. Call records are advisory; a failed write never
/// fails the tool call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    InProgress,
    Booked,
    BookingFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallRecordUpsert {
    pub call_id: String,
    pub practice_id: String,
    pub status: CallOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booked_appointment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Error)]
pub enum CallLogError {
    #[error("Call record write failed: {0}")]
    Http(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    async fn upsert(&self, record: CallRecordUpsert) -> Result<(), CallLogError>;
}

/// Persists call records to the practice API. Unconfigured deployments get a
/// logged no-op rather than an error.
pub struct HttpCallRecordStore {
    client: Client,
    base_url: String,
}

impl HttpCallRecordStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.practice_api_base_url.clone(),
        }
    }
}

#[async_trait]
impl CallRecordStore for HttpCallRecordStore {
    async fn upsert(&self, record: CallRecordUpsert) -> Result<(), CallLogError> {
        if self.base_url.is_empty() {
            debug!(
                "Call logging not configured, dropping record for call {}",
                record.call_id
            );
            return Ok(());
        }

        let url = format!("{}/api/call-records", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&record)
            .send()
            .await
            .map_err(|e| CallLogError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Call record upsert rejected ({}): {}", status, body);
            return Err(CallLogError::Http(format!("{}: {}", status, body)));
        }

        debug!("Recorded call {} as {:?}", record.call_id, record.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base_url: &str) -> AppConfig {
        AppConfig {
            nexhealth_base_url: "https://nexhealth.info".to_string(),
            nexhealth_api_key: "test-key".to_string(),
            practice_api_base_url: base_url.to_string(),
            default_practice_timezone: "America/Chicago".to_string(),
        }
    }

    fn record() -> CallRecordUpsert {
        CallRecordUpsert {
            call_id: "call-1".to_string(),
            practice_id: "practice-1".to_string(),
            status: CallOutcome::Booked,
            booked_appointment_id: Some(9001),
            summary: None,
        }
    }

    #[tokio::test]
    async fn posts_record_to_practice_api() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/call-records"))
            .and(body_json_string(
                r#"{"call_id":"call-1","practice_id":"practice-1","status":"booked","booked_appointment_id":9001}"#,
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = HttpCallRecordStore::new(&config_for(&mock_server.uri()));
        store.upsert(record()).await.unwrap();
    }

    #[tokio::test]
    async fn unconfigured_store_is_a_no_op() {
        let store = HttpCallRecordStore::new(&config_for(""));
        store.upsert(record()).await.unwrap();
    }

    #[tokio::test]
    async fn server_rejection_surfaces_as_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let store = HttpCallRecordStore::new(&config_for(&mock_server.uri()));
        assert!(store.upsert(record()).await.is_err());
    }
}
