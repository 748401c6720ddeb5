use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{PracticeError, PracticeSnapshot};

/// Read-only client for the practice configuration collaborator. The
/// scheduling engine only ever reads one snapshot per turn; all writes to
/// practice configuration happen elsewhere.
pub struct PracticeSnapshotService {
    client: Client,
    base_url: String,
}

impl PracticeSnapshotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.practice_api_base_url.clone(),
        }
    }

    pub async fn fetch_snapshot(&self, practice_id: &str) -> Result<PracticeSnapshot, PracticeError> {
        if self.base_url.is_empty() {
            warn!("Practice API base URL not configured");
            return Err(PracticeError::PracticeConfigMissing);
        }

        let url = format!(
            "{}/api/practices/{}/scheduling-snapshot",
            self.base_url, practice_id
        );
        debug!("Fetching practice snapshot from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PracticeError::Fetch(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(PracticeError::PracticeConfigMissing),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                warn!("Practice API error ({}): {}", status, body);
                Err(PracticeError::Fetch(format!("{}: {}", status, body)))
            }
            _ => response
                .json::<PracticeSnapshot>()
                .await
                .map_err(|e| PracticeError::Fetch(e.to_string())),
        }
    }
}
