use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nexhealth_base_url: String,
    pub nexhealth_api_key: String,
    pub practice_api_base_url: String,
    pub default_practice_timezone: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            nexhealth_base_url: env::var("NEXHEALTH_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("NEXHEALTH_BASE_URL not set, using default");
                    "https://nexhealth.info".to_string()
                }),
            nexhealth_api_key: env::var("NEXHEALTH_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("NEXHEALTH_API_KEY not set, using empty value");
                    String::new()
                }),
            practice_api_base_url: env::var("PRACTICE_API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("PRACTICE_API_BASE_URL not set, using empty value");
                    String::new()
                }),
            default_practice_timezone: env::var("DEFAULT_PRACTICE_TIMEZONE")
                .unwrap_or_else(|_| "America/Chicago".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.nexhealth_base_url.is_empty()
            && !self.nexhealth_api_key.is_empty()
    }

    pub fn is_call_logging_configured(&self) -> bool {
        !self.practice_api_base_url.is_empty()
    }
}
