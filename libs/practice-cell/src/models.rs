use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==============================================================================
// PRACTICE SNAPSHOT MODELS
// ==============================================================================

/// Read-only configuration for one practice, supplied by the practice API.
/// Everything the scheduling engine knows about types, providers and rooms
/// comes from here; the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeSnapshot {
    pub id: String,
    pub nexhealth_subdomain: String,
    pub nexhealth_location_id: i64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub appointment_types: Vec<AppointmentType>,
    #[serde(default)]
    pub providers: Vec<SavedProvider>,
    #[serde(default)]
    pub operatories: Vec<SavedOperatory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentType {
    pub id: i64,
    pub nexhealth_appointment_type_id: i64,
    pub name: String,
    pub duration_minutes: i32,
    #[serde(default = "default_true")]
    pub bookable_online: bool,
    /// Optional grouping/keyword tags used by the matcher in addition to the
    /// static alias table.
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedProvider {
    pub id: i64,
    pub nexhealth_provider_id: i64,
    pub name: String,
    pub is_active: bool,
    /// Accepted appointment type ids (internal). Empty means accepts all,
    /// kept for practices configured before per-type acceptance existed.
    #[serde(default)]
    pub accepted_appointment_type_ids: Vec<i64>,
    /// Assigned operatories by internal id.
    #[serde(default)]
    pub assigned_operatory_ids: Vec<i64>,
}

impl SavedProvider {
    pub fn accepts_type(&self, appointment_type_id: i64) -> bool {
        self.accepted_appointment_type_ids.is_empty()
            || self.accepted_appointment_type_ids.contains(&appointment_type_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedOperatory {
    pub id: i64,
    pub nexhealth_operatory_id: i64,
    pub name: String,
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PracticeError {
    #[error("Practice has no scheduling configuration")]
    PracticeConfigMissing,

    #[error("Practice has no appointment types configured")]
    NoAppointmentTypes,

    #[error("Practice has no saved providers")]
    NoSavedProviders,

    #[error("Practice has no active providers")]
    NoActiveProviders,

    #[error("No active provider accepts appointment type '{type_name}'")]
    NoProvidersForType { type_name: String },

    #[error("Eligible providers have no operatories assigned")]
    NoAssignedOperatories,

    #[error("Unknown appointment type: {0}")]
    InvalidAppointmentType(String),

    #[error("Failed to load practice configuration: {0}")]
    Fetch(String),
}

impl PracticeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PracticeError::PracticeConfigMissing => "PRACTICE_CONFIG_MISSING",
            PracticeError::NoAppointmentTypes => "NO_APPOINTMENT_TYPES",
            PracticeError::NoSavedProviders => "NO_SAVED_PROVIDERS",
            PracticeError::NoActiveProviders => "NO_ACTIVE_PROVIDERS",
            PracticeError::NoProvidersForType { .. } => "NO_PROVIDERS_FOR_TYPE",
            PracticeError::NoAssignedOperatories => "NO_ASSIGNED_OPERATORIES",
            PracticeError::InvalidAppointmentType(_) => "INVALID_APPOINTMENT_TYPE",
            PracticeError::Fetch(_) => "PRACTICE_CONFIG_MISSING",
        }
    }
}
