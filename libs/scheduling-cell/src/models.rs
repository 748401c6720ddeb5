use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use practice_cell::PracticeError;
use shared_nexhealth::NexHealthError;

// ==============================================================================
// EXTERNAL SCHEDULING API WIRE MODELS
// ==============================================================================

/// `GET /appointment_slots` response: slot windows grouped per provider.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotsEnvelope {
    #[serde(default)]
    pub data: Vec<ProviderSlotGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSlotGroup {
    pub pid: i64,
    #[serde(default)]
    pub lid: Option<i64>,
    #[serde(default)]
    pub slots: Vec<RawSlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSlot {
    pub time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub operatory_id: Option<i64>,
}

/// `POST /appointments` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentEnvelope {
    pub data: AppointmentEnvelopeData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentEnvelopeData {
    pub appt: CreatedAppointment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedAppointment {
    pub id: i64,
}

// ==============================================================================
// TOOL ARGUMENT MODELS
// ==============================================================================

/// Arguments shared by every tool call; identity fields are only honored on
/// the first turn, when the snapshot is still blank.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallIdentityArgs {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub practice_id: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentifyPatientArgs {
    #[serde(flatten)]
    pub identity: CallIdentityArgs,
    /// Accepted as number or numeric string; the voice layer is loose here.
    #[serde(default)]
    pub patient_id: Option<Value>,
    #[serde(default)]
    pub patient_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveAppointmentTypeArgs {
    #[serde(flatten)]
    pub identity: CallIdentityArgs,
    #[serde(default)]
    pub service_description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckAvailabilityArgs {
    #[serde(flatten)]
    pub identity: CallIdentityArgs,
    #[serde(default)]
    pub requested_date: Option<String>,
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub provider_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub operatory_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookAppointmentArgs {
    #[serde(flatten)]
    pub identity: CallIdentityArgs,
    #[serde(default)]
    pub selected_time: Option<String>,
    #[serde(default)]
    pub confirmed: Option<bool>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub note: Option<String>,
}

// ==============================================================================
// TOOL RESULT DATA MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityData {
    pub has_availability: bool,
    pub requested_date: NaiveDate,
    pub timezone: String,
    /// At most three distinct display times for the voice layer to offer.
    pub offered_times: Vec<String>,
    pub has_more: bool,
    pub total_slots: usize,
    pub lunch_break_slots_filtered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetailsData {
    pub appointment_type: String,
    pub provider_name: String,
    pub friendly_date: String,
    pub display_time: String,
    pub awaiting_confirmation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmedData {
    pub nexhealth_appointment_id: i64,
    pub provider_name: String,
    pub friendly_date: String,
    pub display_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClarificationData {
    pub reason: ClarificationReason,
    pub selected_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationReason {
    Declined,
    UnconfirmedRepeat,
}

// ==============================================================================
// ERROR TAXONOMY
// ==============================================================================

/// Every engine failure the tool boundary can report. Errors travel as data
/// (`error_code` + structured detail), never as transport failures.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error(transparent)]
    Practice(#[from] PracticeError),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("No patient id was provided")]
    InvalidPatientId,

    #[error("Patient id is not numeric: {0}")]
    InvalidPatientIdFormat(String),

    #[error("Selected time '{0}' is not among the offered slots")]
    SlotNotRecognized(String),

    #[error("Booking context incomplete, missing: {missing}")]
    IncompleteBookingContext { missing: String },

    #[error("Requested slot is no longer available: {0}")]
    SlotUnavailable(String),

    #[error("Booking payload rejected: {0}")]
    ValidationError(String),

    #[error("Scheduling API authentication failed: {0}")]
    AuthError(String),

    #[error("Scheduling API error: {0}")]
    NexhealthApi(String),
}

impl SchedulingError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SchedulingError::Practice(e) => e.error_code(),
            SchedulingError::InvalidTimeFormat(_) => "INVALID_TIME_FORMAT",
            SchedulingError::InvalidPatientId => "INVALID_PATIENT_ID",
            SchedulingError::InvalidPatientIdFormat(_) => "INVALID_PATIENT_ID_FORMAT",
            SchedulingError::SlotNotRecognized(_) => "SLOT_NOT_RECOGNIZED_OR_EXPIRED",
            SchedulingError::IncompleteBookingContext { .. } => "INCOMPLETE_BOOKING_CONTEXT",
            SchedulingError::SlotUnavailable(_) => "SLOT_UNAVAILABLE",
            SchedulingError::ValidationError(_) => "VALIDATION_ERROR",
            SchedulingError::AuthError(_) => "AUTH_ERROR",
            SchedulingError::NexhealthApi(_) => "NEXHEALTH_API_ERROR",
        }
    }
}

impl From<NexHealthError> for SchedulingError {
    fn from(err: NexHealthError) -> Self {
        match err {
            NexHealthError::Conflict(msg) => SchedulingError::SlotUnavailable(msg),
            NexHealthError::Validation(msg) => SchedulingError::ValidationError(msg),
            NexHealthError::Auth(msg) => SchedulingError::AuthError(msg),
            NexHealthError::Api { status, message } => {
                SchedulingError::NexhealthApi(format!("{}: {}", status, message))
            }
            NexHealthError::Transport(msg) => SchedulingError::NexhealthApi(msg),
            // A malformed payload can come back from any call, not just the
            // booking write; it reports as an upstream API failure.
            NexHealthError::Decode(msg) => SchedulingError::NexhealthApi(msg),
        }
    }
}
