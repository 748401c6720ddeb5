use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot;

// ==============================================================================
// CONVERSATION STATE
// ==============================================================================

/// Everything learned so far in one call, rebuilt from a serialized snapshot
/// at the start of every turn and echoed back at the end of it. The snapshot
/// crosses a network boundary each turn, so every field restores defensively:
/// unknown fields are ignored, mistyped fields default, legacy camelCase
/// names are migrated at the deserialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    #[serde(alias = "schemaVersion", deserialize_with = "snapshot::lenient_version")]
    pub schema_version: u32,

    // Identity, immutable once created.
    #[serde(alias = "callId", deserialize_with = "snapshot::lenient_string")]
    pub call_id: String,
    #[serde(alias = "practiceId", deserialize_with = "snapshot::lenient_string")]
    pub practice_id: String,
    #[serde(alias = "assistantId", deserialize_with = "snapshot::lenient_string")]
    pub assistant_id: String,

    // Learned turn by turn.
    #[serde(alias = "patientId", deserialize_with = "snapshot::lenient_opt_i64")]
    pub patient_id: Option<i64>,
    #[serde(alias = "patientStatus", deserialize_with = "snapshot::lenient_patient_status")]
    pub patient_status: PatientStatus,
    #[serde(alias = "appointmentTypeId", deserialize_with = "snapshot::lenient_opt_i64")]
    pub appointment_type_id: Option<i64>,
    #[serde(alias = "appointmentTypeName", deserialize_with = "snapshot::lenient_opt_string")]
    pub appointment_type_name: Option<String>,
    #[serde(alias = "durationMinutes", deserialize_with = "snapshot::lenient_opt_i32")]
    pub duration_minutes: Option<i32>,
    #[serde(alias = "requestedDate", deserialize_with = "snapshot::lenient_opt_date")]
    pub requested_date: Option<NaiveDate>,
    #[serde(alias = "availableSlots", deserialize_with = "snapshot::lenient_opt_slots")]
    pub available_slots: Option<Vec<Slot>>,
    #[serde(alias = "selectedSlot", deserialize_with = "snapshot::lenient_opt_slot")]
    pub selected_slot: Option<Slot>,
    #[serde(alias = "confirmationPresented", deserialize_with = "snapshot::lenient_bool")]
    pub confirmation_presented: bool,
    #[serde(alias = "bookedAppointment", deserialize_with = "snapshot::lenient_opt_booking")]
    pub booked_appointment: Option<BookingRecord>,
    #[serde(alias = "callSummary", deserialize_with = "snapshot::lenient_opt_string")]
    pub call_summary: Option<String>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            schema_version: snapshot::CURRENT_SCHEMA_VERSION,
            call_id: String::new(),
            practice_id: String::new(),
            assistant_id: String::new(),
            patient_id: None,
            patient_status: PatientStatus::Unknown,
            appointment_type_id: None,
            appointment_type_name: None,
            duration_minutes: None,
            requested_date: None,
            available_slots: None,
            selected_slot: None,
            confirmation_presented: false,
            booked_appointment: None,
            call_summary: None,
        }
    }
}

impl ConversationState {
    pub fn new(
        call_id: impl Into<String>,
        practice_id: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            practice_id: practice_id.into(),
            assistant_id: assistant_id.into(),
            ..Self::default()
        }
    }

    /// True when the snapshot never carried an identity, i.e. this is the
    /// first turn of the call.
    pub fn is_blank(&self) -> bool {
        self.call_id.is_empty()
    }

    pub fn identify_patient(&mut self, patient_id: i64, status: PatientStatus) {
        self.patient_id = Some(patient_id);
        self.patient_status = status;
    }

    /// Accepting a resolved appointment type writes id, name and duration
    /// together; the three fields are never set independently.
    pub fn set_appointment_type(&mut self, id: i64, name: impl Into<String>, duration_minutes: i32) {
        self.appointment_type_id = Some(id);
        self.appointment_type_name = Some(name.into());
        self.duration_minutes = Some(duration_minutes);
    }

    /// A fresh availability result replaces the slot list and invalidates any
    /// previous selection; a slot chosen against a stale list must not survive.
    pub fn record_availability(&mut self, date: NaiveDate, slots: Vec<Slot>) {
        self.requested_date = Some(date);
        self.available_slots = Some(slots);
        self.selected_slot = None;
        self.confirmation_presented = false;
    }

    pub fn select_slot(&mut self, slot: Slot) -> Result<(), StateError> {
        if self.requested_date.is_none() {
            return Err(StateError::MissingRequestedDate);
        }
        self.selected_slot = Some(slot);
        self.confirmation_presented = true;
        Ok(())
    }

    pub fn clear_confirmation(&mut self) {
        self.confirmation_presented = false;
    }

    pub fn record_booking(&mut self, record: BookingRecord) {
        self.booked_appointment = Some(record);
        self.confirmation_presented = false;
    }

    /// A failed booking write must not leave the machine stuck in
    /// details-presented, nor keep a half-written record around.
    pub fn rollback_booking(&mut self) {
        self.confirmation_presented = false;
        self.booked_appointment = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    New,
    Existing,
    Unknown,
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientStatus::New => write!(f, "new"),
            PatientStatus::Existing => write!(f, "existing"),
            PatientStatus::Unknown => write!(f, "unknown"),
        }
    }
}

// ==============================================================================
// SLOTS AND BOOKINGS
// ==============================================================================

/// One bookable window, carrying both the raw UTC instants used for the
/// booking write and the display strings read to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(alias = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(alias = "endTime")]
    pub end_time: DateTime<Utc>,
    #[serde(alias = "providerId")]
    pub provider_id: i64,
    #[serde(default, alias = "operatoryId")]
    pub operatory_id: Option<i64>,
    #[serde(default, alias = "locationId")]
    pub location_id: Option<i64>,
    #[serde(default, alias = "displayStart")]
    pub display_start: String,
    #[serde(default, alias = "displayEnd")]
    pub display_end: String,
    #[serde(default, alias = "displayRange")]
    pub display_range: String,
    #[serde(default, alias = "providerName")]
    pub provider_name: String,
    #[serde(default, alias = "operatoryName")]
    pub operatory_name: Option<String>,
}

/// Created only after a successful external booking call; immutable for the
/// rest of the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    #[serde(alias = "nexhealthAppointmentId")]
    pub nexhealth_appointment_id: i64,
    #[serde(alias = "patientId")]
    pub patient_id: i64,
    #[serde(alias = "providerId")]
    pub provider_id: i64,
    #[serde(default, alias = "providerName")]
    pub provider_name: String,
    #[serde(default, alias = "operatoryId")]
    pub operatory_id: Option<i64>,
    #[serde(alias = "date")]
    pub date: NaiveDate,
    #[serde(default, alias = "displayTime")]
    pub display_time: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum StateError {
    #[error("A slot cannot be selected before a date has been requested")]
    MissingRequestedDate,

    #[error("Confirmation requires a selected slot")]
    NoSelectedSlot,
}
