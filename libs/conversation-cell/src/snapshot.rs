//! Snapshot (de)serialization for [`ConversationState`].
//!
//! State crosses a network boundary on every turn, so restoration never
//! trusts shape at runtime: every field tolerates absence, the wrong JSON
//! type, and the legacy camelCase field names, and anything unrecognized
//! defaults instead of failing the turn.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::models::{BookingRecord, ConversationState, PatientStatus, Slot};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

impl ConversationState {
    /// Rebuild state from an arbitrary snapshot value. Never fails: a
    /// malformed snapshot restores to a blank state, malformed fields to
    /// their defaults.
    pub fn restore(snapshot: &Value) -> Self {
        let mut state: ConversationState = match serde_json::from_value(snapshot.clone()) {
            Ok(state) => state,
            Err(e) => {
                warn!("Unrestorable conversation snapshot, starting blank: {}", e);
                ConversationState::default()
            }
        };
        state.schema_version = CURRENT_SCHEMA_VERSION;
        state.repair_invariants();
        state
    }

    pub fn to_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Cross-field invariants can be violated by a stale or hand-edited
    /// snapshot; repair drops the dependent field rather than the turn.
    fn repair_invariants(&mut self) {
        if self.selected_slot.is_some() && self.requested_date.is_none() {
            warn!("Snapshot carried a selected slot without a requested date, dropping selection");
            self.selected_slot = None;
            self.confirmation_presented = false;
        }
        if self.confirmation_presented && self.selected_slot.is_none() {
            warn!("Snapshot carried confirmation_presented without a selected slot, clearing flag");
            self.confirmation_presented = false;
        }
        // appointment_type_name is set iff appointment_type_id is set.
        match (self.appointment_type_id, self.appointment_type_name.as_ref()) {
            (Some(_), None) | (None, Some(_)) => {
                warn!("Snapshot carried a half-set appointment type, dropping it for re-resolution");
                self.appointment_type_id = None;
                self.appointment_type_name = None;
            }
            _ => {}
        }
    }
}

// ==============================================================================
// LENIENT FIELD DESERIALIZERS
// ==============================================================================

pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_string(&value).unwrap_or_default())
}

pub fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_string(&value))
}

pub fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_i64(&value))
}

pub fn lenient_opt_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_i64(&value).and_then(|n| i32::try_from(n).ok()))
}

pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

pub fn lenient_version<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_i64(&value)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(CURRENT_SCHEMA_VERSION))
}

pub fn lenient_patient_status<'de, D>(deserializer: D) -> Result<PatientStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value.as_str() {
        Some(s) if s.eq_ignore_ascii_case("new") => PatientStatus::New,
        Some(s) if s.eq_ignore_ascii_case("existing") => PatientStatus::Existing,
        _ => PatientStatus::Unknown,
    })
}

pub fn lenient_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(parse_iso_date))
}

pub fn lenient_opt_slots<'de, D>(deserializer: D) -> Result<Option<Vec<Slot>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(entries) => {
            let slots: Vec<Slot> = entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect();
            Ok(Some(slots))
        }
        _ => Ok(None),
    }
}

pub fn lenient_opt_slot<'de, D>(deserializer: D) -> Result<Option<Slot>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

pub fn lenient_opt_booking<'de, D>(deserializer: D) -> Result<Option<BookingRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn sample_slot() -> Slot {
        Slot {
            start_time: Utc.with_ymd_and_hms(2025, 6, 3, 19, 5, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 6, 3, 19, 35, 0).unwrap(),
            provider_id: 101,
            operatory_id: Some(7),
            location_id: Some(3),
            display_start: "2:05 PM".to_string(),
            display_end: "2:35 PM".to_string(),
            display_range: "2:05 PM - 2:35 PM".to_string(),
            provider_name: "Dr. Patel".to_string(),
            operatory_name: Some("Operatory 2".to_string()),
        }
    }

    #[test]
    fn round_trip_preserves_every_recognized_field() {
        let mut state = ConversationState::new("call-1", "practice-9", "asst-1");
        state.identify_patient(4421, PatientStatus::Existing);
        state.set_appointment_type(55, "Cleaning", 30);
        state.record_availability(
            NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            vec![sample_slot()],
        );
        state.select_slot(sample_slot()).unwrap();
        state.call_summary = Some("wants a cleaning".to_string());

        let restored = ConversationState::restore(&state.to_snapshot());

        assert_eq!(restored.call_id, "call-1");
        assert_eq!(restored.practice_id, "practice-9");
        assert_eq!(restored.patient_id, Some(4421));
        assert_eq!(restored.patient_status, PatientStatus::Existing);
        assert_eq!(restored.appointment_type_id, Some(55));
        assert_eq!(restored.appointment_type_name.as_deref(), Some("Cleaning"));
        assert_eq!(restored.duration_minutes, Some(30));
        assert_eq!(
            restored.requested_date,
            Some(NaiveDate::from_ymd_opt(2025, 6, 3).unwrap())
        );
        assert_eq!(restored.available_slots.as_ref().map(Vec::len), Some(1));
        assert_eq!(restored.selected_slot, Some(sample_slot()));
        assert!(restored.confirmation_presented);
        assert_eq!(restored.call_summary.as_deref(), Some("wants a cleaning"));
    }

    #[test]
    fn restore_accepts_legacy_camel_case_snapshot() {
        let legacy = json!({
            "callId": "call-7",
            "practiceId": "practice-2",
            "assistantId": "asst-3",
            "patientId": "8812",
            "patientStatus": "existing",
            "appointmentTypeId": 4,
            "appointmentTypeName": "Cleaning",
            "durationMinutes": 30,
            "requestedDate": "2025-06-03",
            "confirmationPresented": false
        });

        let restored = ConversationState::restore(&legacy);

        assert_eq!(restored.call_id, "call-7");
        // Numeric string coerces at the migration boundary.
        assert_eq!(restored.patient_id, Some(8812));
        assert_eq!(restored.patient_status, PatientStatus::Existing);
        assert_eq!(restored.appointment_type_id, Some(4));
        assert_eq!(restored.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn restore_defaults_mistyped_and_unknown_fields() {
        let mangled = json!({
            "call_id": "call-9",
            "practice_id": "practice-1",
            "assistant_id": "asst-1",
            "patient_id": { "nested": true },
            "duration_minutes": "not-a-number",
            "requested_date": 20250603,
            "available_slots": "oops",
            "confirmation_presented": "yes",
            "some_future_field": [1, 2, 3]
        });

        let restored = ConversationState::restore(&mangled);

        assert_eq!(restored.call_id, "call-9");
        assert_eq!(restored.patient_id, None);
        assert_eq!(restored.duration_minutes, None);
        assert_eq!(restored.requested_date, None);
        assert_eq!(restored.available_slots, None);
        assert!(!restored.confirmation_presented);
    }

    #[test]
    fn restore_from_non_object_starts_blank() {
        let restored = ConversationState::restore(&json!("garbage"));
        assert!(restored.is_blank());
        assert_eq!(restored.patient_status, PatientStatus::Unknown);
    }

    #[test]
    fn repair_drops_selection_without_requested_date() {
        let snapshot = json!({
            "call_id": "call-3",
            "practice_id": "p",
            "assistant_id": "a",
            "selected_slot": serde_json::to_value(sample_slot()).unwrap(),
            "confirmation_presented": true
        });

        let restored = ConversationState::restore(&snapshot);

        assert_eq!(restored.selected_slot, None);
        assert!(!restored.confirmation_presented);
    }

    #[test]
    fn repair_drops_half_set_appointment_type() {
        let snapshot = json!({
            "call_id": "call-4",
            "practice_id": "p",
            "assistant_id": "a",
            "appointment_type_id": 12
        });

        let restored = ConversationState::restore(&snapshot);

        assert_eq!(restored.appointment_type_id, None);
        assert_eq!(restored.appointment_type_name, None);
    }

    #[test]
    fn malformed_slot_entries_are_dropped_not_fatal() {
        let snapshot = json!({
            "call_id": "call-5",
            "practice_id": "p",
            "assistant_id": "a",
            "requested_date": "2025-06-03",
            "available_slots": [
                serde_json::to_value(sample_slot()).unwrap(),
                { "start_time": "not a time" },
                42
            ]
        });

        let restored = ConversationState::restore(&snapshot);

        assert_eq!(restored.available_slots.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn select_slot_requires_requested_date() {
        let mut state = ConversationState::new("c", "p", "a");
        let err = state.select_slot(sample_slot()).unwrap_err();
        assert_eq!(err, crate::models::StateError::MissingRequestedDate);
    }
}
