use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use conversation_cell::{BookingRecord, ConversationState, Slot, StateError};
use practice_cell::services::eligibility::resolve_eligibility;
use practice_cell::{PracticeError, PracticeSnapshot};
use shared_config::AppConfig;
use shared_nexhealth::NexHealthClient;

use crate::models::{
    AppointmentEnvelope, BookAppointmentArgs, BookingConfirmedData, BookingDetailsData,
    ClarificationData, ClarificationReason, SchedulingError,
};
use crate::services::display;

const MAX_NOTE_CHARS: usize = 250;
const NOTE_MARKER: &str = "Booked by phone assistant";

/// What one booking turn produced. Only `Booked` involves an external write;
/// the other two arms are pure state transitions.
#[derive(Debug)]
pub enum BookingOutcome {
    DetailsPresented(BookingDetailsData),
    Booked(BookingConfirmedData),
    Clarification(ClarificationData),
}

pub struct BookingService {
    nexhealth: Arc<NexHealthClient>,
    default_timezone: String,
}

impl BookingService {
    pub fn new(config: &AppConfig, nexhealth: Arc<NexHealthClient>) -> Self {
        Self {
            nexhealth,
            default_timezone: config.default_practice_timezone.clone(),
        }
    }

    /// One turn of the confirm-then-book machine. Selecting a time presents
    /// details and arms confirmation; only an explicit `confirmed: true`
    /// reaches the external write. Declines and repeats without confirmation
    /// disarm and ask again.
    pub async fn book_appointment(
        &self,
        practice: &PracticeSnapshot,
        state: &mut ConversationState,
        args: &BookAppointmentArgs,
    ) -> Result<BookingOutcome, SchedulingError> {
        // A call that already booked never books twice; echo the record.
        if let Some(existing) = &state.booked_appointment {
            info!(
                "Call {} already booked appointment {}, skipping write",
                state.call_id, existing.nexhealth_appointment_id
            );
            return Ok(BookingOutcome::Booked(confirmed_data(existing)));
        }

        if args.confirmed == Some(true) {
            let data = self.execute_booking(practice, state, args).await?;
            return Ok(BookingOutcome::Booked(data));
        }

        if let Some(selected_time) = args.selected_time.as_deref().filter(|t| !t.trim().is_empty())
        {
            let slot = find_matching_slot(state, selected_time)
                .ok_or_else(|| SchedulingError::SlotNotRecognized(selected_time.to_string()))?;

            state.select_slot(slot.clone()).map_err(|e| match e {
                StateError::MissingRequestedDate => SchedulingError::IncompleteBookingContext {
                    missing: "requested_date".to_string(),
                },
                StateError::NoSelectedSlot => SchedulingError::IncompleteBookingContext {
                    missing: "selected_slot".to_string(),
                },
            })?;

            let friendly_date = state
                .requested_date
                .map(display::friendly_date)
                .unwrap_or_default();

            return Ok(BookingOutcome::DetailsPresented(BookingDetailsData {
                appointment_type: state
                    .appointment_type_name
                    .clone()
                    .unwrap_or_else(|| "appointment".to_string()),
                provider_name: slot.provider_name.clone(),
                friendly_date,
                display_time: slot.display_start.clone(),
                awaiting_confirmation: true,
            }));
        }

        // No new selection and no confirmation. With a slot on the table this
        // is either a decline or an unconfirmed repeat; either way the armed
        // confirmation is dropped and the slot kept for a cheap re-confirm.
        if let Some(slot) = &state.selected_slot {
            let reason = if args.confirmed == Some(false) {
                ClarificationReason::Declined
            } else {
                ClarificationReason::UnconfirmedRepeat
            };
            let selected_time = Some(slot.display_start.clone());
            state.clear_confirmation();
            return Ok(BookingOutcome::Clarification(ClarificationData {
                reason,
                selected_time,
            }));
        }

        Err(SchedulingError::IncompleteBookingContext {
            missing: "selected_time".to_string(),
        })
    }

    /// The only path that writes externally. Preconditions come from the
    /// conversation state, not the caller's arguments; a failed write rolls
    /// the machine back so the caller can retry or repick.
    async fn execute_booking(
        &self,
        practice: &PracticeSnapshot,
        state: &mut ConversationState,
        args: &BookAppointmentArgs,
    ) -> Result<BookingConfirmedData, SchedulingError> {
        let missing = missing_context(state);
        if !missing.is_empty() {
            return Err(SchedulingError::IncompleteBookingContext {
                missing: missing.join(", "),
            });
        }

        let slot = state.selected_slot.clone().ok_or_else(|| {
            SchedulingError::IncompleteBookingContext {
                missing: "selected_slot".to_string(),
            }
        })?;
        let patient_id = state.patient_id.unwrap_or(0);
        let type_id = state.appointment_type_id.unwrap_or(0);
        let date = state.requested_date.unwrap_or_default();

        let appointment_type = practice
            .appointment_types
            .iter()
            .find(|t| t.id == type_id)
            .ok_or_else(|| {
                PracticeError::InvalidAppointmentType(format!("type id {}", type_id))
            })?;

        let tz = display::resolve_timezone(practice, &self.default_timezone);

        // The display time the patient confirmed is authoritative for the
        // wall-clock start; the stored UTC instant backs it up if the display
        // string no longer parses.
        let start_utc = display::parse_display_time(&slot.display_start)
            .and_then(|t| display::local_to_utc(date, t, &tz))
            .unwrap_or(slot.start_time);
        let end_utc = start_utc + (slot.end_time - slot.start_time);

        let operatory_id = match slot.operatory_id {
            Some(id) => Some(id),
            None => {
                let eligibility = resolve_eligibility(
                    practice,
                    type_id,
                    &appointment_type.name,
                    None,
                    None,
                )?;
                match eligibility.first_operatory() {
                    Some(op) => Some(op.nexhealth_operatory_id),
                    None if practice.operatories.is_empty() => None,
                    None => return Err(PracticeError::NoAssignedOperatories.into()),
                }
            }
        };

        let note = compose_note(args.note.as_deref(), state.call_summary.as_deref());

        let mut appt = json!({
            "patient_id": patient_id,
            "provider_id": slot.provider_id,
            "appointment_type_id": appointment_type.nexhealth_appointment_type_id,
            "start_time": start_utc.to_rfc3339(),
            "end_time": end_utc.to_rfc3339(),
            "note": note,
        });
        if let Some(op_id) = operatory_id {
            appt["operatory_id"] = json!(op_id);
        }
        let body = json!({ "appt": appt });

        let query = vec![
            ("subdomain".to_string(), practice.nexhealth_subdomain.clone()),
            (
                "location_id".to_string(),
                practice.nexhealth_location_id.to_string(),
            ),
            ("notify_patient".to_string(), "false".to_string()),
        ];

        match self
            .nexhealth
            .post::<AppointmentEnvelope>("/appointments", &query, &body)
            .await
        {
            Ok(envelope) => {
                let record = BookingRecord {
                    nexhealth_appointment_id: envelope.data.appt.id,
                    patient_id,
                    provider_id: slot.provider_id,
                    provider_name: slot.provider_name.clone(),
                    operatory_id,
                    date,
                    display_time: slot.display_start.clone(),
                    note,
                };
                info!(
                    "Booked appointment {} for call {}",
                    record.nexhealth_appointment_id, state.call_id
                );
                let data = confirmed_data(&record);
                state.record_booking(record);
                Ok(data)
            }
            Err(e) => {
                warn!("Booking write failed for call {}: {}", state.call_id, e);
                state.rollback_booking();
                Err(e.into())
            }
        }
    }
}

fn confirmed_data(record: &BookingRecord) -> BookingConfirmedData {
    BookingConfirmedData {
        nexhealth_appointment_id: record.nexhealth_appointment_id,
        provider_name: record.provider_name.clone(),
        friendly_date: display::friendly_date(record.date),
        display_time: record.display_time.clone(),
    }
}

/// Exact match on the offered display time first, then a normalized
/// comparison so "2pm" still finds "2:00 PM". A time outside the offered
/// list never matches, no matter how plausible.
fn find_matching_slot(state: &ConversationState, selected_time: &str) -> Option<Slot> {
    let slots = state.available_slots.as_deref()?;

    if let Some(slot) = slots.iter().find(|s| s.display_start == selected_time) {
        return Some(slot.clone());
    }

    let wanted = display::parse_display_time(selected_time)?;
    slots
        .iter()
        .find(|s| display::parse_display_time(&s.display_start) == Some(wanted))
        .cloned()
}

fn missing_context(state: &ConversationState) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if state.patient_id.is_none() {
        missing.push("patient_id");
    }
    if state.appointment_type_id.is_none() {
        missing.push("appointment_type_id");
    }
    if state.requested_date.is_none() {
        missing.push("requested_date");
    }
    if state.selected_slot.is_none() {
        missing.push("selected_slot");
    }
    if state.duration_minutes.is_none() {
        missing.push("duration_minutes");
    }
    missing
}

/// The running call summary wins over a caller-supplied note, mirroring how
/// state beats arguments elsewhere in the machine; the assistant marker is
/// always appended and the whole thing clamped to what the scheduling API
/// accepts.
fn compose_note(caller_note: Option<&str>, call_summary: Option<&str>) -> String {
    let caller = caller_note.map(str::trim).filter(|s| !s.is_empty());
    let summary = call_summary.map(str::trim).filter(|s| !s.is_empty());
    if let (Some(caller), Some(summary)) = (caller, summary) {
        if caller != summary {
            warn!("Caller note differs from call summary, keeping the summary");
        }
    }
    let base = summary.or(caller).unwrap_or_default();
    let note = if base.is_empty() {
        NOTE_MARKER.to_string()
    } else {
        format!("{} | {}", base, NOTE_MARKER)
    };
    note.chars().take(MAX_NOTE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn slot(display_start: &str) -> Slot {
        Slot {
            start_time: Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 4, 15, 30, 0).unwrap(),
            provider_id: 77,
            operatory_id: Some(501),
            location_id: Some(3),
            display_start: display_start.to_string(),
            display_end: "9:30 AM".to_string(),
            display_range: format!("{} - 9:30 AM", display_start),
            provider_name: "Dr. Patel".to_string(),
            operatory_name: Some("Operatory A".to_string()),
        }
    }

    fn state_with_slots(displays: Vec<&str>) -> ConversationState {
        let mut state = ConversationState::new("call-1", "practice-1", "assistant-1");
        state.record_availability(
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            displays.into_iter().map(slot).collect(),
        );
        state
    }

    #[test]
    fn matches_exact_display_time() {
        let state = state_with_slots(vec!["9:00 AM", "9:30 AM"]);
        let found = find_matching_slot(&state, "9:30 AM").unwrap();
        assert_eq!(found.display_start, "9:30 AM");
    }

    #[test]
    fn matches_loose_spoken_variant() {
        let state = state_with_slots(vec!["2:00 PM"]);
        assert!(find_matching_slot(&state, "2pm").is_some());
    }

    #[test]
    fn unknown_time_does_not_match() {
        let state = state_with_slots(vec!["9:00 AM"]);
        assert!(find_matching_slot(&state, "11:00 AM").is_none());
    }

    #[test]
    fn no_slot_list_never_matches() {
        let state = ConversationState::new("call-1", "practice-1", "assistant-1");
        assert!(find_matching_slot(&state, "9:00 AM").is_none());
    }

    #[test]
    fn note_composition_appends_marker_and_clamps() {
        assert_eq!(compose_note(None, None), "Booked by phone assistant");
        assert_eq!(
            compose_note(None, Some("Patient prefers mornings")),
            "Patient prefers mornings | Booked by phone assistant"
        );
        assert_eq!(
            compose_note(Some("caller note"), Some("summary")),
            "summary | Booked by phone assistant"
        );
        assert_eq!(
            compose_note(Some("caller note"), None),
            "caller note | Booked by phone assistant"
        );

        let long = "x".repeat(300);
        let clamped = compose_note(Some(&long), None);
        assert_eq!(clamped.chars().count(), MAX_NOTE_CHARS);
    }

    #[test]
    fn missing_context_lists_every_gap() {
        let state = ConversationState::new("call-1", "practice-1", "assistant-1");
        assert_eq!(
            missing_context(&state),
            vec![
                "patient_id",
                "appointment_type_id",
                "requested_date",
                "selected_slot",
                "duration_minutes"
            ]
        );

        let mut partial = state.clone();
        partial.identify_patient(42, conversation_cell::PatientStatus::Existing);
        partial.set_appointment_type(5, "Cleaning", 30);
        assert_eq!(
            missing_context(&partial),
            vec!["requested_date", "selected_slot"]
        );

        // A restored snapshot can carry the type without its duration.
        partial.duration_minutes = None;
        assert_eq!(
            missing_context(&partial),
            vec!["requested_date", "selected_slot", "duration_minutes"]
        );
    }
}
