use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use conversation_cell::{ConversationState, Slot};
use practice_cell::services::eligibility::{resolve_eligibility, OperatorySelection};
use practice_cell::{PracticeError, PracticeSnapshot};
use shared_config::AppConfig;
use shared_nexhealth::NexHealthClient;

use crate::models::{AvailabilityData, CheckAvailabilityArgs, SchedulingError, SlotsEnvelope};
use crate::services::display;

/// Local-time lunch window, [13:00, 14:00). A slot starting at 12:59 or at
/// 14:00 sharp is kept.
const LUNCH_HOUR: u32 = 13;

/// The voice layer reads at most this many distinct start times aloud.
const MAX_OFFERED_TIMES: usize = 3;

const DEFAULT_SEARCH_DAYS: u32 = 1;

pub struct AvailabilityService {
    nexhealth: Arc<NexHealthClient>,
    default_timezone: String,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig, nexhealth: Arc<NexHealthClient>) -> Self {
        Self {
            nexhealth,
            default_timezone: config.default_practice_timezone.clone(),
        }
    }

    /// Query open slots for the resolved appointment type, filter the lunch
    /// window, persist the full list into the conversation state and return
    /// the caller-facing summary.
    pub async fn check_availability(
        &self,
        practice: &PracticeSnapshot,
        state: &mut ConversationState,
        args: &CheckAvailabilityArgs,
    ) -> Result<AvailabilityData, SchedulingError> {
        if practice.nexhealth_subdomain.is_empty() || practice.nexhealth_location_id == 0 {
            return Err(PracticeError::PracticeConfigMissing.into());
        }

        let requested_date = resolve_requested_date(state, args)?;

        let (type_id, type_name) = match (&state.appointment_type_id, &state.appointment_type_name)
        {
            (Some(id), Some(name)) => (*id, name.clone()),
            _ => {
                return Err(PracticeError::InvalidAppointmentType(
                    "no appointment type resolved for this call".to_string(),
                )
                .into())
            }
        };

        let duration = resolve_duration(practice, state, args, type_id, &type_name)?;

        let eligibility = resolve_eligibility(
            practice,
            type_id,
            &type_name,
            args.provider_ids.as_deref(),
            args.operatory_ids.as_deref(),
        )?;

        let tz = display::resolve_timezone(practice, &self.default_timezone);
        let days = args.days.unwrap_or(DEFAULT_SEARCH_DAYS).max(1);

        let mut query: Vec<(String, String)> = vec![
            ("subdomain".to_string(), practice.nexhealth_subdomain.clone()),
            (
                "start_date".to_string(),
                requested_date.format("%Y-%m-%d").to_string(),
            ),
            ("days".to_string(), days.to_string()),
            (
                "lids[]".to_string(),
                practice.nexhealth_location_id.to_string(),
            ),
            ("slot_length".to_string(), duration.to_string()),
            (
                "overlapping_operatory_slots".to_string(),
                "false".to_string(),
            ),
        ];
        for pid in eligibility.provider_nexhealth_ids() {
            query.push(("pids[]".to_string(), pid.to_string()));
        }
        if let OperatorySelection::Narrowed(operatories) = &eligibility.operatory_selection {
            for operatory in operatories {
                query.push((
                    "operatory_ids[]".to_string(),
                    operatory.nexhealth_operatory_id.to_string(),
                ));
            }
        }

        let envelope: SlotsEnvelope = self.nexhealth.get("/appointment_slots", &query).await?;

        let (slots, lunch_filtered) = collect_slots(&envelope, practice, duration, &tz);

        let offered = offered_times(&slots, MAX_OFFERED_TIMES);
        let distinct_total = distinct_time_count(&slots);

        info!(
            "Availability for practice {} on {}: {} slots ({} lunch-filtered), offering {}",
            practice.id,
            requested_date,
            slots.len(),
            lunch_filtered,
            offered.len()
        );

        let data = AvailabilityData {
            has_availability: !slots.is_empty(),
            requested_date,
            timezone: tz.name().to_string(),
            offered_times: offered,
            has_more: distinct_total > MAX_OFFERED_TIMES,
            total_slots: slots.len(),
            lunch_break_slots_filtered: lunch_filtered,
        };

        state.record_availability(requested_date, slots);

        Ok(data)
    }
}

fn resolve_requested_date(
    state: &ConversationState,
    args: &CheckAvailabilityArgs,
) -> Result<NaiveDate, SchedulingError> {
    if let Some(raw) = &args.requested_date {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| SchedulingError::InvalidTimeFormat(raw.clone()));
    }
    state
        .requested_date
        .ok_or_else(|| SchedulingError::InvalidTimeFormat("requested_date is required".to_string()))
}

/// The state's duration wins; it was written together with the resolved type.
/// A mismatching caller value is logged and ignored, falling back to the
/// type's default when the state has none.
fn resolve_duration(
    practice: &PracticeSnapshot,
    state: &ConversationState,
    args: &CheckAvailabilityArgs,
    type_id: i64,
    type_name: &str,
) -> Result<i32, SchedulingError> {
    let type_default = practice
        .appointment_types
        .iter()
        .find(|t| t.id == type_id)
        .map(|t| t.duration_minutes);

    if let Some(from_state) = state.duration_minutes {
        if let Some(from_args) = args.duration_minutes {
            if from_args != from_state {
                warn!(
                    "Caller supplied duration {} but state has {}, keeping state",
                    from_args, from_state
                );
            }
        }
        return Ok(from_state);
    }

    if let Some(from_args) = args.duration_minutes {
        return Ok(from_args);
    }

    type_default.ok_or_else(|| {
        PracticeError::InvalidAppointmentType(type_name.to_string()).into()
    })
}

/// Flatten the provider-grouped wire response into enriched slots, dropping
/// unparsable entries and lunch-window starts. Only a slot whose local start
/// is definitively inside the window is excluded; anything uncertain stays.
fn collect_slots(
    envelope: &SlotsEnvelope,
    practice: &PracticeSnapshot,
    duration_minutes: i32,
    tz: &Tz,
) -> (Vec<Slot>, usize) {
    let mut slots = Vec::new();
    let mut lunch_filtered = 0usize;

    for group in &envelope.data {
        for raw in &group.slots {
            let start = match DateTime::parse_from_rfc3339(&raw.time) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => {
                    warn!("Skipping slot with unparsable time '{}': {}", raw.time, e);
                    continue;
                }
            };

            if start.with_timezone(tz).hour() == LUNCH_HOUR {
                lunch_filtered += 1;
                continue;
            }

            let end = raw
                .end_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| start + Duration::minutes(duration_minutes as i64));

            let provider_name = practice
                .providers
                .iter()
                .find(|p| p.nexhealth_provider_id == group.pid)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("Provider {}", group.pid));

            let operatory_name = raw.operatory_id.and_then(|oid| {
                practice
                    .operatories
                    .iter()
                    .find(|op| op.nexhealth_operatory_id == oid)
                    .map(|op| op.name.clone())
            });

            let display_start = display::format_12h(start, tz);
            let display_end = display::format_12h(end, tz);

            slots.push(Slot {
                start_time: start,
                end_time: end,
                provider_id: group.pid,
                operatory_id: raw.operatory_id,
                location_id: group.lid,
                display_range: format!("{} - {}", display_start, display_end),
                display_start,
                display_end,
                provider_name,
                operatory_name,
            });
        }
    }

    slots.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.provider_id.cmp(&b.provider_id))
    });

    debug!(
        "Collected {} slots, filtered {} in the lunch window",
        slots.len(),
        lunch_filtered
    );

    (slots, lunch_filtered)
}

/// First `limit` distinct display times in chronological order. Two providers
/// open at the same time collapse into one spoken option.
fn offered_times(slots: &[Slot], limit: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for slot in slots {
        if !seen.contains(&slot.display_start) {
            seen.push(slot.display_start.clone());
            if seen.len() == limit {
                break;
            }
        }
    }
    seen
}

fn distinct_time_count(slots: &[Slot]) -> usize {
    let mut seen: Vec<&str> = Vec::new();
    for slot in slots {
        if !seen.contains(&slot.display_start.as_str()) {
            seen.push(&slot.display_start);
        }
    }
    seen.len()
}
