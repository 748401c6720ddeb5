use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use conversation_cell::{ConversationState, PatientStatus, TraceRegistry};
use practice_cell::services::matching::{self, TypeResolution};
use practice_cell::services::snapshot::PracticeSnapshotService;
use practice_cell::PracticeSnapshot;
use shared_config::AppConfig;
use shared_models::{AppError, ToolInvocation, ToolResponse};
use shared_nexhealth::NexHealthClient;

use crate::models::{
    BookAppointmentArgs, CallIdentityArgs, CheckAvailabilityArgs, ClarificationReason,
    IdentifyPatientArgs, ResolveAppointmentTypeArgs, SchedulingError,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::{BookingOutcome, BookingService};
use crate::services::call_log::{CallOutcome, CallRecordStore, CallRecordUpsert, HttpCallRecordStore};

// ==============================================================================
// SHARED TOOL STATE
// ==============================================================================

#[derive(Clone)]
pub struct ToolState {
    pub availability: Arc<AvailabilityService>,
    pub booking: Arc<BookingService>,
    pub practice: Arc<PracticeSnapshotService>,
    pub call_records: Arc<dyn CallRecordStore>,
    pub traces: Arc<TraceRegistry>,
}

impl ToolState {
    pub fn from_config(config: &AppConfig) -> Self {
        let nexhealth = Arc::new(NexHealthClient::new(config));
        Self {
            availability: Arc::new(AvailabilityService::new(config, Arc::clone(&nexhealth))),
            booking: Arc::new(BookingService::new(config, nexhealth)),
            practice: Arc::new(PracticeSnapshotService::new(config)),
            call_records: Arc::new(HttpCallRecordStore::new(config)),
            traces: Arc::new(TraceRegistry::new()),
        }
    }
}

// ==============================================================================
// TOOL HANDLERS
// ==============================================================================

/// Record which patient this call is about. The id arrives untyped from the
/// voice layer; numbers and numeric strings are both accepted.
#[axum::debug_handler]
pub async fn identify_patient(
    State(state): State<ToolState>,
    Json(invocation): Json<ToolInvocation>,
) -> Json<ToolResponse> {
    let args: IdentifyPatientArgs = parse_args(&invocation);
    let mut convo = restore_state(&invocation, &args.identity);

    let raw_id = match &args.patient_id {
        Some(raw) => raw,
        None => {
            return respond_err(&SchedulingError::InvalidPatientId, &convo);
        }
    };

    let patient_id = match parse_patient_id(raw_id) {
        Ok(id) => id,
        Err(e) => return respond_err(&e, &convo),
    };

    let status = parse_patient_status(args.patient_status.as_deref());
    convo.identify_patient(patient_id, status);

    state.traces.record(
        &convo.call_id,
        "identify_patient",
        format!("patient {} ({})", patient_id, status),
    );
    upsert_call_record(&state, &convo, CallOutcome::InProgress, None).await;

    respond_ok(
        json!({ "patient_id": patient_id, "patient_status": status.to_string() }),
        &convo,
    )
}

/// Map a free-form service description onto one of the practice's bookable
/// appointment types, or hand back the menu when nothing matches cleanly.
#[axum::debug_handler]
pub async fn resolve_appointment_type(
    State(state): State<ToolState>,
    Json(invocation): Json<ToolInvocation>,
) -> Json<ToolResponse> {
    let args: ResolveAppointmentTypeArgs = parse_args(&invocation);
    let mut convo = restore_state(&invocation, &args.identity);

    let practice = match fetch_practice(&state, &convo).await {
        Ok(practice) => practice,
        Err(e) => return respond_err(&e, &convo),
    };

    match matching::resolve_appointment_type(&practice, &args.service_description) {
        Ok(TypeResolution::Matched(m)) => {
            convo.set_appointment_type(
                m.appointment_type.id,
                m.appointment_type.name.clone(),
                m.appointment_type.duration_minutes,
            );
            state.traces.record(
                &convo.call_id,
                "resolve_appointment_type",
                format!("'{}' -> {} (score {})", args.service_description, m.appointment_type.name, m.score),
            );
            respond_ok(
                json!({
                    "matched": true,
                    "appointment_type_id": m.appointment_type.id,
                    "appointment_type_name": m.appointment_type.name,
                    "duration_minutes": m.appointment_type.duration_minutes,
                }),
                &convo,
            )
        }
        Ok(TypeResolution::NeedsClarification { available }) => {
            state.traces.record(
                &convo.call_id,
                "resolve_appointment_type",
                format!("'{}' needs clarification", args.service_description),
            );
            let names: Vec<&str> = available.iter().map(|t| t.name.as_str()).collect();
            respond_ok(
                json!({ "matched": false, "needs_clarification": true, "available_types": names }),
                &convo,
            )
        }
        Err(e) => respond_err(&SchedulingError::Practice(e), &convo),
    }
}

/// Query open slots for the resolved type and date. The full slot list lands
/// in the conversation state; the caller gets at most three times to offer.
#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<ToolState>,
    Json(invocation): Json<ToolInvocation>,
) -> Json<ToolResponse> {
    let args: CheckAvailabilityArgs = parse_args(&invocation);
    let mut convo = restore_state(&invocation, &args.identity);

    let practice = match fetch_practice(&state, &convo).await {
        Ok(practice) => practice,
        Err(e) => return respond_err(&e, &convo),
    };

    match state
        .availability
        .check_availability(&practice, &mut convo, &args)
        .await
    {
        Ok(data) => {
            state.traces.record(
                &convo.call_id,
                "check_availability",
                format!(
                    "{}: {} slots, {} lunch-filtered",
                    data.requested_date, data.total_slots, data.lunch_break_slots_filtered
                ),
            );
            respond_ok_serialized(&data, &convo)
        }
        Err(e) => {
            state.traces.record(
                &convo.call_id,
                "check_availability",
                format!("error {}", e.error_code()),
            );
            respond_err(&e, &convo)
        }
    }
}

/// Drive the confirm-then-book machine one turn forward. Only an explicitly
/// confirmed selection produces an external write.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<ToolState>,
    Json(invocation): Json<ToolInvocation>,
) -> Json<ToolResponse> {
    let args: BookAppointmentArgs = parse_args(&invocation);
    let mut convo = restore_state(&invocation, &args.identity);

    let practice = match fetch_practice(&state, &convo).await {
        Ok(practice) => practice,
        Err(e) => return respond_err(&e, &convo),
    };

    match state
        .booking
        .book_appointment(&practice, &mut convo, &args)
        .await
    {
        Ok(BookingOutcome::Booked(data)) => {
            state.traces.record(
                &convo.call_id,
                "book_appointment",
                format!("booked appointment {}", data.nexhealth_appointment_id),
            );
            upsert_call_record(
                &state,
                &convo,
                CallOutcome::Booked,
                Some(data.nexhealth_appointment_id),
            )
            .await;
            let message = format!(
                "You're booked with {} on {} at {}.",
                data.provider_name, data.friendly_date, data.display_time
            );
            Json(
                ToolResponse::ok(to_value(&data), convo.to_snapshot()).with_message(message),
            )
        }
        Ok(BookingOutcome::DetailsPresented(data)) => {
            state.traces.record(
                &convo.call_id,
                "book_appointment",
                format!("presented {} at {}", data.friendly_date, data.display_time),
            );
            let message = format!(
                "That's a {} with {} on {} at {}. Shall I book it?",
                data.appointment_type, data.provider_name, data.friendly_date, data.display_time
            );
            Json(
                ToolResponse::ok(to_value(&data), convo.to_snapshot()).with_message(message),
            )
        }
        Ok(BookingOutcome::Clarification(data)) => {
            state.traces.record(
                &convo.call_id,
                "book_appointment",
                format!("clarification {:?}", data.reason),
            );
            let message = match data.reason {
                ClarificationReason::Declined => {
                    "No problem. Which time would you like instead?".to_string()
                }
                ClarificationReason::UnconfirmedRepeat => match &data.selected_time {
                    Some(time) => format!("Just to confirm, should I book the {} slot?", time),
                    None => "Which time should I book?".to_string(),
                },
            };
            Json(
                ToolResponse::ok(to_value(&data), convo.to_snapshot()).with_message(message),
            )
        }
        Err(e) => {
            state.traces.record(
                &convo.call_id,
                "book_appointment",
                format!("error {}", e.error_code()),
            );
            if is_write_failure(&e) {
                upsert_call_record(&state, &convo, CallOutcome::BookingFailed, None).await;
            }
            respond_err(&e, &convo)
        }
    }
}

/// Debug view of one call's tool activity.
#[axum::debug_handler]
pub async fn get_call_trace(
    State(state): State<ToolState>,
    Path(call_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let entries = state
        .traces
        .snapshot(&call_id)
        .ok_or_else(|| AppError::NotFound(format!("No trace for call {}", call_id)))?;

    Ok(Json(json!({ "call_id": call_id, "entries": entries })))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "scheduling" }))
}

// ==============================================================================
// HELPERS
// ==============================================================================

fn parse_args<T: serde::de::DeserializeOwned + Default>(invocation: &ToolInvocation) -> T {
    serde_json::from_value(invocation.arguments.clone()).unwrap_or_else(|e| {
        warn!("Malformed tool arguments, using defaults: {}", e);
        T::default()
    })
}

/// Rebuild the conversation from the echoed snapshot. Identity arguments are
/// only honored on a blank state, i.e. the first turn of the call.
fn restore_state(invocation: &ToolInvocation, identity: &CallIdentityArgs) -> ConversationState {
    let mut convo = ConversationState::restore(&invocation.conversation_state);
    if convo.is_blank() {
        convo = ConversationState::new(
            identity.call_id.clone().unwrap_or_default(),
            identity.practice_id.clone().unwrap_or_default(),
            identity.assistant_id.clone().unwrap_or_default(),
        );
        info!("Started conversation for call '{}'", convo.call_id);
    }
    convo
}

async fn fetch_practice(
    state: &ToolState,
    convo: &ConversationState,
) -> Result<PracticeSnapshot, SchedulingError> {
    let practice = state.practice.fetch_snapshot(&convo.practice_id).await?;
    Ok(practice)
}

fn parse_patient_id(raw: &Value) -> Result<i64, SchedulingError> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| SchedulingError::InvalidPatientIdFormat(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| SchedulingError::InvalidPatientIdFormat(s.clone())),
        other => Err(SchedulingError::InvalidPatientIdFormat(other.to_string())),
    }
}

fn parse_patient_status(raw: Option<&str>) -> PatientStatus {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("new") => PatientStatus::New,
        Some("existing") => PatientStatus::Existing,
        _ => PatientStatus::Unknown,
    }
}

/// Booking write outcomes are the ones worth a call record; pure state
/// machine failures (unrecognized time, missing context) are not.
fn is_write_failure(e: &SchedulingError) -> bool {
    matches!(
        e,
        SchedulingError::SlotUnavailable(_)
            | SchedulingError::ValidationError(_)
            | SchedulingError::AuthError(_)
            | SchedulingError::NexhealthApi(_)
    )
}

async fn upsert_call_record(
    state: &ToolState,
    convo: &ConversationState,
    status: CallOutcome,
    booked_appointment_id: Option<i64>,
) {
    let record = CallRecordUpsert {
        call_id: convo.call_id.clone(),
        practice_id: convo.practice_id.clone(),
        status,
        booked_appointment_id,
        summary: convo.call_summary.clone(),
    };
    if let Err(e) = state.call_records.upsert(record).await {
        warn!("Call record upsert failed for call {}: {}", convo.call_id, e);
    }
}

fn to_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}

fn respond_ok(data: Value, convo: &ConversationState) -> Json<ToolResponse> {
    Json(ToolResponse::ok(data, convo.to_snapshot()))
}

fn respond_ok_serialized<T: Serialize>(data: &T, convo: &ConversationState) -> Json<ToolResponse> {
    respond_ok(to_value(data), convo)
}

fn respond_err(e: &SchedulingError, convo: &ConversationState) -> Json<ToolResponse> {
    Json(ToolResponse::error(
        e.error_code(),
        Some(json!({ "detail": e.to_string() })),
        convo.to_snapshot(),
    ))
}
