use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{self, ToolState};

pub fn scheduling_routes(state: ToolState) -> Router {
    Router::new()
        .route("/identify_patient", post(handlers::identify_patient))
        .route(
            "/resolve_appointment_type",
            post(handlers::resolve_appointment_type),
        )
        .route("/check_availability", post(handlers::check_availability))
        .route("/book_appointment", post(handlers::book_appointment))
        .route("/trace/{call_id}", get(handlers::get_call_trace))
        .with_state(state)
}
