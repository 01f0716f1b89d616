//! Local HTTP API for the kiosk front-end.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::error;

use crate::board::{BoardResponse, DispenserBus};
use crate::checkout::{CancelOutcome, TransactionCoordinator, TransactionOutcome};
use crate::db::planogram;
use crate::models::LineItem;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TransactionCoordinator>,
    pub bus: Arc<DispenserBus>,
    pub db: DatabaseConnection,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/payment", post(payment))
        .route("/api/payment/cancel", post(cancel))
        .route("/api/planogram", get(get_planogram))
        .route("/api/slots/test", post(test_slot))
        .route("/api/slots/test-all", post(test_all_slots))
        .route("/api/temperature", get(get_temperature).post(set_temperature))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody {
    amount: f64,
    products: Vec<LineItem>,
    #[serde(default)]
    track_id: Option<String>,
}

async fn payment(
    State(state): State<AppState>,
    Json(body): Json<PaymentBody>,
) -> (StatusCode, Json<Value>) {
    let outcome = state
        .coordinator
        .charge(body.amount, body.products, body.track_id)
        .await;
    payment_response(outcome)
}

/// Shape a charge outcome the way the kiosk front-end expects:
/// `{message, trackId, transactionDetails}` on approval, 402 on decline,
/// 400 with `cancelled: true` on cancellation, 500 on terminal error.
fn payment_response(outcome: TransactionOutcome) -> (StatusCode, Json<Value>) {
    match outcome {
        TransactionOutcome::Approved { track_id, details } => (
            StatusCode::OK,
            Json(json!({
                "message": "Payment approved",
                "trackId": track_id,
                "transactionDetails": details,
            })),
        ),
        TransactionOutcome::Declined { track_id, message, details } => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "message": message,
                "trackId": track_id,
                "declined": true,
                "transactionDetails": details,
            })),
        ),
        TransactionOutcome::Cancelled { track_id, message, details } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "message": message,
                "trackId": track_id,
                "cancelled": true,
                "transactionDetails": details,
            })),
        ),
        TransactionOutcome::Errored { track_id, error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": error, "trackId": track_id })),
        ),
        TransactionOutcome::ValidationFailed { errors } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "validation failed", "errors": errors })),
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody {
    track_id: String,
}

async fn cancel(
    State(state): State<AppState>,
    Json(body): Json<CancelBody>,
) -> (StatusCode, Json<Value>) {
    cancel_response(state.coordinator.cancel(&body.track_id).await)
}

fn cancel_response(outcome: CancelOutcome) -> (StatusCode, Json<Value>) {
    match outcome {
        CancelOutcome::SignalSent => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Cancel signal sent" })),
        ),
        CancelOutcome::Completed { message } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": message.unwrap_or_else(|| "Transaction cancelled".to_string()),
            })),
        ),
        CancelOutcome::Failed { error } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "message": error })),
        ),
    }
}

async fn get_planogram(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match planogram::list(&state.db).await {
        Ok(rows) => (StatusCode::OK, Json(json!({ "slots": rows }))),
        Err(e) => {
            error!(error = %e, "planogram query failed");
            internal_error(&e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotTestBody {
    slot_number: u16,
    #[serde(default)]
    with_drop_sensor: bool,
}

async fn test_slot(
    State(state): State<AppState>,
    Json(body): Json<SlotTestBody>,
) -> (StatusCode, Json<Value>) {
    match state
        .bus
        .test_slot(body.slot_number, body.with_drop_sensor)
        .await
    {
        Ok(response) => (
            StatusCode::OK,
            Json(json!({ "slot": body.slot_number, "response": board_response_json(&response) })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "slot": body.slot_number, "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotSweepBody {
    /// Slots to exercise; `{}` sweeps the full planogram.
    #[serde(default)]
    slots: Option<Vec<u16>>,
    #[serde(default)]
    with_drop_sensor: bool,
}

async fn test_all_slots(
    State(state): State<AppState>,
    Json(body): Json<SlotSweepBody>,
) -> Json<Value> {
    let slots = body.slots.unwrap_or_else(DispenserBus::all_slots);
    let outcomes = state.bus.test_slots(&slots, body.with_drop_sensor).await;
    let results: Vec<Value> = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(response) => json!({ "slot": o.slot, "response": board_response_json(response) }),
            Err(e) => json!({ "slot": o.slot, "error": e.to_string() }),
        })
        .collect();
    Json(json!({ "tested": results.len(), "results": results }))
}

async fn get_temperature(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.bus.read_temperatures().await {
        Ok(readings) => {
            let channels: Vec<Value> = readings
                .iter()
                .map(|r| {
                    json!({
                        "channel": r.channel,
                        "temp1": r.reading.temp1,
                        "temp2": r.reading.temp2,
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({ "channels": channels })))
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct SetTemperatureBody {
    /// Target in degrees Celsius.
    temperature: i16,
    /// 1 = front cabinet, 2 = rear cabinet.
    machine: u8,
}

async fn set_temperature(
    State(state): State<AppState>,
    Json(body): Json<SetTemperatureBody>,
) -> (StatusCode, Json<Value>) {
    if !(-20..=100).contains(&body.temperature) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "temperature must be between -20 and 100" })),
        );
    }
    match state
        .bus
        .set_temperature(body.machine, body.temperature as i8)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "machine": body.machine, "temperature": body.temperature })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

fn board_response_json(response: &BoardResponse) -> Value {
    json!({
        "boardId": response.board_id,
        "status": response.status.label(),
        "motor": response.motor.label(),
        "dropSensor": response.drop_sensor.label(),
        "dispenseState": response.dispense.label(),
        "raw": response.raw,
    })
}

fn internal_error(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::PosResponse;

    fn sample_response() -> PosResponse {
        serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"A1","transRspMsg":"APPROVED"}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_payment_body_parses_front_end_payload() {
        let body: PaymentBody = serde_json::from_str(
            r#"{"amount":1.250,"products":[{"slot":5,"name":"Water","quantity":2}],"trackId":"TRK-7"}"#,
        )
        .unwrap();
        assert_eq!(body.amount, 1.250);
        assert_eq!(body.products.len(), 1);
        assert_eq!(body.products[0].slot, 5);
        assert_eq!(body.track_id.as_deref(), Some("TRK-7"));
    }

    #[test]
    fn test_slot_test_body_parses_front_end_payload() {
        let body: SlotTestBody = serde_json::from_str(r#"{"slotNumber":105}"#).unwrap();
        assert_eq!(body.slot_number, 105);
        assert!(!body.with_drop_sensor);
    }

    #[test]
    fn test_set_temperature_body_parses_front_end_payload() {
        let body: SetTemperatureBody =
            serde_json::from_str(r#"{"temperature":4,"machine":1}"#).unwrap();
        assert_eq!(body.temperature, 4);
        assert_eq!(body.machine, 1);
    }

    #[test]
    fn test_payment_response_approved_shape() {
        let (code, Json(body)) = payment_response(TransactionOutcome::Approved {
            track_id: "TRK-1".to_string(),
            details: sample_response(),
        });
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["trackId"], "TRK-1");
        assert!(body["message"].is_string());
        assert!(body["transactionDetails"].is_object());
    }

    #[test]
    fn test_payment_response_declined_is_402() {
        let (code, Json(body)) = payment_response(TransactionOutcome::Declined {
            track_id: "TRK-2".to_string(),
            message: "DO NOT HONOUR".to_string(),
            details: sample_response(),
        });
        assert_eq!(code, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["declined"], true);
        assert_eq!(body["message"], "DO NOT HONOUR");
    }

    #[test]
    fn test_payment_response_cancelled_is_distinct_from_decline() {
        let (code, Json(body)) = payment_response(TransactionOutcome::Cancelled {
            track_id: "TRK-3".to_string(),
            message: "TRANSACTION CANCELLED".to_string(),
            details: None,
        });
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["cancelled"], true);
        assert_eq!(body["trackId"], "TRK-3");
    }

    #[test]
    fn test_cancel_response_shapes() {
        let (code, Json(body)) = cancel_response(CancelOutcome::SignalSent);
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (code, Json(body)) = cancel_response(CancelOutcome::Failed {
            error: "connection refused".to_string(),
        });
        assert_eq!(code, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "connection refused");
    }
}
