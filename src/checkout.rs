//! Transaction coordination: order validation, payment capture and the
//! hand-off to the dispenser.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::board::DispenseOrchestrator;
use crate::models::{LineItem, order_summary};
use crate::pos::{PosClient, PosError, PosRequest, PosResponse, ResponseType};

/// Smallest charge the acquirer accepts, in KWD.
pub const MIN_AMOUNT_KWD: f64 = 0.100;

/// Terminal amounts are integer fils; 1 KWD = 1000 fils.
pub fn to_fils(amount: f64) -> i64 {
    (amount * 1000.0).round() as i64
}

/// Track ids are unique per machine within terminal retention, which a
/// millisecond clock satisfies for a single kiosk.
pub fn generate_track_id() -> String {
    format!("TRK-{}", Utc::now().timestamp_millis())
}

/// Validate an order before any terminal traffic. Returns every problem
/// found, not just the first.
pub fn validate_order(amount: f64, items: &[LineItem]) -> Vec<String> {
    let mut errors = Vec::new();
    if !amount.is_finite() || amount <= 0.0 {
        errors.push("amount must be a positive number".to_string());
    } else if amount < MIN_AMOUNT_KWD {
        errors.push(format!("amount must be at least {MIN_AMOUNT_KWD:.3} KWD"));
    }
    if items.is_empty() {
        errors.push("order must contain at least one item".to_string());
    }
    for (i, item) in items.iter().enumerate() {
        if !crate::board::DispenserBus::is_valid_slot(item.slot) {
            errors.push(format!("item {}: slot {} is not a valid slot", i + 1, item.slot));
        }
        if item.name.trim().is_empty() {
            errors.push(format!("item {}: product name is empty", i + 1));
        }
        if item.quantity == 0 {
            errors.push(format!("item {}: quantity must be at least 1", i + 1));
        }
    }
    errors
}

/// The seam between the coordinator and the terminal, so transaction logic
/// can be exercised without a live terminal.
pub trait PaymentTerminal: Send + Sync {
    fn request(
        &self,
        req: &PosRequest,
    ) -> impl Future<Output = Result<PosResponse, PosError>> + Send;

    fn cancel_in_flight(
        &self,
        track_id: &str,
    ) -> impl Future<Output = Result<bool, PosError>> + Send;
}

impl PaymentTerminal for PosClient {
    async fn request(&self, req: &PosRequest) -> Result<PosResponse, PosError> {
        PosClient::request(self, req).await
    }

    async fn cancel_in_flight(&self, track_id: &str) -> Result<bool, PosError> {
        PosClient::cancel_in_flight(self, track_id).await
    }
}

/// Final outcome of a charge attempt.
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    Approved {
        track_id: String,
        details: PosResponse,
    },
    Declined {
        track_id: String,
        message: String,
        details: PosResponse,
    },
    /// The customer cancelled at the terminal, or a cancel signalled through
    /// [`TransactionCoordinator::cancel`] resolved the pending payment.
    Cancelled {
        track_id: String,
        message: String,
        details: Option<PosResponse>,
    },
    Errored {
        track_id: String,
        error: String,
    },
    ValidationFailed { errors: Vec<String> },
}

/// Outcome of a cancel attempt.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// Cancel was written onto the live payment connection; the payment
    /// request itself will resolve with the cancellation result.
    SignalSent,
    Completed { message: Option<String> },
    Failed { error: String },
}

pub struct TransactionCoordinator<P = PosClient> {
    pos: Arc<P>,
    dispenser: Arc<DispenseOrchestrator>,
    /// Track id of the payment a cancel was signalled against, so the
    /// pending charge resolves as Cancelled rather than Declined.
    cancel_signalled: Mutex<Option<String>>,
}

impl<P: PaymentTerminal + 'static> TransactionCoordinator<P> {
    pub fn new(pos: Arc<P>, dispenser: Arc<DispenseOrchestrator>) -> Self {
        Self {
            pos,
            dispenser,
            cancel_signalled: Mutex::new(None),
        }
    }

    async fn take_cancel_signal(&self, track_id: &str) -> bool {
        let mut flag = self.cancel_signalled.lock().await;
        if flag.as_deref() == Some(track_id) {
            flag.take();
            true
        } else {
            false
        }
    }

    /// Run one full charge: validate, wake the terminal, capture payment and,
    /// on approval, hand the order to the dispenser. Dispensing runs in the
    /// background so the caller gets the payment result promptly.
    pub async fn charge(
        &self,
        amount: f64,
        items: Vec<LineItem>,
        track_id: Option<String>,
    ) -> TransactionOutcome {
        let errors = validate_order(amount, &items);
        if !errors.is_empty() {
            return TransactionOutcome::ValidationFailed { errors };
        }

        let track_id = track_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_track_id);
        info!(track_id, amount, order = %order_summary(&items), "starting transaction");

        match self.pos.request(&PosRequest::init()).await {
            Ok(resp) if resp.response_type == ResponseType::StatusResponse => {}
            Ok(resp) => {
                warn!(track_id, response_type = ?resp.response_type, "unexpected init response");
                return TransactionOutcome::Errored {
                    track_id,
                    error: format!("terminal init failed: unexpected {:?}", resp.response_type),
                };
            }
            Err(e) => {
                error!(track_id, error = %e, "terminal init failed");
                return TransactionOutcome::Errored {
                    track_id,
                    error: format!("terminal init failed: {e}"),
                };
            }
        }

        let payment = PosRequest::payment(to_fils(amount), &track_id);
        let response = match self.pos.request(&payment).await {
            Ok(resp) => resp,
            Err(e) => match salvage_response(&e) {
                Some(resp) => resp,
                None => {
                    if self.take_cancel_signal(&track_id).await {
                        info!(track_id, error = %e, "payment dropped after cancel signal");
                        return TransactionOutcome::Cancelled {
                            track_id,
                            message: e.to_string(),
                            details: None,
                        };
                    }
                    error!(track_id, error = %e, "payment request failed");
                    return TransactionOutcome::Errored {
                        track_id,
                        error: e.to_string(),
                    };
                }
            },
        };

        if response.is_approved() {
            info!(track_id, "payment approved, dispensing");
            let dispenser = Arc::clone(&self.dispenser);
            let id = track_id.clone();
            tokio::spawn(async move {
                dispenser.run(&items, &id).await;
            });
            TransactionOutcome::Approved {
                track_id,
                details: response,
            }
        } else {
            let message = response
                .display_message()
                .unwrap_or("payment declined")
                .to_string();
            if self.take_cancel_signal(&track_id).await || response.is_cancelled() {
                info!(track_id, message, "payment cancelled");
                return TransactionOutcome::Cancelled {
                    track_id,
                    message,
                    details: Some(response),
                };
            }
            info!(track_id, message, "payment declined");
            TransactionOutcome::Declined {
                track_id,
                message,
                details: response,
            }
        }
    }

    /// Cancel a payment: prefer signalling the in-flight connection, fall
    /// back to a standalone Cancel request.
    pub async fn cancel(&self, track_id: &str) -> CancelOutcome {
        match self.pos.cancel_in_flight(track_id).await {
            Ok(true) => {
                info!(track_id, "cancel signalled on active connection");
                *self.cancel_signalled.lock().await = Some(track_id.to_string());
                return CancelOutcome::SignalSent;
            }
            Ok(false) => {}
            Err(e) => warn!(track_id, error = %e, "in-flight cancel failed, retrying standalone"),
        }
        match self.pos.request(&PosRequest::cancel(track_id)).await {
            Ok(resp) => CancelOutcome::Completed {
                message: resp.display_message().map(str::to_string),
            },
            Err(e) => {
                error!(track_id, error = %e, "cancel request failed");
                CancelOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// The terminal sometimes answers and then drops the connection before a
/// clean shutdown. If the error carries a complete JSON body, treat it as
/// the response.
fn salvage_response(err: &PosError) -> Option<PosResponse> {
    let body = err.partial_body()?;
    let resp: PosResponse = serde_json::from_str(body.trim()).ok()?;
    warn!(error = %err, "salvaged terminal response from transport error");
    Some(resp)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::board::DispenserBus;
    use crate::pos::RequestType;

    fn approved_response() -> PosResponse {
        serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"A99","transRspMsg":"APPROVED"}}"#,
        )
        .unwrap()
    }

    fn status_response() -> PosResponse {
        serde_json::from_str(r#"{"responseType":"StatusResponse","message":"Ready"}"#).unwrap()
    }

    /// Scripted terminal: pops one canned result per request, records what
    /// was sent.
    struct ScriptedTerminal {
        script: Mutex<Vec<Result<PosResponse, PosError>>>,
        requests: Mutex<Vec<PosRequest>>,
        live_connection: bool,
    }

    impl ScriptedTerminal {
        fn new(script: Vec<Result<PosResponse, PosError>>) -> Self {
            Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
                live_connection: false,
            }
        }

        fn sent(&self) -> Vec<PosRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl PaymentTerminal for ScriptedTerminal {
        async fn request(&self, req: &PosRequest) -> Result<PosResponse, PosError> {
            self.requests.lock().unwrap().push(req.clone());
            self.script.lock().unwrap().remove(0)
        }

        async fn cancel_in_flight(&self, _track_id: &str) -> Result<bool, PosError> {
            Ok(self.live_connection)
        }
    }

    fn coordinator(
        terminal: ScriptedTerminal,
    ) -> (Arc<ScriptedTerminal>, TransactionCoordinator<ScriptedTerminal>) {
        let terminal = Arc::new(terminal);
        let dispenser = Arc::new(
            DispenseOrchestrator::new(Arc::new(DispenserBus::detached()), None).with_delays(
                std::time::Duration::ZERO,
                std::time::Duration::ZERO,
            ),
        );
        let coordinator = TransactionCoordinator::new(Arc::clone(&terminal), dispenser);
        (terminal, coordinator)
    }

    fn one_item() -> Vec<LineItem> {
        vec![LineItem {
            slot: 5,
            name: "Water".to_string(),
            quantity: 1,
            price: Some(0.250),
        }]
    }

    #[test]
    fn test_to_fils() {
        assert_eq!(to_fils(1.250), 1250);
        assert_eq!(to_fils(0.100), 100);
        assert_eq!(to_fils(2.0), 2000);
    }

    #[test]
    fn test_validate_order() {
        assert!(validate_order(1.0, &one_item()).is_empty());

        let errors = validate_order(0.050, &one_item());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("0.100"));

        let errors = validate_order(-1.0, &[]);
        assert_eq!(errors.len(), 2);

        let errors = validate_order(
            1.0,
            &[LineItem {
                slot: 75,
                name: "  ".to_string(),
                quantity: 0,
                price: None,
            }],
        );
        assert_eq!(errors.len(), 3);
    }

    #[tokio::test]
    async fn test_charge_approved() {
        let (terminal, coordinator) =
            coordinator(ScriptedTerminal::new(vec![
                Ok(status_response()),
                Ok(approved_response()),
            ]));

        let outcome = coordinator.charge(1.250, one_item(), None).await;
        match outcome {
            TransactionOutcome::Approved { track_id, .. } => {
                assert!(track_id.starts_with("TRK-"));
            }
            other => panic!("expected approval, got {other:?}"),
        }

        let sent = terminal.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].request_type, RequestType::Init);
        assert_eq!(sent[1].request_type, RequestType::Payment);
        assert_eq!(sent[1].amount, Some(1250));
    }

    #[tokio::test]
    async fn test_charge_declined_on_null_auth_code() {
        let declined: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"null","transRspMsg":"DO NOT HONOUR"}}"#,
        )
        .unwrap();
        let (terminal, coordinator) =
            coordinator(ScriptedTerminal::new(vec![Ok(status_response()), Ok(declined)]));

        match coordinator.charge(0.500, one_item(), Some("TRK-CUSTOM".to_string())).await {
            TransactionOutcome::Declined { track_id, message, .. } => {
                assert_eq!(track_id, "TRK-CUSTOM");
                assert_eq!(message, "DO NOT HONOUR");
            }
            other => panic!("expected decline, got {other:?}"),
        }
        assert_eq!(terminal.sent()[1].track_id.as_deref(), Some("TRK-CUSTOM"));
    }

    #[tokio::test]
    async fn test_charge_cancelled_after_signal() {
        let unapproved: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"null","transRspMsg":"DO NOT HONOUR"}}"#,
        )
        .unwrap();
        let mut terminal = ScriptedTerminal::new(vec![Ok(status_response()), Ok(unapproved)]);
        terminal.live_connection = true;
        let (_, coordinator) = coordinator(terminal);

        match coordinator.cancel("TRK-9").await {
            CancelOutcome::SignalSent => {}
            other => panic!("expected signal, got {other:?}"),
        }
        match coordinator.charge(1.0, one_item(), Some("TRK-9".to_string())).await {
            TransactionOutcome::Cancelled { track_id, .. } => assert_eq!(track_id, "TRK-9"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_charge_cancelled_on_terminal_message() {
        let cancelled: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"null","transRspMsg":"TRANSACTION CANCELLED"}}"#,
        )
        .unwrap();
        let (_, coordinator) =
            coordinator(ScriptedTerminal::new(vec![Ok(status_response()), Ok(cancelled)]));

        match coordinator.charge(1.0, one_item(), None).await {
            TransactionOutcome::Cancelled { message, details, .. } => {
                assert_eq!(message, "TRANSACTION CANCELLED");
                assert!(details.is_some());
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_signal_for_other_track_does_not_reclassify_decline() {
        let declined: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"null","transRspMsg":"DO NOT HONOUR"}}"#,
        )
        .unwrap();
        let mut terminal = ScriptedTerminal::new(vec![Ok(status_response()), Ok(declined)]);
        terminal.live_connection = true;
        let (_, coordinator) = coordinator(terminal);

        coordinator.cancel("TRK-OTHER").await;
        match coordinator.charge(1.0, one_item(), Some("TRK-MINE".to_string())).await {
            TransactionOutcome::Declined { .. } => {}
            other => panic!("expected decline, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_charge_validation_failure_sends_nothing() {
        let (terminal, coordinator) = coordinator(ScriptedTerminal::new(vec![]));

        match coordinator.charge(0.050, one_item(), None).await {
            TransactionOutcome::ValidationFailed { errors } => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert!(terminal.sent().is_empty());
    }

    #[tokio::test]
    async fn test_charge_errors_when_init_is_not_status() {
        let (_, coordinator) =
            coordinator(ScriptedTerminal::new(vec![Ok(approved_response())]));

        match coordinator.charge(1.0, one_item(), None).await {
            TransactionOutcome::Errored { error, .. } => {
                assert!(error.contains("init failed"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_charge_salvages_response_from_closed_connection() {
        let salvageable = PosError::ConnectionClosed {
            partial: r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"B7"}}"#
                .to_string(),
        };
        let (_, coordinator) =
            coordinator(ScriptedTerminal::new(vec![Ok(status_response()), Err(salvageable)]));

        match coordinator.charge(1.0, one_item(), None).await {
            TransactionOutcome::Approved { .. } => {}
            other => panic!("expected salvaged approval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_prefers_live_connection() {
        let mut terminal = ScriptedTerminal::new(vec![]);
        terminal.live_connection = true;
        let (terminal, coordinator) = coordinator(terminal);

        match coordinator.cancel("TRK-1").await {
            CancelOutcome::SignalSent => {}
            other => panic!("expected signal, got {other:?}"),
        }
        assert!(terminal.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_falls_back_to_standalone_request() {
        let cancelled: PosResponse = serde_json::from_str(
            r#"{"responseType":"StatusResponse","message":"Transaction cancelled"}"#,
        )
        .unwrap();
        let (terminal, coordinator) = coordinator(ScriptedTerminal::new(vec![Ok(cancelled)]));

        match coordinator.cancel("TRK-2").await {
            CancelOutcome::Completed { message } => {
                assert_eq!(message.as_deref(), Some("Transaction cancelled"));
            }
            other => panic!("expected completion, got {other:?}"),
        }
        let sent = terminal.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request_type, RequestType::Cancel);
        assert_eq!(sent[0].track_id.as_deref(), Some("TRK-2"));
    }
}
