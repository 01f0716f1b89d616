//! Order line items and per-unit dispense results.

use serde::{Deserialize, Serialize};

/// One purchased product line in a checkout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub slot: u16,
    pub name: String,
    pub quantity: u32,
    /// Unit price in major currency units (KWD).
    #[serde(default)]
    pub price: Option<f64>,
}

/// How one physical dispense attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispenseStatus {
    /// The board confirmed the dispense.
    Success,
    /// The write failed or the board never answered; the unit is assumed
    /// dispensed so the already-charged flow can complete. Deliberate
    /// degraded-mode behavior, kept distinct from a confirmed success.
    Simulated,
    /// The board answered with a fault, or the slot/channel was unusable.
    Failed,
}

impl DispenseStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Wire form of the status, identical to its JSON serialization. Local
    /// rows and cloud uploads both store this form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Simulated => "SIMULATED",
            Self::Failed => "FAILED",
        }
    }
}

/// Result of dispensing one unit of one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseResult {
    pub track_id: String,
    /// Product name with its index in the batch, e.g. "Volvic Water (1/2)".
    pub product: String,
    pub status: DispenseStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Human-readable one-line order summary, e.g. "Water x2, Cola x1".
pub fn order_summary(items: &[LineItem]) -> String {
    items
        .iter()
        .map(|p| format!("{} x{}", p.name, p.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_summary() {
        let items = vec![
            LineItem {
                slot: 5,
                name: "Water".to_string(),
                quantity: 2,
                price: Some(0.250),
            },
            LineItem {
                slot: 101,
                name: "Cola".to_string(),
                quantity: 1,
                price: None,
            },
        ];
        assert_eq!(order_summary(&items), "Water x2, Cola x1");
    }

    #[test]
    fn test_dispense_status_serializes_screaming() {
        let json = serde_json::to_string(&DispenseStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
        let json = serde_json::to_string(&DispenseStatus::Simulated).unwrap();
        assert_eq!(json, "\"SIMULATED\"");
    }

    #[test]
    fn test_dispense_status_as_str_matches_serde_form() {
        for status in [
            DispenseStatus::Success,
            DispenseStatus::Simulated,
            DispenseStatus::Failed,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire.as_str(), Some(status.as_str()));
        }
    }

    #[test]
    fn test_line_item_accepts_camel_case_payload() {
        let item: LineItem =
            serde_json::from_str(r#"{"slot": 105, "name": "Chips", "quantity": 3}"#).unwrap();
        assert_eq!(item.slot, 105);
        assert_eq!(item.quantity, 3);
        assert!(item.price.is_none());
    }
}
