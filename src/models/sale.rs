//! Sale ledger DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// DTO for inserting a sales-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSale {
    pub id: Uuid,
    pub vending_machine_id: String,
    pub slot_number: u16,
    pub product_id: String,
    pub quantity: u32,
    pub sold_at: DateTime<Utc>,
    pub unit_price: f64,
    pub status: String,
}

/// DTO for the cloud transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(rename = "transationId")]
    pub track_id: String,
    pub product: String,
    pub status: String,
    pub machine: String,
}
