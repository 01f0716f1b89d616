//! Sale ledger: durable recording of what was actually dispensed.
//!
//! Rows are written locally first, then pushed to the cloud best-effort; the
//! periodic sync loop retries anything the push leaves behind.

use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{planogram, sales};
use crate::error::Result;
use crate::models::{CreateSale, DispenseResult, LineItem, TransactionRecord};
use crate::sync::CloudSync;

pub struct SaleLedger {
    db: DatabaseConnection,
    cloud: Arc<CloudSync>,
    machine_id: String,
}

impl SaleLedger {
    pub fn new(db: DatabaseConnection, cloud: Arc<CloudSync>, machine_id: &str) -> Self {
        Self {
            db,
            cloud,
            machine_id: machine_id.to_string(),
        }
    }

    /// Record the outcome of one dispensed order: sale rows for the units
    /// that left the machine, transaction rows for every unit attempted.
    /// `results` holds one entry per unit in item order.
    pub async fn record(&self, items: &[LineItem], results: &[DispenseResult]) -> Result<()> {
        let mut cursor = results.iter();
        for item in items {
            let unit_results: Vec<_> = cursor.by_ref().take(item.quantity as usize).collect();
            let dispensed = unit_results.iter().filter(|r| !r.status.is_failure()).count() as u32;
            if dispensed == 0 {
                continue;
            }

            let loaded = planogram::get_by_slot(&self.db, i32::from(item.slot)).await?;
            let sale = CreateSale {
                id: Uuid::new_v4(),
                vending_machine_id: self.machine_id.clone(),
                slot_number: item.slot,
                product_id: loaded
                    .as_ref()
                    .map(|p| p.product_id.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                quantity: dispensed,
                sold_at: Utc::now(),
                unit_price: loaded
                    .as_ref()
                    .map(|p| p.product_price)
                    .or(item.price)
                    .unwrap_or(0.0),
                status: "COMPLETED".to_string(),
            };

            let row = sales::insert_sale(&self.db, &sale).await?;
            planogram::decrement_stock(&self.db, i32::from(item.slot), dispensed as i32).await?;

            match self.cloud.push_sale(&row).await {
                Ok(()) => sales::mark_sale_synced(&self.db, &row.id).await?,
                Err(e) => warn!(sale_id = %row.id, error = %e, "sale push deferred to sync loop"),
            }
        }

        let mut uploads = Vec::with_capacity(results.len());
        let mut row_ids = Vec::with_capacity(results.len());
        for result in results {
            let row = sales::insert_transaction(&self.db, &self.machine_id, result).await?;
            uploads.push(TransactionRecord {
                track_id: row.track_id.clone(),
                product: row.product.clone(),
                status: row.status.clone(),
                machine: row.vending_machine_id.clone(),
            });
            row_ids.push(row.id);
        }

        match self.cloud.push_transactions(&uploads).await {
            Ok(()) => {
                for id in &row_ids {
                    sales::mark_transaction_synced(&self.db, id).await?;
                }
            }
            Err(e) => warn!(error = %e, "transaction push deferred to sync loop"),
        }

        info!(
            track_id = results.first().map(|r| r.track_id.as_str()).unwrap_or(""),
            units = results.len(),
            "order recorded"
        );
        Ok(())
    }
}
