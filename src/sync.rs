//! Cloud sync: planogram pulls and sale/transaction uploads.
//!
//! The backend is a PostgREST-style API keyed by machine id. Every sale and
//! dispense record lands in the local database first and is flushed here, so
//! a dead uplink never blocks vending.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::CloudConfig;
use crate::db::{planogram, sales};
use crate::entities::planogram as planogram_entity;
use crate::entities::{sales_log, transaction_log};
use crate::error::{AppError, Result};
use crate::models::TransactionRecord;

/// One slot as the cloud reports it, with its product embedded.
#[derive(Debug, Clone, Deserialize)]
struct CloudSlot {
    slot_number: i32,
    quantity: i32,
    status: String,
    product: Option<CloudProduct>,
}

#[derive(Debug, Clone, Deserialize)]
struct CloudProduct {
    id: String,
    name: String,
    price: f64,
}

#[derive(Debug, Clone, Serialize)]
struct DecrementCall<'a> {
    machine_id: &'a str,
    slot_number: i32,
    quantity: i32,
}

pub struct CloudSync {
    http: Client,
    api_url: String,
    machine_id: String,
    interval: Duration,
    db: DatabaseConnection,
}

impl CloudSync {
    pub fn new(cfg: &CloudConfig, machine_id: &str, db: DatabaseConnection) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&cfg.api_key)
            .map_err(|_| AppError::config("cloud api_key contains invalid characters"))?;
        headers.insert("apikey", key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))
            .map_err(|_| AppError::config("cloud api_key contains invalid characters"))?;
        headers.insert(AUTHORIZATION, bearer);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            machine_id: machine_id.to_string(),
            interval: Duration::from_secs(cfg.interval_minutes * 60),
            db,
        })
    }

    /// Pull the machine's planogram from the cloud and replace the local
    /// copy. Returns the number of slots received.
    pub async fn fetch_planogram(&self) -> Result<usize> {
        let url = format!(
            "{}/rest/v1/slots?vending_machine_id=eq.{}&select=slot_number,quantity,status,product:products(id,name,price)",
            self.api_url, self.machine_id
        );
        let slots: Vec<CloudSlot> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rows: Vec<planogram_entity::Model> = slots
            .into_iter()
            .filter_map(|slot| {
                let product = slot.product?;
                Some(planogram_entity::Model {
                    slot_number: slot.slot_number,
                    vending_machine_id: self.machine_id.clone(),
                    product_id: product.id,
                    product_name: product.name,
                    product_price: product.price,
                    quantity: slot.quantity,
                    status: slot.status,
                })
            })
            .collect();

        let count = planogram::replace_all(&self.db, rows).await?;
        info!(slots = count, "planogram refreshed from cloud");
        Ok(count)
    }

    /// Upload one sale row and decrement the cloud-side slot stock.
    pub async fn push_sale(&self, sale: &sales_log::Model) -> Result<()> {
        let url = format!("{}/rest/v1/sales", self.api_url);
        self.http
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({
                "id": sale.id,
                "vending_machine_id": sale.vending_machine_id,
                "slot_number": sale.slot_number,
                "product_id": sale.product_id,
                "quantity": sale.quantity,
                "sold_at": sale.sold_at,
                "unit_price": sale.unit_price,
                "status": sale.status,
            }))
            .send()
            .await?
            .error_for_status()?;

        let url = format!("{}/rest/v1/rpc/decrease_slot_quantity", self.api_url);
        self.http
            .post(&url)
            .json(&DecrementCall {
                machine_id: &self.machine_id,
                slot_number: sale.slot_number,
                quantity: sale.quantity,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Upload a batch of dispense records.
    pub async fn push_transactions(&self, records: &[TransactionRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let url = format!("{}/rest/v1/transactions", self.api_url);
        self.http
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(records)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Push everything the local database holds that the cloud has not
    /// acknowledged yet. Rows are marked synced one at a time so a mid-batch
    /// failure never loses data.
    pub async fn flush_unsynced(&self) -> Result<FlushReport> {
        let mut report = FlushReport::default();

        for sale in sales::unsynced_sales(&self.db).await? {
            match self.push_sale(&sale).await {
                Ok(()) => {
                    sales::mark_sale_synced(&self.db, &sale.id).await?;
                    report.sales += 1;
                }
                Err(e) => {
                    warn!(sale_id = %sale.id, error = %e, "sale upload failed");
                    report.failed += 1;
                }
            }
        }

        for row in sales::unsynced_transactions(&self.db).await? {
            let upload = TransactionRecord {
                track_id: row.track_id.clone(),
                product: row.product.clone(),
                status: row.status.clone(),
                machine: row.vending_machine_id.clone(),
            };
            match self.push_transactions(std::slice::from_ref(&upload)).await {
                Ok(()) => {
                    sales::mark_transaction_synced(&self.db, &row.id).await?;
                    report.transactions += 1;
                }
                Err(e) => {
                    warn!(transaction_id = %row.id, error = %e, "transaction upload failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Background loop: periodic flush plus a planogram refresh.
    pub async fn run_loop(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.flush_unsynced().await {
                Ok(report) if report.sales + report.transactions + report.failed > 0 => {
                    info!(
                        sales = report.sales,
                        transactions = report.transactions,
                        failed = report.failed,
                        "cloud flush complete"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "cloud flush failed"),
            }
            if let Err(e) = self.fetch_planogram().await {
                warn!(error = %e, "planogram refresh failed");
            }
        }
    }
}

/// Counts from one flush pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushReport {
    pub sales: usize,
    pub transactions: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_slot_parsing() {
        let body = r#"[
            {"slot_number":5,"quantity":8,"status":"active",
             "product":{"id":"p-1","name":"Water","price":0.250}},
            {"slot_number":6,"quantity":0,"status":"empty","product":null}
        ]"#;
        let slots: Vec<CloudSlot> = serde_json::from_str(body).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].slot_number, 5);
        assert_eq!(slots[0].product.as_ref().unwrap().name, "Water");
        assert!(slots[1].product.is_none());
    }

    #[test]
    fn test_transaction_record_field_names() {
        let upload = TransactionRecord {
            track_id: "TRK-1".to_string(),
            product: "Water (1/1)".to_string(),
            status: "SUCCESS".to_string(),
            machine: "VM-01".to_string(),
        };
        let json = serde_json::to_string(&upload).unwrap();
        assert!(json.contains(r#""transationId":"TRK-1""#));
        assert!(json.contains(r#""machine":"VM-01""#));
    }
}
