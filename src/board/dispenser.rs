//! Dispense orchestration: turning a paid order into motor runs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::bus::DispenserBus;
use super::channel::ChannelError;
use super::frame;
use super::types::{DEFAULT_BOARD_ID, MotorStatus, RESPONSE_LEN, instruction};
use crate::ledger::SaleLedger;
use crate::models::{DispenseResult, DispenseStatus, LineItem};

/// Mechanical settling time between units of the same product.
const INTRA_PRODUCT_DELAY: Duration = Duration::from_millis(1000);
/// Settling time between distinct products.
const INTER_PRODUCT_DELAY: Duration = Duration::from_millis(2000);

/// Sequences the physical dispensing of an order across the board channels.
///
/// Units are dispensed strictly one at a time: the mechanism cannot run two
/// motors of the same slot simultaneously, and the boards have no request
/// ids. A failed unit never aborts the batch; every unit gets a result.
pub struct DispenseOrchestrator {
    bus: Arc<DispenserBus>,
    ledger: Option<Arc<SaleLedger>>,
    intra_product_delay: Duration,
    inter_product_delay: Duration,
}

impl DispenseOrchestrator {
    pub fn new(bus: Arc<DispenserBus>, ledger: Option<Arc<SaleLedger>>) -> Self {
        Self {
            bus,
            ledger,
            intra_product_delay: INTRA_PRODUCT_DELAY,
            inter_product_delay: INTER_PRODUCT_DELAY,
        }
    }

    /// Override the settling delays (tests).
    #[cfg(test)]
    pub(crate) fn with_delays(mut self, intra: Duration, inter: Duration) -> Self {
        self.intra_product_delay = intra;
        self.inter_product_delay = inter;
        self
    }

    /// Dispense every unit of every line item, then hand the results to the
    /// sale ledger fire-and-forget. Returns one result per unit.
    pub async fn run(&self, items: &[LineItem], track_id: &str) -> Vec<DispenseResult> {
        let results = self.dispense(items, track_id).await;

        if let Some(ledger) = &self.ledger {
            let ledger = ledger.clone();
            let items = items.to_vec();
            let recorded = results.clone();
            tokio::spawn(async move {
                if let Err(e) = ledger.record(&items, &recorded).await {
                    error!("Sale ledger recording failed: {e}");
                }
            });
        }

        results
    }

    /// Drive the hardware for each unit sequentially with settling delays.
    pub async fn dispense(&self, items: &[LineItem], track_id: &str) -> Vec<DispenseResult> {
        let total: u32 = items.iter().map(|p| p.quantity).sum();
        info!("Dispensing {total} units for {track_id}");

        let mut results = Vec::with_capacity(total as usize);
        for (index, item) in items.iter().enumerate() {
            for unit in 0..item.quantity {
                let (status, error) = self.dispense_unit(item.slot).await;
                let product = format!("{} ({}/{})", item.name, unit + 1, item.quantity);
                match status {
                    DispenseStatus::Success => info!("Dispensed {product} from slot {}", item.slot),
                    DispenseStatus::Simulated => {
                        warn!(
                            "Simulated dispense of {product} from slot {}: {}",
                            item.slot,
                            error.as_deref().unwrap_or("no detail")
                        );
                    }
                    DispenseStatus::Failed => {
                        error!(
                            "Failed to dispense {product} from slot {}: {}",
                            item.slot,
                            error.as_deref().unwrap_or("no detail")
                        );
                    }
                }
                results.push(DispenseResult {
                    track_id: track_id.to_string(),
                    product,
                    status,
                    error,
                });

                if unit + 1 < item.quantity {
                    tokio::time::sleep(self.intra_product_delay).await;
                }
            }

            if index + 1 < items.len() {
                tokio::time::sleep(self.inter_product_delay).await;
            }
        }

        results
    }

    /// Dispense one unit. Hardware faults degrade instead of propagating:
    /// the customer is already charged, so write failures and silence from
    /// the board resolve as `Simulated` and the flow completes.
    async fn dispense_unit(&self, slot: u16) -> (DispenseStatus, Option<String>) {
        let Some(channel) = self.bus.channel_for_slot(slot) else {
            return (
                DispenseStatus::Failed,
                Some(format!("invalid slot: {slot}")),
            );
        };

        if !channel.is_available() {
            return (
                DispenseStatus::Simulated,
                Some("serial port unavailable".to_string()),
            );
        }

        let packet = frame::encode_command(DEFAULT_BOARD_ID, slot, instruction::VEND_WITH_SENSOR);
        match channel.send(&packet, RESPONSE_LEN).await {
            Ok(bytes) => match frame::decode_response(&bytes) {
                Ok(response) if response.motor == MotorStatus::Normal => {
                    (DispenseStatus::Success, None)
                }
                Ok(response) => (
                    DispenseStatus::Failed,
                    Some(format!("motor fault: {}", response.motor.label())),
                ),
                Err(e) => (DispenseStatus::Failed, Some(e.to_string())),
            },
            Err(ChannelError::Timeout) => (
                DispenseStatus::Simulated,
                Some("no response before timeout".to_string()),
            ),
            Err(ChannelError::WriteFailure(e)) => (
                DispenseStatus::Simulated,
                Some(format!("write error: {e}")),
            ),
            Err(ChannelError::Unavailable) => (
                DispenseStatus::Simulated,
                Some("serial port unavailable".to_string()),
            ),
            Err(e) => (DispenseStatus::Failed, Some(e.to_string())),
        }
    }
}
