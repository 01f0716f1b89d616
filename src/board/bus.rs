//! Slot routing across the two dispenser board channels.
//!
//! Slots 1..=60 live on the front board, 100..=160 on the rear board; each
//! board hangs off its own serial port. The two ports are physically
//! independent, so temperature polls run against both concurrently.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::channel::{ChannelError, SerialChannel};
use super::frame;
use super::types::{
    BoardResponse, DEFAULT_BOARD_ID, FRONT_SLOT_MAX, FRONT_SLOT_MIN, REAR_SLOT_MAX, REAR_SLOT_MIN,
    RESPONSE_LEN, TemperatureReading, instruction,
};
use crate::config::SerialConfig;
use crate::error::{AppError, Result};

/// Pause between slots when exercising the whole planogram.
const SLOT_TEST_DELAY: Duration = Duration::from_millis(3000);

/// Temperature reading tagged with the channel it came from.
#[derive(Debug, Clone)]
pub struct ChannelTemperature {
    pub channel: String,
    pub reading: TemperatureReading,
}

/// Outcome of testing one slot during a sweep.
#[derive(Debug)]
pub struct SlotTestOutcome {
    pub slot: u16,
    pub result: Result<BoardResponse>,
}

/// Both board channels plus the routing rule between them.
pub struct DispenserBus {
    front: SerialChannel,
    rear: SerialChannel,
}

impl DispenserBus {
    /// Open both ports. Either may come up unavailable without failing.
    pub fn open(cfg: &SerialConfig) -> Self {
        Self {
            front: SerialChannel::open("front", &cfg.front_port),
            rear: SerialChannel::open("rear", &cfg.rear_port),
        }
    }

    /// Bus with no backing hardware, for deployments and tests without boards.
    pub fn detached() -> Self {
        Self {
            front: SerialChannel::unavailable("front"),
            rear: SerialChannel::unavailable("rear"),
        }
    }

    /// Every addressable slot across both cabinets.
    pub fn all_slots() -> Vec<u16> {
        (FRONT_SLOT_MIN..=FRONT_SLOT_MAX)
            .chain(REAR_SLOT_MIN..=REAR_SLOT_MAX)
            .collect()
    }

    /// Whether `slot` is a valid planogram address.
    pub fn is_valid_slot(slot: u16) -> bool {
        (FRONT_SLOT_MIN..=FRONT_SLOT_MAX).contains(&slot)
            || (REAR_SLOT_MIN..=REAR_SLOT_MAX).contains(&slot)
    }

    /// Route a slot number to its channel.
    pub fn channel_for_slot(&self, slot: u16) -> Option<&SerialChannel> {
        if (FRONT_SLOT_MIN..=FRONT_SLOT_MAX).contains(&slot) {
            Some(&self.front)
        } else if (REAR_SLOT_MIN..=REAR_SLOT_MAX).contains(&slot) {
            Some(&self.rear)
        } else {
            None
        }
    }

    /// Exercise one slot's motor and decode the board's verdict.
    pub async fn test_slot(&self, slot: u16, with_drop_sensor: bool) -> Result<BoardResponse> {
        let channel = self
            .channel_for_slot(slot)
            .ok_or_else(|| AppError::validation(format!("invalid slot: {slot}")))?;

        let instr = if with_drop_sensor {
            instruction::TEST_WITH_SENSOR
        } else {
            instruction::TEST
        };
        let packet = frame::encode_command(DEFAULT_BOARD_ID, slot, instr);
        debug!("Testing slot {slot} via {}: {packet:02X?}", channel.name());

        let bytes = channel.send(&packet, RESPONSE_LEN).await?;
        Ok(frame::decode_response(&bytes)?)
    }

    /// Test a list of slots sequentially with a settling delay between them.
    /// Failures are recorded per slot and never abort the sweep.
    pub async fn test_slots(&self, slots: &[u16], with_drop_sensor: bool) -> Vec<SlotTestOutcome> {
        let mut outcomes = Vec::with_capacity(slots.len());
        for (i, &slot) in slots.iter().enumerate() {
            let result = self.test_slot(slot, with_drop_sensor).await;
            if let Err(e) = &result {
                warn!("Slot {slot} test failed: {e}");
            }
            outcomes.push(SlotTestOutcome { slot, result });
            if i + 1 < slots.len() {
                tokio::time::sleep(SLOT_TEST_DELAY).await;
            }
        }
        info!("Finished testing {} slots", slots.len());
        outcomes
    }

    /// Poll the temperature sensors on both boards concurrently.
    pub async fn read_temperatures(&self) -> Result<Vec<ChannelTemperature>> {
        let (front, rear) = tokio::join!(
            read_channel_temperature(&self.front),
            read_channel_temperature(&self.rear),
        );
        Ok(vec![front?, rear?])
    }

    /// Push a target temperature to one cabinet (1 = front, 2 = rear).
    pub async fn set_temperature(&self, cabinet: u8, celsius: i8) -> Result<()> {
        let channel = match cabinet {
            1 => &self.front,
            2 => &self.rear,
            other => {
                return Err(AppError::validation(format!("invalid cabinet: {other}")));
            }
        };

        let packet = frame::set_temperature_request(DEFAULT_BOARD_ID, celsius);
        match channel.send(&packet, RESPONSE_LEN).await {
            Ok(_) => {
                info!("Set {} cabinet temperature to {celsius}C", channel.name());
                Ok(())
            }
            // The boards do not always acknowledge this command.
            Err(ChannelError::Timeout) => {
                debug!("No acknowledgement for set-temperature on {}", channel.name());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-enable the drive controller after power-up. The controller's reply
    /// format is undocumented, so a missing response is not an error.
    pub async fn enable_controller(&self) -> Result<()> {
        match self.front.send(&frame::ENABLE_CONTROLLER, RESPONSE_LEN).await {
            Ok(bytes) => {
                debug!("Controller enable response: {bytes:02X?}");
                Ok(())
            }
            Err(ChannelError::Timeout) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_channel_temperature(channel: &SerialChannel) -> Result<ChannelTemperature> {
    let packet = frame::temperature_request(DEFAULT_BOARD_ID);
    let bytes = channel.send(&packet, RESPONSE_LEN).await?;
    let reading = frame::decode_temperature(&bytes)?;
    debug!(
        "{}: temp1={}C temp2={}C",
        channel.name(),
        reading.temp1,
        reading.temp2
    );
    Ok(ChannelTemperature {
        channel: channel.name().to_string(),
        reading,
    })
}
