//! Dispenser board serial protocol.
//!
//! The drive boards speak a fixed-width binary protocol at 9600 8N1:
//! 6-byte self-checking command frames out, 5-byte checksummed responses
//! back. Slots 1..=60 belong to the front board, 100..=160 to the rear.

mod bus;
mod channel;
pub mod frame;
mod dispenser;
pub mod types;


pub use bus::{ChannelTemperature, DispenserBus, SlotTestOutcome};
pub use channel::{ChannelError, SerialChannel};
pub use dispenser::DispenseOrchestrator;
pub use frame::FrameError;
pub use types::{
    BoardResponse, BoardStatus, DispenseState, DropSensorStatus, MotorStatus, TemperatureReading,
};
