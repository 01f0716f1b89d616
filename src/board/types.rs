//! Dispenser board protocol constants and decoded response types.

/// Length of a command frame in bytes.
pub const COMMAND_LEN: usize = 6;
/// Length of a board response in bytes.
pub const RESPONSE_LEN: usize = 5;

/// Default board address byte (both boards answer on 0x00, routing is per port).
pub const DEFAULT_BOARD_ID: u8 = 0x00;

/// Status byte reported by a healthy board.
pub(crate) const STATUS_NORMAL: u8 = 0x5D;

// Slot address space. Two physical boards share addresses 1..=60; the rear
// board is reached through its own port with slot numbers offset by 100.
pub const FRONT_SLOT_MIN: u16 = 1;
pub const FRONT_SLOT_MAX: u16 = 60;
pub const REAR_SLOT_MIN: u16 = 100;
pub const REAR_SLOT_MAX: u16 = 160;
pub(crate) const REAR_SLOT_BASE: u16 = 100;

/// Instruction bytes (d5 of the command frame).
pub mod instruction {
    /// Vend without drop-sensor confirmation.
    pub const VEND: u8 = 0x00;
    /// Vend with drop-sensor confirmation.
    pub const VEND_WITH_SENSOR: u8 = 0x11;
    /// Motor test without drop sensor.
    pub const TEST: u8 = 0x55;
    /// Motor test with drop sensor.
    pub const TEST_WITH_SENSOR: u8 = 0xAA;
    /// Set cabinet target temperature (d5 carries the value).
    pub const SET_TEMPERATURE: u8 = 0xCE;
    /// Poll the temperature sensors.
    pub const READ_TEMPERATURE: u8 = 0xDC;
}

/// Motor fault code from the high nibble of response byte 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorStatus {
    Normal,
    PmosShort,
    NmosShort,
    MotorCircuit,
    MotorOpenCircuit,
    MotorTimeout,
    Unknown(u8),
}

impl MotorStatus {
    pub(crate) fn from_nibble(code: u8) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::PmosShort,
            2 => Self::NmosShort,
            3 => Self::MotorCircuit,
            4 => Self::MotorOpenCircuit,
            5 => Self::MotorTimeout,
            other => Self::Unknown(other),
        }
    }

    /// Human-readable label matching the board manual.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::PmosShort => "PMOS short",
            Self::NmosShort => "NMOS short",
            Self::MotorCircuit => "Motor circuit",
            Self::MotorOpenCircuit => "Motor open circuit",
            Self::MotorTimeout => "Motor timeout",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Drop-sensor fault code from the low nibble of response byte 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropSensorStatus {
    Normal,
    TriggeredWithoutTransmission,
    NoOutputWhenForbidden,
    SignalDuringDispense,
    Unknown(u8),
}

impl DropSensorStatus {
    pub(crate) fn from_nibble(code: u8) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::TriggeredWithoutTransmission,
            2 => Self::NoOutputWhenForbidden,
            3 => Self::SignalDuringDispense,
            other => Self::Unknown(other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::TriggeredWithoutTransmission => "Sensor triggered without transmission",
            Self::NoOutputWhenForbidden => "No output when forbidden",
            Self::SignalDuringDispense => "Sensor signal during dispense",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Dispense progress code from response byte 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenseState {
    /// 0x00 - no dispense in progress, or drop sensor off.
    Idle,
    /// 0xAA - product is being dispensed.
    Dispensing,
    Unknown(u8),
}

impl DispenseState {
    pub(crate) fn from_byte(code: u8) -> Self {
        match code {
            0x00 => Self::Idle,
            0xAA => Self::Dispensing,
            other => Self::Unknown(other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "No dispense or sensor off",
            Self::Dispensing => "Dispensing product",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Overall status byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStatus {
    Normal,
    Error(u8),
}

impl BoardStatus {
    pub(crate) fn from_byte(code: u8) -> Self {
        if code == STATUS_NORMAL {
            Self::Normal
        } else {
            Self::Error(code)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Error(_) => "Error",
        }
    }
}

/// Decoded 5-byte command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardResponse {
    pub board_id: u8,
    pub status: BoardStatus,
    pub motor: MotorStatus,
    pub drop_sensor: DropSensorStatus,
    pub dispense: DispenseState,
    /// Raw bytes as received, for diagnostics.
    pub raw: [u8; RESPONSE_LEN],
}

/// Decoded temperature poll response. Values are degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureReading {
    pub temp1: i16,
    pub temp2: i16,
}
