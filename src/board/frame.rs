//! Frame encoding and checksum validation for the dispenser boards.
//!
//! Commands are 6 bytes where every even-position byte is followed by its
//! ones' complement, making the frame self-checking. Responses are 5 bytes
//! ending in a sum-and-mask checksum. All functions here are pure.

use super::types::{
    BoardResponse, BoardStatus, COMMAND_LEN, DispenseState, DropSensorStatus, MotorStatus,
    RESPONSE_LEN, REAR_SLOT_BASE, REAR_SLOT_MAX, REAR_SLOT_MIN, TemperatureReading, instruction,
};
use thiserror::Error;

/// Errors from decoding an inbound frame. Never retried; a bad frame fails
/// that single decode.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid response length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Fixed packet that re-enables the drive controller after power-up.
pub const ENABLE_CONTROLLER: [u8; COMMAND_LEN] = [0x00, 0xFF, 0xCC, 0x33, 0x01, 0xFE];

/// Sum of the first four bytes, masked to one byte.
fn sum_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u32, |acc, &b| acc + u32::from(b)) as u8
}

/// Map a slot number into the board's own address space. Rear-board slots
/// (100..=160) are offset by 100 so both boards see addresses 1..=60.
pub fn actual_slot(slot_number: u16) -> u8 {
    if (REAR_SLOT_MIN..=REAR_SLOT_MAX).contains(&slot_number) {
        (slot_number - REAR_SLOT_BASE) as u8
    } else {
        slot_number as u8
    }
}

/// Build a 6-byte dispense/test command frame.
///
/// Callers validate the slot range; this function is total.
pub fn encode_command(board_id: u8, slot_number: u16, instruction: u8) -> [u8; COMMAND_LEN] {
    let d1 = board_id;
    let d3 = actual_slot(slot_number);
    let d5 = instruction;
    [d1, 0xFF - d1, d3, 0xFF - d3, d5, 0xFF - d5]
}

/// Decode and checksum-validate a 5-byte command response.
///
/// Unmapped status codes decode to `Unknown` variants rather than failing;
/// a malformed-but-checksum-valid frame must still decode.
pub fn decode_response(bytes: &[u8]) -> Result<BoardResponse, FrameError> {
    if bytes.len() != RESPONSE_LEN {
        return Err(FrameError::InvalidLength {
            expected: RESPONSE_LEN,
            actual: bytes.len(),
        });
    }

    let expected = sum_checksum(&bytes[..4]);
    if bytes[4] != expected {
        return Err(FrameError::ChecksumMismatch {
            expected,
            actual: bytes[4],
        });
    }

    let motor_nibble = (bytes[2] & 0xF0) >> 4;
    let sensor_nibble = bytes[2] & 0x0F;

    let mut raw = [0u8; RESPONSE_LEN];
    raw.copy_from_slice(bytes);

    Ok(BoardResponse {
        board_id: bytes[0],
        status: BoardStatus::from_byte(bytes[1]),
        motor: MotorStatus::from_nibble(motor_nibble),
        drop_sensor: DropSensorStatus::from_nibble(sensor_nibble),
        dispense: DispenseState::from_byte(bytes[3]),
        raw,
    })
}

/// Build the temperature poll frame for one board.
///
/// d5/d6 are the fixed 0x55/0xAA trailer the boards expect here, not the
/// complement pair used by command frames.
pub fn temperature_request(board_id: u8) -> [u8; COMMAND_LEN] {
    let cmd = instruction::READ_TEMPERATURE;
    [board_id, 0xFF - board_id, cmd, 0xFF - cmd, 0x55, 0xAA]
}

/// Decode a 5-byte temperature response. Temperature bytes are two's
/// complement signed.
pub fn decode_temperature(bytes: &[u8]) -> Result<TemperatureReading, FrameError> {
    if bytes.len() != RESPONSE_LEN {
        return Err(FrameError::InvalidLength {
            expected: RESPONSE_LEN,
            actual: bytes.len(),
        });
    }

    let expected = sum_checksum(&bytes[..4]);
    if bytes[4] != expected {
        return Err(FrameError::ChecksumMismatch {
            expected,
            actual: bytes[4],
        });
    }

    Ok(TemperatureReading {
        temp1: i16::from(bytes[2] as i8),
        temp2: i16::from(bytes[3] as i8),
    })
}

/// Build the set-temperature frame. d2 is a fixed 0xFF on this command.
pub fn set_temperature_request(board_id: u8, celsius: i8) -> [u8; COMMAND_LEN] {
    let cmd = instruction::SET_TEMPERATURE;
    let d5 = celsius as u8;
    [board_id, 0xFF, cmd, 0xFF - cmd, d5, 0xFF - d5]
}
