//! Serial channel ownership and request/response discipline.
//!
//! The board protocol is half-duplex with no request ids: one request may be
//! in flight per port at a time, and overlapping writes corrupt framing. Each
//! channel therefore rejects a second caller with `Busy` while a send is
//! pending, and buffers any bytes left over after a response for the next
//! call.

use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, trace, warn};

/// Wire settings for the drive boards: 9600 baud, 8N1.
pub const BAUD_RATE: u32 = 9600;

/// How long to wait for a complete response after the write is issued.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Errors from one `send` on a serial channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The port failed to open; the machine keeps vending in degraded mode.
    #[error("serial port unavailable")]
    Unavailable,

    /// Another request is already in flight on this port.
    #[error("channel busy: a request is already in flight")]
    Busy,

    /// No complete response arrived before the deadline.
    #[error("timeout waiting for board response")]
    Timeout,

    #[error("serial write failed: {0}")]
    WriteFailure(String),

    #[error("serial read failed: {0}")]
    ReadFailure(String),
}

struct PortState {
    stream: SerialStream,
    /// Bytes received beyond the previous response boundary.
    residual: Vec<u8>,
    /// Set after a timeout: the port may still deliver a late response that
    /// must be drained, not treated as the next reply.
    stale: bool,
}

/// One physical serial connection to a board group.
pub struct SerialChannel {
    name: String,
    port: Mutex<Option<PortState>>,
}

impl SerialChannel {
    /// Open a channel on the given device path. A failed open is not fatal:
    /// the channel comes up unavailable and sends resolve per caller policy,
    /// so the kiosk keeps accepting orders with a disconnected board.
    pub fn open(name: &str, path: &str) -> Self {
        let builder = tokio_serial::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None);

        let state = match builder.open_native_async() {
            Ok(stream) => {
                debug!("Opened serial port {path} for channel {name}");
                Some(PortState {
                    stream,
                    residual: Vec::new(),
                    stale: false,
                })
            }
            Err(e) => {
                warn!("Serial port {path} unavailable for channel {name}: {e}");
                None
            }
        };

        Self {
            name: name.to_string(),
            port: Mutex::new(state),
        }
    }

    /// Create a channel with no backing port.
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            port: Mutex::new(None),
        }
    }

    /// Wrap an already-open stream, used to drive the channel over a pty pair.
    #[cfg(test)]
    pub(crate) fn from_stream(name: &str, stream: SerialStream) -> Self {
        Self {
            name: name.to_string(),
            port: Mutex::new(Some(PortState {
                stream,
                residual: Vec::new(),
                stale: false,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the underlying device opened successfully.
    pub fn is_available(&self) -> bool {
        match self.port.try_lock() {
            Ok(guard) => guard.is_some(),
            // A send is in flight, so the port must exist.
            Err(_) => true,
        }
    }

    /// Write a frame and wait for exactly `expected_len` response bytes.
    ///
    /// Rejects with `Busy` if a send is already in flight. The timeout starts
    /// when the write is issued; bytes beyond `expected_len` are kept for the
    /// next call.
    pub async fn send(&self, frame: &[u8], expected_len: usize) -> Result<Vec<u8>, ChannelError> {
        let mut guard = self.port.try_lock().map_err(|_| ChannelError::Busy)?;
        let state = guard.as_mut().ok_or(ChannelError::Unavailable)?;

        if state.stale {
            drain_stale(state).await;
        }

        trace!("{} TX ({} bytes): {:02X?}", self.name, frame.len(), frame);

        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        state
            .stream
            .write_all(frame)
            .await
            .map_err(|e| ChannelError::WriteFailure(e.to_string()))?;

        let mut buf = std::mem::take(&mut state.residual);
        let mut chunk = [0u8; 64];
        while buf.len() < expected_len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                state.stale = true;
                return Err(ChannelError::Timeout);
            }
            match timeout(remaining, state.stream.read(&mut chunk)).await {
                Err(_) => {
                    state.stale = true;
                    return Err(ChannelError::Timeout);
                }
                Ok(Ok(0)) => {
                    return Err(ChannelError::ReadFailure("port closed".to_string()));
                }
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(ChannelError::ReadFailure(e.to_string())),
            }
        }

        state.residual = buf.split_off(expected_len);
        trace!("{} RX ({} bytes): {:02X?}", self.name, buf.len(), buf);
        Ok(buf)
    }
}

/// Discard whatever a timed-out request left on the wire.
async fn drain_stale(state: &mut PortState) {
    state.residual.clear();
    let mut scratch = [0u8; 64];
    while let Ok(Ok(n)) = timeout(Duration::from_millis(20), state.stream.read(&mut scratch)).await
    {
        if n == 0 {
            break;
        }
        trace!("drained {n} stale bytes");
    }
    state.stale = false;
}
