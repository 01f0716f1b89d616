//! TLS client for the payment terminal.
//!
//! Each request opens a fresh connection to the terminal, writes one framed
//! request and waits for one framed response. While a request is being
//! awaited, its write half is parked in `active` so a Cancel can be pushed
//! onto the same connection; the terminal then resolves the original request
//! with the cancellation result.

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use crate::config::PosConfig;
use crate::pos::messages::{self, PosRequest, PosResponse};

const READ_CHUNK: usize = 4096;

#[derive(Error, Debug)]
pub enum PosError {
    #[error("terminal certificate error: {0}")]
    Certificate(String),
    #[error("failed to connect to terminal at {addr}: {detail}")]
    Connect { addr: String, detail: String },
    #[error("terminal transport error: {0}")]
    Transport(String),
    #[error("terminal did not respond within {0:?}")]
    Timeout(Duration),
    #[error("terminal closed the connection mid-response: {partial}")]
    ConnectionClosed { partial: String },
    #[error("terminal sent a malformed response: {body}")]
    Malformed { body: String },
}

impl PosError {
    /// Raw terminal text embedded in this error, if any. Lets callers
    /// salvage a response the terminal sent alongside a transport failure.
    pub fn partial_body(&self) -> Option<&str> {
        match self {
            Self::ConnectionClosed { partial } => Some(partial),
            Self::Malformed { body } => Some(body),
            _ => None,
        }
    }
}

type ActiveWriter = Arc<Mutex<Option<WriteHalf<TlsStream<TcpStream>>>>>;

/// Clears the parked writer when the owning request is dropped before its
/// response arrives (e.g. the HTTP caller disconnected mid-payment), so a
/// later Cancel does not write onto a dead socket and report success.
struct ActiveGuard<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Drop for ActiveGuard<T> {
    fn drop(&mut self) {
        // Contention here means another request or cancel holds the lock
        // right now; leave the slot to that owner.
        if let Ok(mut slot) = self.slot.try_lock() {
            slot.take();
        }
    }
}

pub struct PosClient {
    host: String,
    port: u16,
    connector: TlsConnector,
    server_name: ServerName<'static>,
    active: ActiveWriter,
}

impl PosClient {
    /// Build a client trusting only the CA certificate named in the config.
    pub fn new(cfg: &PosConfig) -> Result<Self, PosError> {
        let pem = std::fs::read(&cfg.ca_certificate).map_err(|e| {
            PosError::Certificate(format!("cannot read {}: {e}", cfg.ca_certificate))
        })?;
        let mut roots = RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut BufReader::new(pem.as_slice())) {
            let cert = cert.map_err(|e| PosError::Certificate(e.to_string()))?;
            roots
                .add(cert)
                .map_err(|e| PosError::Certificate(e.to_string()))?;
        }
        if roots.is_empty() {
            return Err(PosError::Certificate(format!(
                "no certificates found in {}",
                cfg.ca_certificate
            )));
        }

        let tls = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(cfg.host.clone())
            .map_err(|e| PosError::Certificate(format!("bad terminal host name: {e}")))?;

        Ok(Self {
            host: cfg.host.clone(),
            port: cfg.port,
            connector: TlsConnector::from(Arc::new(tls)),
            server_name,
            active: Arc::new(Mutex::new(None)),
        })
    }

    /// Send one request and wait for its response, using the request type's
    /// protocol timeout.
    pub async fn request(&self, req: &PosRequest) -> Result<PosResponse, PosError> {
        self.request_with_timeout(req, req.default_timeout()).await
    }

    pub async fn request_with_timeout(
        &self,
        req: &PosRequest,
        wait: Duration,
    ) -> Result<PosResponse, PosError> {
        let stream = self.connect().await?;
        let (reader, mut writer) = tokio::io::split(stream);

        let mut payload = serde_json::to_vec(req).map_err(|e| PosError::Transport(e.to_string()))?;
        payload.push(messages::ETX);
        writer
            .write_all(&payload)
            .await
            .map_err(|e| PosError::Transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| PosError::Transport(e.to_string()))?;
        debug!(request = ?req.request_type, "sent terminal request");

        // Park the writer so a Cancel can ride this connection. The guard
        // drops it again if this future is cancelled before the response.
        *self.active.lock().await = Some(writer);
        let _park = ActiveGuard {
            slot: Arc::clone(&self.active),
        };

        // Timeout armed after the write; the cardholder interaction happens
        // during this window.
        let result = self.read_response(reader, Instant::now() + wait, wait).await;
        self.close_active().await;
        result
    }

    /// Push a Cancel onto the connection of an in-flight request. Returns
    /// false when no request is outstanding, in which case the caller should
    /// issue a standalone Cancel instead.
    pub async fn cancel_in_flight(&self, track_id: &str) -> Result<bool, PosError> {
        let mut slot = self.active.lock().await;
        let Some(writer) = slot.as_mut() else {
            return Ok(false);
        };
        let mut payload = serde_json::to_vec(&PosRequest::cancel(track_id))
            .map_err(|e| PosError::Transport(e.to_string()))?;
        payload.push(messages::ETX);
        writer
            .write_all(&payload)
            .await
            .map_err(|e| PosError::Transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| PosError::Transport(e.to_string()))?;
        debug!(track_id, "cancel written onto active terminal connection");
        Ok(true)
    }

    async fn connect(&self) -> Result<TlsStream<TcpStream>, PosError> {
        let addr = format!("{}:{}", self.host, self.port);
        let tcp = TcpStream::connect(&addr).await.map_err(|e| PosError::Connect {
            addr: addr.clone(),
            detail: e.to_string(),
        })?;
        self.connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| PosError::Connect {
                addr,
                detail: e.to_string(),
            })
    }

    async fn read_response(
        &self,
        mut reader: ReadHalf<TlsStream<TcpStream>>,
        deadline: Instant,
        wait: Duration,
    ) -> Result<PosResponse, PosError> {
        let mut buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = match timeout_at(deadline, reader.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(PosError::Transport(e.to_string())),
                Err(_) => return Err(PosError::Timeout(wait)),
            };
            if n == 0 {
                return Err(PosError::ConnectionClosed {
                    partial: messages::strip_etx(&String::from_utf8_lossy(&buf)),
                });
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(text) = messages::extract_message(&buf) {
                debug!(len = text.len(), "terminal response complete");
                return serde_json::from_str(&text)
                    .map_err(|_| PosError::Malformed { body: text });
            }
        }
    }

    async fn close_active(&self) {
        if let Some(mut writer) = self.active.lock().await.take()
            && let Err(e) = writer.shutdown().await
        {
            warn!(error = %e, "terminal connection shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_clears_parked_writer_on_drop() {
        let slot: Arc<Mutex<Option<u8>>> = Arc::new(Mutex::new(Some(7)));
        let guard = ActiveGuard {
            slot: Arc::clone(&slot),
        };
        drop(guard);
        assert!(slot.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_guard_leaves_slot_to_a_concurrent_holder() {
        let slot: Arc<Mutex<Option<u8>>> = Arc::new(Mutex::new(Some(7)));
        let held = slot.lock().await;
        drop(ActiveGuard {
            slot: Arc::clone(&slot),
        });
        assert_eq!(*held, Some(7));
    }
}
