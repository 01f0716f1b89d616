//! POS terminal message types and framing helpers.
//!
//! The terminal speaks UTF-8 JSON over TLS with a single ETX (0x03) byte as
//! the message terminator; there is no length prefix. Request and response
//! types are discriminated by `requestType` / `responseType` strings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Message terminator byte.
pub const ETX: u8 = 0x03;

/// Outbound request discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Init,
    Payment,
    Cancel,
    LastTransaction,
    Settlement,
    ClearKey,
}

impl RequestType {
    /// Protocol timeout for this request type, armed after the write
    /// completes. Payment waits for the cardholder, so it is by far the
    /// longest.
    pub fn default_timeout(self) -> Duration {
        match self {
            Self::Payment => Duration::from_millis(180_000),
            Self::Cancel | Self::Settlement => Duration::from_millis(60_000),
            Self::ClearKey => Duration::from_millis(120_000),
            Self::Init | Self::LastTransaction => Duration::from_millis(30_000),
        }
    }
}

/// Inbound response discriminator. Unrecognized strings decode to
/// `Unknown` rather than failing the whole message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ResponseType {
    StatusResponse,
    PaymentResponse,
    Unknown(String),
}

impl From<String> for ResponseType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "StatusResponse" => Self::StatusResponse,
            "PaymentResponse" => Self::PaymentResponse,
            _ => Self::Unknown(s),
        }
    }
}

impl Serialize for ResponseType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::StatusResponse => serializer.serialize_str("StatusResponse"),
            Self::PaymentResponse => serializer.serialize_str("PaymentResponse"),
            Self::Unknown(name) => serializer.serialize_str(name),
        }
    }
}

/// One request to the terminal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PosRequest {
    pub request_type: RequestType,
    /// Amount in fils (smallest currency unit); Payment only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

impl PosRequest {
    pub fn init() -> Self {
        Self {
            request_type: RequestType::Init,
            amount: None,
            track_id: None,
        }
    }

    pub fn payment(amount: i64, track_id: &str) -> Self {
        Self {
            request_type: RequestType::Payment,
            amount: Some(amount),
            track_id: Some(track_id.to_string()),
        }
    }

    pub fn cancel(track_id: &str) -> Self {
        Self {
            request_type: RequestType::Cancel,
            amount: None,
            track_id: Some(track_id.to_string()),
        }
    }

    pub fn last_transaction(track_id: &str) -> Self {
        Self {
            request_type: RequestType::LastTransaction,
            amount: None,
            track_id: Some(track_id.to_string()),
        }
    }

    pub fn settlement() -> Self {
        Self {
            request_type: RequestType::Settlement,
            amount: None,
            track_id: None,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.request_type.default_timeout()
    }
}

/// Detailed transaction fields the terminal returns. Everything beyond the
/// fields this crate inspects is passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trans_rsp_msg: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One response from the terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosResponse {
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_response: Option<FullResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_details: Option<serde_json::Value>,
}

impl PosResponse {
    /// A payment is approved iff the terminal sent a PaymentResponse whose
    /// authCode is present and not the literal string "null". Every other
    /// shape, including a missing fullResponse, is a decline.
    pub fn is_approved(&self) -> bool {
        self.response_type == ResponseType::PaymentResponse
            && self
                .full_response
                .as_ref()
                .and_then(|f| f.auth_code.as_deref())
                .is_some_and(|code| !code.is_empty() && code != "null")
    }

    /// Decline/info message for the operator, if the terminal sent one.
    pub fn display_message(&self) -> Option<&str> {
        self.full_response
            .as_ref()
            .and_then(|f| f.trans_rsp_msg.as_deref())
            .or(self.message.as_deref())
    }

    /// Cancellation confirmations arrive as an unapproved response whose
    /// message names the cancellation (e.g. "TRANSACTION CANCELLED").
    pub fn is_cancelled(&self) -> bool {
        !self.is_approved()
            && self
                .display_message()
                .is_some_and(|m| m.to_ascii_lowercase().contains("cancel"))
    }
}

/// If `buf` holds at least one complete message, return it as text with all
/// ETX bytes stripped; otherwise the message is still in flight.
pub fn extract_message(buf: &[u8]) -> Option<String> {
    if !buf.contains(&ETX) {
        return None;
    }
    let text: Vec<u8> = buf.iter().copied().filter(|&b| b != ETX).collect();
    Some(String::from_utf8_lossy(&text).into_owned())
}

/// Strip ETX bytes from error payload text.
pub fn strip_etx(text: &str) -> String {
    text.chars().filter(|&c| c != '\u{3}').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_string(&PosRequest::payment(1250, "TRK-9")).unwrap();
        assert_eq!(
            json,
            r#"{"requestType":"Payment","amount":1250,"trackId":"TRK-9"}"#
        );

        let json = serde_json::to_string(&PosRequest::init()).unwrap();
        assert_eq!(json, r#"{"requestType":"Init"}"#);
    }

    #[test]
    fn test_default_timeouts() {
        assert_eq!(
            RequestType::Payment.default_timeout(),
            Duration::from_millis(180_000)
        );
        assert_eq!(
            RequestType::Cancel.default_timeout(),
            Duration::from_millis(60_000)
        );
        assert_eq!(
            RequestType::Settlement.default_timeout(),
            Duration::from_millis(60_000)
        );
        assert_eq!(
            RequestType::ClearKey.default_timeout(),
            Duration::from_millis(120_000)
        );
        assert!(RequestType::Init.default_timeout() < RequestType::Cancel.default_timeout());
    }

    #[test]
    fn test_approved_payment() {
        let response: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"A1B2","transRspMsg":"APPROVED"}}"#,
        )
        .unwrap();
        assert!(response.is_approved());
        assert_eq!(response.display_message(), Some("APPROVED"));
    }

    #[test]
    fn test_literal_null_auth_code_is_declined() {
        let response: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"null"}}"#,
        )
        .unwrap();
        assert!(!response.is_approved());
    }

    #[test]
    fn test_json_null_auth_code_is_declined() {
        let response: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":null,"transRspMsg":"DECLINED"}}"#,
        )
        .unwrap();
        assert!(!response.is_approved());
        assert_eq!(response.display_message(), Some("DECLINED"));
    }

    #[test]
    fn test_cancellation_message_is_recognized() {
        let response: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"null","transRspMsg":"TRANSACTION CANCELLED"}}"#,
        )
        .unwrap();
        assert!(response.is_cancelled());

        let declined: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"null","transRspMsg":"DO NOT HONOUR"}}"#,
        )
        .unwrap();
        assert!(!declined.is_cancelled());
    }

    #[test]
    fn test_missing_full_response_is_declined() {
        let response: PosResponse =
            serde_json::from_str(r#"{"responseType":"PaymentResponse"}"#).unwrap();
        assert!(!response.is_approved());
    }

    #[test]
    fn test_status_response_is_not_approved() {
        let response: PosResponse = serde_json::from_str(
            r#"{"responseType":"StatusResponse","message":"Ready","fullResponse":{"authCode":"A1"}}"#,
        )
        .unwrap();
        assert!(!response.is_approved());
    }

    #[test]
    fn test_unknown_response_type_decodes() {
        let response: PosResponse =
            serde_json::from_str(r#"{"responseType":"FutureResponse"}"#).unwrap();
        assert_eq!(
            response.response_type,
            ResponseType::Unknown("FutureResponse".to_string())
        );
    }

    #[test]
    fn test_extra_full_response_fields_pass_through() {
        let response: PosResponse = serde_json::from_str(
            r#"{"responseType":"PaymentResponse","fullResponse":{"authCode":"OK","rrn":"0012","cardScheme":"VISA"}}"#,
        )
        .unwrap();
        let full = response.full_response.unwrap();
        assert_eq!(full.extra.get("rrn").and_then(|v| v.as_str()), Some("0012"));
        assert_eq!(
            full.extra.get("cardScheme").and_then(|v| v.as_str()),
            Some("VISA")
        );
    }

    #[test]
    fn test_extract_message_waits_for_etx() {
        let mut buf = b"{\"responseType\":".to_vec();
        assert!(extract_message(&buf).is_none());

        buf.extend_from_slice(b"\"StatusResponse\"}");
        assert!(extract_message(&buf).is_none());

        buf.push(ETX);
        assert_eq!(
            extract_message(&buf).unwrap(),
            r#"{"responseType":"StatusResponse"}"#
        );
    }

    #[test]
    fn test_extract_message_strips_every_etx() {
        let buf = [0x03, b'{', b'}', 0x03, 0x03];
        assert_eq!(extract_message(&buf).unwrap(), "{}");
    }

    #[test]
    fn test_strip_etx() {
        assert_eq!(strip_etx("ab\u{3}cd\u{3}"), "abcd");
    }
}
