//! Channel gateway webhook handlers
//!
//! The gateway delivers status events here at-least-once. The endpoint
//! always acknowledges events it could process, even when they resolve
//! to no-ops, so the gateway stops redelivering them.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, error, warn};
use wavecast_core::DeliveryEvent;

use crate::handlers::campaigns::ErrorResponse;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Subscription verification query, as sent by the gateway
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// One delivery event in a webhook payload
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub meta_message_id: String,
    pub event_type: String,
    #[allow(dead_code)]
    pub timestamp: Option<i64>,
    pub failure_reason: Option<String>,
}

/// Acknowledgement returned for processed payloads
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: usize,
}

/// Answer the gateway's subscription verification handshake
///
/// GET /webhooks/channel
pub async fn verify_subscription(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, StatusCode> {
    let expected = state
        .webhook_verify_token
        .as_deref()
        .ok_or(StatusCode::FORBIDDEN)?;

    if query.mode == "subscribe" && query.verify_token == expected {
        debug!("Webhook subscription verified");
        Ok(query.challenge)
    } else {
        warn!("Webhook verification failed");
        Err(StatusCode::FORBIDDEN)
    }
}

/// Receive delivery events from the gateway
///
/// POST /webhooks/channel
pub async fn receive_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Some(secret) = &state.app_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok());

        if !verify_signature(secret, &body, signature) {
            warn!("Webhook signature verification failed");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "invalid_signature".to_string(),
                    message: "Payload signature did not verify".to_string(),
                }),
            ));
        }
    }

    let events: Vec<WebhookEvent> = parse_payload(&body).map_err(|message| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_payload".to_string(),
                message,
            }),
        )
    })?;

    let received = events.len();
    for event in events {
        let parsed: DeliveryEvent = event.event_type.parse().map_err(|e: String| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "unknown_event_type".to_string(),
                    message: e,
                }),
            )
        })?;

        if let Err(e) = state
            .tracker
            .apply_event(
                &event.meta_message_id,
                parsed,
                event.failure_reason.as_deref(),
            )
            .await
        {
            error!(
                meta_message_id = %event.meta_message_id,
                error = %e,
                "Failed to apply delivery event"
            );
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: "Failed to apply delivery event".to_string(),
                }),
            ));
        }
    }

    Ok(Json(WebhookAck { received }))
}

/// Payloads carry either one event object or an array of them
fn parse_payload(body: &[u8]) -> Result<Vec<WebhookEvent>, String> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| format!("Malformed JSON: {}", e))?;

    match value {
        serde_json::Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| format!("Malformed event list: {}", e))
        }
        _ => serde_json::from_value::<WebhookEvent>(value)
            .map(|event| vec![event])
            .map_err(|e| format!("Malformed event: {}", e)),
    }
}

/// Check an `X-Hub-Signature-256` header against the payload
fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(header) = header else {
        return false;
    };
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Mac;
    use pretty_assertions::assert_eq;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_signature_verifies() {
        let body = br#"{"meta_message_id":"wamid.X","event_type":"delivered"}"#;
        let header = sign("secret", body);
        assert!(verify_signature("secret", body, Some(&header)));
    }

    #[test]
    fn test_signature_rejects_tampered_body() {
        let body = br#"{"meta_message_id":"wamid.X","event_type":"delivered"}"#;
        let header = sign("secret", body);
        assert!(!verify_signature("secret", b"tampered", Some(&header)));
        assert!(!verify_signature("other-secret", body, Some(&header)));
    }

    #[test]
    fn test_signature_rejects_missing_or_malformed_header() {
        let body = b"{}";
        assert!(!verify_signature("secret", body, None));
        assert!(!verify_signature("secret", body, Some("md5=abc")));
        assert!(!verify_signature("secret", body, Some("sha256=zzzz")));
    }

    #[test]
    fn test_parse_single_event() {
        let body = br#"{"meta_message_id":"wamid.X","event_type":"read","timestamp":1724630400}"#;
        let events = parse_payload(body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].meta_message_id, "wamid.X");
        assert_eq!(events[0].event_type, "read");
    }

    #[test]
    fn test_parse_event_array() {
        let body = br#"[
            {"meta_message_id":"wamid.A","event_type":"delivered"},
            {"meta_message_id":"wamid.B","event_type":"failed","failure_reason":"expired"}
        ]"#;
        let events = parse_payload(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].failure_reason.as_deref(), Some("expired"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_payload(b"not json").is_err());
        assert!(parse_payload(br#"{"event_type":"read"}"#).is_err());
    }
}
