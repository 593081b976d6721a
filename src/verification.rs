use crate::error::WebhookError;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ID: &str = "webhook-id";
pub const HEADER_TIMESTAMP: &str = "webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "webhook-signature";

/// One inbound Standard Webhooks delivery, exactly as received.
#[derive(Debug, Clone)]
pub struct WebhookDelivery<'a> {
    pub id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature_header: Option<&'a str>,
    /// Signed verbatim. Never re-serialize the parsed body.
    pub raw_body: &'a [u8],
    pub secret: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    pub validate_timestamp: bool,
    pub tolerance_seconds: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            validate_timestamp: true,
            tolerance_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Valid,
    InvalidSignature,
    MissingHeaders,
    /// `difference` is `None` when the timestamp is not an integer.
    TimestampOutOfTolerance {
        difference: Option<u64>,
        tolerance: u64,
    },
    MalformedBody(String),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid)
    }

    pub fn into_result(self) -> Result<(), WebhookError> {
        match self {
            VerificationResult::Valid => Ok(()),
            VerificationResult::InvalidSignature => Err(WebhookError::InvalidSignature),
            VerificationResult::MissingHeaders => Err(WebhookError::MissingHeaders),
            VerificationResult::TimestampOutOfTolerance {
                difference: Some(difference),
                tolerance,
            } => Err(WebhookError::TimestampOutOfTolerance {
                difference,
                tolerance,
            }),
            VerificationResult::TimestampOutOfTolerance {
                difference: None,
                tolerance,
            } => Err(WebhookError::InvalidTimestamp { tolerance }),
            VerificationResult::MalformedBody(reason) => Err(WebhookError::MalformedBody(reason)),
        }
    }
}

/// Parse the body as a JSON object. Only the filter and the emitted event
/// need the parsed form; the signature is computed over the raw bytes.
pub fn parse_body(raw_body: &[u8]) -> Result<Map<String, Value>, String> {
    match serde_json::from_slice::<Value>(raw_body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Verify a Standard Webhooks delivery against an explicit clock.
pub fn verify_at(
    delivery: &WebhookDelivery<'_>,
    options: VerifyOptions,
    now_seconds: i64,
) -> VerificationResult {
    if let Err(reason) = parse_body(delivery.raw_body) {
        return VerificationResult::MalformedBody(reason);
    }

    let (msg_id, timestamp, signature_header) = match (
        non_empty(delivery.id),
        non_empty(delivery.timestamp),
        non_empty(delivery.signature_header),
    ) {
        (Some(i), Some(t), Some(s)) => (i, t, s),
        _ => return VerificationResult::MissingHeaders,
    };

    if options.validate_timestamp {
        if let Some(rejected) = check_timestamp(timestamp, options.tolerance_seconds, now_seconds) {
            return rejected;
        }
    }

    let expected = match expected_signature(delivery.secret, msg_id, timestamp, delivery.raw_body) {
        Some(sig) => sig,
        None => return VerificationResult::InvalidSignature,
    };

    if signature_matches(signature_header, &expected) {
        VerificationResult::Valid
    } else {
        VerificationResult::InvalidSignature
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn check_timestamp(timestamp: &str, tolerance: u64, now_seconds: i64) -> Option<VerificationResult> {
    let sent = match timestamp.trim().parse::<i64>() {
        Ok(t) => t,
        Err(_) => {
            return Some(VerificationResult::TimestampOutOfTolerance {
                difference: None,
                tolerance,
            })
        }
    };
    let difference = now_seconds.abs_diff(sent);
    // Boundary is inclusive: a difference equal to the tolerance passes.
    if difference > tolerance {
        Some(VerificationResult::TimestampOutOfTolerance {
            difference: Some(difference),
            tolerance,
        })
    } else {
        None
    }
}

/// Polar expects the signing secret to be base64. Plain-text secrets are
/// encoded and then decoded back into key bytes; keep both steps.
pub fn derive_key(secret: &str) -> Option<Vec<u8>> {
    let engine = base64::engine::general_purpose::STANDARD;
    let encoded = engine.encode(secret.as_bytes());
    engine.decode(encoded).ok()
}

/// `base64(HMAC-SHA256(key, "<id>.<timestamp>.<body>"))`.
pub fn expected_signature(secret: &str, msg_id: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let key = derive_key(secret)?;
    let mut mac = HmacSha256::new_from_slice(&key).ok()?;
    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Some(base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Header holds space-separated `version,signature` tokens; any `v1` match wins.
fn signature_matches(signature_header: &str, expected: &str) -> bool {
    signature_header
        .split(' ')
        .filter_map(|token| token.split_once(','))
        .any(|(version, signature)| {
            version == "v1" && bool::from(signature.as_bytes().ct_eq(expected.as_bytes()))
        })
}
