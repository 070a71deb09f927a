//! Signed pagination cursors.
//!
//! A cursor carries the complete resume state of a paginated query, so the
//! server keeps nothing between pages. The token is not encrypted: anyone
//! holding it can read the payload, but only the holder of the signing
//! secret can produce a payload that verifies.
//!
//! # Wire format
//!
//! ```text
//! base64url(json) "." base64url(hmac_sha256(secret, json))
//! ```
//!
//! Both segments are unpadded URL-safe base64, so the token can be used
//! verbatim as a query-string value. The MAC covers the raw JSON bytes, not
//! the encoded segment. The JSON payload is
//! `{"v":1,"st":..,"et":..,"mm":..,"ps":..,"buckets":[..],"idx":..,"lek":{..}}`
//! with `lek` omitted when there is no store continuation key.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::types::{EpochMillis, QueryRequest};

type HmacSha256 = Hmac<Sha256>;

/// The only payload version this codec reads or writes.
pub const CURSOR_VERSION: u64 = 1;

const SEGMENT_SEPARATOR: char = '.';

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a presented cursor is rejected. All of them are client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// The token is not two non-empty base64url segments carrying a
    /// well-formed payload.
    #[error("malformed cursor: {0}")]
    Malformed(String),
    /// The signature does not match the payload under the current secret.
    #[error("cursor signature does not verify")]
    InvalidSignature,
    /// The payload was written by an incompatible codec version.
    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u64),
    /// The cursor was issued for different query parameters.
    #[error("cursor does not match request parameter `{field}`")]
    ParameterMismatch {
        /// Wire name of the first parameter that differs.
        field: &'static str,
    },
}

impl CursorError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_cursor",
            Self::InvalidSignature => "invalid_signature",
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::ParameterMismatch { .. } => "parameter_mismatch",
        }
    }
}

// ---------------------------------------------------------------------------
// Resume state
// ---------------------------------------------------------------------------

/// Store-defined marker for where a partition scan stopped.
///
/// The codec carries it through the token without looking inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationKey(pub serde_json::Map<String, serde_json::Value>);

impl ContinuationKey {
    /// Reads a field of the marker.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ContinuationKey {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Decoded cursor payload: the bound query parameters plus scan position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Payload version, always [`CURSOR_VERSION`] when produced here.
    #[serde(rename = "v")]
    pub version: u64,
    /// Bound window start.
    #[serde(rename = "st")]
    pub start_time: EpochMillis,
    /// Bound window end.
    #[serde(rename = "et")]
    pub end_time: EpochMillis,
    /// Bound magnitude floor.
    #[serde(rename = "mm")]
    pub min_magnitude: f64,
    /// Bound page size.
    #[serde(rename = "ps")]
    pub page_size: u32,
    /// Day buckets of the query window, in scan order.
    pub buckets: Vec<String>,
    /// Position in `buckets` where the next page resumes.
    #[serde(rename = "idx")]
    pub bucket_index: usize,
    /// Where the scan of `buckets[bucket_index]` stopped, if mid-partition.
    #[serde(rename = "lek", skip_serializing_if = "Option::is_none", default)]
    pub continuation: Option<ContinuationKey>,
}

impl ResumeState {
    /// Builds resume state bound to `request`'s parameters.
    #[must_use]
    pub fn for_request(
        request: &QueryRequest,
        buckets: Vec<String>,
        bucket_index: usize,
        continuation: Option<ContinuationKey>,
    ) -> Self {
        Self {
            version: CURSOR_VERSION,
            start_time: request.start_time,
            end_time: request.end_time,
            min_magnitude: request.min_magnitude,
            page_size: request.page_size,
            buckets,
            bucket_index,
            continuation,
        }
    }

    /// Bucket the next page starts from.
    #[must_use]
    pub fn current_bucket(&self) -> Option<&str> {
        self.buckets.get(self.bucket_index).map(String::as_str)
    }

    /// Checks that this cursor was issued for exactly these parameters.
    ///
    /// The magnitude is compared exactly; it only ever round-trips through
    /// the same `f64` representation.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::ParameterMismatch`] naming the first differing
    /// parameter.
    #[allow(clippy::float_cmp)]
    pub fn verify_binding(
        &self,
        start_time: EpochMillis,
        end_time: EpochMillis,
        min_magnitude: f64,
        page_size: u32,
    ) -> Result<(), CursorError> {
        let field = if self.start_time != start_time {
            "startTime"
        } else if self.end_time != end_time {
            "endTime"
        } else if self.min_magnitude != min_magnitude {
            "minMagnitude"
        } else if self.page_size != page_size {
            "pageSize"
        } else {
            return Ok(());
        };
        Err(CursorError::ParameterMismatch { field })
    }

    fn check_position(&self) -> Result<(), CursorError> {
        if self.bucket_index < self.buckets.len() {
            Ok(())
        } else {
            Err(CursorError::Malformed(format!(
                "bucket index {} out of range for {} buckets",
                self.bucket_index,
                self.buckets.len()
            )))
        }
    }
}

/// Only the version field, read before committing to the full payload shape.
#[derive(Deserialize)]
struct VersionHeader {
    v: u64,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// HMAC key used to sign cursors. `Debug` output never shows the bytes.
#[derive(Clone)]
pub struct CursorSecret(Vec<u8>);

impl CursorSecret {
    /// Wraps raw key bytes; any length is accepted.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Whether the key has no bytes. Startup rejects an empty secret.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CursorSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CursorSecret(<redacted>)")
    }
}

/// Signs and verifies cursor tokens with a process-wide secret.
///
/// Stateless apart from the secret, so one instance is shared by all
/// requests behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CursorCodec {
    secret: CursorSecret,
}

impl CursorCodec {
    /// Creates a codec that signs and verifies with `secret`.
    #[must_use]
    pub fn new(secret: CursorSecret) -> Self {
        Self { secret }
    }

    fn mac(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret.0)
            .expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Serializes and signs `state`.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Malformed`] if the state cannot be serialized
    /// (a non-finite magnitude, for instance).
    pub fn encode(&self, state: &ResumeState) -> Result<String, CursorError> {
        let json = serde_json::to_vec(state)
            .map_err(|e| CursorError::Malformed(format!("cannot serialize state: {e}")))?;
        let signature = self.mac(&json);

        let mut token = URL_SAFE_NO_PAD.encode(&json);
        token.push(SEGMENT_SEPARATOR);
        token.push_str(&URL_SAFE_NO_PAD.encode(signature));
        Ok(token)
    }

    /// Verifies and parses a token produced by [`CursorCodec::encode`].
    ///
    /// The signature is checked before the payload is parsed, so a forged
    /// payload is never interpreted.
    ///
    /// # Errors
    ///
    /// - [`CursorError::Malformed`] if the token shape, encoding, or JSON is
    ///   invalid, or the bucket index is out of range
    /// - [`CursorError::InvalidSignature`] if the MAC does not verify
    /// - [`CursorError::UnsupportedVersion`] if `v` is not [`CURSOR_VERSION`]
    pub fn decode(&self, token: &str) -> Result<ResumeState, CursorError> {
        let mut segments = token.split(SEGMENT_SEPARATOR);
        let (Some(payload_b64), Some(signature_b64), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(CursorError::Malformed(
                "expected exactly two segments".to_string(),
            ));
        };
        if payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(CursorError::Malformed("empty segment".to_string()));
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| CursorError::Malformed(format!("payload is not base64url: {e}")))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| CursorError::Malformed(format!("signature is not base64url: {e}")))?;

        let expected = self.mac(&json);
        if !bool::from(expected.ct_eq(&signature)) {
            tracing::debug!("rejecting cursor with invalid signature");
            return Err(CursorError::InvalidSignature);
        }

        let header: VersionHeader = serde_json::from_slice(&json)
            .map_err(|e| CursorError::Malformed(format!("missing version: {e}")))?;
        if header.v != CURSOR_VERSION {
            return Err(CursorError::UnsupportedVersion(header.v));
        }

        let state: ResumeState = serde_json::from_slice(&json)
            .map_err(|e| CursorError::Malformed(format!("invalid payload: {e}")))?;
        state.check_position()?;
        Ok(state)
    }
}
