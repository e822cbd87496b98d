//! Wallet-signed request authentication.
//!
//! Every protected endpoint carries `Authorization: Solana <b64url(JSON)>`,
//! where the JSON envelope holds the caller address, a canonicalizable message
//! `{v, uri, issuedAt}`, and an Ed25519 signature over the canonical bytes.
//! Verifying the header proves control of the wallet without any on-chain
//! interaction.
//!
//! Canonical form (byte-exact, LF-joined, no trailing newline):
//!
//! ```text
//! solana-auth-v1
//! version: {v}
//! uri: {uri}
//! issued-at: {issuedAt}
//! ```
//!
//! `issuedAt` is normalized to UTC at second precision with a `Z` suffix, so
//! signer and verifier agree on the signed bytes regardless of how the client
//! formatted its timestamp.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_keypair::Keypair;
use solana_signature::Signature;
use solana_signer::Signer;

use crate::types::SolanaAddress;
use crate::util::Base64UrlBytes;

pub const CANON_PREFIX: &str = "solana-auth-v1";
pub const AUTH_SCHEME: &str = "Solana ";
pub const AUTH_VERSION: u32 = 1;

/// Default freshness window: messages older than `ttl + skew` are rejected.
pub const DEFAULT_MAX_TTL_SECONDS: i64 = 300;
/// Tolerated wall-clock skew between client and server.
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 120;

/// The signed message carried inside the authorization envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthMessage {
    #[serde(rename = "v")]
    pub version: u32,
    pub uri: String,
    #[serde(rename = "issuedAt", with = "iso_utc")]
    pub issued_at: DateTime<Utc>,
}

impl AuthMessage {
    pub fn new(uri: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            version: AUTH_VERSION,
            uri: uri.into(),
            issued_at,
        }
    }

    /// The byte-exact canonical form signed by the wallet.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let lines = [
            CANON_PREFIX.to_string(),
            format!("version: {}", self.version),
            format!("uri: {}", self.uri),
            format!("issued-at: {}", iso_utc::format(&self.issued_at)),
        ];
        lines.join("\n").into_bytes()
    }
}

/// ISO-8601 timestamp serde at second precision with a `Z` suffix.
///
/// Deserialization tolerates explicit offsets and naive timestamps (treated
/// as UTC), matching what wallet tooling in the wild produces.
mod iso_utc {
    use super::*;

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.trunc_subsecs(0).format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// The wire envelope: `base64url(JSON({address, msg, sig}))` after the scheme
/// prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePayload {
    pub address: String,
    pub msg: AuthMessage,
    pub sig: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unsupported scheme")]
    UnsupportedScheme,
    #[error("bad auth payload: {0}")]
    BadPayload(String),
    #[error("URI mismatch")]
    UriMismatch,
    #[error("issued-at is in the future")]
    IssuedInFuture,
    #[error("message expired")]
    Expired,
    #[error("invalid address")]
    InvalidAddress,
    #[error("signature verification failed")]
    SignatureInvalid,
}

/// Freshness bounds enforced on the signed `issuedAt`.
#[derive(Debug, Clone, Copy)]
pub struct AuthWindow {
    pub max_ttl_seconds: i64,
    pub clock_skew_seconds: i64,
}

impl Default for AuthWindow {
    fn default() -> Self {
        Self {
            max_ttl_seconds: DEFAULT_MAX_TTL_SECONDS,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
        }
    }
}

/// Verifies a `Solana` authorization header against the request URI.
///
/// Returns the caller's wallet address if the header decodes, the URI matches,
/// the freshness window holds, and the Ed25519 signature over the canonical
/// bytes checks out under the public key encoded by `address`.
pub fn verify_authorization_header(
    header_value: &str,
    request_uri: &str,
    window: AuthWindow,
) -> Result<SolanaAddress, AuthError> {
    verify_authorization_header_at(header_value, request_uri, window, Utc::now())
}

/// [`verify_authorization_header`] with an explicit clock, for deterministic
/// freshness checks.
pub fn verify_authorization_header_at(
    header_value: &str,
    request_uri: &str,
    window: AuthWindow,
    now: DateTime<Utc>,
) -> Result<SolanaAddress, AuthError> {
    let encoded = header_value
        .strip_prefix(AUTH_SCHEME)
        .ok_or(AuthError::UnsupportedScheme)?;

    let raw = Base64UrlBytes::decode(encoded)
        .map_err(|e| AuthError::BadPayload(e.to_string()))?;
    let wire: WirePayload =
        serde_json::from_slice(&raw).map_err(|e| AuthError::BadPayload(e.to_string()))?;

    if wire.msg.uri != request_uri {
        return Err(AuthError::UriMismatch);
    }

    let age = now.signed_duration_since(wire.msg.issued_at);
    if -age.num_seconds() > window.clock_skew_seconds {
        return Err(AuthError::IssuedInFuture);
    }
    if age.num_seconds() > window.max_ttl_seconds + window.clock_skew_seconds {
        return Err(AuthError::Expired);
    }

    let address: SolanaAddress = wire.address.parse().map_err(|_| AuthError::InvalidAddress)?;

    let sig_bytes =
        Base64UrlBytes::decode(&wire.sig).map_err(|_| AuthError::SignatureInvalid)?;
    let sig_array: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| AuthError::SignatureInvalid)?;
    let signature = Signature::from(sig_array);

    let canonical = wire.msg.canonical_bytes();
    if !signature.verify(address.as_bytes(), &canonical) {
        return Err(AuthError::SignatureInvalid);
    }

    Ok(address)
}

/// Builds a `Solana` authorization header value for the given URI, signed by
/// the keypair. Used by the SDK and by tests; the server only verifies.
pub fn build_authorization_header(
    keypair: &Keypair,
    uri: &str,
    issued_at: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    let msg = AuthMessage::new(uri, issued_at);
    let signature = keypair.sign_message(&msg.canonical_bytes());
    let wire = WirePayload {
        address: keypair.pubkey().to_string(),
        msg,
        sig: Base64UrlBytes::encode(signature),
    };
    let json = serde_json::to_vec(&wire)?;
    Ok(format!("{AUTH_SCHEME}{}", Base64UrlBytes::encode(json)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const URI: &str = "http://localhost:8000/docs/search";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn header_at(keypair: &Keypair, issued_at: DateTime<Utc>) -> String {
        build_authorization_header(keypair, URI, issued_at).unwrap()
    }

    #[test]
    fn canonical_bytes_are_exact() {
        let issued = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let msg = AuthMessage::new("https://example.com/x", issued);
        assert_eq!(
            msg.canonical_bytes(),
            b"solana-auth-v1\nversion: 1\nuri: https://example.com/x\nissued-at: 2025-06-01T12:00:00Z"
        );
    }

    #[test]
    fn sign_then_verify_round_trip() {
        let keypair = Keypair::new();
        let header = header_at(&keypair, now());
        let address =
            verify_authorization_header_at(&header, URI, AuthWindow::default(), now()).unwrap();
        assert_eq!(address.to_string(), keypair.pubkey().to_string());
    }

    #[test]
    fn subsecond_timestamps_normalize() {
        let keypair = Keypair::new();
        let issued = now() + Duration::milliseconds(437);
        let header = header_at(&keypair, issued);
        assert!(verify_authorization_header_at(&header, URI, AuthWindow::default(), now()).is_ok());
    }

    #[test]
    fn rejects_wrong_scheme() {
        let err = verify_authorization_header_at("Bearer abc", URI, AuthWindow::default(), now())
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedScheme));
    }

    #[test]
    fn rejects_garbage_payload() {
        let err = verify_authorization_header_at(
            "Solana not-base64!!!",
            URI,
            AuthWindow::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::BadPayload(_)));
    }

    #[test]
    fn rejects_uri_mismatch() {
        let keypair = Keypair::new();
        let header = header_at(&keypair, now());
        let err = verify_authorization_header_at(
            &header,
            "http://localhost:8000/docs/chunks",
            AuthWindow::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::UriMismatch));
    }

    #[test]
    fn rejects_tampered_message() {
        let keypair = Keypair::new();
        let header = header_at(&keypair, now());
        let encoded = header.strip_prefix(AUTH_SCHEME).unwrap();
        let mut wire: WirePayload =
            serde_json::from_slice(&Base64UrlBytes::decode(encoded).unwrap()).unwrap();
        wire.msg.uri = "http://localhost:8000/docs/chunks".to_string();
        let tampered = format!(
            "{AUTH_SCHEME}{}",
            Base64UrlBytes::encode(serde_json::to_vec(&wire).unwrap())
        );
        // The URI now matches the request, so the forged message reaches the
        // signature check and dies there.
        let err = verify_authorization_header_at(
            &tampered,
            "http://localhost:8000/docs/chunks",
            AuthWindow::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::SignatureInvalid));
    }

    #[test]
    fn rejects_stale_message() {
        let keypair = Keypair::new();
        let header = header_at(&keypair, now() - Duration::minutes(10));
        let err =
            verify_authorization_header_at(&header, URI, AuthWindow::default(), now()).unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[test]
    fn rejects_future_message_beyond_skew() {
        let keypair = Keypair::new();
        let header = header_at(&keypair, now() + Duration::minutes(3));
        let err =
            verify_authorization_header_at(&header, URI, AuthWindow::default(), now()).unwrap_err();
        assert!(matches!(err, AuthError::IssuedInFuture));
    }

    #[test]
    fn accepts_message_within_skew() {
        let keypair = Keypair::new();
        let header = header_at(&keypair, now() + Duration::seconds(60));
        assert!(verify_authorization_header_at(&header, URI, AuthWindow::default(), now()).is_ok());
    }

    #[test]
    fn rejects_wrong_signer() {
        let signer = Keypair::new();
        let impostor = Keypair::new();
        let msg = AuthMessage::new(URI, now());
        let signature = signer.sign_message(&msg.canonical_bytes());
        let wire = WirePayload {
            // Claim the impostor's address over the real signer's signature.
            address: impostor.pubkey().to_string(),
            msg,
            sig: Base64UrlBytes::encode(signature),
        };
        let header = format!(
            "{AUTH_SCHEME}{}",
            Base64UrlBytes::encode(serde_json::to_vec(&wire).unwrap())
        );
        let err =
            verify_authorization_header_at(&header, URI, AuthWindow::default(), now()).unwrap_err();
        assert!(matches!(err, AuthError::SignatureInvalid));
    }
}
