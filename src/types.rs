//! Type definitions for the x402 protocol as used by this gateway.
//!
//! This mirrors the structures and validation logic of the official x402 SDKs
//! for the Solana `exact` scheme. The key objects are [`PaymentRequirements`],
//! [`PaymentPayload`], [`PaymentRequiredResponse`], and the facilitator
//! verify/settle request-response pairs, which encode payment intent,
//! authorization, and the result of verification and settlement.
//!
//! Wire format notes: all objects use camelCase field names, token amounts are
//! string-encoded decimal integers to avoid JSON precision loss, and addresses
//! are base58-encoded Ed25519 public keys.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_pubkey::Pubkey;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use url::Url;

use crate::util::Base64Bytes;

/// Represents the protocol version. Currently only version 1 is supported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum X402Version {
    V1,
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported x402Version: {0}")]
pub struct X402VersionError(pub u8);

impl TryFrom<u8> for X402Version {
    type Error = X402VersionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(X402Version::V1),
            _ => Err(X402VersionError(value)),
        }
    }
}

impl From<X402Version> for u8 {
    fn from(value: X402Version) -> Self {
        match value {
            X402Version::V1 => 1,
        }
    }
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        X402Version::try_from(num).map_err(Error::custom)
    }
}

/// Enumerates payment schemes. Only "exact" is supported in this implementation,
/// meaning the amount to be transferred must match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
        }
    }
}

/// Solana networks accepted for payment.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolanaNetwork {
    /// Solana mainnet-beta.
    #[serde(rename = "solana")]
    Solana,
    /// Solana devnet.
    #[serde(rename = "solana-devnet")]
    SolanaDevnet,
}

impl Display for SolanaNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolanaNetwork::Solana => write!(f, "solana"),
            SolanaNetwork::SolanaDevnet => write!(f, "solana-devnet"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown Solana network: {0}")]
pub struct SolanaNetworkParseError(pub String);

impl FromStr for SolanaNetwork {
    type Err = SolanaNetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solana" => Ok(SolanaNetwork::Solana),
            "solana-devnet" => Ok(SolanaNetwork::SolanaDevnet),
            other => Err(SolanaNetworkParseError(other.to_string())),
        }
    }
}

/// A Solana account address, serialized as a base58 string.
///
/// Wraps [`Pubkey`] so the raw 32-byte Ed25519 verifying key is available to
/// both signature checks and ATA derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolanaAddress(pub Pubkey);

impl SolanaAddress {
    pub fn pubkey(&self) -> &Pubkey {
        &self.0
    }

    /// The raw 32-byte Ed25519 public key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_array()
    }
}

impl From<Pubkey> for SolanaAddress {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }
}

impl From<SolanaAddress> for Pubkey {
    fn from(address: SolanaAddress) -> Self {
        address.0
    }
}

impl FromStr for SolanaAddress {
    type Err = solana_pubkey::ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Pubkey::from_str(s)?))
    }
}

impl Display for SolanaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SolanaAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for SolanaAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(Error::custom)
    }
}

/// A token amount in asset base units.
///
/// Parsed from a decimal string to prevent accidental loss of precision in
/// JSON serialization: `6000` becomes `"6000"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TokenAmount(pub u64);

impl TokenAmount {
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)
            .and_then(|string| string.parse::<u64>().map_err(Error::custom))
            .map(TokenAmount)
    }
}

/// Scheme-specific extras attached to [`PaymentRequirements`].
///
/// For gasless Solana payments this carries the facilitator wallet that pays
/// chain fees, so the client can set it as the transaction fee payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentExtra {
    pub fee_payer: SolanaAddress,
}

/// Requirements set by the seller for an acceptable payment.
///
/// Echoed verbatim in every 402 challenge and replayed by the verifier, so the
/// fields here must reconstruct byte-identically across the challenge-verify
/// round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: SolanaNetwork,
    pub max_amount_required: TokenAmount,
    pub resource: Url,
    pub description: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub pay_to: SolanaAddress,
    pub max_timeout_seconds: u64,
    pub asset: SolanaAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<PaymentExtra>,
}

/// Scheme payload for the Solana `exact` scheme: a base64-encoded, partially
/// signed versioned transaction (payer slot left for the facilitator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    pub transaction: String,
}

/// Describes a signed request to transfer a specific amount of funds on-chain.
/// Sent by the client as base64 JSON in the `X-PAYMENT` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: SolanaNetwork,
    pub payload: ExactSolanaPayload,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentHeaderError {
    #[error("Invalid base64 in payment header")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid JSON in payment header")]
    Json(#[from] serde_json::Error),
}

impl TryFrom<Base64Bytes<'_>> for PaymentPayload {
    type Error = PaymentHeaderError;

    fn try_from(value: Base64Bytes<'_>) -> Result<Self, Self::Error> {
        let decoded = value.decode()?;
        let payload = serde_json::from_slice(&decoded)?;
        Ok(payload)
    }
}

impl PaymentPayload {
    /// Encodes the payload as base64 JSON, the `X-PAYMENT` header value.
    pub fn to_base64(&self) -> Result<Base64Bytes<'static>, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json))
    }
}

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub x402_version: X402Version,
    pub accepts: Vec<PaymentRequirements>,
    pub error: String,
}

impl Display for PaymentRequiredResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Wrapper for a payment payload and requirements sent to the facilitator
/// to be verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: X402Version,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Wrapper for a payment payload and requirements sent to the facilitator
/// to be used for settlement.
pub type SettleRequest = VerifyRequest;

/// Returned by the facilitator after verifying a [`PaymentPayload`] against
/// [`PaymentRequirements`]. Includes a boolean flag and an optional reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<SolanaAddress>,
}

/// Returned by the facilitator after attempting to settle a payment on-chain.
/// Indicates success/failure, transaction signature, and payer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<SolanaAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<SolanaNetwork>,
}

impl SettleResponse {
    /// Encodes the settlement result as base64 JSON, the `X-PAYMENT-RESPONSE`
    /// header value.
    pub fn to_base64(&self) -> Result<Base64Bytes<'static>, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json))
    }
}

/// A simple error structure returned on 401 and 500 responses.
/// Used when no structured protocol-level response is appropriate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
