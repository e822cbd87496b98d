//! Utility types shared across the gateway: base64 wrappers and signal handling.

pub mod b64;
pub mod sig_down;

pub use b64::{Base64Bytes, Base64UrlBytes};
pub use sig_down::SigDown;
