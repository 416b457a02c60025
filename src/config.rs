//! Device configuration surface.
//!
//! The session engine's [`ConnectOptions`](crate::network::application::mqtt::ConnectOptions)
//! takes no opinion on where its fields come from; this module is the thin,
//! `no_std`-compatible layer a device uses to turn a provisioned JSON blob
//! (as might sit in flash alongside the firmware image) into one. Nothing in
//! `network::application::mqtt` depends on this module; a caller with its
//! own provisioning format can ignore it entirely.

use base64ct::{Base64, Encoding};
use serde::Deserialize;

/// Errors decoding or validating a [`DeviceConfig`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    /// The JSON blob did not parse.
    Malformed,
    /// No `device_secret_b64` field was present.
    NoSecret,
    /// The base64-encoded secret field was not valid base64, or did not fit
    /// the caller-provided output buffer.
    InvalidSecret,
    /// The blob's trailing CRC32 did not match its contents.
    ChecksumMismatch,
}

/// Provisioned device configuration.
///
/// Borrows its string fields directly from the input buffer rather than
/// allocating owned copies, matching the engine's caller-owns-the-bytes
/// discipline.
#[derive(Debug, Deserialize)]
pub struct DeviceConfig<'a> {
    /// The MQTT client id to connect with.
    pub client_id: &'a str,
    /// Broker hostname.
    pub broker_host: &'a str,
    /// Broker port.
    pub broker_port: u16,
    /// Keep-alive interval in seconds.
    pub keep_alive_seconds: u16,
    /// Base64-encoded device secret (e.g. a pre-shared key used for broker
    /// authentication), if one was provisioned.
    pub device_secret_b64: Option<&'a str>,
}

impl<'a> DeviceConfig<'a> {
    /// Parse a JSON-encoded configuration blob.
    pub fn from_json(json: &'a str) -> Result<Self, ConfigError> {
        serde_json_core::from_str(json)
            .map(|(config, _bytes_consumed)| config)
            .map_err(|_| ConfigError::Malformed)
    }

    /// Decode `device_secret_b64` into `out`, returning the decoded slice.
    pub fn decode_secret<'b>(&self, out: &'b mut [u8]) -> Result<&'b [u8], ConfigError> {
        let encoded = self.device_secret_b64.ok_or(ConfigError::NoSecret)?;
        Base64::decode(encoded, out).map_err(|_| ConfigError::InvalidSecret)
    }
}

/// Compute the CRC32 of a provisioned configuration blob, for comparison
/// against a trailing checksum stored alongside it in flash.
pub fn checksum(blob: &[u8]) -> u32 {
    crc32fast::hash(blob)
}

/// Verify that `blob`'s trailing 4 little-endian bytes match the CRC32 of
/// everything before them, returning the checksummed body on success.
pub fn verify_checksum(blob: &[u8]) -> Result<&[u8], ConfigError> {
    if blob.len() < 4 {
        return Err(ConfigError::ChecksumMismatch);
    }
    let (body, trailer) = blob.split_at(blob.len() - 4);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if checksum(body) == expected {
        Ok(body)
    } else {
        Err(ConfigError::ChecksumMismatch)
    }
}
