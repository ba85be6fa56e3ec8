//! JSON wire codec for [`Announcement`] payloads.
//!
//! The payload is a flat JSON object with the named fields `hostname`,
//! `cpu`, `memory`, `tx_kbps`, `rx_kbps`, `active_conns` and `custom`.
//! Decoding goes through a single entry point that either yields a complete
//! announcement or an error; there is no per-field fallback.

use thiserror::Error;

use crate::types::Announcement;

/// Largest payload accepted or produced.  Matches the receive buffer.
pub const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload of {0} bytes exceeds the datagram size limit")]
    TooLarge(usize),
    #[error("malformed announcement: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("field `{0}` is not a finite number")]
    NonFinite(&'static str),
}

pub fn encode(announcement: &Announcement) -> Result<Vec<u8>, CodecError> {
    check_finite(announcement)?;
    let bytes = serde_json::to_vec(announcement)?;
    if bytes.len() > MAX_DATAGRAM {
        return Err(CodecError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

pub fn decode(payload: &[u8]) -> Result<Announcement, CodecError> {
    if payload.len() > MAX_DATAGRAM {
        return Err(CodecError::TooLarge(payload.len()));
    }
    let announcement: Announcement = serde_json::from_slice(payload)?;
    check_finite(&announcement)?;
    Ok(announcement)
}

fn check_finite(a: &Announcement) -> Result<(), CodecError> {
    let fields = [
        ("cpu", a.cpu),
        ("memory", a.memory),
        ("tx_kbps", a.tx_kbps),
        ("rx_kbps", a.rx_kbps),
        ("active_conns", a.active_conns),
    ];
    match fields.into_iter().find(|(_, v)| !v.is_finite()) {
        Some((name, _)) => Err(CodecError::NonFinite(name)),
        None => Ok(()),
    }
}
