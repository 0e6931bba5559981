//! Classify raw stream payloads into [`Envelope`]s.
//!
//! A payload that fails to decode is dropped here with a `warn` diagnostic.
//! The caller never sees the error, so one bad message cannot end the
//! stream.

use lookout_core::{Envelope, EnvelopeError};
use tracing::warn;

/// Longest prefix of a rejected payload included in the diagnostic.
const PREVIEW_LEN: usize = 120;

/// Decode one text payload.
pub fn decode_envelope(raw: &str) -> Result<Envelope, EnvelopeError> {
    Ok(serde_json::from_str(raw)?)
}

/// Decode one text payload, logging and discarding it on failure.
pub fn parse_envelope(raw: &str) -> Option<Envelope> {
    match decode_envelope(raw) {
        Ok(envelope) => Some(envelope),
        Err(error) => {
            warn!(
                %error,
                len = raw.len(),
                preview = preview(raw),
                "dropping malformed envelope"
            );
            None
        }
    }
}

fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
