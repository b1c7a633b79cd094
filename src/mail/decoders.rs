use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{NotifierError, Result};

/// Gmail's base64url. Some producers pad, some don't; accept both.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64url body blob into text. Invalid UTF-8 sequences are dropped.
pub fn decode_body_data(data: &str) -> Result<String> {
    let bytes = URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|e| NotifierError::Decode(format!("invalid base64url body: {e}")))?;
    Ok(utf8_ignoring_errors(&bytes))
}

fn utf8_ignoring_errors(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// First `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
