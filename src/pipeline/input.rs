//! Input validation: turn the caller's `imageBase64` field into image bytes
//! we are willing to forward to a paid inference endpoint.
//!
//! Browsers and mobile clients send the same image in several shapes: bare
//! base64, a `data:image/...;base64,` URI copied from a canvas, base64 wrapped
//! at 76 columns, or base64 with the padding stripped. All of those are
//! accepted. What is rejected is anything that does not decode, or decodes to
//! bytes whose magic number is not a known image format.

use crate::error::IngestError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::debug;

/// Standard alphabet, padding optional on decode.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An image payload that decoded cleanly and sniffed as a known format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    /// Canonical (padded, unwrapped) standard base64 of the image bytes.
    pub base64: String,
    /// MIME type detected from the magic bytes, e.g. `image/jpeg`.
    pub mime_type: &'static str,
    /// Decoded size in bytes.
    pub byte_len: usize,
}

/// Validate the raw `imageBase64` field of a request.
///
/// # Errors
/// - [`IngestError::MissingImage`] when the field is absent or blank.
/// - [`IngestError::InvalidImage`] when it is not base64 or not an image.
pub fn validate_image(payload: Option<&str>) -> Result<ValidatedImage, IngestError> {
    let payload = payload.map(str::trim).unwrap_or_default();
    let payload = strip_data_uri(payload);
    if payload.is_empty() {
        return Err(IngestError::MissingImage);
    }

    let compact: String;
    let encoded = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        compact = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        compact.as_str()
    } else {
        payload
    };

    let bytes = LENIENT_BASE64
        .decode(encoded)
        .map_err(|e| IngestError::InvalidImage {
            reason: format!("not valid base64: {e}"),
        })?;

    let format = image::guess_format(&bytes).map_err(|_| {
        let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
        IngestError::InvalidImage {
            reason: format!("unrecognised image format (first bytes: {magic:02x?})"),
        }
    })?;

    let mime_type = format.to_mime_type();
    debug!("Validated {} image, {} bytes", mime_type, bytes.len());

    Ok(ValidatedImage {
        base64: STANDARD.encode(&bytes),
        mime_type,
        byte_len: bytes.len(),
    })
}

/// Drop a leading `data:<mime>;base64,` prefix if present.
///
/// The declared MIME type is ignored; the magic bytes decide.
fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, data)) = payload.split_once(";base64,") {
            return data.trim_start();
        }
    }
    payload
}
