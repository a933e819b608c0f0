//! Image encoding: validated receipt bytes → `ImageData` for the VLM request.
//!
//! VLM APIs (OpenAI, Anthropic, Gemini, OpenAI-compatible hosts) accept images
//! as base64 data-URIs embedded in the JSON request body. The payload already
//! arrives base64-encoded, so this stage only attaches the sniffed MIME type
//! and the detail level.

use crate::pipeline::input::ValidatedImage;
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a validated receipt image for the multimodal API.
///
/// `detail: "high"` makes GPT-4-class models tile the image instead of
/// reading a single 512 px overview; receipt totals and dates are printed in
/// small type and are unreadable at overview resolution.
pub fn encode_receipt(image: &ValidatedImage) -> ImageData {
    debug!(
        "Encoding {} receipt → {} bytes base64",
        image.mime_type,
        image.base64.len()
    );
    ImageData::new(image.base64.clone(), image.mime_type).with_detail("high")
}
