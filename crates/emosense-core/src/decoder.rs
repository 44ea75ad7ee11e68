//! Request decoding: JSON body → data-URI → base64 → RGB image buffer.
//!
//! The body is parsed as JSON whatever its declared content type. Only a
//! missing or empty `image` field is a client error; every other failure in
//! the chain is reported as a generic decode failure.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::RgbImage;
use serde_json::Value;
use thiserror::Error;

/// Standard alphabet, padding required, trailing bits ignored.
const PAYLOAD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical)
        .with_decode_allow_trailing_bits(true),
);

const IMAGE_FIELD: &str = "image";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("No image provided")]
    MissingImage,
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("image field must be a data URI string")]
    ImageNotString,
    #[error("image data URI has no ',' separator")]
    MissingSeparator,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cannot decode image bytes: {0}")]
    Image(#[from] image::ImageError),
}

impl DecodeError {
    /// Whether the failure is the caller's fault and should surface as a 400.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DecodeError::MissingImage)
    }
}

/// Parse the raw request body as JSON.
pub fn parse_body(raw: &[u8]) -> Result<Value, DecodeError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Pull the data-URI string out of a parsed request body.
///
/// Absent, `null` and empty values (`""`, `false`, `0`, `[]`, `{}`) all count
/// as a missing image.
pub fn extract_image_field(body: &Value) -> Result<&str, DecodeError> {
    let fields = body.as_object().ok_or(DecodeError::NotAnObject)?;
    match fields.get(IMAGE_FIELD) {
        Some(value) if !is_empty_value(value) => {
            value.as_str().ok_or(DecodeError::ImageNotString)
        }
        _ => Err(DecodeError::MissingImage),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Split `"<header>,<payload>"` on the first comma.
pub fn split_data_uri(uri: &str) -> Result<(&str, &str), DecodeError> {
    uri.split_once(',').ok_or(DecodeError::MissingSeparator)
}

/// Decode a base64 payload, ignoring embedded ASCII whitespace.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(PAYLOAD_BASE64.decode(compact)?)
}

/// Decode encoded image bytes (PNG, JPEG, ...) into a 3-channel buffer.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Run the whole chain on a raw request body.
pub fn decode_request(raw: &[u8]) -> Result<RgbImage, DecodeError> {
    let body = parse_body(raw)?;
    let uri = extract_image_field(&body)?;
    let (header, payload) = split_data_uri(uri)?;
    tracing::debug!(header, payload_len = payload.len(), "decoding data URI");

    let bytes = decode_base64(payload)?;
    let image = decode_image(&bytes)?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        "image decoded"
    );
    Ok(image)
}

/// Build a `data:<mime>;base64,<payload>` URI from encoded image bytes.
///
/// The MIME type is sniffed from the bytes; unknown formats fall back to
/// `application/octet-stream`.
pub fn to_data_uri(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
