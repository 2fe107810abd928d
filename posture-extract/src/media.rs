use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

/// What kind of content the extraction service should expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Sent base64-encoded with an image media type.
    Image,
    /// Text-bearing document; text is recovered locally before sending.
    Text,
}

/// A fully-prepared request for the extraction service.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    /// Base64 for images, recovered text for documents.
    pub content: String,
    pub kind: MediaKind,
    /// IANA media type, only meaningful for images.
    pub media_type: Option<String>,
}

impl ExtractionRequest {
    /// Build a request from raw file bytes and the declared media kind.
    pub fn from_bytes(kind: MediaKind, extension: &str, bytes: &[u8]) -> Self {
        match kind {
            MediaKind::Image => ExtractionRequest {
                content: BASE64.encode(bytes),
                kind,
                media_type: media_type_for_extension(extension),
            },
            MediaKind::Text => ExtractionRequest {
                content: recover_text(bytes),
                kind,
                media_type: None,
            },
        }
    }
}

/// IANA media type for an image extension, lowercased without the dot.
pub fn media_type_for_extension(extension: &str) -> Option<String> {
    let media = match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(media.to_string())
}

/// Recover readable text from arbitrary document bytes.
///
/// Office/PDF containers are not properly parsed here; the extraction
/// service interprets whatever survives. Lossy UTF-8 decode, strip
/// non-printables, collapse whitespace runs.
pub fn recover_text(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(if ch == '\n' { '\n' } else { ' ' });
            }
            last_was_space = true;
        } else if !ch.is_control() && ch != '\u{fffd}' {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}
