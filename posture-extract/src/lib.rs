mod client;
mod error;
mod media;
mod payload;

pub use client::{ExtractionClient, Extractor};
pub use error::ExtractError;
pub use media::{media_type_for_extension, recover_text, ExtractionRequest, MediaKind};
pub use payload::validate_payload;
