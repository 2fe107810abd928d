#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("extraction request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("extraction service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("extraction payload invalid: {0}")]
    InvalidPayload(String),
    #[error("no extraction endpoint configured")]
    NotConfigured,
}
