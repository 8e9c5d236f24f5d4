//! Renders pairing challenges as displayable images.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;

const DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";
const MIN_DIMENSION: u32 = 264;

/// Errors from QR encoding.
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("empty QR payload")]
    Empty,

    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("QR encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Encodes `raw` as a QR code and returns it as an SVG data URL.
pub fn encode_data_url(raw: &str) -> Result<String, QrError> {
    if raw.is_empty() {
        return Err(QrError::Empty);
    }
    let code = QrCode::new(raw.as_bytes()).map_err(|e| QrError::Encode(e.to_string()))?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .build();
    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(image)))
}

/// [`encode_data_url`] on the blocking pool.
pub async fn encode_data_url_blocking(raw: String) -> Result<String, QrError> {
    tokio::task::spawn_blocking(move || encode_data_url(&raw)).await?
}
