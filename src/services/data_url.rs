use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// An uploaded image as sent by the browser's `FileReader.readAsDataURL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DataUrlImage<'a> {
    pub(crate) mime_type: &'a str,
    pub(crate) payload: &'a str,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum DataUrlError {
    #[error("image must be a data URL (missing ',' separator)")]
    MissingSeparator,
    #[error("image data URL has an empty payload")]
    EmptyPayload,
    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("image is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// Everything after the first comma of a data URL.
pub(crate) fn extract_base64_payload(data_url: &str) -> Option<&str> {
    data_url.split_once(',').map(|(_, payload)| payload)
}

impl<'a> DataUrlImage<'a> {
    pub(crate) fn parse(data_url: &'a str, max_bytes: usize) -> Result<Self, DataUrlError> {
        let payload = extract_base64_payload(data_url).ok_or(DataUrlError::MissingSeparator)?;
        let header = &data_url[..data_url.len() - payload.len() - 1];
        if payload.is_empty() {
            return Err(DataUrlError::EmptyPayload);
        }

        let decoded =
            STANDARD.decode(payload).map_err(|err| DataUrlError::InvalidBase64(err.to_string()))?;
        if decoded.len() > max_bytes {
            return Err(DataUrlError::TooLarge { size: decoded.len(), limit: max_bytes });
        }

        Ok(Self { mime_type: mime_type_of(header), payload })
    }
}

fn mime_type_of(header: &str) -> &str {
    header
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|mime| mime.starts_with("image/") && mime.len() > "image/".len())
        .unwrap_or(DEFAULT_MIME_TYPE)
}
