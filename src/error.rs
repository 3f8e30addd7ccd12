use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Upload rejection reasons
// ---------------------------------------------------------------------------

/// Why an upload was refused before (or while) turning it into a table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("file is {:.1} MB, the limit is {:.0} MB", mib(.size), mib(.limit))]
    Oversize { size: usize, limit: usize },

    #[error("unsupported file type '.{0}' (supported: .csv, .xlsx, .xls, .pdf, .txt)")]
    UnsupportedFormat(String),

    #[error("file is corrupt: {0}")]
    Corrupt(String),

    #[error("file is empty: {0}")]
    Empty(String),
}

fn mib(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

// ---------------------------------------------------------------------------
// Domain error
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum DashError {
    #[error("Upload rejected: {0}")]
    UploadRejected(RejectReason),

    #[error("Could not parse file: {0}")]
    ParseFailure(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("LLM service failure: {0}")]
    ExternalServiceFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, machine-readable error category for responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UploadRejected,
    ParseFailure,
    InsufficientData,
    ExternalServiceFailure,
    InvalidRequest,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UploadRejected => "upload_rejected",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::ExternalServiceFailure => "external_service_failure",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Io => "io",
        }
    }
}

impl DashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DashError::UploadRejected(_) => ErrorKind::UploadRejected,
            DashError::ParseFailure(_) => ErrorKind::ParseFailure,
            DashError::InsufficientData(_) => ErrorKind::InsufficientData,
            DashError::ExternalServiceFailure(_) => ErrorKind::ExternalServiceFailure,
            DashError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            DashError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<reqwest::Error> for DashError {
    fn from(err: reqwest::Error) -> Self {
        DashError::ExternalServiceFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_message_mentions_limit() {
        let err = DashError::UploadRejected(RejectReason::Oversize {
            size: 60 * 1024 * 1024,
            limit: 50 * 1024 * 1024,
        });
        let msg = err.to_string();
        assert!(msg.contains("60.0 MB"), "{msg}");
        assert!(msg.contains("50 MB"), "{msg}");
        assert_eq!(err.kind(), ErrorKind::UploadRejected);
    }

    #[test]
    fn reject_reasons_render_detail() {
        let unsupported = RejectReason::UnsupportedFormat("json".into());
        assert_eq!(
            unsupported.to_string(),
            "unsupported file type '.json' (supported: .csv, .xlsx, .xls, .pdf, .txt)"
        );
        let err = DashError::UploadRejected(RejectReason::Empty("no rows".into()));
        assert_eq!(err.to_string(), "Upload rejected: file is empty: no rows");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ExternalServiceFailure).unwrap();
        assert_eq!(json, "\"external_service_failure\"");
    }
}
