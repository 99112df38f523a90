use browserless_client::BrowserlessError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that end a run. Partial data never produces one of these: missing
/// strategies, bad fragments and correlation misses are reported in the
/// run summary instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(#[from] CaptureError),

    #[error("Sink write failed: {0}")]
    SinkWrite(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture driver failed: {0}")]
    Driver(String),

    #[error("Capture window closed after {0:?} with nothing collected")]
    Timeout(std::time::Duration),

    #[error("Replay file error: {0}")]
    Replay(String),
}

impl From<BrowserlessError> for CaptureError {
    fn from(err: BrowserlessError) -> Self {
        CaptureError::Driver(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Sink rejected records: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}
