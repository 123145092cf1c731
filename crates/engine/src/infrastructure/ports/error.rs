//! Error types for port operations.

/// Failures talking to the remote workflow endpoint.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The remote answered with a non-success status.
    #[error("HTTP error {status}: {body}")]
    Status { status: u16, body: String },

    /// The remote answered successfully but not with an event stream.
    #[error("Remote did not answer with an event stream: {body}")]
    NotEventStream { body: String },

    /// The request could not be sent or the stream broke.
    #[error("Request error: {0}")]
    Connection(String),

    /// An event could not be decoded.
    #[error("Malformed event: {0}")]
    Protocol(String),

    /// The remote closed the event stream body before its final chunk, after the
    /// response had started. Callers treat it as completion.
    #[error("Peer closed connection without sending complete message body")]
    PrematureClose,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),
    #[error("Invalid storage response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelApiError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    RequestFailed { url: String, message: String },
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("IO error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum WeightsError {
    #[error("Failed to get remote file properties for {0}")]
    Properties(String),
    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },
    #[error("File {path} is not a valid safetensors file: {reason}")]
    Integrity { path: String, reason: String },
    #[error("IO error: {0}")]
    Io(String),
}
