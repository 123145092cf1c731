//! Use cases - request orchestration for the bridge routes.
//!
//! Each use case owns the ports it needs and is shared through `App`.

pub mod download;
pub mod error;
pub mod execute;
pub mod payload;
pub mod uploads;

pub use download::{DownloadError, DownloadOutputs};
pub use error::BridgeError;
pub use execute::{ExecuteWorkflow, RelayState};
pub use payload::BuildPayload;
pub use uploads::UploadInputFiles;
