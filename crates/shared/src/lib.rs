//! falbridge Shared - wire types exchanged with the host UI
//!
//! - Request bodies for the `/fal/*` routes
//! - The `{ error, node_errors }` envelope
//! - `{ type, data }` event messages
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json and the domain crate
//! 2. **No business logic** - Pure data types and serialization

pub mod messages;
pub mod requests;
pub mod responses;

pub use messages::{HostMessage, FAL_EXECUTION_ERROR_EVENT, FAL_INFO_EVENT};
pub use requests::{DownloadFile, DownloadRequest, PromptRequest};
pub use responses::{ErrorBody, ErrorEnvelope, NodeErrorDetail, NodeErrors};
