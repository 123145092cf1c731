//! Messages pushed to host UI clients over the notification socket.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event type of the bridge's own progress notices.
pub const FAL_INFO_EVENT: &str = "fal-info";

/// Event type the remote uses to report a failed execution.
pub const FAL_EXECUTION_ERROR_EVENT: &str = "fal-execution-error";

/// A `{ type, data }` event, both as received from the remote stream and as
/// delivered to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl HostMessage {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// `fal-info { message }`
    pub fn info(message: &str) -> Self {
        Self::new(FAL_INFO_EVENT, json!({ "message": message }))
    }

    /// The host's connect greeting: `status { status, sid }`.
    pub fn status(sid: &str) -> Self {
        Self::new(
            "status",
            json!({ "status": { "exec_info": { "queue_remaining": 0 } }, "sid": sid }),
        )
    }

    pub fn is_execution_error(&self) -> bool {
        self.event_type == FAL_EXECUTION_ERROR_EVENT
    }
}
