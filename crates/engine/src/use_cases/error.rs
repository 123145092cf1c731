//! Errors surfaced by the bridge routes and their wire representation.

use serde_json::{Map, Value};

use falbridge_domain::{NodeRef, WorkflowError};
use falbridge_shared::{ErrorEnvelope, FAL_EXECUTION_ERROR_EVENT};

use crate::infrastructure::ports::TransportError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("Client ID is missing")]
    ClientIdMissing,

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("File upload failed for node {}: {message}", .node.node_id)]
    FileUploadFailed { node: NodeRef, message: String },

    /// The remote reported a failed execution; carries the event's data.
    #[error("Remote execution failed")]
    RemoteExecution(Value),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl BridgeError {
    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::ClientIdMissing | Self::Workflow(_) | Self::FileUploadFailed { .. } => 400,
            Self::RemoteExecution(data) => data
                .get("code")
                .and_then(Value::as_u64)
                .filter(|code| (400..=599).contains(code))
                .map(|code| code as u16)
                .unwrap_or(500),
            Self::Transport(TransportError::Status { status, .. }) => *status,
            Self::Transport(TransportError::NotEventStream { .. }) => 400,
            Self::Transport(_) | Self::Unexpected(_) => 500,
        }
    }

    /// The `{ error, node_errors }` body for this error.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::ClientIdMissing => ErrorEnvelope::new(
                "client_id_missing",
                "Client ID is missing",
                "Client is not initialized yet. Please try again in a few seconds.",
            ),
            Self::Workflow(error) => workflow_envelope(error),
            Self::FileUploadFailed { node, message } => {
                ErrorEnvelope::new("file_upload_failed", "File upload failed", message.clone())
                    .with_node_error(&node.node_id, &node.class_type, message.clone())
            }
            Self::RemoteExecution(data) => remote_envelope(data),
            Self::Transport(TransportError::Status { status, body }) => ErrorEnvelope::new(
                "http_error",
                format!("HTTP error occurred: {status}"),
                body.clone(),
            ),
            Self::Transport(TransportError::NotEventStream { body }) => {
                ErrorEnvelope::new(FAL_EXECUTION_ERROR_EVENT, "fal execution error", body.clone())
            }
            Self::Transport(other) => ErrorEnvelope::new(
                "request_error",
                "Request error occurred",
                other.to_string(),
            ),
            Self::Unexpected(message) => ErrorEnvelope::new(
                "unexpected_error",
                "An unexpected error occurred",
                message.clone(),
            ),
        }
    }
}

fn workflow_envelope(error: &WorkflowError) -> ErrorEnvelope {
    match error {
        WorkflowError::DuplicateInputName {
            name,
            first,
            second,
        } => {
            let message = format!("Duplicate input name '{name}'");
            ErrorEnvelope::new("duplicate_input_name", "Duplicate input name", error.to_string())
                .with_node_error(&first.node_id, &first.class_type, message.clone())
                .with_node_error(&second.node_id, &second.class_type, message)
        }
        other => other.nodes().into_iter().fold(
            ErrorEnvelope::new("invalid_workflow", "Invalid workflow", other.to_string()),
            |envelope, node| {
                envelope.with_node_error(&node.node_id, &node.class_type, other.to_string())
            },
        ),
    }
}

/// The remote's own envelope when it sent one, otherwise a generic wrapper.
fn remote_envelope(data: &Value) -> ErrorEnvelope {
    if let Some(envelope) = data
        .get("error")
        .and_then(|e| serde_json::from_value::<ErrorEnvelope>(e.clone()).ok())
    {
        return envelope;
    }

    let details = match data.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => data.to_string(),
    };
    let extra_info = match data {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    ErrorEnvelope::new(FAL_EXECUTION_ERROR_EVENT, "fal execution error", details)
        .with_extra_info(extra_info)
}
