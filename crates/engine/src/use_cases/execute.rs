//! Execute a workflow remotely and relay its events to the host UI.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;

use falbridge_domain::WorkflowGraph;
use falbridge_shared::HostMessage;

use crate::infrastructure::ports::{HostEventPort, RemoteWorkflowPort, TransportError};
use crate::use_cases::error::BridgeError;
use crate::use_cases::payload::BuildPayload;

/// Progress of one relay, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    UploadingFiles,
    BuildingPayload,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::UploadingFiles => "uploading_files",
            Self::BuildingPayload => "building_payload",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct ExecuteWorkflow {
    build_payload: Arc<BuildPayload>,
    remote: Arc<dyn RemoteWorkflowPort>,
    events: Arc<dyn HostEventPort>,
}

impl ExecuteWorkflow {
    pub fn new(
        build_payload: Arc<BuildPayload>,
        remote: Arc<dyn RemoteWorkflowPort>,
        events: Arc<dyn HostEventPort>,
    ) -> Self {
        Self {
            build_payload,
            remote,
            events,
        }
    }

    /// Run `graph` remotely, forwarding every event to `client_id` in arrival order.
    ///
    /// Returns once the remote stream ends. A `fal-execution-error` event ends the
    /// relay with [`BridgeError::RemoteExecution`] and is not forwarded.
    pub async fn execute(
        &self,
        client_id: Option<&str>,
        graph: &WorkflowGraph,
        ui_graph: Option<Value>,
    ) -> Result<(), BridgeError> {
        let client_id = client_id
            .filter(|id| !id.is_empty())
            .ok_or(BridgeError::ClientIdMissing)?;

        let result = self.relay(client_id, graph, ui_graph).await;
        match &result {
            Ok(()) => transition(client_id, RelayState::Completed),
            Err(e) => {
                transition(client_id, RelayState::Failed);
                tracing::warn!(client_id, error = %e, "Workflow execution failed");
            }
        }
        result
    }

    async fn relay(
        &self,
        client_id: &str,
        graph: &WorkflowGraph,
        ui_graph: Option<Value>,
    ) -> Result<(), BridgeError> {
        transition(client_id, RelayState::Idle);

        self.events
            .send(client_id, HostMessage::info("Uploading input files"))
            .await;
        transition(client_id, RelayState::UploadingFiles);
        let payload = self.build_payload.execute(graph, ui_graph, false).await?;
        transition(client_id, RelayState::BuildingPayload);

        self.events
            .send(client_id, HostMessage::info("Executing the workflow"))
            .await;
        transition(client_id, RelayState::Connecting);

        let mut stream = self.remote.stream(&payload).await?;
        transition(client_id, RelayState::Streaming);

        let mut forwarded = 0usize;
        while let Some(event) = stream.next().await {
            match event {
                Ok(message) if message.is_execution_error() => {
                    return Err(BridgeError::RemoteExecution(message.data));
                }
                Ok(message) => {
                    self.events.send(client_id, message).await;
                    forwarded += 1;
                }
                Err(TransportError::PrematureClose) => {
                    tracing::debug!(client_id, "Remote closed the stream early; treating as complete");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(client_id, forwarded, "Relayed remote events");
        Ok(())
    }
}

fn transition(client_id: &str, state: RelayState) {
    tracing::debug!(client_id, state = %state, "Relay state");
}
