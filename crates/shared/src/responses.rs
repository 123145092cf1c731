//! Error envelope returned by the `/fal/*` routes.
//!
//! The host UI renders `error` as a dialog and uses `node_errors` to highlight
//! the offending nodes in the graph editor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level error description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable classification (`duplicate_input_name`, ...)
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub extra_info: Map<String, Value>,
}

/// One error attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeErrorDetail {
    pub message: String,
    #[serde(default)]
    pub details: String,
}

/// All errors attached to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeErrors {
    pub class_type: String,
    pub errors: Vec<NodeErrorDetail>,
}

/// `{ error: {...}, node_errors: {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
    #[serde(default)]
    pub node_errors: BTreeMap<String, NodeErrors>,
}

impl ErrorEnvelope {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                error_type: error_type.into(),
                message: message.into(),
                details: details.into(),
                extra_info: Map::new(),
            },
            node_errors: BTreeMap::new(),
        }
    }

    pub fn with_extra_info(mut self, extra_info: Map<String, Value>) -> Self {
        self.error.extra_info = extra_info;
        self
    }

    /// Attach an error to `node_id`, merging with errors already recorded for it.
    pub fn with_node_error(
        mut self,
        node_id: impl Into<String>,
        class_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let entry = self
            .node_errors
            .entry(node_id.into())
            .or_insert_with(|| NodeErrors {
                class_type: class_type.into(),
                errors: Vec::new(),
            });
        entry.errors.push(NodeErrorDetail {
            message: message.into(),
            details: String::new(),
        });
        self
    }
}
