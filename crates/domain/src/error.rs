//! Error types for workflow validation and payload assembly.

use thiserror::Error;

/// A node identified by id and class type, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub node_id: String,
    pub class_type: String,
}

impl NodeRef {
    pub fn new(node_id: impl Into<String>, class_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            class_type: class_type.into(),
        }
    }
}

/// Errors raised while reading a workflow graph or assembling a payload.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    /// Two distinct named-input nodes declare the same name.
    #[error("Found duplicate input name '{name}' in the workflow")]
    DuplicateInputName {
        name: String,
        first: NodeRef,
        second: NodeRef,
    },

    /// A link points at a node id that is not in the graph.
    #[error("Node {} input '{input}' references missing node {upstream_id}", .node.node_id)]
    MissingUpstreamNode {
        node: NodeRef,
        input: String,
        upstream_id: String,
    },

    /// A named-input node lacks its name or value field.
    #[error("Named input node {} is missing field '{field}'", .node.node_id)]
    MalformedNamedInput { node: NodeRef, field: String },

    /// An input key addresses a node or field that does not exist.
    #[error("Node {node_id} has no input '{field}'")]
    UnknownInput { node_id: String, field: String },
}

impl WorkflowError {
    /// Nodes implicated by this error, for per-node annotations.
    pub fn nodes(&self) -> Vec<NodeRef> {
        match self {
            Self::DuplicateInputName { first, second, .. } => vec![first.clone(), second.clone()],
            Self::MalformedNamedInput { node, .. } | Self::MissingUpstreamNode { node, .. } => {
                vec![node.clone()]
            }
            Self::UnknownInput { .. } => Vec::new(),
        }
    }
}
