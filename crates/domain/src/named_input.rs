//! Named-input nodes.
//!
//! A named-input node is a scalar value node whose `name` turns it into a
//! parameter of the remote workflow. When another node consumes its output,
//! the literal value is published in the payload under that name, with the
//! key of the value field so the remote side can write it back into the graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NodeRef, WorkflowError};
use crate::workflow::{InputKey, WorkflowGraph};

/// Field holding the parameter name on every named-input node.
pub const NAME_FIELD: &str = "name";

/// The recognized named-input node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedInputKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl NamedInputKind {
    pub fn from_class_type(class_type: &str) -> Option<Self> {
        match class_type {
            "StringInput_fal" => Some(Self::String),
            "IntegerInput_fal" => Some(Self::Integer),
            "FloatInput_fal" => Some(Self::Float),
            "BooleanInput_fal" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn class_type(&self) -> &'static str {
        match self {
            Self::String => "StringInput_fal",
            Self::Integer => "IntegerInput_fal",
            Self::Float => "FloatInput_fal",
            Self::Boolean => "BooleanInput_fal",
        }
    }

    /// Input field holding the literal value.
    pub fn value_field(&self) -> &'static str {
        match self {
            Self::String | Self::Boolean => "value",
            Self::Integer | Self::Float => "number",
        }
    }

    pub fn all() -> &'static [NamedInputKind] {
        &[Self::String, Self::Integer, Self::Float, Self::Boolean]
    }
}

/// A named input discovered in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedInput {
    pub name: String,
    pub value: Value,
    /// Points at the named-input node's own value field.
    pub key: InputKey,
    pub kind: NamedInputKind,
}

/// Collect every consumed named input, in the order consumers appear.
///
/// A named-input node feeding several inputs yields a single entry. Nodes
/// nobody consumes are skipped. Two distinct nodes sharing a name fail with
/// [`WorkflowError::DuplicateInputName`].
pub fn collect_named_inputs(graph: &WorkflowGraph) -> Result<Vec<NamedInput>, WorkflowError> {
    let mut seen: HashMap<String, NodeRef> = HashMap::new();
    let mut collected = Vec::new();

    for (node_id, node) in graph.iter() {
        for (input, link) in node.links() {
            let upstream = graph.get(&link.node_id).ok_or_else(|| {
                WorkflowError::MissingUpstreamNode {
                    node: NodeRef::new(node_id, &node.class_type),
                    input: input.to_string(),
                    upstream_id: link.node_id.clone(),
                }
            })?;

            let Some(kind) = NamedInputKind::from_class_type(&upstream.class_type) else {
                continue;
            };

            let upstream_ref = NodeRef::new(&link.node_id, &upstream.class_type);
            let name = upstream
                .input(NAME_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| WorkflowError::MalformedNamedInput {
                    node: upstream_ref.clone(),
                    field: NAME_FIELD.to_string(),
                })?;

            if let Some(previous) = seen.get(name) {
                if previous.node_id == link.node_id {
                    continue;
                }
                return Err(WorkflowError::DuplicateInputName {
                    name: name.to_string(),
                    first: previous.clone(),
                    second: upstream_ref,
                });
            }

            let value = upstream
                .input(kind.value_field())
                .cloned()
                .ok_or_else(|| WorkflowError::MalformedNamedInput {
                    node: upstream_ref.clone(),
                    field: kind.value_field().to_string(),
                })?;

            seen.insert(name.to_string(), upstream_ref);
            collected.push(NamedInput {
                name: name.to_string(),
                value,
                key: InputKey::new(&link.node_id, kind.value_field()),
                kind,
            });
        }
    }

    Ok(collected)
}
