//! Workflow graph as serialized by the host.
//!
//! The host sends its API-format workflow as a JSON object keyed by node id.
//! Each node carries a `class_type` and an `inputs` object whose values are
//! either literals or links of the form `[upstream-node-id, output-index]`.
//!
//! Node order is significant: uploaded file inputs are numbered in graph order,
//! so the graph keeps nodes in the order they were deserialized.

use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WorkflowError;

/// A link from a node input to another node's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLink {
    pub node_id: String,
    pub output_index: u64,
}

impl InputLink {
    /// Interpret an input value as a link (`["4", 0]`).
    ///
    /// Returns `None` for literals.
    pub fn from_value(value: &Value) -> Option<Self> {
        let pair = value.as_array()?;
        if pair.len() != 2 {
            return None;
        }
        let node_id = match &pair[0] {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        let output_index = pair[1].as_u64()?;
        Some(Self {
            node_id,
            output_index,
        })
    }
}

/// One node of the API-format workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub class_type: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Host-specific fields (`_meta`, ...) carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Link this node's input to `node_id`'s output `output_index`.
    pub fn with_link(self, name: impl Into<String>, node_id: &str, output_index: u64) -> Self {
        self.with_input(name, serde_json::json!([node_id, output_index]))
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Inputs that reference another node, in declaration order.
    pub fn links(&self) -> impl Iterator<Item = (&str, InputLink)> + '_ {
        self.inputs
            .iter()
            .filter_map(|(name, value)| InputLink::from_value(value).map(|l| (name.as_str(), l)))
    }
}

/// Address of a single node input: `[node-id, "inputs", field]` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputKey {
    pub node_id: String,
    pub field: String,
}

impl InputKey {
    const INPUTS_SEGMENT: &'static str = "inputs";

    pub fn new(node_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.node_id, Self::INPUTS_SEGMENT, self.field)
    }
}

impl Serialize for InputKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.node_id)?;
        seq.serialize_element(Self::INPUTS_SEGMENT)?;
        seq.serialize_element(&self.field)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for InputKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = InputKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("[node_id, \"inputs\", field]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<InputKey, A::Error> {
                let node_id: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let segment: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if segment != InputKey::INPUTS_SEGMENT {
                    return Err(de::Error::invalid_value(
                        de::Unexpected::Str(&segment),
                        &"\"inputs\"",
                    ));
                }
                let field: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                Ok(InputKey { node_id, field })
            }
        }

        deserializer.deserialize_seq(KeyVisitor)
    }
}

/// The API-format workflow: node id to node spec, in host order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowGraph {
    nodes: Vec<(String, NodeSpec)>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing any node with the same id in place.
    pub fn insert(&mut self, node_id: impl Into<String>, spec: NodeSpec) {
        let node_id = node_id.into();
        match self.nodes.iter_mut().find(|(id, _)| *id == node_id) {
            Some((_, existing)) => *existing = spec,
            None => self.nodes.push((node_id, spec)),
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>, spec: NodeSpec) -> Self {
        self.insert(node_id, spec);
        self
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeSpec> {
        self.nodes
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, spec)| spec)
    }

    fn get_mut(&mut self, node_id: &str) -> Option<&mut NodeSpec> {
        self.nodes
            .iter_mut()
            .find(|(id, _)| id == node_id)
            .map(|(_, spec)| spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.nodes.iter().map(|(id, spec)| (id.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Overwrite the input addressed by `key`.
    ///
    /// The input must already exist on the node; keys never create new inputs.
    pub fn set_input(&mut self, key: &InputKey, value: Value) -> Result<(), WorkflowError> {
        let node = self
            .get_mut(&key.node_id)
            .ok_or_else(|| WorkflowError::UnknownInput {
                node_id: key.node_id.clone(),
                field: key.field.clone(),
            })?;
        match node.inputs.get_mut(&key.field) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(WorkflowError::UnknownInput {
                node_id: key.node_id.clone(),
                field: key.field.clone(),
            }),
        }
    }
}

impl Serialize for WorkflowGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for (id, spec) in &self.nodes {
            map.serialize_entry(id, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WorkflowGraph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut nodes = Vec::with_capacity(raw.len());
        for (id, value) in raw {
            let spec: NodeSpec = serde_json::from_value(value)
                .map_err(|e| de::Error::custom(format!("node {id}: {e}")))?;
            nodes.push((id, spec));
        }
        Ok(Self { nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_keeps_host_order() {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "10": {"class_type": "SaveImage", "inputs": {"images": ["8", 0]}},
            "3": {"class_type": "KSampler", "inputs": {"seed": 5}},
            "8": {"class_type": "VAEDecode", "inputs": {}}
        }))
        .unwrap();

        let ids: Vec<&str> = graph.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["10", "3", "8"]);
    }

    #[test]
    fn unknown_node_fields_round_trip() {
        let raw = json!({
            "1": {"class_type": "LoadImage", "inputs": {"image": "a.png"}, "_meta": {"title": "Load"}}
        });
        let graph: WorkflowGraph = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&graph).unwrap(), raw);
    }

    #[test]
    fn links_skip_literals() {
        let node = NodeSpec::new("KSampler")
            .with_input("seed", 42)
            .with_link("model", "4", 0)
            .with_input("sampler_name", "euler");

        let links: Vec<_> = node.links().collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, "model");
        assert_eq!(links[0].1.node_id, "4");
    }

    #[test]
    fn numeric_link_ids_are_accepted() {
        let link = InputLink::from_value(&json!([7, 1])).unwrap();
        assert_eq!(link.node_id, "7");
        assert_eq!(link.output_index, 1);
        assert!(InputLink::from_value(&json!(["7"])).is_none());
    }

    #[test]
    fn input_key_wire_format() {
        let key = InputKey::new("12", "image");
        assert_eq!(serde_json::to_value(&key).unwrap(), json!(["12", "inputs", "image"]));

        let back: InputKey = serde_json::from_value(json!(["12", "inputs", "image"])).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_value::<InputKey>(json!(["12", "outputs", "image"])).is_err());
    }

    #[test]
    fn set_input_requires_existing_field() {
        let mut graph = WorkflowGraph::new()
            .with_node("1", NodeSpec::new("LoadImage").with_input("image", "a.png"));

        graph
            .set_input(&InputKey::new("1", "image"), json!("https://cdn/a.png"))
            .unwrap();
        assert_eq!(graph.get("1").unwrap().input("image"), Some(&json!("https://cdn/a.png")));

        let err = graph
            .set_input(&InputKey::new("1", "mask"), json!("x"))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownInput { .. }));
    }
}
