//! Declarative node schemas and the values flowing between nodes.
//!
//! A node kind is described by its inputs (with widget defaults and ranges) and
//! its output types. Handlers receive [`NodeInputs`] with defaults already filled
//! in and return a [`NodeOutput`].

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::image::ImageBatch;

/// Types a node input or output can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Int,
    Float,
    Boolean,
    String,
    Combo,
    Image,
    Model,
    Clip,
    Vae,
}

/// Widget description of an input, including its default.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum InputType {
    Int {
        default: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<i64>,
    },
    Float {
        default: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    Boolean {
        default: bool,
    },
    String {
        default: String,
        multiline: bool,
    },
    Combo {
        options: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// Connection from another node's output; no widget, no default.
    Link { value_type: ValueType },
}

impl InputType {
    pub fn int(default: i64) -> Self {
        Self::Int {
            default,
            min: None,
            max: None,
            step: None,
        }
    }

    pub fn int_range(default: i64, min: i64, max: i64) -> Self {
        Self::Int {
            default,
            min: Some(min),
            max: Some(max),
            step: None,
        }
    }

    pub fn float(default: f64) -> Self {
        Self::Float {
            default,
            min: None,
            max: None,
            step: None,
        }
    }

    pub fn float_range(default: f64, min: f64, max: f64, step: Option<f64>) -> Self {
        Self::Float {
            default,
            min: Some(min),
            max: Some(max),
            step,
        }
    }

    pub fn string(default: impl Into<String>) -> Self {
        Self::String {
            default: default.into(),
            multiline: false,
        }
    }

    pub fn multiline(default: impl Into<String>) -> Self {
        Self::String {
            default: default.into(),
            multiline: true,
        }
    }

    pub fn combo(options: &[&str], default: Option<&str>) -> Self {
        Self::Combo {
            options: options.iter().map(|o| o.to_string()).collect(),
            default: default.map(str::to_string),
        }
    }

    pub fn link(value_type: ValueType) -> Self {
        Self::Link { value_type }
    }

    /// The value used when the input is absent.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Self::Int { default, .. } => Some(json!(default)),
            Self::Float { default, .. } => Some(json!(default)),
            Self::Boolean { default } => Some(json!(default)),
            Self::String { default, .. } => Some(json!(default)),
            Self::Combo { options, default } => default
                .as_ref()
                .or_else(|| options.first())
                .map(|v| json!(v)),
            Self::Link { .. } => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int { .. } => ValueType::Int,
            Self::Float { .. } => ValueType::Float,
            Self::Boolean { .. } => ValueType::Boolean,
            Self::String { .. } => ValueType::String,
            Self::Combo { .. } => ValueType::Combo,
            Self::Link { value_type } => *value_type,
        }
    }
}

/// One declared input of a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(flatten)]
    pub input_type: InputType,
    pub required: bool,
}

impl InputSpec {
    pub fn required(name: impl Into<String>, input_type: InputType) -> Self {
        Self {
            name: name.into(),
            input_type,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, input_type: InputType) -> Self {
        Self {
            name: name.into(),
            input_type,
            required: false,
        }
    }
}

/// Public description of a node kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSchema {
    pub kind: String,
    pub display_name: String,
    pub category: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<ValueType>,
    /// Output nodes produce side effects (files) rather than values.
    pub output_node: bool,
}

/// Checkpoint plus any LoRAs applied on top of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHandle {
    pub checkpoint: PathBuf,
    pub loras: Vec<AppliedLora>,
}

impl ModelHandle {
    pub fn new(checkpoint: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            loras: Vec::new(),
        }
    }

    pub fn with_lora(mut self, path: impl Into<PathBuf>, strength: f64) -> Self {
        self.loras.push(AppliedLora {
            path: path.into(),
            strength,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedLora {
    pub path: PathBuf,
    pub strength: f64,
}

/// A value passed into or out of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Int(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Images(ImageBatch),
    Model(ModelHandle),
    Clip(ModelHandle),
    Vae(ModelHandle),
}

impl NodeValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Boolean(_) => ValueType::Boolean,
            Self::String(_) => ValueType::String,
            Self::Images(_) => ValueType::Image,
            Self::Model(_) => ValueType::Model,
            Self::Clip(_) => ValueType::Clip,
            Self::Vae(_) => ValueType::Vae,
        }
    }

    /// Convert a widget literal into a value of the declared type.
    pub fn from_literal(name: &str, input_type: &InputType, literal: &Value) -> Result<Self, NodeError> {
        let invalid = || NodeError::InvalidLiteral {
            name: name.to_string(),
            expected: input_type.value_type(),
            literal: literal.clone(),
        };
        match input_type {
            InputType::Int { .. } => literal.as_i64().map(Self::Int).ok_or_else(invalid),
            InputType::Float { .. } => literal.as_f64().map(Self::Float).ok_or_else(invalid),
            InputType::Boolean { .. } => literal.as_bool().map(Self::Boolean).ok_or_else(invalid),
            InputType::String { .. } | InputType::Combo { .. } => literal
                .as_str()
                .map(|s| Self::String(s.to_string()))
                .ok_or_else(invalid),
            InputType::Link { .. } => Err(invalid()),
        }
    }
}

/// Errors raised while invoking a node.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    #[error("Unknown node kind: {0}")]
    UnknownKind(String),
    #[error("Missing required input '{0}'")]
    MissingInput(String),
    #[error("Input '{name}' expected {expected:?}, got {found:?}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        found: ValueType,
    },
    #[error("Input '{name}' expected a {expected:?} literal, got {literal}")]
    InvalidLiteral {
        name: String,
        expected: ValueType,
        literal: Value,
    },
    #[error("Node failed: {0}")]
    Failed(String),
}

impl NodeError {
    pub fn failed(message: impl ToString) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Resolved inputs handed to a node handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs {
    values: HashMap<String, NodeValue>,
}

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: NodeValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: NodeValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&NodeValue, NodeError> {
        self.values
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    fn mismatch(name: &str, expected: ValueType, found: &NodeValue) -> NodeError {
        NodeError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: found.value_type(),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, NodeError> {
        match self.get(name)? {
            NodeValue::Int(v) => Ok(*v),
            other => Err(Self::mismatch(name, ValueType::Int, other)),
        }
    }

    /// Integers are accepted where floats are expected.
    pub fn float(&self, name: &str) -> Result<f64, NodeError> {
        match self.get(name)? {
            NodeValue::Float(v) => Ok(*v),
            NodeValue::Int(v) => Ok(*v as f64),
            other => Err(Self::mismatch(name, ValueType::Float, other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, NodeError> {
        match self.get(name)? {
            NodeValue::Boolean(v) => Ok(*v),
            other => Err(Self::mismatch(name, ValueType::Boolean, other)),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, NodeError> {
        match self.get(name)? {
            NodeValue::String(v) => Ok(v),
            other => Err(Self::mismatch(name, ValueType::String, other)),
        }
    }

    pub fn images(&self, name: &str) -> Result<&ImageBatch, NodeError> {
        match self.get(name)? {
            NodeValue::Images(v) => Ok(v),
            other => Err(Self::mismatch(name, ValueType::Image, other)),
        }
    }

    pub fn model(&self, name: &str) -> Result<&ModelHandle, NodeError> {
        match self.get(name)? {
            NodeValue::Model(v) => Ok(v),
            other => Err(Self::mismatch(name, ValueType::Model, other)),
        }
    }

    pub fn clip(&self, name: &str) -> Result<&ModelHandle, NodeError> {
        match self.get(name)? {
            NodeValue::Clip(v) => Ok(v),
            other => Err(Self::mismatch(name, ValueType::Clip, other)),
        }
    }
}

/// What a node hands back: positional output values plus optional UI data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    pub values: Vec<NodeValue>,
    pub ui: Option<Value>,
}

impl NodeOutput {
    pub fn values(values: Vec<NodeValue>) -> Self {
        Self { values, ui: None }
    }

    pub fn single(value: NodeValue) -> Self {
        Self::values(vec![value])
    }

    pub fn ui(ui: Value) -> Self {
        Self {
            values: Vec::new(),
            ui: Some(ui),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combo_defaults_to_first_option() {
        let combo = InputType::combo(&["square", "landscape_4_3"], None);
        assert_eq!(combo.default_value(), Some(json!("square")));

        let explicit = InputType::combo(&["1", "2"], Some("2"));
        assert_eq!(explicit.default_value(), Some(json!("2")));
        assert_eq!(InputType::link(ValueType::Image).default_value(), None);
    }

    #[test]
    fn input_spec_serializes_flat() {
        let spec = InputSpec::required("num_images", InputType::int_range(1, 1, 10));
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"name": "num_images", "type": "INT", "default": 1, "min": 1, "max": 10, "required": true})
        );
    }

    #[test]
    fn literals_follow_declared_type() {
        let value = NodeValue::from_literal("steps", &InputType::int(1), &json!(28)).unwrap();
        assert_eq!(value, NodeValue::Int(28));

        let err = NodeValue::from_literal("steps", &InputType::int(1), &json!("28")).unwrap_err();
        assert!(matches!(err, NodeError::InvalidLiteral { .. }));

        let size = NodeValue::from_literal(
            "image_size",
            &InputType::combo(&["square"], None),
            &json!("square"),
        )
        .unwrap();
        assert_eq!(size, NodeValue::String("square".into()));
    }

    #[test]
    fn typed_getters_report_mismatch() {
        let inputs = NodeInputs::new()
            .with("seed", NodeValue::Int(-1))
            .with("prompt", NodeValue::String("fox".into()));

        assert_eq!(inputs.float("seed").unwrap(), -1.0);
        assert!(matches!(
            inputs.boolean("prompt"),
            Err(NodeError::TypeMismatch { expected: ValueType::Boolean, found: ValueType::String, .. })
        ));
        assert_eq!(inputs.int("missing"), Err(NodeError::MissingInput("missing".into())));
    }
}
