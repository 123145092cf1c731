//! Custom node kinds contributed to the host.
//!
//! The registry maps a kind tag (`FluxDev_fal`, ...) to its schema and handler.
//! Invoking a node fills declared defaults for absent inputs before calling the
//! handler; range checks are left to the host's widgets.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use falbridge_domain::{NodeError, NodeInputs, NodeOutput, NodeSchema, NodeValue};

pub mod generation;
pub mod loaders;
pub mod save_image;
pub mod values;

use crate::infrastructure::folders::HostFolders;
use crate::infrastructure::ports::{MediaFetchPort, ModelApiPort, WeightsPort};

/// Hidden per-execution data available to every handler.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// API-format workflow being executed
    pub prompt: Option<Value>,
    /// UI metadata keyed by name (`workflow`, ...)
    pub extra_pnginfo: Option<Value>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(
        &self,
        inputs: NodeInputs,
        context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError>;
}

/// A registered node kind.
pub struct NodeDescriptor {
    pub schema: NodeSchema,
    handler: Arc<dyn NodeHandler>,
}

/// Services node handlers depend on.
#[derive(Clone)]
pub struct NodeServices {
    pub models: Arc<dyn ModelApiPort>,
    pub fetcher: Arc<dyn MediaFetchPort>,
    pub weights: Arc<dyn WeightsPort>,
    pub folders: HostFolders,
    pub disable_metadata: bool,
}

#[derive(Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, NodeDescriptor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node kind the bridge contributes.
    pub fn standard(services: NodeServices) -> Self {
        let mut registry = Self::new();
        values::register(&mut registry);
        generation::register(&mut registry, services.models.clone(), services.fetcher.clone());
        loaders::register(&mut registry, services.weights.clone());
        save_image::register(&mut registry, services.folders, services.disable_metadata);
        registry
    }

    /// Add a node kind, replacing any previous registration with the same tag.
    pub fn register(&mut self, schema: NodeSchema, handler: Arc<dyn NodeHandler>) {
        self.nodes
            .insert(schema.kind.clone(), NodeDescriptor { schema, handler });
    }

    pub fn get(&self, kind: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(kind)
    }

    /// Schemas of all registered kinds, sorted by kind tag.
    pub fn schemas(&self) -> Vec<&NodeSchema> {
        self.nodes.values().map(|d| &d.schema).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run `kind` with `inputs`, filling in declared defaults first.
    pub async fn invoke(
        &self,
        kind: &str,
        mut inputs: NodeInputs,
        context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        let descriptor = self
            .nodes
            .get(kind)
            .ok_or_else(|| NodeError::UnknownKind(kind.to_string()))?;

        for spec in &descriptor.schema.inputs {
            if inputs.contains(&spec.name) {
                continue;
            }
            match spec.input_type.default_value() {
                Some(default) => {
                    let value = NodeValue::from_literal(&spec.name, &spec.input_type, &default)?;
                    inputs.insert(spec.name.clone(), value);
                }
                None if spec.required => return Err(NodeError::MissingInput(spec.name.clone())),
                None => {}
            }
        }

        tracing::debug!(kind, "Invoking node");
        descriptor.handler.run(inputs, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use falbridge_domain::{InputSpec, InputType, ValueType};

    fn schema() -> NodeSchema {
        NodeSchema {
            kind: "Echo".to_string(),
            display_name: "Echo".to_string(),
            category: "test".to_string(),
            inputs: vec![
                InputSpec::required("text", InputType::string("hello")),
                InputSpec::required("model", InputType::link(ValueType::Model)),
                InputSpec::optional("seed", InputType::int(-1)),
            ],
            outputs: vec![ValueType::String],
            output_node: false,
        }
    }

    #[tokio::test]
    async fn fills_defaults_before_running() {
        let mut handler = MockNodeHandler::new();
        handler
            .expect_run()
            .withf(|inputs, _| {
                inputs.string("text").ok() == Some("hello") && inputs.int("seed").ok() == Some(-1)
            })
            .times(1)
            .returning(|inputs, _| {
                Ok(NodeOutput::single(NodeValue::String(
                    inputs.string("text")?.to_string(),
                )))
            });

        let mut registry = NodeRegistry::new();
        registry.register(schema(), Arc::new(handler));

        let inputs = NodeInputs::new().with(
            "model",
            NodeValue::Model(falbridge_domain::ModelHandle::new("/m.safetensors")),
        );
        let output = registry
            .invoke("Echo", inputs, &ExecutionContext::default())
            .await
            .expect("node runs");
        assert_eq!(output.values, vec![NodeValue::String("hello".to_string())]);
    }

    #[tokio::test]
    async fn missing_link_is_reported() {
        let mut handler = MockNodeHandler::new();
        handler.expect_run().never();

        let mut registry = NodeRegistry::new();
        registry.register(schema(), Arc::new(handler));

        let result = registry
            .invoke("Echo", NodeInputs::new(), &ExecutionContext::default())
            .await;
        assert_eq!(result, Err(NodeError::MissingInput("model".to_string())));
    }

    #[tokio::test]
    async fn unknown_kind_is_reported() {
        let registry = NodeRegistry::new();
        let result = registry
            .invoke("Nope", NodeInputs::new(), &ExecutionContext::default())
            .await;
        assert_eq!(result, Err(NodeError::UnknownKind("Nope".to_string())));
    }
}
