//! Loaders that fetch model weights by URL.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use falbridge_domain::{
    InputSpec, InputType, NodeError, NodeInputs, NodeOutput, NodeSchema, NodeValue, ValueType,
};

use super::{ExecutionContext, NodeHandler, NodeRegistry};
use crate::infrastructure::ports::WeightsPort;

const CATEGORY: &str = "loaders";
pub const DEFAULT_WEIGHTS_URL: &str =
    "https://huggingface.co/nerijs/pixel-art-xl/resolve/main/pixel-art-xl.safetensors";

fn strength() -> InputType {
    InputType::float_range(1.0, -20.0, 20.0, Some(0.01))
}

pub struct RemoteLoraLoader {
    weights: Arc<dyn WeightsPort>,
    /// URL and local path of the most recently applied LoRA.
    loaded: Mutex<Option<(String, PathBuf)>>,
}

impl RemoteLoraLoader {
    pub const KIND: &'static str = "RemoteLoraLoader_fal";

    pub fn new(weights: Arc<dyn WeightsPort>) -> Self {
        Self {
            weights,
            loaded: Mutex::new(None),
        }
    }

    pub fn schema() -> NodeSchema {
        NodeSchema {
            kind: Self::KIND.to_string(),
            display_name: "Load LoRA from URL (fal)".to_string(),
            category: CATEGORY.to_string(),
            inputs: vec![
                InputSpec::required("model", InputType::link(ValueType::Model)),
                InputSpec::required("clip", InputType::link(ValueType::Clip)),
                InputSpec::required("lora_url", InputType::string(DEFAULT_WEIGHTS_URL)),
                InputSpec::required("strength_model", strength()),
                InputSpec::required("strength_clip", strength()),
            ],
            outputs: vec![ValueType::Model, ValueType::Clip],
            output_node: false,
        }
    }

    pub async fn last_loaded(&self) -> Option<PathBuf> {
        self.loaded.lock().await.as_ref().map(|(_, path)| path.clone())
    }
}

#[async_trait]
impl NodeHandler for RemoteLoraLoader {
    async fn run(
        &self,
        inputs: NodeInputs,
        _context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        let model = inputs.model("model")?;
        let clip = inputs.clip("clip")?;
        let strength_model = inputs.float("strength_model")?;
        let strength_clip = inputs.float("strength_clip")?;

        if strength_model == 0.0 && strength_clip == 0.0 {
            return Ok(NodeOutput::values(vec![
                NodeValue::Model(model.clone()),
                NodeValue::Clip(clip.clone()),
            ]));
        }

        let url = inputs.string("lora_url")?;
        let mut loaded = self.loaded.lock().await;
        let path = match loaded.as_ref() {
            Some((loaded_url, path)) if loaded_url == url => path.clone(),
            _ => self.weights.fetch_weights(url).await.map_err(NodeError::failed)?,
        };
        tracing::debug!(url, path = %path.display(), "Applying LoRA");
        *loaded = Some((url.to_string(), path.clone()));

        Ok(NodeOutput::values(vec![
            NodeValue::Model(model.clone().with_lora(path.clone(), strength_model)),
            NodeValue::Clip(clip.clone().with_lora(path, strength_clip)),
        ]))
    }
}

pub struct RemoteCheckpointLoader {
    weights: Arc<dyn WeightsPort>,
}

impl RemoteCheckpointLoader {
    pub const KIND: &'static str = "RemoteCheckpointLoader_fal";

    pub fn new(weights: Arc<dyn WeightsPort>) -> Self {
        Self { weights }
    }

    pub fn schema() -> NodeSchema {
        NodeSchema {
            kind: Self::KIND.to_string(),
            display_name: "Load Checkpoint from URL (fal)".to_string(),
            category: CATEGORY.to_string(),
            inputs: vec![InputSpec::required(
                "ckpt_url",
                InputType::string(DEFAULT_WEIGHTS_URL),
            )],
            outputs: vec![ValueType::Model, ValueType::Clip, ValueType::Vae],
            output_node: false,
        }
    }
}

#[async_trait]
impl NodeHandler for RemoteCheckpointLoader {
    async fn run(
        &self,
        inputs: NodeInputs,
        _context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        let url = inputs.string("ckpt_url")?;
        let path = self
            .weights
            .fetch_weights(url)
            .await
            .map_err(NodeError::failed)?;
        tracing::debug!(url, path = %path.display(), "Loaded checkpoint");

        let handle = falbridge_domain::ModelHandle::new(path);
        Ok(NodeOutput::values(vec![
            NodeValue::Model(handle.clone()),
            NodeValue::Clip(handle.clone()),
            NodeValue::Vae(handle),
        ]))
    }
}

pub fn register(registry: &mut NodeRegistry, weights: Arc<dyn WeightsPort>) {
    registry.register(
        RemoteLoraLoader::schema(),
        Arc::new(RemoteLoraLoader::new(weights.clone())),
    );
    registry.register(
        RemoteCheckpointLoader::schema(),
        Arc::new(RemoteCheckpointLoader::new(weights)),
    );
}
