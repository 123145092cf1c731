//! Text-to-image nodes backed by hosted Flux models.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use falbridge_domain::{
    ImageBatch, InputSpec, InputType, NodeError, NodeInputs, NodeOutput, NodeSchema, NodeValue,
    RgbImage, ValueType,
};

use super::{ExecutionContext, NodeHandler, NodeRegistry};
use crate::infrastructure::ports::{MediaFetchPort, ModelApiPort};

const CATEGORY: &str = "FAL";
const IMAGE_SIZES: [&str; 6] = [
    "square_hd",
    "square",
    "portrait_4_3",
    "portrait_16_9",
    "landscape_4_3",
    "landscape_16_9",
];
const SAFETY_TOLERANCES: [&str; 6] = ["1", "2", "3", "4", "5", "6"];
const PLACEHOLDER_SIZE: u32 = 512;
const NO_SEED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxVariant {
    Pro,
    Dev,
    Schnell,
}

impl FluxVariant {
    pub fn all() -> [FluxVariant; 3] {
        [Self::Pro, Self::Dev, Self::Schnell]
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pro => "FluxPro_fal",
            Self::Dev => "FluxDev_fal",
            Self::Schnell => "FluxSchnell_fal",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Pro => "fal-ai/flux-pro",
            Self::Dev => "fal-ai/flux/dev",
            Self::Schnell => "fal-ai/flux/schnell",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Self::Pro => "Flux Pro (fal)",
            Self::Dev => "Flux Dev (fal)",
            Self::Schnell => "Flux Schnell (fal)",
        }
    }

    fn default_steps(&self) -> i64 {
        match self {
            Self::Schnell => 4,
            Self::Pro | Self::Dev => 28,
        }
    }

    fn has_guidance(&self) -> bool {
        !matches!(self, Self::Schnell)
    }

    pub fn schema(&self) -> NodeSchema {
        let mut inputs = vec![
            InputSpec::required("prompt", InputType::multiline("")),
            InputSpec::required(
                "image_size",
                InputType::combo(&IMAGE_SIZES, Some("landscape_4_3")),
            ),
            InputSpec::required(
                "num_inference_steps",
                InputType::int_range(self.default_steps(), 1, 100),
            ),
        ];
        if self.has_guidance() {
            inputs.push(InputSpec::required(
                "guidance_scale",
                InputType::float_range(3.5, 0.0, 20.0, None),
            ));
        }
        inputs.push(InputSpec::required("num_images", InputType::int_range(1, 1, 10)));
        match self {
            Self::Pro => inputs.push(InputSpec::required(
                "safety_tolerance",
                InputType::combo(&SAFETY_TOLERANCES, Some("2")),
            )),
            Self::Dev | Self::Schnell => inputs.push(InputSpec::required(
                "enable_safety_checker",
                InputType::Boolean { default: true },
            )),
        }
        inputs.push(InputSpec::optional("seed", InputType::int(NO_SEED)));
        inputs.push(InputSpec::optional("api_key", InputType::string("")));

        NodeSchema {
            kind: self.kind().to_string(),
            display_name: self.display_name().to_string(),
            category: CATEGORY.to_string(),
            inputs,
            outputs: vec![ValueType::Image],
            output_node: false,
        }
    }

    /// Request arguments for the hosted model.
    pub fn arguments(&self, inputs: &NodeInputs) -> Result<Value, NodeError> {
        let mut arguments = Map::new();
        arguments.insert("prompt".into(), json!(inputs.string("prompt")?));
        arguments.insert("image_size".into(), json!(inputs.string("image_size")?));
        arguments.insert(
            "num_inference_steps".into(),
            json!(inputs.int("num_inference_steps")?),
        );
        if self.has_guidance() {
            arguments.insert("guidance_scale".into(), json!(inputs.float("guidance_scale")?));
        }
        arguments.insert("num_images".into(), json!(inputs.int("num_images")?));
        match self {
            Self::Pro => {
                arguments.insert(
                    "safety_tolerance".into(),
                    json!(inputs.string("safety_tolerance")?),
                );
            }
            Self::Dev | Self::Schnell => {
                arguments.insert(
                    "enable_safety_checker".into(),
                    json!(inputs.boolean("enable_safety_checker")?),
                );
            }
        }

        let seed = inputs.int("seed").unwrap_or(NO_SEED);
        if seed != NO_SEED {
            arguments.insert("seed".into(), json!(seed));
        }
        Ok(Value::Object(arguments))
    }
}

pub struct FluxNode {
    variant: FluxVariant,
    models: Arc<dyn ModelApiPort>,
    fetcher: Arc<dyn MediaFetchPort>,
}

impl FluxNode {
    pub fn new(
        variant: FluxVariant,
        models: Arc<dyn ModelApiPort>,
        fetcher: Arc<dyn MediaFetchPort>,
    ) -> Self {
        Self {
            variant,
            models,
            fetcher,
        }
    }

    async fn generate(&self, inputs: &NodeInputs) -> Result<ImageBatch, NodeError> {
        let arguments = self.variant.arguments(inputs)?;
        let api_key = inputs
            .string("api_key")
            .ok()
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        let result = self
            .models
            .run(self.variant.endpoint(), arguments, api_key)
            .await
            .map_err(NodeError::failed)?;

        let urls = result
            .get("images")
            .and_then(Value::as_array)
            .ok_or_else(|| NodeError::failed("Result has no images"))?
            .iter()
            .map(|image| {
                image
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| NodeError::failed("Image entry has no url"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut images = Vec::with_capacity(urls.len());
        for url in urls {
            let bytes = self.fetcher.fetch(url).await.map_err(NodeError::failed)?;
            images.push(decode_image(&bytes)?);
        }
        ImageBatch::stack(images).map_err(NodeError::failed)
    }
}

#[async_trait]
impl NodeHandler for FluxNode {
    async fn run(
        &self,
        inputs: NodeInputs,
        _context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        let batch = match self.generate(&inputs).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(
                    endpoint = self.variant.endpoint(),
                    error = %e,
                    "Image generation failed, returning a blank image"
                );
                ImageBatch::black(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE)
            }
        };
        Ok(NodeOutput::single(NodeValue::Images(batch)))
    }
}

/// Decode PNG/JPEG bytes into a normalized RGB image.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, NodeError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(NodeError::failed)?
        .to_rgb8();
    let (width, height) = decoded.dimensions();
    RgbImage::from_rgb8(width, height, decoded.as_raw()).map_err(NodeError::failed)
}

pub fn register(
    registry: &mut NodeRegistry,
    models: Arc<dyn ModelApiPort>,
    fetcher: Arc<dyn MediaFetchPort>,
) {
    for variant in FluxVariant::all() {
        registry.register(
            variant.schema(),
            Arc::new(FluxNode::new(variant, models.clone(), fetcher.clone())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{
        FetchError, MockMediaFetchPort, MockModelApiPort, ModelApiError,
    };
    use mockall::predicate::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let buffer = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(buffer)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn registry(models: MockModelApiPort, fetcher: MockMediaFetchPort) -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        register(&mut registry, Arc::new(models), Arc::new(fetcher));
        registry
    }

    fn prompt(text: &str) -> NodeInputs {
        NodeInputs::new().with("prompt", NodeValue::String(text.to_string()))
    }

    #[test]
    fn schnell_has_no_guidance_and_fewer_steps() {
        let schema = FluxVariant::Schnell.schema();
        assert!(schema.inputs.iter().all(|i| i.name != "guidance_scale"));
        let steps = schema
            .inputs
            .iter()
            .find(|i| i.name == "num_inference_steps")
            .expect("steps input");
        assert_eq!(steps.input_type.default_value(), Some(json!(4)));
    }

    #[test]
    fn unset_seed_is_omitted() {
        let inputs = prompt("a fox")
            .with("image_size", NodeValue::String("square".into()))
            .with("num_inference_steps", NodeValue::Int(28))
            .with("guidance_scale", NodeValue::Float(3.5))
            .with("num_images", NodeValue::Int(1))
            .with("safety_tolerance", NodeValue::String("2".into()))
            .with("seed", NodeValue::Int(-1));

        let arguments = FluxVariant::Pro.arguments(&inputs).expect("arguments");
        assert_eq!(
            arguments,
            json!({
                "prompt": "a fox",
                "image_size": "square",
                "num_inference_steps": 28,
                "guidance_scale": 3.5,
                "num_images": 1,
                "safety_tolerance": "2"
            })
        );

        let seeded = inputs.with("seed", NodeValue::Int(7));
        assert_eq!(FluxVariant::Pro.arguments(&seeded).expect("arguments")["seed"], 7);
    }

    #[tokio::test]
    async fn fetches_and_stacks_every_image() {
        let mut models = MockModelApiPort::new();
        models
            .expect_run()
            .withf(|endpoint, arguments, api_key| {
                endpoint == "fal-ai/flux/dev"
                    && arguments["prompt"] == "a fox"
                    && arguments["enable_safety_checker"] == true
                    && api_key.as_deref() == Some("per-call")
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(json!({"images": [{"url": "https://cdn.fal/1.png"}, {"url": "https://cdn.fal/2.png"}]}))
            });

        let mut fetcher = MockMediaFetchPort::new();
        fetcher
            .expect_fetch()
            .with(eq("https://cdn.fal/1.png"))
            .returning(|_| Ok(png(2, 1, [255, 255, 255])));
        fetcher
            .expect_fetch()
            .with(eq("https://cdn.fal/2.png"))
            .returning(|_| Ok(png(2, 1, [0, 0, 0])));

        let output = registry(models, fetcher)
            .invoke(
                "FluxDev_fal",
                prompt("a fox").with("api_key", NodeValue::String("per-call".into())),
                &ExecutionContext::default(),
            )
            .await
            .expect("runs");

        match &output.values[0] {
            NodeValue::Images(batch) => {
                assert_eq!(batch.shape(), [2, 1, 2, 3]);
                assert_eq!(batch.frame(0).expect("frame"), &[1.0; 6]);
                assert_eq!(batch.frame(1).expect("frame"), &[0.0; 6]);
            }
            other => panic!("expected images, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_failure_yields_blank_image() {
        let mut models = MockModelApiPort::new();
        models
            .expect_run()
            .returning(|_, _, _| Err(ModelApiError::RequestFailed("401".to_string())));
        let mut fetcher = MockMediaFetchPort::new();
        fetcher.expect_fetch().never();

        let output = registry(models, fetcher)
            .invoke("FluxSchnell_fal", prompt("a fox"), &ExecutionContext::default())
            .await
            .expect("never fails");

        assert_eq!(output.values, vec![NodeValue::Images(ImageBatch::black(512, 512))]);
    }

    #[tokio::test]
    async fn failed_image_fetch_yields_blank_image() {
        let mut models = MockModelApiPort::new();
        models
            .expect_run()
            .returning(|_, _, _| Ok(json!({"images": [{"url": "https://cdn.fal/1.png"}]})));
        let mut fetcher = MockMediaFetchPort::new();
        fetcher.expect_fetch().returning(|url| {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        });

        let output = registry(models, fetcher)
            .invoke("FluxPro_fal", prompt("a fox"), &ExecutionContext::default())
            .await
            .expect("never fails");

        assert_eq!(output.values, vec![NodeValue::Images(ImageBatch::black(512, 512))]);
    }
}
