//! Output node writing image batches as PNG files into the host's output folder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use falbridge_domain::{
    ImageBatch, InputSpec, InputType, NodeError, NodeInputs, NodeOutput, NodeSchema, ValueType,
};

use super::values::random_short_id;
use super::{ExecutionContext, NodeHandler, NodeRegistry};
use crate::infrastructure::folders::{is_within, HostFolders};

const BATCH_NUM: &str = "%batch_num%";

pub struct SaveImage {
    folders: HostFolders,
    disable_metadata: bool,
}

impl SaveImage {
    pub const KIND: &'static str = "SaveImage_fal";

    pub fn new(folders: HostFolders, disable_metadata: bool) -> Self {
        Self {
            folders,
            disable_metadata,
        }
    }

    pub fn schema() -> NodeSchema {
        NodeSchema {
            kind: Self::KIND.to_string(),
            display_name: "Save Image (fal)".to_string(),
            category: "image".to_string(),
            inputs: vec![
                InputSpec::required("images", InputType::link(ValueType::Image)),
                InputSpec::required("filename_prefix", InputType::string("ComfyUI")),
                InputSpec::required(
                    "output_name",
                    InputType::string(format!("output_{}", random_short_id())),
                ),
            ],
            outputs: Vec::new(),
            output_node: true,
        }
    }

    fn text_chunks(&self, context: &ExecutionContext) -> Result<Vec<(String, String)>, NodeError> {
        let mut chunks = Vec::new();
        if self.disable_metadata {
            return Ok(chunks);
        }
        if let Some(prompt) = &context.prompt {
            chunks.push(("prompt".to_string(), to_json(prompt)?));
        }
        if let Some(Value::Object(extra)) = &context.extra_pnginfo {
            for (key, value) in extra {
                chunks.push((key.clone(), to_json(value)?));
            }
        }
        Ok(chunks)
    }
}

#[async_trait]
impl NodeHandler for SaveImage {
    async fn run(
        &self,
        inputs: NodeInputs,
        context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        if inputs.string("output_name")?.is_empty() {
            return Err(NodeError::failed("Output name is required"));
        }
        let images = inputs.images("images")?;
        let target = SaveTarget::resolve(
            self.folders.output_directory(),
            inputs.string("filename_prefix")?,
        )?;

        tokio::fs::create_dir_all(&target.directory)
            .await
            .map_err(NodeError::failed)?;
        let mut counter = next_counter(&target.directory, &target.filename).await?;
        let chunks = self.text_chunks(context)?;

        let mut results = Vec::with_capacity(images.len());
        for batch_number in 0..images.len() {
            let filename = target.filename.replace(BATCH_NUM, &batch_number.to_string());
            let file = format!("{filename}_{counter:05}_.png");
            let encoded = encode_png(images, batch_number, &chunks)?;
            let path = target.directory.join(&file);
            tokio::fs::write(&path, encoded)
                .await
                .map_err(NodeError::failed)?;
            tracing::debug!(path = %path.display(), "Saved image");

            results.push(json!({
                "filename": file,
                "subfolder": target.subfolder,
                "type": "output",
            }));
            counter += 1;
        }

        Ok(NodeOutput::ui(json!({ "images": results })))
    }
}

/// Where a batch is written, derived from the filename prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTarget {
    pub directory: PathBuf,
    pub filename: String,
    pub subfolder: String,
}

impl SaveTarget {
    /// `prefix` may contain a subfolder (`portraits/hero`); it must stay inside `root`.
    pub fn resolve(root: &Path, prefix: &str) -> Result<Self, NodeError> {
        let (subfolder, filename) = match prefix.rsplit_once('/') {
            Some((subfolder, filename)) => (subfolder, filename),
            None => ("", prefix),
        };
        let directory = root.join(subfolder);
        if !is_within(root, &directory) {
            return Err(NodeError::failed(
                "Saving image outside the output folder is not allowed",
            ));
        }
        Ok(Self {
            directory,
            filename: filename.to_string(),
            subfolder: subfolder.to_string(),
        })
    }
}

/// One past the highest counter among `<filename>_<counter>_...` files in `directory`.
pub async fn next_counter(directory: &Path, filename: &str) -> Result<u32, NodeError> {
    let prefix = format!("{filename}_");
    let mut highest = 0;
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(NodeError::failed)?;
    while let Some(entry) = entries.next_entry().await.map_err(NodeError::failed)? {
        let name = entry.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
            continue;
        };
        let digits = rest.split('_').next().unwrap_or_default();
        if let Ok(counter) = digits.parse::<u32>() {
            highest = highest.max(counter);
        }
    }
    Ok(highest + 1)
}

fn to_json(value: &Value) -> Result<String, NodeError> {
    serde_json::to_string(value).map_err(NodeError::failed)
}

fn encode_png(
    images: &ImageBatch,
    index: usize,
    chunks: &[(String, String)],
) -> Result<Vec<u8>, NodeError> {
    let samples = images
        .frame_rgb8(index)
        .ok_or_else(|| NodeError::failed(format!("Image {index} is out of range")))?;

    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, images.width(), images.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Fast);
    for (keyword, text) in chunks {
        encoder
            .add_text_chunk(keyword.clone(), text.clone())
            .map_err(NodeError::failed)?;
    }
    let mut writer = encoder.write_header().map_err(NodeError::failed)?;
    writer
        .write_image_data(&samples)
        .map_err(NodeError::failed)?;
    writer.finish().map_err(NodeError::failed)?;
    Ok(bytes)
}

pub fn register(registry: &mut NodeRegistry, folders: HostFolders, disable_metadata: bool) {
    registry.register(
        SaveImage::schema(),
        Arc::new(SaveImage::new(folders, disable_metadata)),
    );
}
