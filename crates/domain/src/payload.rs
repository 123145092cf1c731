//! The request body sent to the remote workflow endpoint.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::named_input::NamedInput;
use crate::workflow::{InputKey, WorkflowGraph};

/// URL substituted for every file input when building without side effects.
pub const DRY_RUN_FILE_URL: &str = "example_url";

/// A local file reference replaced by a remote URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub key: InputKey,
    pub url: String,
    pub class_type: String,
}

/// Where a payload parameter came from in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputOrigin {
    pub key: InputKey,
    pub class_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_pnginfo: Option<Value>,
}

/// Wire body for the remote workflow endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub prompt: WorkflowGraph,
    pub extra_data: ExtraData,
    pub fal_inputs: BTreeMap<String, Value>,
    pub fal_inputs_dev_info: BTreeMap<String, InputOrigin>,
}

impl Payload {
    /// Assemble a payload from a graph, its UI metadata, uploaded files and named inputs.
    ///
    /// The prompt is a copy of `graph` with each uploaded file field pointing at its
    /// URL. Files are also published as `<class_type lowercased>_<n>`, numbered per
    /// class type in the order given. Named inputs are published under their names.
    pub fn assemble(
        graph: &WorkflowGraph,
        ui_graph: Option<Value>,
        files: &[UploadedFile],
        named_inputs: &[NamedInput],
    ) -> Result<Self, WorkflowError> {
        let mut prompt = graph.clone();
        let mut fal_inputs = BTreeMap::new();
        let mut dev_info = BTreeMap::new();
        let mut per_class: HashMap<String, usize> = HashMap::new();

        for file in files {
            prompt.set_input(&file.key, Value::String(file.url.clone()))?;

            let class_name = file.class_type.to_lowercase();
            let counter = per_class.entry(class_name.clone()).or_insert(0);
            *counter += 1;
            let input_name = format!("{class_name}_{counter}");

            fal_inputs.insert(input_name.clone(), Value::String(file.url.clone()));
            dev_info.insert(
                input_name,
                InputOrigin {
                    key: file.key.clone(),
                    class_type: file.class_type.clone(),
                },
            );
        }

        for input in named_inputs {
            fal_inputs.insert(input.name.clone(), input.value.clone());
            dev_info.insert(
                input.name.clone(),
                InputOrigin {
                    key: input.key.clone(),
                    class_type: input.kind.class_type().to_string(),
                },
            );
        }

        Ok(Self {
            prompt,
            extra_data: ExtraData {
                extra_pnginfo: ui_graph,
            },
            fal_inputs,
            fal_inputs_dev_info: dev_info,
        })
    }

    /// Drop the UI graph, as exported workflow definitions do not carry it.
    pub fn without_ui_metadata(mut self) -> Self {
        self.extra_data.extra_pnginfo = None;
        self
    }
}
