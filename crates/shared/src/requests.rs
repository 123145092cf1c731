//! Request bodies sent by the host UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use falbridge_domain::WorkflowGraph;

/// Body of `POST /fal/execute` and `POST /fal/save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Required by execute; save ignores it.
    #[serde(default)]
    pub client_id: Option<String>,
    /// API-format workflow graph.
    pub output: WorkflowGraph,
    /// UI-format workflow, forwarded as PNG metadata.
    #[serde(default)]
    pub workflow: Option<Value>,
}

/// Body of `POST /fal/download`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub files: Vec<DownloadFile>,
}

/// One remote output to store in a host folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadFile {
    /// May carry a host folder annotation, e.g. `"img.png [temp]"`.
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Folder type (`output`, `input`, `temp`); empty means `output`.
    #[serde(rename = "type", default)]
    pub folder_type: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_request_without_client_id() {
        let request: PromptRequest = serde_json::from_value(json!({
            "output": {"1": {"class_type": "LoadImage", "inputs": {"image": "a.png"}}},
            "workflow": {"nodes": []}
        }))
        .unwrap();

        assert!(request.client_id.is_none());
        assert_eq!(request.output.len(), 1);
    }

    #[test]
    fn download_file_type_field() {
        let request: DownloadRequest = serde_json::from_value(json!({
            "files": [{"filename": "a.png", "subfolder": "", "type": "temp", "url": "https://x/a.png"}]
        }))
        .unwrap();

        assert_eq!(request.files[0].folder_type, "temp");
    }
}
