//! Build the request body for the remote workflow endpoint.

use std::sync::Arc;

use serde_json::Value;

use falbridge_domain::{collect_named_inputs, Payload, WorkflowGraph};

use crate::use_cases::error::BridgeError;
use crate::use_cases::uploads::UploadInputFiles;

pub struct BuildPayload {
    uploads: Arc<UploadInputFiles>,
}

impl BuildPayload {
    pub fn new(uploads: Arc<UploadInputFiles>) -> Self {
        Self { uploads }
    }

    /// Named inputs are validated before any file is uploaded, so an invalid
    /// graph fails without side effects.
    pub async fn execute(
        &self,
        graph: &WorkflowGraph,
        ui_graph: Option<Value>,
        dry_run: bool,
    ) -> Result<Payload, BridgeError> {
        let named_inputs = collect_named_inputs(graph)?;
        let files = self.uploads.execute(graph, dry_run).await?;

        tracing::debug!(
            files = files.len(),
            named_inputs = named_inputs.len(),
            dry_run,
            "Assembling payload"
        );
        Ok(Payload::assemble(graph, ui_graph, &files, &named_inputs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::LruCache;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::folders::{FolderType, HostFolders};
    use crate::infrastructure::ports::MockFileStoragePort;
    use falbridge_domain::{NodeSpec, WorkflowError, DRY_RUN_FILE_URL};
    use serde_json::json;

    fn build_payload(storage: MockFileStoragePort) -> BuildPayload {
        build_payload_in(storage, HostFolders::new("/nonexistent"))
    }

    fn build_payload_in(storage: MockFileStoragePort, folders: HostFolders) -> BuildPayload {
        let uploads = UploadInputFiles::new(
            Arc::new(storage),
            folders,
            Arc::new(LruCache::new(16, Arc::new(SystemClock::new()))),
        );
        BuildPayload::new(Arc::new(uploads))
    }

    fn graph() -> WorkflowGraph {
        WorkflowGraph::new()
            .with_node("1", NodeSpec::new("LoadImage").with_input("image", "cat.png"))
            .with_node(
                "2",
                NodeSpec::new("StringInput_fal")
                    .with_input("name", "prompt")
                    .with_input("value", "a cat"),
            )
            .with_node(
                "3",
                NodeSpec::new("IntegerInput_fal")
                    .with_input("name", "steps")
                    .with_input("number", 20),
            )
            .with_node(
                "4",
                NodeSpec::new("KSampler")
                    .with_link("positive", "2", 0)
                    .with_link("steps", "3", 0)
                    .with_link("latent_image", "1", 0),
            )
    }

    #[tokio::test]
    async fn dry_run_publishes_files_and_named_inputs() {
        let mut storage = MockFileStoragePort::new();
        storage.expect_upload().never();

        let payload = build_payload(storage)
            .execute(&graph(), Some(json!({"nodes": []})), true)
            .await
            .expect("payload");

        assert_eq!(payload.fal_inputs.len(), 3);
        assert_eq!(payload.fal_inputs["loadimage_1"], DRY_RUN_FILE_URL);
        assert_eq!(payload.fal_inputs["prompt"], "a cat");
        assert_eq!(payload.fal_inputs["steps"], 20);
        assert_eq!(
            payload.extra_data.extra_pnginfo,
            Some(json!({"nodes": []}))
        );
    }

    #[tokio::test]
    async fn dry_run_differs_from_a_real_build_only_in_file_urls() {
        const UPLOADED: &str = "https://v3.fal.media/files/cat.png";

        let dir = tempfile::tempdir().expect("tempdir");
        let folders = HostFolders::new(dir.path());
        std::fs::create_dir_all(folders.directory(FolderType::Input)).expect("mkdir");
        std::fs::write(folders.annotated_filepath("cat.png"), b"meow").expect("write");

        let mut storage = MockFileStoragePort::new();
        storage
            .expect_upload()
            .times(1)
            .returning(|_, _, _| Ok(UPLOADED.to_string()));
        let real = build_payload_in(storage, folders.clone())
            .execute(&graph(), Some(json!({"nodes": []})), false)
            .await
            .expect("real payload");

        let mut idle = MockFileStoragePort::new();
        idle.expect_upload().never();
        let dry = build_payload_in(idle, folders)
            .execute(&graph(), Some(json!({"nodes": []})), true)
            .await
            .expect("dry-run payload");

        assert_ne!(real, dry);
        let swapped = serde_json::to_string(&real)
            .expect("serialize")
            .replace(UPLOADED, DRY_RUN_FILE_URL);
        let swapped: Payload = serde_json::from_str(&swapped).expect("deserialize");
        assert_eq!(swapped, dry);
    }

    #[tokio::test]
    async fn duplicate_names_fail_before_uploading() {
        let mut storage = MockFileStoragePort::new();
        storage.expect_upload().never();

        let graph = graph()
            .with_node(
                "5",
                NodeSpec::new("FloatInput_fal")
                    .with_input("name", "steps")
                    .with_input("number", 1.5),
            )
            .with_node("6", NodeSpec::new("KSampler").with_link("cfg", "5", 0));

        let result = build_payload(storage).execute(&graph, None, false).await;

        match result {
            Err(BridgeError::Workflow(WorkflowError::DuplicateInputName {
                name,
                first,
                second,
            })) => {
                assert_eq!(name, "steps");
                assert_eq!(first.node_id, "3");
                assert_eq!(second.node_id, "5");
            }
            other => panic!("expected duplicate name error, got {other:?}"),
        }
    }
}
