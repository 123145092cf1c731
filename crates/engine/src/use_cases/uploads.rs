//! Upload local media referenced by loader nodes.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use falbridge_domain::{InputKey, MediaKind, NodeRef, UploadedFile, WorkflowGraph, DRY_RUN_FILE_URL};

use crate::infrastructure::cache::{UploadCache, UploadKey};
use crate::infrastructure::folders::HostFolders;
use crate::infrastructure::ports::FileStoragePort;
use crate::use_cases::error::BridgeError;

/// Replace every loader node's local file with a remote URL.
pub struct UploadInputFiles {
    storage: Arc<dyn FileStoragePort>,
    folders: HostFolders,
    cache: Arc<UploadCache>,
}

impl UploadInputFiles {
    pub fn new(
        storage: Arc<dyn FileStoragePort>,
        folders: HostFolders,
        cache: Arc<UploadCache>,
    ) -> Self {
        Self {
            storage,
            folders,
            cache,
        }
    }

    /// Upload the files in graph order. With `dry_run` nothing is read or sent and
    /// every URL is the placeholder.
    ///
    /// Stops at the first failure; earlier uploads are kept.
    pub async fn execute(
        &self,
        graph: &WorkflowGraph,
        dry_run: bool,
    ) -> Result<Vec<UploadedFile>, BridgeError> {
        let mut uploaded = Vec::new();

        for (node_id, node) in graph.iter() {
            let Some(kind) = MediaKind::from_class_type(&node.class_type) else {
                continue;
            };
            let field = kind.field();
            let failed = |message: String| BridgeError::FileUploadFailed {
                node: NodeRef::new(node_id, &node.class_type),
                message,
            };

            let reference = node
                .input(field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| failed(format!("Input '{field}' is not a file reference")))?;

            let url = if dry_run {
                DRY_RUN_FILE_URL.to_string()
            } else {
                let path = self.folders.annotated_filepath(reference);
                self.upload_file(&path).await.map_err(failed)?
            };

            uploaded.push(UploadedFile {
                key: InputKey::new(node_id, field),
                url,
                class_type: node.class_type.clone(),
            });
        }

        Ok(uploaded)
    }

    async fn upload_file(&self, path: &Path) -> Result<String, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("{}: {e}", path.display()))?;
        let absolute = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        let key = UploadKey::new(absolute, content_hash(&bytes));

        if let Some(url) = self.cache.get(&key).await {
            tracing::debug!(path = %path.display(), "Upload cache hit");
            return Ok(url);
        }

        let file_name = file_name(path);
        let mime = content_type(path);
        let url = self
            .storage
            .upload(&file_name, mime.essence_str(), bytes)
            .await
            .map_err(|e| e.to_string())?;

        tracing::info!(path = %path.display(), url = %url, "Uploaded input file");
        self.cache.insert(key, url.clone()).await;
        Ok(url)
    }
}

/// Hex SHA-256 of file contents.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

/// MIME type guessed from the file extension.
pub fn content_type(path: &Path) -> mime_guess::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::LruCache;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::ports::{MockFileStoragePort, StorageError};
    use falbridge_domain::NodeSpec;
    use mockall::predicate::*;

    fn cache() -> Arc<UploadCache> {
        Arc::new(LruCache::new(128, Arc::new(SystemClock::new())))
    }

    fn host_with_image(name: &str, contents: &[u8]) -> (tempfile::TempDir, HostFolders) {
        let dir = tempfile::tempdir().expect("tempdir");
        let folders = HostFolders::new(dir.path());
        std::fs::create_dir_all(folders.directory(crate::infrastructure::folders::FolderType::Input))
            .expect("mkdir");
        std::fs::write(folders.annotated_filepath(name), contents).expect("write");
        (dir, folders)
    }

    fn graph() -> WorkflowGraph {
        WorkflowGraph::new()
            .with_node("1", NodeSpec::new("LoadImage").with_input("image", "cat.png"))
            .with_node("2", NodeSpec::new("KSampler").with_input("seed", 5))
    }

    #[tokio::test]
    async fn dry_run_never_touches_storage() {
        let mut storage = MockFileStoragePort::new();
        storage.expect_upload().never();

        let use_case = UploadInputFiles::new(
            Arc::new(storage),
            HostFolders::new("/nonexistent"),
            cache(),
        );
        let files = use_case.execute(&graph(), true).await.expect("dry run");

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].url, DRY_RUN_FILE_URL);
        assert_eq!(files[0].key, InputKey::new("1", "image"));
        assert_eq!(files[0].class_type, "LoadImage");
    }

    #[tokio::test]
    async fn unchanged_file_is_uploaded_once() {
        let (_dir, folders) = host_with_image("cat.png", b"meow");
        let mut storage = MockFileStoragePort::new();
        storage
            .expect_upload()
            .with(eq("cat.png"), eq("image/png"), eq(b"meow".to_vec()))
            .times(1)
            .returning(|_, _, _| Ok("https://cdn.fal/cat.png".to_string()));

        let use_case = UploadInputFiles::new(Arc::new(storage), folders, cache());

        let first = use_case.execute(&graph(), false).await.expect("first upload");
        let second = use_case.execute(&graph(), false).await.expect("cached upload");

        assert_eq!(first[0].url, "https://cdn.fal/cat.png");
        assert_eq!(second[0].url, "https://cdn.fal/cat.png");
    }

    #[tokio::test]
    async fn edited_file_is_uploaded_again() {
        let (_dir, folders) = host_with_image("cat.png", b"meow");
        let path = folders.annotated_filepath("cat.png");
        let mut storage = MockFileStoragePort::new();
        let mut seq = mockall::Sequence::new();
        storage
            .expect_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("https://cdn.fal/v1.png".to_string()));
        storage
            .expect_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("https://cdn.fal/v2.png".to_string()));

        let use_case = UploadInputFiles::new(Arc::new(storage), folders, cache());
        use_case.execute(&graph(), false).await.expect("first upload");
        std::fs::write(&path, b"purr").expect("rewrite");
        let files = use_case.execute(&graph(), false).await.expect("second upload");

        assert_eq!(files[0].url, "https://cdn.fal/v2.png");
    }

    #[tokio::test]
    async fn storage_failure_names_the_loader_node() {
        let (_dir, folders) = host_with_image("cat.png", b"meow");
        let mut storage = MockFileStoragePort::new();
        storage
            .expect_upload()
            .returning(|_, _, _| Err(StorageError::UploadFailed("503".to_string())));

        let use_case = UploadInputFiles::new(Arc::new(storage), folders, cache());
        let result = use_case.execute(&graph(), false).await;

        match result {
            Err(BridgeError::FileUploadFailed { node, .. }) => {
                assert_eq!(node, NodeRef::new("1", "LoadImage"));
            }
            other => panic!("expected upload failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_fails_without_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut storage = MockFileStoragePort::new();
        storage.expect_upload().never();

        let use_case =
            UploadInputFiles::new(Arc::new(storage), HostFolders::new(dir.path()), cache());
        let result = use_case.execute(&graph(), false).await;

        assert!(matches!(result, Err(BridgeError::FileUploadFailed { .. })));
    }

    #[test]
    fn content_types_by_extension() {
        let essence = |name: &str| content_type(Path::new(name)).essence_str().to_string();
        assert_eq!(essence("a.PNG"), "image/png");
        assert_eq!(essence("clip.mp4"), "video/mp4");
        assert_eq!(essence("scan.tiff"), "image/tiff");
        assert_eq!(essence("photo.avif"), "image/avif");
        assert_eq!(essence("reel.mpeg"), "video/mpeg");
        assert_eq!(essence("blob"), "application/octet-stream");
    }
}
