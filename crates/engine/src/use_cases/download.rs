//! Store remote outputs in the host's folders.

use std::path::PathBuf;
use std::sync::Arc;

use falbridge_shared::DownloadFile;

use crate::infrastructure::folders::{is_within, split_annotation, FolderType, HostFolders};
use crate::infrastructure::ports::{FetchError, MediaFetchPort};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid file name: {0}")]
    InvalidFilename(String),
    #[error("Unknown folder type: {0}")]
    UnknownFolderType(String),
    #[error("Subfolder escapes the target folder: {0}")]
    OutsideFolder(String),
    #[error("Download failed: {0}")]
    Failed(String),
}

impl DownloadError {
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidFilename(_) | Self::UnknownFolderType(_) => 400,
            Self::OutsideFolder(_) => 403,
            Self::Failed(_) => 500,
        }
    }
}

/// A validated download target.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTarget {
    pub url: String,
    pub directory: PathBuf,
    pub path: PathBuf,
}

pub struct DownloadOutputs {
    folders: HostFolders,
    fetcher: Arc<dyn MediaFetchPort>,
}

impl DownloadOutputs {
    pub fn new(folders: HostFolders, fetcher: Arc<dyn MediaFetchPort>) -> Self {
        Self { folders, fetcher }
    }

    /// Validate every entry, then download them in order.
    ///
    /// Nothing is written unless all entries are valid. Downloads answered
    /// with an error status are logged and skipped.
    pub async fn execute(&self, files: &[DownloadFile]) -> Result<usize, DownloadError> {
        let targets = files
            .iter()
            .map(|file| self.resolve(file))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stored = 0;
        for target in targets {
            tokio::fs::create_dir_all(&target.directory)
                .await
                .map_err(|e| DownloadError::Failed(e.to_string()))?;

            tracing::info!(url = %target.url, path = %target.path.display(), "Downloading output");
            match self.fetcher.download_to(&target.url, &target.path).await {
                Ok(bytes) => {
                    tracing::debug!(url = %target.url, bytes, "Downloaded output");
                    stored += 1;
                }
                Err(FetchError::Status { url, status }) => {
                    tracing::warn!(url = %url, status, "Failed to download output");
                }
                Err(e) => return Err(DownloadError::Failed(e.to_string())),
            }
        }
        Ok(stored)
    }

    /// Where `file` would be written.
    pub fn resolve(&self, file: &DownloadFile) -> Result<DownloadTarget, DownloadError> {
        let (name, annotated) = split_annotation(&file.filename);

        if name.starts_with('/') || name.contains("..") {
            return Err(DownloadError::InvalidFilename(file.filename.clone()));
        }

        let folder = match annotated {
            Some(folder) => folder,
            None => FolderType::parse(&file.folder_type)
                .ok_or_else(|| DownloadError::UnknownFolderType(file.folder_type.clone()))?,
        };
        let root = self.folders.directory(folder);
        let directory = root.join(&file.subfolder);
        if !is_within(root, &directory) {
            return Err(DownloadError::OutsideFolder(file.subfolder.clone()));
        }

        let base_name = std::path::Path::new(name)
            .file_name()
            .ok_or_else(|| DownloadError::InvalidFilename(file.filename.clone()))?;
        let path = directory.join(base_name);

        Ok(DownloadTarget {
            url: file.url.clone(),
            directory,
            path,
        })
    }
}
