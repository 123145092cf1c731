//! Local store for remote model weights.
//!
//! Each URL gets its own directory named after the SHA-256 of the URL, holding
//! a single file. Downloads land in a `.part` file and are renamed into place
//! once complete and verified.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, USER_AGENT};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::infrastructure::media::write_chunks;
use crate::infrastructure::ports::{FetchError, WeightsError, WeightsPort};

const SAFETENSORS_EXTENSION: &str = ".safetensors";
/// Upper bound for a safetensors JSON header.
const MAX_HEADER_LEN: u64 = 100 * 1024 * 1024;

pub struct WeightsStore {
    client: Client,
    root: PathBuf,
    civitai_token: Option<String>,
    hf_token: Option<String>,
}

impl WeightsStore {
    pub fn new(
        root: impl Into<PathBuf>,
        civitai_token: Option<String>,
        hf_token: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            root: root.into(),
            civitai_token,
            hf_token,
        }
    }

    /// Directory holding the weights for `url`.
    pub fn directory_for(&self, url: &str) -> PathBuf {
        self.root.join(hash_url(url))
    }

    fn bearer_token(&self, url: &str) -> Option<&str> {
        let host = url::Url::parse(url).ok()?.host_str()?.to_string();
        let token = match host.as_str() {
            "civitai.com" => self.civitai_token.as_deref(),
            "huggingface.co" => self.hf_token.as_deref(),
            _ => return None,
        };
        if token.is_none() {
            tracing::warn!(host = %host, "No access token configured for weights host");
        }
        token
    }

    /// Fetch `url` into the store, reusing a previous download unless `force`.
    pub async fn download(&self, url: &str, force: bool) -> Result<PathBuf, WeightsError> {
        let dir = self.directory_for(url);

        if !force {
            if let Some(existing) = first_file(&dir).await {
                tracing::debug!(url, path = %existing.display(), "Reusing downloaded weights");
                return Ok(existing);
            }
        }

        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("falbridge/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = self.bearer_token(url) {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let mut response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, url, "Weights request failed");
            WeightsError::Properties(url.to_string())
        })?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), url, "Weights request rejected");
            return Err(WeightsError::Properties(url.to_string()));
        }

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let file_name = parse_file_name(url, disposition.as_deref());
        let target = dir.join(&file_name);

        if !force {
            if let (Ok(meta), Some(expected)) = (tokio::fs::metadata(&target).await, content_length) {
                if meta.len() == expected {
                    return Ok(target);
                }
            }
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WeightsError::Io(e.to_string()))?;

        let partial = dir.join(format!("{file_name}.part"));
        let result = self
            .write_partial(&mut response, &partial, &target, url)
            .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result?;

        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| WeightsError::Io(e.to_string()))?;

        tracing::info!(url, path = %target.display(), "Downloaded model weights");
        Ok(target)
    }

    async fn write_partial(
        &self,
        response: &mut reqwest::Response,
        partial: &Path,
        target: &Path,
        url: &str,
    ) -> Result<(), WeightsError> {
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| WeightsError::Io(e.to_string()))?;
        write_chunks(response, &mut file, url)
            .await
            .map_err(|e| match e {
                FetchError::Io(message) => WeightsError::Io(message),
                other => WeightsError::Download {
                    url: url.to_string(),
                    message: other.to_string(),
                },
            })?;
        file.flush()
            .await
            .map_err(|e| WeightsError::Io(e.to_string()))?;
        drop(file);

        check_safetensors(partial, target).await
    }
}

#[async_trait]
impl WeightsPort for WeightsStore {
    async fn fetch_weights(&self, url: &str) -> Result<PathBuf, WeightsError> {
        self.download(url, false).await
    }
}

/// Hex SHA-256 of a URL.
pub fn hash_url(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

async fn first_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_partial = path.extension().is_some_and(|ext| ext == "part");
        if path.is_file() && !is_partial {
            return Some(path);
        }
    }
    None
}

/// Extract a file name from a `Content-Disposition` header.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let (_, rest) = header.split_once("filename=")?;
    let name = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split(';').next()?.trim(),
    };
    if name.is_empty() {
        return None;
    }
    base_name(name)
}

/// Percent-decode `raw` and keep only its final path component.
fn base_name(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    Path::new(decoded.as_ref())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// File name for a download: Content-Disposition, then URL basename, then URL hash.
pub fn parse_file_name(url: &str, content_disposition: Option<&str>) -> String {
    if let Some(name) = content_disposition.and_then(filename_from_content_disposition) {
        return name;
    }

    match url::Url::parse(url) {
        Ok(parsed) if parsed.scheme() != "data" => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(base_name)
            .unwrap_or_else(|| hash_url(url)),
        _ => hash_url(url),
    }
}

/// Verify that `partial` holds a safetensors file to be stored as `target`.
async fn check_safetensors(partial: &Path, target: &Path) -> Result<(), WeightsError> {
    let invalid = |reason: &str| WeightsError::Integrity {
        path: target.display().to_string(),
        reason: reason.to_string(),
    };

    if !target.to_string_lossy().ends_with(SAFETENSORS_EXTENSION) {
        return Err(invalid("not a .safetensors file"));
    }

    let mut file = tokio::fs::File::open(partial)
        .await
        .map_err(|e| WeightsError::Io(e.to_string()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| WeightsError::Io(e.to_string()))?
        .len();

    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)
        .await
        .map_err(|_| invalid("file too short"))?;
    let header_len = u64::from_le_bytes(len_bytes);
    if header_len == 0 || header_len > MAX_HEADER_LEN || header_len > size.saturating_sub(8) {
        return Err(invalid("header too large"));
    }

    let mut header = vec![0u8; header_len as usize];
    file.read_exact(&mut header)
        .await
        .map_err(|_| invalid("truncated header"))?;
    match serde_json::from_slice::<serde_json::Value>(&header) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        _ => Err(invalid("header is not a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn safetensors_bytes(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn content_disposition_variants() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="pixel-art-xl.safetensors""#),
            Some("pixel-art-xl.safetensors".to_string())
        );
        assert_eq!(
            filename_from_content_disposition("attachment; filename=my%20lora.safetensors"),
            Some("my lora.safetensors".to_string())
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
    }

    #[test]
    fn file_name_falls_back_to_url() {
        let url = "https://huggingface.co/nerijs/pixel-art-xl/resolve/main/pixel-art-xl.safetensors";
        assert_eq!(parse_file_name(url, None), "pixel-art-xl.safetensors");

        let bare = "https://example.com/";
        assert_eq!(parse_file_name(bare, None), hash_url(bare));
    }

    #[test]
    fn url_file_name_cannot_leave_the_weights_directory() {
        let url = "https://evil.example/x/..%2F..%2F..%2Fpwned.safetensors";
        assert_eq!(parse_file_name(url, None), "pwned.safetensors");

        for url in [
            "https://evil.example/x/%2E%2E",
            "https://evil.example/x/..%2F..",
        ] {
            assert_eq!(parse_file_name(url, None), hash_url(url));
        }
    }

    #[test]
    fn url_hash_is_stable_hex() {
        let hash = hash_url("https://example.com/a.safetensors");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_url("https://example.com/a.safetensors"));
        assert_ne!(hash, hash_url("https://example.com/b.safetensors"));
    }

    #[tokio::test]
    async fn accepts_valid_safetensors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let partial = dir.path().join("model.safetensors.part");
        std::fs::write(&partial, safetensors_bytes(r#"{"__metadata__":{}}"#, &[0; 16]))
            .expect("write");

        let result = check_safetensors(&partial, &dir.path().join("model.safetensors")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn rejects_oversized_header_and_wrong_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let partial = dir.path().join("model.part");
        let mut bytes = u64::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        std::fs::write(&partial, bytes).expect("write");

        let oversized = check_safetensors(&partial, &dir.path().join("model.safetensors")).await;
        assert!(matches!(oversized, Err(WeightsError::Integrity { .. })));

        let wrong_ext = check_safetensors(&partial, &dir.path().join("model.ckpt")).await;
        assert!(matches!(wrong_ext, Err(WeightsError::Integrity { .. })));
    }

    #[tokio::test]
    async fn reuses_existing_download_without_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = WeightsStore::new(dir.path(), None, None);
        let url = "https://example.invalid/lora.safetensors";

        let weights_dir = store.directory_for(url);
        std::fs::create_dir_all(&weights_dir).expect("mkdir");
        std::fs::write(weights_dir.join("lora.safetensors"), b"cached").expect("write");

        let path = store.fetch_weights(url).await.expect("cached weights");
        assert_eq!(path, weights_dir.join("lora.safetensors"));
    }
}
