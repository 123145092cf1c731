//! Plain HTTP fetches for generated media and output downloads.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;

use crate::infrastructure::ports::{FetchError, MediaFetchPort};

#[derive(Clone)]
pub struct HttpMediaFetcher {
    client: Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::RequestFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl Default for HttpMediaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetchPort for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.get(url)
            .await?
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::RequestFailed {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self.get(url).await?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchError::Io(format!("{}: {e}", dest.display())))?;

        let written = write_chunks(&mut response, &mut file, url).await?;
        file.flush()
            .await
            .map_err(|e| FetchError::Io(format!("{}: {e}", dest.display())))?;
        Ok(written)
    }
}

/// Copy a response body to `file` chunk by chunk.
pub(crate) async fn write_chunks(
    response: &mut Response,
    file: &mut tokio::fs::File,
    url: &str,
) -> Result<u64, FetchError> {
    let mut written = 0u64;
    loop {
        let chunk = response
            .chunk()
            .await
            .map_err(|e| FetchError::RequestFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let Some(chunk) = chunk else {
            break;
        };
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;
        written += chunk.len() as u64;
    }
    Ok(written)
}
