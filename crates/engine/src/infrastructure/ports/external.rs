//! External service port traits (fal.ai, HTTP fetches, host UI).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use falbridge_domain::Payload;
use falbridge_shared::HostMessage;

use super::error::{FetchError, ModelApiError, StorageError, TransportError, WeightsError};

// =============================================================================
// Remote Workflow Execution
// =============================================================================

/// Remote events in arrival order.
pub type EventStream = BoxStream<'static, Result<HostMessage, TransportError>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteWorkflowPort: Send + Sync {
    /// Submit a payload and open the event stream for its execution.
    async fn stream(&self, payload: &Payload) -> Result<EventStream, TransportError>;
}

// =============================================================================
// Object Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStoragePort: Send + Sync {
    /// Store `bytes` remotely and return the public URL.
    async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError>;
}

// =============================================================================
// Model Endpoints
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelApiPort: Send + Sync {
    /// Submit `arguments` to a model endpoint and wait for the result.
    ///
    /// `api_key` overrides the configured key for this call.
    async fn run(
        &self,
        endpoint: &str,
        arguments: Value,
        api_key: Option<String>,
    ) -> Result<Value, ModelApiError>;
}

// =============================================================================
// Plain HTTP fetches
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetchPort: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeightsPort: Send + Sync {
    /// Local path of the weights file behind `url`, downloading it if needed.
    async fn fetch_weights(&self, url: &str) -> Result<PathBuf, WeightsError>;
}

// =============================================================================
// Host UI notifications
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostEventPort: Send + Sync {
    /// Deliver `message` to the UI client `client_id`.
    ///
    /// Messages to one client arrive in the order they were sent.
    async fn send(&self, client_id: &str, message: HostMessage);
}
