//! Application state and composition.

use std::sync::Arc;

use crate::api::ClientHub;
use crate::infrastructure::{
    cache::UploadCache,
    clock::SystemClock,
    config::BridgeConfig,
    fal::FalClient,
    folders::HostFolders,
    media::HttpMediaFetcher,
    ports::{
        ClockPort, FileStoragePort, MediaFetchPort, ModelApiPort, RemoteWorkflowPort, WeightsPort,
    },
    weights::WeightsStore,
};
use crate::nodes::{NodeRegistry, NodeServices};
use crate::use_cases::{BuildPayload, DownloadOutputs, ExecuteWorkflow, UploadInputFiles};

/// Main application state.
///
/// Passed to HTTP/WebSocket handlers via Axum state.
pub struct App {
    pub config: BridgeConfig,
    pub use_cases: UseCases,
    pub nodes: Arc<NodeRegistry>,
    pub hub: Arc<ClientHub>,
}

/// Container for all use cases.
pub struct UseCases {
    pub build_payload: Arc<BuildPayload>,
    pub execute: Arc<ExecuteWorkflow>,
    pub download: Arc<DownloadOutputs>,
}

/// External services the application is composed from.
pub struct Ports {
    pub remote: Arc<dyn RemoteWorkflowPort>,
    pub storage: Arc<dyn FileStoragePort>,
    pub models: Arc<dyn ModelApiPort>,
    pub fetcher: Arc<dyn MediaFetchPort>,
    pub weights: Arc<dyn WeightsPort>,
    pub clock: Arc<dyn ClockPort>,
}

impl Ports {
    /// Production adapters for `config`.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let fal = Arc::new(FalClient::new(
            config.api_key.clone(),
            config.endpoint(),
            &config.run_base_url,
            &config.rest_base_url,
            config.stream_timeout,
        ));
        let weights = Arc::new(WeightsStore::new(
            config.weights_dir.clone(),
            config.civitai_token.clone(),
            config.hf_token.clone(),
        ));

        Self {
            remote: fal.clone(),
            storage: fal.clone(),
            models: fal,
            fetcher: Arc::new(HttpMediaFetcher::new()),
            weights,
            clock: Arc::new(SystemClock::new()),
        }
    }
}

impl App {
    pub fn new(config: BridgeConfig, ports: Ports) -> Self {
        let folders = HostFolders::new(&config.base_dir);
        let hub = Arc::new(ClientHub::new());

        let cache = Arc::new(UploadCache::new(config.upload_cache_capacity, ports.clock));
        let uploads = Arc::new(UploadInputFiles::new(
            ports.storage,
            folders.clone(),
            cache,
        ));
        let build_payload = Arc::new(BuildPayload::new(uploads));
        let execute = Arc::new(ExecuteWorkflow::new(
            build_payload.clone(),
            ports.remote,
            hub.clone(),
        ));
        let download = Arc::new(DownloadOutputs::new(folders.clone(), ports.fetcher.clone()));

        let nodes = Arc::new(NodeRegistry::standard(NodeServices {
            models: ports.models,
            fetcher: ports.fetcher,
            weights: ports.weights,
            folders,
            disable_metadata: config.disable_metadata,
        }));

        Self {
            config,
            use_cases: UseCases {
                build_payload,
                execute,
                download,
            },
            nodes,
            hub,
        }
    }
}
