//! Port traits for infrastructure boundaries.
//!
//! These are the only abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Remote workflow execution (fal.ai SSE endpoint)
//! - Object storage uploads
//! - Synchronous model endpoints
//! - Plain HTTP fetches and model weight downloads
//! - Host UI notifications
//! - Clock (for testing)

mod error;
mod external;
mod testing;

pub use error::{FetchError, ModelApiError, StorageError, TransportError, WeightsError};

pub use external::{
    EventStream, FileStoragePort, HostEventPort, MediaFetchPort, ModelApiPort,
    RemoteWorkflowPort, WeightsPort,
};

pub use testing::ClockPort;

#[cfg(test)]
pub use external::{
    MockFileStoragePort, MockHostEventPort, MockMediaFetchPort, MockModelApiPort,
    MockRemoteWorkflowPort, MockWeightsPort,
};

#[cfg(test)]
pub use testing::MockClockPort;
