use std::sync::Arc;

use tokio::runtime::Handle;

use crate::api::AttributionError;
use crate::referrer::ReferrerPlatform;

/// Reports whether the device currently has a usable network.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity for hosts that cannot tell; the request timeouts still bound the call.
pub struct AssumeOnline;

impl Connectivity for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Host capabilities the pipeline depends on.
#[derive(Clone)]
pub struct PlatformContext {
    pub referrer: Arc<dyn ReferrerPlatform>,
    pub connectivity: Arc<dyn Connectivity>,
    runtime: Handle,
}

impl PlatformContext {
    /// Capture the tokio runtime this is called from. Runs are spawned onto it.
    pub fn current(
        referrer: Arc<dyn ReferrerPlatform>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, AttributionError> {
        let runtime = Handle::try_current().map_err(|e| {
            AttributionError::InvalidArgument(format!("no tokio runtime available: {e}"))
        })?;

        Ok(Self::with_runtime(referrer, connectivity, runtime))
    }

    pub fn with_runtime(
        referrer: Arc<dyn ReferrerPlatform>,
        connectivity: Arc<dyn Connectivity>,
        runtime: Handle,
    ) -> Self {
        Self {
            referrer,
            connectivity,
            runtime,
        }
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}
