//! Current-state fetching.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::resource::{Resource, ResourceKind};

use super::api::ResourceApi;

/// Reads the existing resource set from the remote API.
#[derive(Clone)]
pub struct StateFetcher {
    api: Arc<dyn ResourceApi>,
}

impl StateFetcher {
    /// Creates a fetcher over an API client.
    #[must_use]
    pub fn new(api: Arc<dyn ResourceApi>) -> Self {
        Self { api }
    }

    /// Lists every existing resource of `kind`.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` if the listing fails for any reason.
    pub async fn fetch(&self, kind: ResourceKind) -> Result<Vec<Resource>, FetchError> {
        debug!("Fetching existing {kind} resources");
        let resources = self
            .api
            .list(kind)
            .await
            .map_err(|source| FetchError { kind, source })?;
        info!("Fetched {} existing {kind} resource(s)", resources.len());
        Ok(resources)
    }
}

impl std::fmt::Debug for StateFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateFetcher").finish_non_exhaustive()
    }
}
