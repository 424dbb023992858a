//! Remote resource API seam.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::planner::Patch;
use crate::resource::{Resource, ResourceKind};

/// Result type for remote API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Operations the engine needs from the remote management API.
///
/// Implementations own their retry and timeout policy; callers treat every
/// returned error as final for that call.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Lists every existing resource of a kind, remote identifiers populated.
    async fn list(&self, kind: ResourceKind) -> ApiResult<Vec<Resource>>;

    /// Creates a resource and returns its assigned remote identifier.
    async fn create(&self, resource: &Resource) -> ApiResult<String>;

    /// Overwrites the fields in `patch` on an existing resource.
    async fn update(&self, kind: ResourceKind, remote_id: &str, patch: &Patch) -> ApiResult<()>;

    /// Deletes an existing resource.
    async fn delete(&self, kind: ResourceKind, remote_id: &str) -> ApiResult<()>;
}
