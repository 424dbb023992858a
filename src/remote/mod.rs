//! Remote management API integration.
//!
//! This module provides the [`ResourceApi`] seam used by the fetcher and the
//! executor, its REST implementation, an in-memory implementation and the
//! wire conversion between API objects and resources.

mod api;
mod client;
mod fetcher;
mod memory;
mod types;

pub use api::{ApiResult, ResourceApi};
pub use client::{HttpResourceApi, PAGE_SIZE};
pub use fetcher::StateFetcher;
pub use memory::InMemoryApi;
pub use types::{NAME_FIELD, create_payload, remote_id_from_wire, resource_from_wire};
