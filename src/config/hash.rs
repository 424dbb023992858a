//! Deterministic hashing of desired state.
//!
//! Hashes identify a desired set independently of the order it was declared
//! in, so two runs over the same tenant file report the same hash.

use sha2::{Digest, Sha256};

use crate::resource::Resource;

/// Hasher for computing desired-state hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a single resource (kind, key and fields).
    #[must_use]
    pub fn hash_resource(&self, resource: &Resource) -> String {
        let mut hasher = Sha256::new();
        Self::update_resource(&mut hasher, resource);
        hex::encode(hasher.finalize())
    }

    /// Computes a hash over a desired set, independent of declaration order.
    #[must_use]
    pub fn hash_desired(&self, resources: &[Resource]) -> String {
        let mut hashes: Vec<String> = resources.iter().map(|r| self.hash_resource(r)).collect();
        hashes.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update((hashes.len() as u64).to_be_bytes());
        for hash in hashes {
            hasher.update(hash.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    fn update_resource(hasher: &mut Sha256, resource: &Resource) {
        hasher.update(resource.kind.section().as_bytes());
        hasher.update([0u8]);
        hasher.update(resource.key.as_bytes());
        hasher.update([0u8]);
        // Object keys serialize in sorted order, nested objects included.
        let fields = serde_json::to_vec(&resource.fields).unwrap_or_default();
        hasher.update((fields.len() as u64).to_be_bytes());
        hasher.update(&fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Fields, ResourceKind};

    fn app(name: &str, description: &str) -> Resource {
        Resource::desired(ResourceKind::Application, name, Fields::new())
            .with_field("description", description)
    }

    #[test]
    fn test_resource_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let resource = app("web", "frontend");

        assert_eq!(hasher.hash_resource(&resource), hasher.hash_resource(&resource));
    }

    #[test]
    fn test_different_fields_different_hash() {
        let hasher = ConfigHasher::new();

        assert_ne!(
            hasher.hash_resource(&app("web", "frontend")),
            hasher.hash_resource(&app("web", "backend"))
        );
    }

    #[test]
    fn test_desired_hash_ignores_order() {
        let hasher = ConfigHasher::new();
        let forward = vec![app("a", "1"), app("b", "2")];
        let backward = vec![app("b", "2"), app("a", "1")];

        assert_eq!(hasher.hash_desired(&forward), hasher.hash_desired(&backward));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }
}
