//! Kingsoft Cloud Provider
//!
//! Resources and data sources for Kingsoft Cloud, built on the ksyun-core
//! transcoder and retry engine.
//!
//! ## Module Structure
//!
//! - `client` - Vendor API seam and the retrying call context
//! - `config` - Provider block and environment settings
//! - `provider` - KsyunProvider implementation
//! - `resources` - Managed resource handlers
//! - `data_sources` - Read-only listings

pub mod client;
pub mod config;
pub mod data_sources;
pub mod provider;
pub mod resources;

// Re-export main types
pub use client::{ApiClient, ApiError, Context, Service};
pub use config::{ConfigError, ProviderConfig};
pub use provider::KsyunProvider;

use ksyun_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use ksyun_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for KsyunProvider {
    fn name(&self) -> &'static str {
        "ksyun"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        let mut types = resources::resource_types();
        types.extend(data_sources::data_source_types());
        types
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(&id, &identifier).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let import_id = import_id.to_string();
        Box::pin(async move { self.import_resource(&id, &import_id).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_resource(&resource).await })
    }
}
