//! fmgr FortiManager Provider
//!
//! Move resources over the FortiManager JSON-RPC API.
//!
//! ## Module Structure
//!
//! - `resources` - Move resource table and schemas
//! - `scope` - ADOM/device resolution and URL rendering
//! - `client` - JSON-RPC client and the `Transport` trait
//! - `memory` - In-memory transport backed by snapshot files
//! - `provider` - FortiManagerProvider implementation

pub mod client;
pub mod memory;
pub mod provider;
pub mod resources;
pub mod scope;

// Re-export main types
pub use client::{CallConfig, ClientError, FmgClient, Transport, TransportError};
pub use memory::{MemoryCollection, MemoryTransport};
pub use provider::FortiManagerProvider;
pub use scope::ProviderConfig;

use fmgr_core::provider::{BoxFuture, Provider, ProviderResult};
use fmgr_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl<T: Transport + 'static> Provider for FortiManagerProvider<T> {
    fn name(&self) -> &'static str {
        "fortimanager"
    }

    fn resource_types(&self) -> Vec<Box<dyn fmgr_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(&self, prior: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let prior = prior.clone();
        Box::pin(async move { self.read_resource(&prior).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.move_resource(&resource).await })
    }

    fn update(
        &self,
        _id: &ResourceId,
        _identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let to = to.clone();
        Box::pin(async move { self.move_resource(&to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
