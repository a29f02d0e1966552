//! Desired-state file
//!
//! ```json
//! {
//!   "provider": { "adom": "root", "device_name": "FGT-01" },
//!   "resources": [
//!     {
//!       "type": "packages_firewall_policy_move",
//!       "name": "dns_first",
//!       "attributes": { "pkg": "default", "policy": "3", "target": "1", "option": "before" }
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use fmgr_core::resource::{Resource, Value};
use fmgr_core::schema::{AttributeType, ResourceSchema};
use fmgr_provider::ProviderConfig;
use fmgr_provider::resources::get_config;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DesiredFile {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ResourceDecl {
    /// Build the resource. Numeric ids such as `"policy": 3` are accepted
    /// for string attributes and kept as their decimal text.
    pub fn to_resource(&self) -> Resource {
        let schema = get_config(&self.resource_type).map(|config| config.schema());
        self.attributes.iter().fold(
            Resource::new(&self.resource_type, &self.name),
            |resource, (key, value)| match Value::from_json(value) {
                Some(Value::Int(i)) if expects_string(schema.as_ref(), key) => {
                    resource.with_string(key, i.to_string())
                }
                Some(v) => resource.with_attribute(key, v),
                None => resource,
            },
        )
    }
}

fn expects_string(schema: Option<&ResourceSchema>, name: &str) -> bool {
    schema
        .and_then(|s| s.attributes.get(name))
        .is_some_and(|attr| matches!(attr.attr_type, AttributeType::String))
}

impl DesiredFile {
    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn to_resources(&self) -> Vec<Resource> {
        self.resources.iter().map(ResourceDecl::to_resource).collect()
    }
}
