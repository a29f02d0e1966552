//! FortiManager Provider implementation
//!
//! Move resources have no remote object of their own. Create and update
//! both issue a `move` call and then read back; read fetches the whole
//! collection and records how far the observed order is from the request;
//! delete only forgets the resource.

use std::collections::HashMap;

use fmgr_core::position::{self, DRIFT_ATTRIBUTE, Relation};
use fmgr_core::provider::{ProviderError, ProviderResult};
use fmgr_core::resource::{Resource, ResourceId, State, Value};

use crate::client::{CallConfig, FmgClient, Transport};
use crate::resources::{MoveResourceConfig, get_config};
use crate::scope::{self, Params, ProviderConfig};

/// Get the MoveResourceConfig for a resource type
fn config_for(id: &ResourceId) -> ProviderResult<&'static MoveResourceConfig> {
    get_config(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

fn require_str<'a>(
    attributes: &'a HashMap<String, Value>,
    name: &str,
    id: &ResourceId,
) -> ProviderResult<&'a str> {
    attributes
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::new(format!("Required attribute '{}' is missing", name))
                .for_resource(id.clone())
        })
}

/// FortiManager Provider
pub struct FortiManagerProvider<T: Transport> {
    client: FmgClient<T>,
    config: ProviderConfig,
    read_call: CallConfig,
    move_call: CallConfig,
}

impl<T: Transport> FortiManagerProvider<T> {
    pub fn new(client: FmgClient<T>, config: ProviderConfig) -> Self {
        Self {
            client,
            config,
            read_call: CallConfig::default(),
            move_call: CallConfig::default().with_retries(1),
        }
    }

    pub fn client(&self) -> &FmgClient<T> {
        &self.client
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn resolve(
        &self,
        config: &MoveResourceConfig,
        id: &ResourceId,
        attributes: &HashMap<String, Value>,
    ) -> ProviderResult<Params> {
        scope::resolve_params(config, attributes, &self.config).map_err(|e| {
            ProviderError::new(format!("Error resolving {}: {}", config.display_name(), e))
                .for_resource(id.clone())
                .with_cause(e)
        })
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Issue the move described by `resource`, then read back
    pub async fn move_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let config = config_for(id)?;
        let schema = config.schema();

        let mut attributes = resource.attributes.clone();
        schema.apply_defaults(&mut attributes);
        schema.validate(&attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ProviderError::new(messages.join("; ")).for_resource(id.clone())
        })?;

        let key = require_str(&attributes, config.key_attribute, id)?;
        let target = require_str(&attributes, "target", id)?;
        let relation = require_str(&attributes, "option", id)?
            .parse::<Relation>()
            .map_err(|e| ProviderError::new(e.to_string()).for_resource(id.clone()))?;

        let params = self.resolve(config, id, &attributes)?;
        let url = scope::entry_url(config, &params, key)
            .map_err(|e| ProviderError::new(e.to_string()).for_resource(id.clone()))?;

        log::info!("moving {} {} {} {}", url, relation, config.key_attribute, target);

        self.client
            .move_entry(&url, relation, target, &self.move_call)
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "Error updating {} resource: {}",
                    config.display_name(),
                    e
                ))
                .for_resource(id.clone())
                .with_cause(e)
            })?;

        let identifier = config.identifier(key, target);
        let prior = State::existing(id.clone(), attributes.clone()).with_identifier(identifier);
        self.read_resource(&prior).await
    }

    /// Re-read the collection and record the drift description
    pub async fn read_resource(&self, prior: &State) -> ProviderResult<State> {
        let id = &prior.id;
        let config = config_for(id)?;

        let source = require_str(&prior.attributes, config.key_attribute, id)?;
        let target = require_str(&prior.attributes, "target", id)?;
        // An option that does not parse places no constraint on the order
        let relation = prior
            .get_str("option")
            .and_then(|o| o.parse::<Relation>().ok());

        let params = self.resolve(config, id, &prior.attributes)?;
        let url = scope::collection_url(config, &params)
            .map_err(|e| ProviderError::new(e.to_string()).for_resource(id.clone()))?;

        let reading_error = |message: String| {
            ProviderError::new(format!(
                "Error reading {} resource: {}",
                config.display_name(),
                message
            ))
            .for_resource(id.clone())
        };

        let entries = match self
            .client
            .get_collection(&url, &self.read_call)
            .await
            .map_err(|e| reading_error(e.to_string()).with_cause(e))?
        {
            Some(entries) => entries,
            None => {
                log::debug!("{} not found, dropping {}", url, id);
                return Ok(State::not_found(id.clone()));
            }
        };

        let report = position::report(
            &entries,
            config.identifying_field,
            source,
            target,
            relation,
        )
        .map_err(|e| reading_error(e.to_string()).with_cause(e))?;

        if report.has_drift() {
            log::warn!("{}: {}", id, report.description);
        }

        let mut attributes = prior.attributes.clone();
        attributes.insert(
            DRIFT_ATTRIBUTE.to_string(),
            Value::String(report.description),
        );

        let identifier = prior
            .identifier
            .clone()
            .unwrap_or_else(|| config.identifier(source, target));
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Nothing to remove remotely; the entry stays where it is
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        config_for(id)?;
        log::debug!("forgetting {} ({})", id, identifier);
        Ok(())
    }
}
