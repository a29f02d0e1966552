//! Scope resolution and collection URL rendering
//!
//! Turns a resource's attributes plus the provider configuration into the
//! concrete parameters of a collection URL: which ADOM or device/VDOM it
//! lives in, and the names of its parent objects.

use std::collections::BTreeMap;
use std::collections::HashMap;

use fmgr_core::resource::Value;
use serde::Deserialize;
use thiserror::Error;

use crate::resources::{MoveResourceConfig, Scope};

/// Provider-level scope the resources inherit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderScope {
    #[default]
    Adom,
    Global,
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub scopetype: ProviderScope,
    /// ADOM used when a resource inherits the provider scope
    pub adom: String,
    /// Device used by device-scoped resources that do not name one
    pub device_name: Option<String>,
    pub device_vdom: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            scopetype: ProviderScope::Adom,
            adom: "root".to_string(),
            device_name: None,
            device_vdom: "root".to_string(),
        }
    }
}

impl ProviderConfig {
    pub const ENV_ADOM: &'static str = "FORTIMANAGER_ADOM";
    pub const ENV_DEVICE_NAME: &'static str = "FORTIMANAGER_DEVICE_NAME";
    pub const ENV_DEVICE_VDOM: &'static str = "FORTIMANAGER_DEVICE_VDOM";

    /// Apply overrides from `FORTIMANAGER_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(adom) = lookup(Self::ENV_ADOM) {
            self.adom = adom;
        }
        if let Some(device) = lookup(Self::ENV_DEVICE_NAME) {
            self.device_name = Some(device);
        }
        if let Some(vdom) = lookup(Self::ENV_DEVICE_VDOM) {
            self.device_vdom = vdom;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("invalid scopetype '{0}', expected one of: inherit, adom, global")]
    InvalidScopeType(String),

    #[error("unresolved placeholder '{{{placeholder}}}' in {template}")]
    UnresolvedPlaceholder {
        placeholder: String,
        template: String,
    },
}

/// Resolved URL parameters for one resource
pub type Params = BTreeMap<String, String>;

/// Escape a name for use as a URL path segment.
///
/// FortiManager addresses objects by name inside the URL, so a `/` in a
/// name is written as `\/`.
pub fn escape_segment(name: &str) -> String {
    name.replace('/', "\\/")
}

/// Reverse of [`escape_segment`]
pub fn unescape_segment(segment: &str) -> String {
    segment.replace("\\/", "/")
}

fn get_str<'a>(attributes: &'a HashMap<String, Value>, name: &str) -> Option<&'a str> {
    attributes
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Resolve the `{adom}` segment: `global` or `adom/<name>`
fn resolve_adom(
    attributes: &HashMap<String, Value>,
    provider: &ProviderConfig,
) -> Result<String, ScopeError> {
    match get_str(attributes, "scopetype").unwrap_or("inherit") {
        "inherit" => Ok(match provider.scopetype {
            ProviderScope::Global => "global".to_string(),
            ProviderScope::Adom => format!("adom/{}", escape_segment(&provider.adom)),
        }),
        "adom" => get_str(attributes, "adom")
            .map(|adom| format!("adom/{}", escape_segment(adom)))
            .ok_or_else(|| ScopeError::MissingParameter("adom".to_string())),
        "global" => Ok("global".to_string()),
        other => Err(ScopeError::InvalidScopeType(other.to_string())),
    }
}

/// Resource attribute first, provider setting second
fn resolve_variable(
    attributes: &HashMap<String, Value>,
    name: &str,
    fallback: Option<&str>,
) -> Result<String, ScopeError> {
    get_str(attributes, name)
        .or(fallback.filter(|s| !s.is_empty()))
        .map(escape_segment)
        .ok_or_else(|| ScopeError::MissingParameter(name.to_string()))
}

/// Build the parameter dictionary for a resource
pub fn resolve_params(
    config: &MoveResourceConfig,
    attributes: &HashMap<String, Value>,
    provider: &ProviderConfig,
) -> Result<Params, ScopeError> {
    let mut params = Params::new();

    match config.scope {
        Scope::Adom => {
            params.insert("adom".to_string(), resolve_adom(attributes, provider)?);
        }
        Scope::Device => {
            params.insert(
                "device".to_string(),
                resolve_variable(attributes, "device_name", provider.device_name.as_deref())?,
            );
            params.insert(
                "vdom".to_string(),
                resolve_variable(attributes, "device_vdom", Some(&provider.device_vdom))?,
            );
        }
    }

    for parent in config.parents {
        let value = get_str(attributes, parent)
            .ok_or_else(|| ScopeError::MissingParameter(parent.to_string()))?;
        params.insert(parent.to_string(), escape_segment(value));
    }

    Ok(params)
}

/// Fill every `{name}` placeholder of a URL template
pub fn render(template: &str, params: &Params) -> Result<String, ScopeError> {
    let mut url = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        url.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| ScopeError::UnresolvedPlaceholder {
                placeholder: after.to_string(),
                template: template.to_string(),
            })?;
        let name = &after[..end];
        let value = params
            .get(name)
            .ok_or_else(|| ScopeError::UnresolvedPlaceholder {
                placeholder: name.to_string(),
                template: template.to_string(),
            })?;
        url.push_str(value);
        rest = &after[end + 1..];
    }
    url.push_str(rest);

    Ok(url)
}

/// URL of the ordered collection
pub fn collection_url(config: &MoveResourceConfig, params: &Params) -> Result<String, ScopeError> {
    render(config.collection_url, params)
}

/// URL of a single entry inside the collection
pub fn entry_url(
    config: &MoveResourceConfig,
    params: &Params,
    key: &str,
) -> Result<String, ScopeError> {
    Ok(format!(
        "{}/{}",
        collection_url(config, params)?,
        escape_segment(key)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{
        PACKAGES_FIREWALL_POLICY_MOVE, SWITCH_CONTROLLER_MANAGED_SWITCH_MOVE,
        SYSTEM_AUTOMATION_STITCH_ACTIONS_MOVE,
    };

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn inherit_uses_provider_adom() {
        let provider = ProviderConfig {
            adom: "branch".to_string(),
            ..Default::default()
        };
        let params =
            resolve_params(&PACKAGES_FIREWALL_POLICY_MOVE, &attrs(&[("pkg", "default")]), &provider)
                .unwrap();
        assert_eq!(
            collection_url(&PACKAGES_FIREWALL_POLICY_MOVE, &params).unwrap(),
            "/pm/config/adom/branch/pkg/default/firewall/policy"
        );
    }

    #[test]
    fn inherit_global_provider() {
        let provider = ProviderConfig {
            scopetype: ProviderScope::Global,
            ..Default::default()
        };
        let params =
            resolve_params(&PACKAGES_FIREWALL_POLICY_MOVE, &attrs(&[("pkg", "p")]), &provider)
                .unwrap();
        assert_eq!(params["adom"], "global");
    }

    #[test]
    fn explicit_adom_scope() {
        let provider = ProviderConfig::default();
        let params = resolve_params(
            &PACKAGES_FIREWALL_POLICY_MOVE,
            &attrs(&[("scopetype", "adom"), ("adom", "edge"), ("pkg", "p")]),
            &provider,
        )
        .unwrap();
        assert_eq!(params["adom"], "adom/edge");

        let err = resolve_params(
            &PACKAGES_FIREWALL_POLICY_MOVE,
            &attrs(&[("scopetype", "adom"), ("pkg", "p")]),
            &provider,
        )
        .unwrap_err();
        assert_eq!(err, ScopeError::MissingParameter("adom".to_string()));
    }

    #[test]
    fn invalid_scopetype() {
        let err = resolve_params(
            &PACKAGES_FIREWALL_POLICY_MOVE,
            &attrs(&[("scopetype", "device"), ("pkg", "p")]),
            &ProviderConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, ScopeError::InvalidScopeType("device".to_string()));
    }

    #[test]
    fn device_scope_falls_back_to_provider() {
        let provider = ProviderConfig {
            device_name: Some("FGT-01".to_string()),
            ..Default::default()
        };
        let params = resolve_params(&SWITCH_CONTROLLER_MANAGED_SWITCH_MOVE, &attrs(&[]), &provider)
            .unwrap();
        assert_eq!(
            collection_url(&SWITCH_CONTROLLER_MANAGED_SWITCH_MOVE, &params).unwrap(),
            "/pm/config/device/FGT-01/vdom/root/switch-controller/managed-switch"
        );

        let params = resolve_params(
            &SWITCH_CONTROLLER_MANAGED_SWITCH_MOVE,
            &attrs(&[("device_name", "FGT-02"), ("device_vdom", "dmz")]),
            &provider,
        )
        .unwrap();
        assert_eq!(params["device"], "FGT-02");
        assert_eq!(params["vdom"], "dmz");
    }

    #[test]
    fn device_scope_requires_device() {
        let err = resolve_params(
            &SYSTEM_AUTOMATION_STITCH_ACTIONS_MOVE,
            &attrs(&[("automation_stitch", "s")]),
            &ProviderConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, ScopeError::MissingParameter("device_name".to_string()));
    }

    #[test]
    fn missing_parent() {
        let err = resolve_params(&PACKAGES_FIREWALL_POLICY_MOVE, &attrs(&[]), &ProviderConfig::default())
            .unwrap_err();
        assert_eq!(err, ScopeError::MissingParameter("pkg".to_string()));
    }

    #[test]
    fn entry_url_escapes_slashes() {
        let params = resolve_params(
            &SYSTEM_AUTOMATION_STITCH_ACTIONS_MOVE,
            &attrs(&[("device_name", "FGT"), ("automation_stitch", "a/b")]),
            &ProviderConfig::default(),
        )
        .unwrap();
        assert_eq!(
            entry_url(&SYSTEM_AUTOMATION_STITCH_ACTIONS_MOVE, &params, "3").unwrap(),
            "/pm/config/device/FGT/global/system/automation-stitch/a\\/b/actions/3"
        );
        assert_eq!(unescape_segment("a\\/b"), "a/b");
    }

    #[test]
    fn render_reports_unknown_placeholder() {
        let err = render("/pm/{missing}/x", &Params::new()).unwrap_err();
        assert!(matches!(err, ScopeError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn env_overrides() {
        let config = ProviderConfig::default().with_overrides(|name| match name {
            ProviderConfig::ENV_ADOM => Some("lab".to_string()),
            ProviderConfig::ENV_DEVICE_NAME => Some("FGT-LAB".to_string()),
            _ => None,
        });
        assert_eq!(config.adom, "lab");
        assert_eq!(config.device_name.as_deref(), Some("FGT-LAB"));
        assert_eq!(config.device_vdom, "root");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"scopetype": "global", "device_name": "FGT"}"#).unwrap();
        assert_eq!(config.scopetype, ProviderScope::Global);
        assert_eq!(config.adom, "root");
        assert_eq!(config.device_vdom, "root");
    }
}
