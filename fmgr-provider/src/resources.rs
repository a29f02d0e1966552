//! Move resource definitions for the FortiManager JSON-RPC API
//!
//! Every move resource repositions one entry of a remotely stored ordered
//! collection. They differ only in where the collection lives, which path
//! parameters lead to it, and which field identifies its entries, so each
//! one is a row in a static table rather than its own module.

use fmgr_core::position::DRIFT_ATTRIBUTE;
use fmgr_core::provider::ResourceType;
use fmgr_core::resource::Value;
use fmgr_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use heck::ToUpperCamelCase;

/// Where a collection lives on the FortiManager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// ADOM database objects and policy packages (`/pm/config/{adom}/...`)
    Adom,
    /// Per-device configuration (`/pm/config/device/{device}/...`)
    Device,
}

/// Configuration of one move resource type
#[derive(Debug)]
pub struct MoveResourceConfig {
    /// Resource type name (e.g., "packages_firewall_policy_move")
    pub type_name: &'static str,
    pub description: &'static str,
    pub scope: Scope,
    /// Collection URL template. `{adom}`, `{device}` and `{vdom}` are filled
    /// from scope resolution, every other placeholder from `parents`.
    pub collection_url: &'static str,
    /// Required attributes naming the parent objects in the URL
    pub parents: &'static [&'static str],
    /// Attribute holding the key of the entry being moved
    pub key_attribute: &'static str,
    /// Field of each collection record that holds its key
    pub identifying_field: &'static str,
}

pub const DLP_EXACT_DATA_MATCH_COLUMNS_MOVE: MoveResourceConfig = MoveResourceConfig {
    type_name: "object_dlp_exactdatamatch_columns_move",
    description: "Reorder columns of a DLP exact-data-match object",
    scope: Scope::Adom,
    collection_url: "/pm/config/{adom}/obj/dlp/exact-data-match/{exact_data_match}/columns",
    parents: &["exact_data_match"],
    key_attribute: "columns",
    identifying_field: "index",
};

pub const SWITCH_CONTROLLER_MANAGED_SWITCH_MOVE: MoveResourceConfig = MoveResourceConfig {
    type_name: "switchcontroller_managedswitch_move",
    description: "Reorder FortiSwitches managed by a device",
    scope: Scope::Device,
    collection_url: "/pm/config/device/{device}/vdom/{vdom}/switch-controller/managed-switch",
    parents: &[],
    key_attribute: "managed_switch",
    identifying_field: "switch-id",
};

pub const SYSTEM_AUTOMATION_STITCH_ACTIONS_MOVE: MoveResourceConfig = MoveResourceConfig {
    type_name: "system_automationstitch_actions_move",
    description: "Reorder the actions of an automation stitch",
    scope: Scope::Device,
    collection_url: "/pm/config/device/{device}/global/system/automation-stitch/{automation_stitch}/actions",
    parents: &["automation_stitch"],
    key_attribute: "actions",
    identifying_field: "id",
};

pub const VPN_SSL_WEB_PORTAL_BOOKMARKS_MOVE: MoveResourceConfig = MoveResourceConfig {
    type_name: "object_vpn_ssl_web_portal_bookmarkgroup_bookmarks_move",
    description: "Reorder bookmarks inside an SSL-VPN web portal bookmark group",
    scope: Scope::Adom,
    collection_url: "/pm/config/{adom}/obj/vpn/ssl/web/portal/{portal}/bookmark-group/{bookmark_group}/bookmarks",
    parents: &["portal", "bookmark_group"],
    key_attribute: "bookmarks",
    identifying_field: "name",
};

pub const PACKAGES_FIREWALL_POLICY_MOVE: MoveResourceConfig = MoveResourceConfig {
    type_name: "packages_firewall_policy_move",
    description: "Reorder firewall policies inside a policy package",
    scope: Scope::Adom,
    collection_url: "/pm/config/{adom}/pkg/{pkg}/firewall/policy",
    parents: &["pkg"],
    key_attribute: "policy",
    identifying_field: "policyid",
};

static CONFIGS: [&MoveResourceConfig; 5] = [
    &DLP_EXACT_DATA_MATCH_COLUMNS_MOVE,
    &SWITCH_CONTROLLER_MANAGED_SWITCH_MOVE,
    &SYSTEM_AUTOMATION_STITCH_ACTIONS_MOVE,
    &VPN_SSL_WEB_PORTAL_BOOKMARKS_MOVE,
    &PACKAGES_FIREWALL_POLICY_MOVE,
];

/// All move resource configurations
pub fn configs() -> &'static [&'static MoveResourceConfig] {
    &CONFIGS
}

/// Look up a move resource configuration by type name
pub fn get_config(type_name: &str) -> Option<&'static MoveResourceConfig> {
    configs().iter().copied().find(|c| c.type_name == type_name)
}

impl MoveResourceConfig {
    /// Type name in the form used for identifiers and error messages
    /// (e.g., "PackagesFirewallPolicyMove")
    pub fn display_name(&self) -> String {
        self.type_name.to_upper_camel_case()
    }

    /// Identifier assigned after a successful move
    pub fn identifier(&self, key: &str, target: &str) -> String {
        format!("{}_{}_{}", self.display_name(), key, target)
    }

    /// Attribute schema shared by every move resource
    pub fn schema(&self) -> ResourceSchema {
        let mut schema = ResourceSchema::new(self.type_name).with_description(self.description);

        schema = match self.scope {
            Scope::Adom => schema
                .attribute(
                    AttributeSchema::new(
                        "scopetype",
                        AttributeType::enumeration(&["inherit", "adom", "global"]),
                    )
                    .with_default(Value::String("inherit".to_string()))
                    .with_description("How the ADOM is chosen"),
                )
                .attribute(
                    AttributeSchema::new("adom", AttributeType::String)
                        .with_description("ADOM name, used when scopetype is adom"),
                ),
            Scope::Device => schema
                .attribute(
                    AttributeSchema::new("device_name", AttributeType::String)
                        .with_description("Managed device, defaults to the provider setting"),
                )
                .attribute(
                    AttributeSchema::new("device_vdom", AttributeType::String)
                        .with_description("VDOM on the device, defaults to the provider setting"),
                ),
        };

        for parent in self.parents {
            schema = schema.attribute(AttributeSchema::new(*parent, AttributeType::String).required());
        }

        schema
            .attribute(
                AttributeSchema::new(self.key_attribute, AttributeType::String)
                    .required()
                    .with_description("Key of the entry to move"),
            )
            .attribute(
                AttributeSchema::new("target", AttributeType::String)
                    .required()
                    .with_description("Key of the entry to move relative to"),
            )
            .attribute(
                AttributeSchema::new("option", AttributeType::enumeration(&["before", "after"]))
                    .required(),
            )
            .attribute(
                AttributeSchema::new(DRIFT_ATTRIBUTE, AttributeType::String)
                    .computed()
                    .with_description("Describes how the observed order departs from the request"),
            )
    }
}

/// ResourceType handle over a move resource configuration
pub struct MoveResourceType {
    config: &'static MoveResourceConfig,
}

impl ResourceType for MoveResourceType {
    fn name(&self) -> &'static str {
        self.config.type_name
    }

    fn schema(&self) -> ResourceSchema {
        self.config.schema()
    }
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    configs()
        .iter()
        .map(|&config| Box::new(MoveResourceType { config }) as Box<dyn ResourceType>)
        .collect()
}
