//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state declared by the user with the current state
//! read back through the Provider, and generates the Effects needed to
//! converge. For move resources a non-empty drift description on the
//! current state is itself a difference: the move has to be issued again.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::position::DRIFT_ATTRIBUTE;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but is no longer declared -> needs deletion
    Delete(State),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
///
/// Computed attributes declared in `schema` are not compared.
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let computed = schema
        .map(|s| s.computed_attributes())
        .unwrap_or_default();
    let mut changed = find_changed_attributes(&desired.attributes, &current.attributes, &computed);

    if has_drift(current) {
        changed.push(DRIFT_ATTRIBUTE.to_string());
    }

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Whether a read-back state reports that the requested order no longer holds
pub fn has_drift(current: &State) -> bool {
    matches!(
        current.attributes.get(DRIFT_ATTRIBUTE),
        Some(Value::String(s)) if !s.is_empty()
    )
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    computed: &[&str],
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') || computed.contains(&key.as_str()) {
            continue;
        }

        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Existing states that are no longer declared are deleted after all
/// creates and updates.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut diffs: Vec<Diff> = desired
        .iter()
        .map(|resource| {
            let current = current_states
                .get(&resource.id)
                .cloned()
                .unwrap_or_else(|| State::not_found(resource.id.clone()));
            diff(resource, &current, schemas.get(&resource.id.resource_type))
        })
        .collect();

    let declared: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphaned: Vec<&State> = current_states
        .values()
        .filter(|state| state.exists && !declared.contains(&state.id))
        .collect();
    orphaned.sort_by_key(|state| state.id.to_string());
    diffs.extend(orphaned.into_iter().cloned().map(Diff::Delete));

    let mut plan = Plan::new();
    for d in diffs {
        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update { id, from, to, .. } => {
                plan.add(Effect::Update { id, from, to });
            }
            Diff::NoChange(_) => {}
            Diff::Delete(state) => plan.add(Effect::Delete { state }),
        }
    }

    plan
}
