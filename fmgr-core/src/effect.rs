//! Effect - A side effect described as a value
//!
//! Effects are produced by the differ and executed by the Interpreter.
//! Building one never touches the remote device.

use crate::resource::{Resource, ResourceId, State};

/// A single operation to perform against a Provider
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a resource
    Create(Resource),
    /// Update a resource in place (for move resources: issue the move again)
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Forget a resource; `state` carries the identifier to delete
    Delete { state: State },
}

impl Effect {
    /// The resource this effect acts on
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(resource) => &resource.id,
            Effect::Update { id, .. } => id,
            Effect::Delete { state } => &state.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_of_each_effect() {
        let id = ResourceId::new("t", "n");
        assert_eq!(Effect::Create(Resource::new("t", "n")).resource_id(), &id);
        assert_eq!(
            Effect::Delete { state: State::not_found(id.clone()) }.resource_id(),
            &id
        );
        let update = Effect::Update {
            id: id.clone(),
            from: State::not_found(id.clone()),
            to: Resource::new("t", "n"),
        };
        assert_eq!(update.resource_id(), &id);
    }
}
