//! Lines owned by a document.

use crate::error::{DomainError, DomainResult};

/// A receiving part, shipment part or count item, addressed by its own id
/// inside the owning document.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;
}

/// Look up an owned entity by id, failing with `NotFound` naming `kind`.
pub fn find_entity<'a, E: Entity>(items: &'a [E], id: &E::Id, kind: &str) -> DomainResult<&'a E> {
    items
        .iter()
        .find(|e| e.id() == id)
        .ok_or_else(|| DomainError::not_found(format!("{kind} {id}")))
}
