//! Components the store and the runner rely on.
//!
//! [`Name`] backs name lookups, [`ParentEntity`] defines the tree that
//! recursive removal walks, and [`WorldRoot`] tags the entity a world's
//! top-level plugins attach to.

use crate::component::Component;
use crate::entity::Entity;

/// Human-readable entity name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Name {
    /// Create a name component.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Component for Name {
    fn type_name() -> &'static str {
        "Name"
    }
}

/// The entity this entity is a child of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParentEntity(pub Entity);

impl Component for ParentEntity {
    fn type_name() -> &'static str {
        "ParentEntity"
    }
}

/// Marker for the root entity of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldRoot;

impl Component for WorldRoot {
    fn type_name() -> &'static str {
        "WorldRoot"
    }
}
