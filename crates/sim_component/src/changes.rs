//! Per-step change tracking.
//!
//! A [`ChangeSet`] records which (entity, component type) pairs were added,
//! modified or removed since the last step boundary, plus which entities were
//! created or removed. Systems read it through the manager's `each_new`,
//! `each_modified` and `each_removed` iterators instead of rescanning the
//! whole store. The runner clears it once every step has finished its
//! post-update phase.

use std::collections::{BTreeSet, HashMap};

use crate::component::ComponentTypeId;
use crate::entity::Entity;

/// Added / modified / removed sets for the current step.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    added: HashMap<ComponentTypeId, BTreeSet<Entity>>,
    modified: HashMap<ComponentTypeId, BTreeSet<Entity>>,
    removed: HashMap<ComponentTypeId, BTreeSet<Entity>>,
    new_entities: BTreeSet<Entity>,
    removed_entities: BTreeSet<Entity>,
}

impl ChangeSet {
    /// Create an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `entity` gained a component of type `ty`.
    pub fn mark_added(&mut self, ty: ComponentTypeId, entity: Entity) {
        if let Some(set) = self.removed.get_mut(&ty) {
            set.remove(&entity);
        }
        self.added.entry(ty).or_default().insert(entity);
    }

    /// Record that `entity`'s component of type `ty` was overwritten.
    ///
    /// A component added during this step stays "new" rather than "modified".
    pub fn mark_modified(&mut self, ty: ComponentTypeId, entity: Entity) {
        if self.added.get(&ty).is_some_and(|set| set.contains(&entity)) {
            return;
        }
        self.modified.entry(ty).or_default().insert(entity);
    }

    /// Record that `entity` lost its component of type `ty`.
    pub fn mark_removed(&mut self, ty: ComponentTypeId, entity: Entity) {
        if let Some(set) = self.added.get_mut(&ty) {
            set.remove(&entity);
        }
        if let Some(set) = self.modified.get_mut(&ty) {
            set.remove(&entity);
        }
        self.removed.entry(ty).or_default().insert(entity);
    }

    /// Record that `entity` was created.
    pub fn entity_created(&mut self, entity: Entity) {
        self.new_entities.insert(entity);
    }

    /// Record that `entity` was removed.
    pub fn entity_removed(&mut self, entity: Entity) {
        self.new_entities.remove(&entity);
        self.removed_entities.insert(entity);
    }

    /// Entities whose component of type `ty` was added this step.
    pub fn added(&self, ty: ComponentTypeId) -> impl Iterator<Item = Entity> + '_ {
        self.added.get(&ty).into_iter().flatten().copied()
    }

    /// Entities whose component of type `ty` was modified this step.
    pub fn modified(&self, ty: ComponentTypeId) -> impl Iterator<Item = Entity> + '_ {
        self.modified.get(&ty).into_iter().flatten().copied()
    }

    /// Entities whose component of type `ty` was removed this step.
    pub fn removed(&self, ty: ComponentTypeId) -> impl Iterator<Item = Entity> + '_ {
        self.removed.get(&ty).into_iter().flatten().copied()
    }

    /// Entities created this step.
    pub fn new_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.new_entities.iter().copied()
    }

    /// Entities removed this step.
    pub fn removed_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.removed_entities.iter().copied()
    }

    /// Returns `true` if any entity of type `ty` changed in any way.
    #[must_use]
    pub fn touches(&self, ty: ComponentTypeId) -> bool {
        [&self.added, &self.modified, &self.removed]
            .iter()
            .any(|map| map.get(&ty).is_some_and(|set| !set.is_empty()))
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_entities.is_empty()
            && self.removed_entities.is_empty()
            && [&self.added, &self.modified, &self.removed]
                .iter()
                .all(|map| map.values().all(BTreeSet::is_empty))
    }

    /// Forget everything recorded so far.
    pub fn clear(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.removed.clear();
        self.new_entities.clear();
        self.removed_entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSE: ComponentTypeId = ComponentTypeId::from_name("Pose");

    #[test]
    fn test_added_then_modified_stays_added() {
        let mut changes = ChangeSet::new();
        changes.mark_added(POSE, Entity(1));
        changes.mark_modified(POSE, Entity(1));
        assert_eq!(changes.added(POSE).collect::<Vec<_>>(), vec![Entity(1)]);
        assert_eq!(changes.modified(POSE).count(), 0);
    }

    #[test]
    fn test_removed_clears_added_and_modified() {
        let mut changes = ChangeSet::new();
        changes.mark_added(POSE, Entity(1));
        changes.mark_modified(POSE, Entity(2));
        changes.mark_removed(POSE, Entity(1));
        changes.mark_removed(POSE, Entity(2));
        assert_eq!(changes.added(POSE).count(), 0);
        assert_eq!(changes.modified(POSE).count(), 0);
        assert_eq!(changes.removed(POSE).count(), 2);
    }

    #[test]
    fn test_readd_after_remove_is_added() {
        let mut changes = ChangeSet::new();
        changes.mark_removed(POSE, Entity(3));
        changes.mark_added(POSE, Entity(3));
        assert_eq!(changes.removed(POSE).count(), 0);
        assert!(changes.touches(POSE));
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut changes = ChangeSet::new();
        changes.entity_created(Entity(1));
        changes.mark_added(POSE, Entity(1));
        assert!(!changes.is_empty());
        changes.clear();
        assert!(changes.is_empty());
        assert!(!changes.touches(POSE));
    }

    #[test]
    fn test_unknown_type_yields_nothing() {
        let changes = ChangeSet::new();
        assert_eq!(changes.added(ComponentTypeId::from_name("Missing")).count(), 0);
    }
}
