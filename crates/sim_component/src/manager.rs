//! The entity-component manager.
//!
//! [`EntityComponentManager`] is the typed key-value graph a world's systems
//! read and write. Every mutation is recorded in the current [`ChangeSet`].
//! Operations on the null entity or on an entity that does not exist are
//! no-ops that return `false`, `None` or an empty iterator.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, error};

use crate::changes::ChangeSet;
use crate::component::{Component, ComponentTypeId};
use crate::components::{Name, ParentEntity};
use crate::entity::{Entity, EntityAllocator};
use crate::storage::{Column, ErasedColumn};

/// A removal requested during a step and applied at the next step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RemovalRequest {
    entity: Entity,
    recursive: bool,
}

/// Typed component storage keyed by entity, with per-step change tracking.
#[derive(Debug, Default)]
pub struct EntityComponentManager {
    allocator: EntityAllocator,
    entities: BTreeSet<Entity>,
    columns: HashMap<ComponentTypeId, Box<dyn ErasedColumn>>,
    changes: ChangeSet,
    removal_requests: Vec<RemovalRequest>,
}

impl Clone for EntityComponentManager {
    fn clone(&self) -> Self {
        Self {
            allocator: self.allocator.clone(),
            entities: self.entities.clone(),
            columns: self
                .columns
                .iter()
                .map(|(ty, column)| (*ty, column.clone_box()))
                .collect(),
            changes: self.changes.clone(),
            removal_requests: self.removal_requests.clone(),
        }
    }
}

impl EntityComponentManager {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Create a new entity with no components.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.entities.insert(entity);
        self.changes.entity_created(entity);
        entity
    }

    /// Returns `true` if `entity` exists in this store.
    #[must_use]
    pub fn has_entity(&self, entity: Entity) -> bool {
        entity.is_valid() && self.entities.contains(&entity)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate over all live entities in ascending ID order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().copied()
    }

    /// Remove an entity immediately.
    ///
    /// With `recursive`, every descendant reachable through [`ParentEntity`]
    /// is removed as well, children before their parents. Without it, direct
    /// children are detached (their `ParentEntity` is removed) so no
    /// component is left pointing at a dead entity.
    ///
    /// Returns the number of entities removed.
    pub fn remove_entity(&mut self, entity: Entity, recursive: bool) -> usize {
        if !self.has_entity(entity) {
            return 0;
        }

        let mut doomed = Vec::new();
        if recursive {
            doomed = self.descendants(entity);
        } else {
            for child in self.children(entity) {
                self.remove_component::<ParentEntity>(child);
            }
        }
        doomed.push(entity);

        for &e in &doomed {
            self.remove_all_components(e);
            self.entities.remove(&e);
            self.changes.entity_removed(e);
        }

        debug!(%entity, recursive, removed = doomed.len(), "removed entity");
        doomed.len()
    }

    /// Queue an entity for removal at the next step boundary.
    ///
    /// Returns `false` if the entity does not exist.
    pub fn request_remove_entity(&mut self, entity: Entity, recursive: bool) -> bool {
        if !self.has_entity(entity) {
            return false;
        }
        self.removal_requests.push(RemovalRequest { entity, recursive });
        true
    }

    /// Returns `true` if removal requests are waiting for the step boundary.
    #[must_use]
    pub fn has_pending_removals(&self) -> bool {
        !self.removal_requests.is_empty()
    }

    /// Apply every queued removal request, in request order.
    ///
    /// Requests for entities already removed by an earlier recursive request
    /// are skipped. Returns the number of entities removed.
    pub fn process_remove_entity_requests(&mut self) -> usize {
        let requests = std::mem::take(&mut self.removal_requests);
        requests
            .into_iter()
            .map(|req| self.remove_entity(req.entity, req.recursive))
            .sum()
    }

    /// The parent of `entity`, if it has one.
    #[must_use]
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.component::<ParentEntity>(entity).map(|p| p.0)
    }

    /// Direct children of `entity`, in ascending ID order.
    #[must_use]
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        if !self.has_entity(entity) {
            return Vec::new();
        }
        self.each::<ParentEntity>()
            .filter(|(_, parent)| parent.0 == entity)
            .map(|(child, _)| child)
            .collect()
    }

    /// Every descendant of `entity` (excluding itself) in post-order, so each
    /// child appears before its own parent.
    #[must_use]
    pub fn descendants(&self, entity: Entity) -> Vec<Entity> {
        let mut tree: BTreeMap<Entity, Vec<Entity>> = BTreeMap::new();
        for (child, parent) in self.each::<ParentEntity>() {
            tree.entry(parent.0).or_default().push(child);
        }

        let mut out = Vec::new();
        // Iterative post-order walk; the flag marks "children already pushed".
        let mut stack: Vec<(Entity, bool)> = tree
            .get(&entity)
            .map(|kids| kids.iter().rev().map(|&k| (k, false)).collect())
            .unwrap_or_default();
        let mut seen = BTreeSet::new();
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                out.push(node);
                continue;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.push((node, true));
            if let Some(kids) = tree.get(&node) {
                stack.extend(kids.iter().rev().map(|&k| (k, false)));
            }
        }
        out
    }

    /// Find the entity carrying the given [`Name`].
    ///
    /// When several entities share a name the one with the lowest ID wins.
    #[must_use]
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.each::<Name>()
            .find(|(_, n)| n.as_str() == name)
            .map(|(e, _)| e)
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Attach `value` to `entity`, overwriting any existing `T`.
    ///
    /// Returns `false` (and stores nothing) if the entity does not exist or
    /// another component type already claimed `T`'s type name.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> bool {
        if !self.has_entity(entity) {
            return false;
        }
        let ty = T::component_type_id();
        let Some(column) = self.column_mut::<T>() else {
            error!(
                component = T::type_name(),
                %ty,
                "component type id is already taken by another type"
            );
            return false;
        };
        let previous = column.values.insert(entity, value);
        if previous.is_some() {
            self.changes.mark_modified(ty, entity);
        } else {
            self.changes.mark_added(ty, entity);
        }
        true
    }

    /// Borrow `entity`'s `T`.
    #[must_use]
    pub fn component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.column::<T>()?.values.get(&entity)
    }

    /// Clone out `entity`'s `T`.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<T> {
        self.component::<T>(entity).cloned()
    }

    /// Mutably borrow `entity`'s `T`, marking it modified for this step.
    pub fn component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let ty = T::component_type_id();
        if !self.has_component::<T>(entity) {
            return None;
        }
        self.changes.mark_modified(ty, entity);
        self.columns
            .get_mut(&ty)?
            .as_any_mut()
            .downcast_mut::<Column<T>>()?
            .values
            .get_mut(&entity)
    }

    /// Returns `true` if `entity` carries a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.columns
            .get(&T::component_type_id())
            .is_some_and(|column| column.contains(entity))
    }

    /// Detach `entity`'s `T`, returning it.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        let ty = T::component_type_id();
        let removed = self
            .columns
            .get_mut(&ty)?
            .as_any_mut()
            .downcast_mut::<Column<T>>()?
            .values
            .remove(&entity)?;
        self.changes.mark_removed(ty, entity);
        Some(removed)
    }

    /// Iterate over every entity carrying a `T`, with its value.
    pub fn each<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.column::<T>()
            .into_iter()
            .flat_map(|column| column.values.iter().map(|(e, v)| (*e, v)))
    }

    /// Entities whose `T` was added since the last step boundary.
    pub fn each_new<T: Component>(&self) -> impl Iterator<Item = Entity> + '_ {
        self.changes.added(T::component_type_id())
    }

    /// Entities whose `T` was overwritten since the last step boundary.
    pub fn each_modified<T: Component>(&self) -> impl Iterator<Item = Entity> + '_ {
        self.changes.modified(T::component_type_id())
    }

    /// Entities whose `T` was removed since the last step boundary.
    pub fn each_removed<T: Component>(&self) -> impl Iterator<Item = Entity> + '_ {
        self.changes.removed(T::component_type_id())
    }

    /// Entities created since the last step boundary.
    pub fn each_new_entity(&self) -> impl Iterator<Item = Entity> + '_ {
        self.changes.new_entities()
    }

    /// Entities removed since the last step boundary.
    pub fn each_removed_entity(&self) -> impl Iterator<Item = Entity> + '_ {
        self.changes.removed_entities()
    }

    /// Number of components of type `T` currently stored.
    #[must_use]
    pub fn component_count<T: Component>(&self) -> usize {
        self.columns
            .get(&T::component_type_id())
            .map_or(0, |column| column.len())
    }

    // -----------------------------------------------------------------------
    // Change tracking
    // -----------------------------------------------------------------------

    /// The changes recorded since the last step boundary.
    #[must_use]
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Start a fresh change set. Called once per step boundary.
    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    fn remove_all_components(&mut self, entity: Entity) {
        for (ty, column) in &mut self.columns {
            if column.remove(entity) {
                self.changes.mark_removed(*ty, entity);
            }
        }
    }

    fn column<T: Component>(&self) -> Option<&Column<T>> {
        self.columns
            .get(&T::component_type_id())?
            .as_any()
            .downcast_ref::<Column<T>>()
    }

    /// `None` when another type already owns `T`'s id.
    fn column_mut<T: Component>(&mut self) -> Option<&mut Column<T>> {
        self.columns
            .entry(T::component_type_id())
            .or_insert_with(|| Box::new(Column::<T>::new()))
            .as_any_mut()
            .downcast_mut::<Column<T>>()
    }
}
