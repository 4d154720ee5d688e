//! Type-erased component columns.
//!
//! Each component type lives in its own [`Column`], keyed by entity in a
//! `BTreeMap` for deterministic iteration. The manager holds columns behind
//! the [`ErasedColumn`] trait and downcasts on typed access.

use std::any::Any;
use std::collections::BTreeMap;

use crate::component::Component;
use crate::entity::Entity;

/// Operations the manager needs on a column without knowing its type.
pub(crate) trait ErasedColumn: Send + Sync + std::fmt::Debug {
    fn remove(&mut self, entity: Entity) -> bool;
    fn contains(&self, entity: Entity) -> bool;
    fn len(&self) -> usize;
    fn clone_box(&self) -> Box<dyn ErasedColumn>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Storage for every instance of one component type.
pub(crate) struct Column<T: Component> {
    pub(crate) values: BTreeMap<Entity, T>,
}

impl<T: Component> Column<T> {
    pub(crate) fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<T: Component> std::fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("type", &T::type_name())
            .field("len", &self.values.len())
            .finish()
    }
}

impl<T: Component> ErasedColumn for Column<T> {
    fn remove(&mut self, entity: Entity) -> bool {
        self.values.remove(&entity).is_some()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.values.contains_key(&entity)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn clone_box(&self) -> Box<dyn ErasedColumn> {
        Box::new(Column {
            values: self.values.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Mass(f64);

    impl Component for Mass {
        fn type_name() -> &'static str {
            "Mass"
        }
    }

    #[test]
    fn test_erased_remove_and_contains() {
        let mut column = Column::<Mass>::new();
        column.values.insert(Entity(1), Mass(2.0));
        let erased: &mut dyn ErasedColumn = &mut column;
        assert!(erased.contains(Entity(1)));
        assert!(erased.remove(Entity(1)));
        assert!(!erased.remove(Entity(1)));
        assert_eq!(erased.len(), 0);
    }

    #[test]
    fn test_clone_box_is_independent() {
        let mut column = Column::<Mass>::new();
        column.values.insert(Entity(1), Mass(2.0));
        let mut copy = column.clone_box();
        copy.remove(Entity(1));
        assert_eq!(column.values.len(), 1);
        let typed = copy.as_any().downcast_ref::<Column<Mass>>();
        assert!(typed.is_some_and(|c| c.values.is_empty()));
    }
}
