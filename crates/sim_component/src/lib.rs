//! # sim_component
//!
//! The entity-component store that every simulated world is built on. It
//! holds no behavior: only typed data keyed by entity, plus a record of what
//! changed since the last step boundary.
//!
//! This crate provides:
//!
//! - [`Entity`]: lightweight `u64` entity identifiers, with [`Entity::NULL`].
//! - [`EntityAllocator`]: monotonically increasing ID allocator.
//! - [`Component`] trait: the contract all stored data must satisfy.
//! - [`EntityComponentManager`]: the typed store with change tracking.
//! - [`ChangeSet`]: the per-step added/modified/removed sets.
//! - [`components`]: the built-in `Name`, `ParentEntity` and `WorldRoot`.

pub mod changes;
pub mod component;
pub mod components;
pub mod entity;
pub mod manager;
mod storage;

pub use changes::ChangeSet;
pub use component::{Component, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use manager::EntityComponentManager;
