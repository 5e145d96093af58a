//! Typed per-context property bag.
//!
//! Collaborators stash state keyed by its Rust type, so two hook points can
//! share a value without agreeing on string keys. The backing map is only
//! allocated on first insert.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

#[derive(Default)]
pub struct PropertyBag {
    values: Option<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values
            .get_or_insert_with(HashMap::new)
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .as_ref()?
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.values
            .as_mut()?
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.values
            .as_mut()?
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values
            .as_ref()
            .is_some_and(|values| values.contains_key(&TypeId::of::<T>()))
    }

    pub fn len(&self) -> usize {
        self.values.as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the backing map has been allocated yet.
    pub fn is_allocated(&self) -> bool {
        self.values.is_some()
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBag")
            .field("len", &self.len())
            .finish()
    }
}
