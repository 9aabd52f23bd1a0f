//! Name-keyed, insertion-ordered collections with single-owner enforcement.
//!
//! Entities never hold a pointer to their parent. Each parent gets an
//! [`OwnerRef`] (a process-unique id plus its display name) and every child
//! stores the `OwnerRef` of the collection it was added to. A child whose
//! owner id differs from the collection's is rejected on insert.

use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::{BulkError, Result};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a parent entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerRef {
    id: u64,
    name: String,
}

impl OwnerRef {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// An entity that can live in a [`SchemaCollection`].
pub trait SchemaItem {
    /// Entity kind used in error messages ("Column", "Index", ...).
    const KIND: &'static str;

    fn name(&self) -> &str;

    fn owner(&self) -> Option<&OwnerRef>;

    fn set_owner(&mut self, owner: Option<OwnerRef>);
}

/// Case-insensitive keyed collection preserving insertion order.
#[derive(Debug, Clone)]
pub struct SchemaCollection<T> {
    owner: OwnerRef,
    items: IndexMap<String, T>,
}

/// Lookup key of a schema name. Names differing only in case, including
/// non-ASCII letters, share a key.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Whether two schema names are the same under [`name_key`].
pub fn names_eq(a: &str, b: &str) -> bool {
    a == b || name_key(a) == name_key(b)
}

impl<T: SchemaItem> SchemaCollection<T> {
    pub(crate) fn new(owner: OwnerRef) -> Self {
        Self {
            owner,
            items: IndexMap::new(),
        }
    }

    /// Owner every item of this collection points to.
    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    pub(crate) fn rename_owner(&mut self, name: &str) {
        self.owner.set_name(name);
        for item in self.items.values_mut() {
            item.set_owner(Some(self.owner.clone()));
        }
    }

    /// Add an item, taking ownership of it.
    ///
    /// Fails when the item is owned by another parent, or when a different item
    /// with the same name is already present. Re-adding an item to its current
    /// parent replaces the stored entry.
    pub fn add(&mut self, mut item: T) -> Result<()> {
        let key = name_key(item.name());
        let same_owner = match item.owner() {
            Some(owner) if owner.id != self.owner.id => {
                return Err(BulkError::AlreadyOwned {
                    entity: T::KIND,
                    name: item.name().to_string(),
                    owner: owner.name.clone(),
                    target: self.owner.name.clone(),
                });
            }
            Some(_) => true,
            None => false,
        };

        if self.items.contains_key(&key) && !same_owner {
            return Err(BulkError::DuplicateName {
                entity: T::KIND,
                name: item.name().to_string(),
                collection: self.owner.name.clone(),
            });
        }

        item.set_owner(Some(self.owner.clone()));
        self.items.insert(key, item);
        Ok(())
    }

    /// Remove an item by name, clearing its owner.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.items.shift_remove(&name_key(name)).map(|mut item| {
            item.set_owner(None);
            item
        })
    }

    /// Remove every item, clearing their owners.
    pub fn clear(&mut self) -> Vec<T> {
        self.items
            .drain(..)
            .map(|(_, mut item)| {
                item.set_owner(None);
                item
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(&name_key(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.items.get_mut(&name_key(name))
    }

    pub fn get_index(&self, index: usize) -> Option<&T> {
        self.items.get_index(index).map(|(_, v)| v)
    }

    /// Position of an item in insertion order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.get_index_of(&name_key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(&name_key(name))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }

    /// Item names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.values().map(|i| i.name())
    }
}

impl<T: SchemaItem> Index<&str> for SchemaCollection<T> {
    type Output = T;

    fn index(&self, name: &str) -> &T {
        match self.get(name) {
            Some(item) => item,
            None => panic!("{} '{}' not found in {}", T::KIND, name, self.owner.name),
        }
    }
}

impl<T: SchemaItem> Index<usize> for SchemaCollection<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<'a, T: SchemaItem> IntoIterator for &'a SchemaCollection<T> {
    type Item = &'a T;
    type IntoIter = indexmap::map::Values<'a, String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values()
    }
}
