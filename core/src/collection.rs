//! Normalized entity storage with existence-checked mutations.
//!
//! An [`EntityCollection`] is a map from id to entity plus a version counter.
//! Every successful mutation replaces whole entries (never patches a stored
//! value in place) and bumps the version, so observers can detect changes by
//! comparing versions or by awaiting the [`watch`] channel returned from
//! [`EntityCollection::subscribe`].
//!
//! Operations that can fail return [`CollectionError`] and leave both the map
//! and the version untouched. `add_many` and `remove_many` are all-or-nothing.

use crate::entity::Entity;
use crate::error::CollectionError;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// A normalized collection of entities keyed by their id.
///
/// Projections (`ids`, `all`) iterate in id order.
///
/// # Invariant
///
/// Every key equals the `id()` of the entity stored under it.
#[derive(Debug)]
pub struct EntityCollection<T: Entity> {
    entities: BTreeMap<String, T>,
    version: u64,
    changes: watch::Sender<u64>,
}

impl<T: Entity> EntityCollection<T> {
    /// Create an empty collection at version 0
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            entities: BTreeMap::new(),
            version: 0,
            changes,
        }
    }

    /// Bump the version and wake subscribers.
    ///
    /// Takes the fields rather than `&mut self` so callers can notify while
    /// still holding a borrow into `entities`.
    fn notify(version: &mut u64, changes: &watch::Sender<u64>) {
        *version += 1;
        changes.send_replace(*version);
        tracing::trace!(version = *version, "Entity collection changed");
    }

    // ========== Projections ==========

    /// All ids currently stored
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    /// All entities currently stored
    #[must_use]
    pub fn all(&self) -> Vec<&T> {
        self.entities.values().collect()
    }

    /// The current entity for `id`, if any
    #[must_use]
    pub fn select_by_id(&self, id: &str) -> Option<&T> {
        self.entities.get(id)
    }

    /// Entities for the given ids, in request order.
    ///
    /// Ids that are not present are skipped silently.
    pub fn select_many<I, S>(&self, ids: I) -> Vec<&T>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .filter_map(|id| self.entities.get(AsRef::<str>::as_ref(&id)))
            .collect()
    }

    /// Number of stored entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the collection holds no entities
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether `id` is present
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Number of successful mutations since creation
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Receive the version after every successful mutation
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    // ========== Mutations ==========

    /// Insert a new entity.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyExists`] if the id is already stored.
    /// The collection is left unchanged.
    pub fn add_one(&mut self, entity: T) -> Result<&T, CollectionError> {
        match self.entities.entry(entity.id().to_owned()) {
            Entry::Occupied(existing) => Err(CollectionError::already_exists(existing.key())),
            Entry::Vacant(slot) => {
                let inserted = slot.insert(entity);
                Self::notify(&mut self.version, &self.changes);
                Ok(inserted)
            },
        }
    }

    /// Insert several new entities, all or nothing.
    ///
    /// Duplicates inside `items` are not conflicts; the later item wins.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::AlreadyExists`] listing every id that is
    /// already stored. Nothing is inserted in that case.
    pub fn add_many(&mut self, items: Vec<T>) -> Result<(), CollectionError> {
        let conflicts: Vec<String> = items
            .iter()
            .filter(|item| self.entities.contains_key(item.id()))
            .map(|item| item.id().to_owned())
            .collect();

        if !conflicts.is_empty() {
            return Err(CollectionError::AlreadyExists { ids: conflicts });
        }

        self.insert_all(items);
        Ok(())
    }

    /// Merge `patch` over the stored entity and store the result.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::NotFound`] if `id` is absent.
    pub fn update_one(&mut self, id: &str, patch: &T::Patch) -> Result<&T, CollectionError> {
        let Some(slot) = self.entities.get_mut(id) else {
            return Err(CollectionError::not_found(id));
        };

        let mut updated = slot.clone();
        updated.apply_patch(patch);
        *slot = updated;

        Self::notify(&mut self.version, &self.changes);
        Ok(slot)
    }

    /// Insert or replace by id. Never fails.
    pub fn upsert_one(&mut self, entity: T) -> &T {
        let slot = match self.entities.entry(entity.id().to_owned()) {
            Entry::Occupied(mut existing) => {
                existing.insert(entity);
                existing.into_mut()
            },
            Entry::Vacant(slot) => slot.insert(entity),
        };
        Self::notify(&mut self.version, &self.changes);
        slot
    }

    /// Insert or replace each item by id. Never fails.
    pub fn upsert_many(&mut self, items: Vec<T>) {
        self.insert_all(items);
    }

    /// Remove the entity stored under `id` and return it.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::NotFound`] if `id` is absent.
    pub fn remove_one(&mut self, id: &str) -> Result<T, CollectionError> {
        let removed = self
            .entities
            .remove(id)
            .ok_or_else(|| CollectionError::not_found(id))?;
        Self::notify(&mut self.version, &self.changes);
        Ok(removed)
    }

    /// Remove several entities, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::NotFound`] listing every absent id. Nothing
    /// is removed in that case.
    pub fn remove_many<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<(), CollectionError> {
        let missing: Vec<String> = ids
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|id| !self.entities.contains_key(*id))
            .map(str::to_owned)
            .collect();

        if !missing.is_empty() {
            return Err(CollectionError::NotFound { ids: missing });
        }

        if ids.is_empty() {
            return Ok(());
        }

        for id in ids {
            self.entities.remove(AsRef::<str>::as_ref(id));
        }
        Self::notify(&mut self.version, &self.changes);
        Ok(())
    }

    /// Replace the whole content with `items`. Never fails.
    ///
    /// Later duplicates among `items` overwrite earlier ones.
    pub fn set_all(&mut self, items: Vec<T>) {
        self.entities.clear();
        for item in items {
            self.entities.insert(item.id().to_owned(), item);
        }
        Self::notify(&mut self.version, &self.changes);
    }

    /// Remove every entity
    pub fn reset(&mut self) {
        self.entities.clear();
        Self::notify(&mut self.version, &self.changes);
    }

    fn insert_all(&mut self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        for item in items {
            self.entities.insert(item.id().to_owned(), item);
        }
        Self::notify(&mut self.version, &self.changes);
    }
}

impl<T: Entity> Default for EntityCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> FromIterator<T> for EntityCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collection = Self::new();
        collection.set_all(iter.into_iter().collect());
        collection
    }
}
