//! # Catalog Store Core
//!
//! Core traits and types for the catalog store.
//!
//! This crate provides the synchronous half of the store layer:
//!
//! - **Entity**: a record with a unique string identifier and a typed patch
//! - **`EntityCollection`**: a normalized, observable map of entities keyed by id
//! - **`CollectionError`**: existence failures returned as values
//! - **Environment**: injected dependencies (the [`environment::Clock`])
//!
//! The asynchronous half (loading/error/staleness bookkeeping) lives in
//! `catalog-store-runtime`.
//!
//! ## Example
//!
//! ```
//! use catalog_store_core::{Entity, EntityCollection};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Tag {
//!     id: String,
//!     label: String,
//! }
//!
//! struct TagPatch {
//!     label: Option<String>,
//! }
//!
//! impl Entity for Tag {
//!     type Patch = TagPatch;
//!
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn apply_patch(&mut self, patch: &TagPatch) {
//!         if let Some(label) = &patch.label {
//!             self.label.clone_from(label);
//!         }
//!     }
//! }
//!
//! let mut tags = EntityCollection::new();
//! tags.add_one(Tag { id: "1".into(), label: "new".into() }).ok();
//! assert!(tags.add_one(Tag { id: "1".into(), label: "dup".into() }).is_err());
//! assert_eq!(tags.ids(), vec!["1"]);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Collection module - normalized entity storage
pub mod collection;

pub use collection::EntityCollection;
pub use entity::Entity;
pub use error::CollectionError;

/// Entity module - the record contract stored by collections
pub mod entity {
    /// A record with a unique string identifier.
    ///
    /// Partial updates are expressed with an explicit [`Entity::Patch`] type
    /// whose fields are all optional. Only the fields present in the patch are
    /// written by [`Entity::apply_patch`].
    pub trait Entity: Clone {
        /// Partial change set applied by `update_one`
        type Patch;

        /// The unique identifier of this entity
        fn id(&self) -> &str;

        /// Overwrite the fields present in `patch`
        fn apply_patch(&mut self, patch: &Self::Patch);
    }
}

/// Error types for collection operations
pub mod error {
    use thiserror::Error;

    /// Expected failures of collection mutations
    ///
    /// Existence conflicts are routine, so they are returned as values and
    /// never raised as panics. Every variant lists all offending ids.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum CollectionError {
        /// One or more ids are already present
        #[error("Entities already exist: {}", .ids.join(", "))]
        AlreadyExists {
            /// Conflicting ids, in request order
            ids: Vec<String>,
        },

        /// One or more ids are absent
        #[error("Entities not found: {}", .ids.join(", "))]
        NotFound {
            /// Missing ids, in request order
            ids: Vec<String>,
        },
    }

    impl CollectionError {
        /// Conflict on a single id
        #[must_use]
        pub fn already_exists(id: impl Into<String>) -> Self {
            Self::AlreadyExists {
                ids: vec![id.into()],
            }
        }

        /// Missing single id
        #[must_use]
        pub fn not_found(id: impl Into<String>) -> Self {
            Self::NotFound {
                ids: vec![id.into()],
            }
        }

        /// The ids this error reports
        #[must_use]
        pub fn ids(&self) -> &[String] {
            match self {
                Self::AlreadyExists { ids } | Self::NotFound { ids } => ids,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All time-dependent behavior (staleness, `last_fetch`) reads the clock
/// through this trait so tests can substitute a deterministic one.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_store_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};
    use super::CollectionError;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn collection_error_lists_every_id() {
        let err = CollectionError::AlreadyExists {
            ids: vec!["1".to_string(), "2".to_string()],
        };
        assert_eq!(err.to_string(), "Entities already exist: 1, 2");
        assert_eq!(err.ids(), ["1", "2"]);

        let err = CollectionError::not_found("9");
        assert_eq!(err.to_string(), "Entities not found: 9");
    }
}
