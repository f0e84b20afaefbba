//! Error types for the product store.

use catalog_store_core::CollectionError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failures surfaced by the product store and its remote data source
///
/// Values are `Clone` because the last failure of every operation slot is
/// kept in that slot's state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// A remote call failed; `message` says which one
    #[error("{message}: {source}")]
    Request {
        /// What the store was trying to do
        message: String,
        /// The underlying failure
        source: Box<ApiError>,
    },

    /// The request was rejected by validation
    #[error("{message}")]
    Validation {
        /// Summary of the rejection
        message: String,
        /// Messages per offending field
        fields: BTreeMap<String, Vec<String>>,
    },

    /// The remote data source could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The backend could not complete a valid request
    #[error("Server error: {0}")]
    Server(String),

    /// No product with this id
    #[error("Product with ID {0} not found")]
    NotFound(String),

    /// The local collection rejected the change
    #[error(transparent)]
    Collection(#[from] CollectionError),
}

impl ApiError {
    /// Validation failure on a single field
    #[must_use]
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Validation {
            fields: BTreeMap::from([(field.to_owned(), vec![message.clone()])]),
            message,
        }
    }

    /// Wrap this failure with what the caller was doing
    #[must_use]
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// The innermost failure, skipping `Request` wrappers
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Request { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_the_cause() {
        let err = ApiError::NotFound("7".to_string()).context("Failed to update product");

        assert_eq!(
            err.to_string(),
            "Failed to update product: Product with ID 7 not found"
        );
        assert_eq!(err.root_cause(), &ApiError::NotFound("7".to_string()));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_field_lists_the_field() {
        let err = ApiError::invalid_field("price", "Price must be a positive number");
        let ApiError::Validation { fields, .. } = &err else {
            unreachable!("invalid_field builds a validation error");
        };
        assert_eq!(fields["price"], vec!["Price must be a positive number".to_string()]);
        assert_eq!(err.to_string(), "Price must be a positive number");
    }
}
