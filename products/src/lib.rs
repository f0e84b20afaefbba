//! # Catalog Products
//!
//! Product catalog store built on the catalog store layer.
//!
//! - [`ProductStore`]: normalized products plus loading/error/staleness per operation
//! - [`ProductApi`]: the remote data source the store calls
//! - [`InMemoryProductApi`]: a volatile backend for demos and tests
//! - [`StoreConfig`]: staleness threshold and log level loaded from the environment
//!
//! ## Example
//!
//! ```
//! use catalog_products::{FetchOptions, InMemoryProductApi, NewProduct, ProductPatch, ProductStore};
//! use catalog_store_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), catalog_products::ApiError> {
//! let store = ProductStore::new(Arc::new(InMemoryProductApi::seeded()), Arc::new(SystemClock));
//!
//! store.fetch_all(FetchOptions::default()).await?;
//! let desk = store.create(NewProduct::new("Desk", 250.0)).await?;
//! store.update(&desk.id, ProductPatch::new().price(230.0)).await?;
//!
//! assert_eq!(store.by_id(&desk.id).map(|p| p.price), Some(230.0));
//! assert_eq!(store.count(), 4);
//! # Ok(())
//! # }
//! ```

/// Remote data source
pub mod api;

/// Store configuration
pub mod config;

/// Error types
pub mod error;

/// The product store
pub mod store;

/// Product, patch and creation payload
pub mod types;

pub use api::{ApiFuture, InMemoryProductApi, ProductApi};
pub use config::StoreConfig;
pub use error::ApiError;
pub use store::{FetchOptions, ProductState, ProductStore};
pub use types::{NewProduct, Product, ProductPatch};
