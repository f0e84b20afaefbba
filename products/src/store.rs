//! The product store: one entity collection plus one tracker slot per operation.
//!
//! - `fetch_all` serves the cached list while it is fresh
//! - `create` appends the backend's product and invalidates the list
//! - `update` and `remove` apply their change locally first and roll back to
//!   the pre-operation snapshot if the backend rejects it
//!
//! Update and delete slots are kept per product id, created on first use and
//! discarded when the product is deleted.
//!
//! Two concurrent operations on the same id are not serialised. The second
//! optimistic change can overwrite the first, and rollback after such a race
//! restores whichever snapshot settles last.

use crate::api::ProductApi;
use crate::config::StoreConfig;
use crate::error::ApiError;
use crate::types::{NewProduct, Product, ProductPatch};
use catalog_store_core::environment::Clock;
use catalog_store_core::EntityCollection;
use catalog_store_runtime::{with_async_state, AsyncOptions, AsyncSlot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;

type Products = RwLock<EntityCollection<Product>>;

/// Tracker slots of the product store
#[derive(Debug, Default)]
pub struct ProductState {
    /// List fetch
    pub fetch: AsyncSlot<ApiError>,
    /// Product creation
    pub create: AsyncSlot<ApiError>,
    /// Per-id updates
    pub update: HashMap<String, AsyncSlot<ApiError>>,
    /// Per-id deletions
    pub delete: HashMap<String, AsyncSlot<ApiError>>,
}

impl ProductState {
    /// Fresh slots, no per-id entries
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Options for [`ProductStore::fetch_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Refetch even if the cached list is fresh
    pub force: bool,
    /// Overrides the configured staleness threshold
    pub stale_time: Option<Duration>,
}

impl FetchOptions {
    /// Always hit the backend
    #[must_use]
    pub const fn forced() -> Self {
        Self {
            force: true,
            stale_time: None,
        }
    }

    /// Use `stale_time` instead of the configured threshold
    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}

/// Product store backed by a [`ProductApi`].
///
/// Cloning the store shares its collection and slots.
#[derive(Clone)]
pub struct ProductStore {
    products: Arc<Products>,
    state: Arc<Mutex<ProductState>>,
    api: Arc<dyn ProductApi>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

fn write_products<R>(products: &Products, f: impl FnOnce(&mut EntityCollection<Product>) -> R) -> R {
    let mut guard = products.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

fn lock_state(state: &Mutex<ProductState>) -> MutexGuard<'_, ProductState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProductStore {
    /// Create a store with the default configuration
    #[must_use]
    pub fn new(api: Arc<dyn ProductApi>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(api, clock, StoreConfig::default())
    }

    /// Create a store with an explicit configuration
    #[must_use]
    pub fn with_config(api: Arc<dyn ProductApi>, clock: Arc<dyn Clock>, config: StoreConfig) -> Self {
        Self {
            products: Arc::new(RwLock::new(EntityCollection::new())),
            state: Arc::new(Mutex::new(ProductState::new())),
            api,
            clock,
            config,
        }
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn read_products<R>(&self, f: impl FnOnce(&EntityCollection<Product>) -> R) -> R {
        let guard = self.products.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn fetch_slot(&self) -> AsyncSlot<ApiError> {
        lock_state(&self.state).fetch.clone()
    }

    fn create_slot(&self) -> AsyncSlot<ApiError> {
        lock_state(&self.state).create.clone()
    }

    fn update_slot(&self, id: &str) -> AsyncSlot<ApiError> {
        lock_state(&self.state)
            .update
            .entry(id.to_owned())
            .or_default()
            .clone()
    }

    fn delete_slot(&self, id: &str) -> AsyncSlot<ApiError> {
        lock_state(&self.state)
            .delete
            .entry(id.to_owned())
            .or_default()
            .clone()
    }

    fn read_slot<R>(
        &self,
        select: impl FnOnce(&ProductState) -> Option<&AsyncSlot<ApiError>>,
        read: impl FnOnce(&AsyncSlot<ApiError>) -> R,
    ) -> Option<R> {
        let state = lock_state(&self.state);
        select(&state).map(read)
    }

    // ========== Actions ==========

    /// Fetch every product, unless the cached list is still fresh.
    ///
    /// # Errors
    ///
    /// Returns the backend failure wrapped with "Failed to fetch products".
    #[tracing::instrument(skip(self))]
    pub async fn fetch_all(&self, options: FetchOptions) -> Result<Vec<Product>, ApiError> {
        let stale_time = options.stale_time.unwrap_or_else(|| self.config.stale_time());
        let slot = self.fetch_slot();

        if !options.force && !slot.is_stale(self.clock.as_ref(), stale_time) {
            tracing::debug!("Serving products from cache");
            return Ok(self.all());
        }

        let api = Arc::clone(&self.api);
        let products = Arc::clone(&self.products);

        with_async_state(
            &slot,
            self.clock.as_ref(),
            || async move {
                let items = api
                    .list()
                    .await
                    .map_err(|e| e.context("Failed to fetch products"))?;
                write_products(&products, |c| c.set_all(items.clone()));
                tracing::info!(count = items.len(), "Products fetched");
                Ok::<_, ApiError>(items)
            },
            AsyncOptions::new(),
        )
        .await
    }

    /// Create a product on the backend and add it locally.
    ///
    /// # Errors
    ///
    /// Returns the backend failure wrapped with "Failed to create product",
    /// or [`ApiError::Collection`] if the returned id is already stored.
    #[tracing::instrument(skip(self, data), fields(name = %data.name))]
    pub async fn create(&self, data: NewProduct) -> Result<Product, ApiError> {
        let slot = self.create_slot();
        let fetch = self.fetch_slot();
        let api = Arc::clone(&self.api);
        let products = Arc::clone(&self.products);

        with_async_state(
            &slot,
            self.clock.as_ref(),
            || async move {
                let created = api
                    .create(data)
                    .await
                    .map_err(|e| e.context("Failed to create product"))?;
                write_products(&products, |c| c.add_one(created.clone()).map(|_| ()))?;
                tracing::info!(id = %created.id, "Product created");
                Ok::<_, ApiError>(created)
            },
            AsyncOptions::new().on_success_sync(move |_: &Product| fetch.invalidate()),
        )
        .await
    }

    /// Update a product, showing the change locally before the backend confirms.
    ///
    /// # Errors
    ///
    /// - [`ApiError::NotFound`] if the product is not in the store (no remote call)
    /// - the backend failure wrapped with "Failed to update product", after
    ///   the local change has been rolled back
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: ProductPatch) -> Result<Product, ApiError> {
        let Some(snapshot) = self.by_id(id) else {
            return Err(ApiError::NotFound(id.to_owned()));
        };

        let slot = self.update_slot(id);
        let fetch = self.fetch_slot();
        let api = Arc::clone(&self.api);
        let products = Arc::clone(&self.products);
        let apply_to = Arc::clone(&self.products);
        let rollback_to = Arc::clone(&self.products);
        let local_id = id.to_owned();
        let remote_id = id.to_owned();
        let local_patch = patch.clone();

        with_async_state(
            &slot,
            self.clock.as_ref(),
            || async move {
                let updated = api
                    .update(remote_id, patch)
                    .await
                    .map_err(|e| e.context("Failed to update product"))?;
                write_products(&products, |c| {
                    c.upsert_one(updated.clone());
                });
                Ok::<_, ApiError>(updated)
            },
            AsyncOptions::new()
                .optimistic(
                    move || {
                        write_products(&apply_to, |c| {
                            if let Err(error) = c.update_one(&local_id, &local_patch) {
                                tracing::debug!(%error, "Optimistic update skipped");
                            }
                        });
                    },
                    move || {
                        write_products(&rollback_to, |c| {
                            c.upsert_one(snapshot);
                        });
                    },
                )
                .on_success_sync(move |_: &Product| fetch.invalidate()),
        )
        .await
    }

    /// Delete a product, removing it locally before the backend confirms.
    ///
    /// On success both per-id slots of the product are discarded.
    ///
    /// # Errors
    ///
    /// - [`ApiError::NotFound`] if the product is not in the store (no remote call)
    /// - the backend failure wrapped with "Failed to delete product", after
    ///   the product has been restored locally
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<(), ApiError> {
        let Some(snapshot) = self.by_id(id) else {
            return Err(ApiError::NotFound(id.to_owned()));
        };

        let slot = self.delete_slot(id);
        let fetch = self.fetch_slot();
        let api = Arc::clone(&self.api);
        let apply_to = Arc::clone(&self.products);
        let rollback_to = Arc::clone(&self.products);
        let state = Arc::clone(&self.state);
        let local_id = id.to_owned();
        let remote_id = id.to_owned();
        let discard_id = id.to_owned();

        with_async_state(
            &slot,
            self.clock.as_ref(),
            || async move {
                api.delete(remote_id)
                    .await
                    .map_err(|e| e.context("Failed to delete product"))
            },
            AsyncOptions::new()
                .optimistic(
                    move || {
                        write_products(&apply_to, |c| {
                            if let Err(error) = c.remove_one(&local_id) {
                                tracing::debug!(%error, "Optimistic delete skipped");
                            }
                        });
                    },
                    move || {
                        write_products(&rollback_to, |c| {
                            c.upsert_one(snapshot);
                        });
                    },
                )
                .on_success_sync(move |_: &()| {
                    fetch.invalidate();
                    let mut state = lock_state(&state);
                    state.delete.remove(&discard_id);
                    state.update.remove(&discard_id);
                    tracing::info!(id = %discard_id, "Product deleted");
                }),
        )
        .await
    }

    /// Mark the cached list stale so the next `fetch_all` hits the backend
    pub fn invalidate(&self) {
        self.fetch_slot().invalidate();
    }

    /// Drop every product and every slot
    pub fn reset(&self) {
        write_products(&self.products, EntityCollection::reset);
        *lock_state(&self.state) = ProductState::new();
        tracing::debug!("Product store reset");
    }

    // ========== Getters ==========

    /// Every product, in id order
    #[must_use]
    pub fn all(&self) -> Vec<Product> {
        self.read_products(|c| c.all().into_iter().cloned().collect())
    }

    /// Every product id, in id order
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.read_products(|c| c.ids().into_iter().map(str::to_owned).collect())
    }

    /// The current product `id`
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<Product> {
        self.read_products(|c| c.select_by_id(id).cloned())
    }

    /// The current products for `ids`, skipping unknown ids
    #[must_use]
    pub fn select_many(&self, ids: &[&str]) -> Vec<Product> {
        self.read_products(|c| c.select_many(ids).into_iter().cloned().collect())
    }

    /// Every product ordered by name, ignoring case
    #[must_use]
    pub fn sorted(&self) -> Vec<Product> {
        let mut products = self.all();
        products.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        products
    }

    /// Number of products
    #[must_use]
    pub fn count(&self) -> usize {
        self.read_products(EntityCollection::len)
    }

    /// Whether the list fetch is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.fetch_slot().is_loading()
    }

    /// Whether a creation is in flight
    #[must_use]
    pub fn is_creating(&self) -> bool {
        self.create_slot().is_loading()
    }

    /// Whether an update of `id` is in flight
    #[must_use]
    pub fn is_updating(&self, id: &str) -> bool {
        self.read_slot(|s| s.update.get(id), AsyncSlot::is_loading)
            .unwrap_or(false)
    }

    /// Whether a deletion of `id` is in flight
    #[must_use]
    pub fn is_deleting(&self, id: &str) -> bool {
        self.read_slot(|s| s.delete.get(id), AsyncSlot::is_loading)
            .unwrap_or(false)
    }

    /// Last list fetch failure
    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        self.fetch_slot().error()
    }

    /// Last creation failure
    #[must_use]
    pub fn create_error(&self) -> Option<ApiError> {
        self.create_slot().error()
    }

    /// Last update failure for `id`
    #[must_use]
    pub fn update_error(&self, id: &str) -> Option<ApiError> {
        self.read_slot(|s| s.update.get(id), AsyncSlot::error)
            .flatten()
    }

    /// Last deletion failure for `id`
    #[must_use]
    pub fn delete_error(&self, id: &str) -> Option<ApiError> {
        self.read_slot(|s| s.delete.get(id), AsyncSlot::error)
            .flatten()
    }

    /// Whether any update or delete slot exists for `id`
    #[must_use]
    pub fn has_slots_for(&self, id: &str) -> bool {
        let state = lock_state(&self.state);
        state.update.contains_key(id) || state.delete.contains_key(id)
    }

    /// Whether the cached list is within the configured staleness threshold
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        !self
            .fetch_slot()
            .is_stale(self.clock.as_ref(), self.config.stale_time())
    }

    /// Number of changes applied to the product collection
    #[must_use]
    pub fn version(&self) -> u64 {
        self.read_products(EntityCollection::version)
    }

    /// Receive the collection version after every change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.read_products(EntityCollection::subscribe)
    }
}

impl std::fmt::Debug for ProductStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductStore")
            .field("products", &self.count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
