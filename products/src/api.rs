//! Remote data source for products.
//!
//! The store only sees the [`ProductApi`] trait. [`InMemoryProductApi`] is a
//! volatile backend that lives as long as the process, used by the demo
//! binary and the tests.

use crate::error::ApiError;
use crate::types::{NewProduct, Product, ProductPatch};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

/// Boxed future returned by [`ProductApi`] methods
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Remote CRUD operations on products.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the store can
/// hold an `Arc<dyn ProductApi>`.
pub trait ProductApi: Send + Sync {
    /// List every product
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn list(&self) -> ApiFuture<'_, Vec<Product>>;

    /// Create a product; the backend assigns its id
    ///
    /// # Errors
    ///
    /// `Validation` for a bad payload, or transport failures.
    fn create(&self, data: NewProduct) -> ApiFuture<'_, Product>;

    /// Apply `patch` to the product `id` and return the stored result
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation`, or transport failures.
    fn update(&self, id: String, patch: ProductPatch) -> ApiFuture<'_, Product>;

    /// Delete the product `id`
    ///
    /// # Errors
    ///
    /// `NotFound`, or transport failures.
    fn delete(&self, id: String) -> ApiFuture<'_, ()>;
}

#[derive(Debug)]
struct ProductTable {
    products: BTreeMap<String, Product>,
    /// `None` once every `u64` id has been handed out
    next_id: Option<u64>,
}

/// Volatile in-process product backend.
///
/// Ids are assigned sequentially. Payloads are checked the way the HTTP
/// backend checks them: names must be non-empty and prices positive.
#[derive(Debug)]
pub struct InMemoryProductApi {
    table: Mutex<ProductTable>,
}

impl InMemoryProductApi {
    /// An empty backend; the first id assigned is `1`
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(ProductTable {
                products: BTreeMap::new(),
                next_id: Some(1),
            }),
        }
    }

    /// A backend holding the demo catalog (Laptop, Mouse, Keyboard)
    #[must_use]
    pub fn seeded() -> Self {
        Self::with_products([
            Product::new("1", "Laptop", 999.99),
            Product::new("2", "Mouse", 29.99),
            Product::new("3", "Keyboard", 79.99),
        ])
    }

    /// A backend holding `products`; new ids continue after the largest
    /// numeric id present
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products: BTreeMap<String, Product> = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        let next_id = products
            .keys()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .map_or(Some(1), |max| max.checked_add(1));

        Self {
            table: Mutex::new(ProductTable { products, next_id }),
        }
    }

    /// Number of stored products
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_table(|table| table.products.len())
    }

    /// Whether the backend holds no products
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stored product `id`, bypassing the async interface
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Product> {
        self.with_table(|table| table.products.get(id).cloned())
    }

    fn with_table<R>(&self, f: impl FnOnce(&mut ProductTable) -> R) -> R {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }

    fn validate_name(name: &str) -> Result<(), ApiError> {
        if name.trim().is_empty() {
            return Err(ApiError::invalid_field(
                "name",
                "Name is required and must not be empty",
            ));
        }
        Ok(())
    }

    fn validate_price(price: f64) -> Result<(), ApiError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(ApiError::invalid_field(
                "price",
                "Price must be a positive number",
            ));
        }
        Ok(())
    }

    fn create_now(&self, data: NewProduct) -> Result<Product, ApiError> {
        Self::validate_name(&data.name)?;
        Self::validate_price(data.price)?;

        let product = self.with_table(|table| {
            let id = table
                .next_id
                .ok_or_else(|| ApiError::Server("No product ids left to assign".to_string()))?;
            table.next_id = id.checked_add(1);
            let product = data.into_product(id.to_string());
            table.products.insert(product.id.clone(), product.clone());
            Ok::<_, ApiError>(product)
        })?;

        tracing::debug!(id = %product.id, "Product created");
        Ok(product)
    }

    fn update_now(&self, id: &str, patch: &ProductPatch) -> Result<Product, ApiError> {
        // a patched name is taken as given, only creation requires one
        if let Some(price) = patch.price {
            Self::validate_price(price)?;
        }

        self.with_table(|table| {
            let stored = table
                .products
                .get_mut(id)
                .ok_or_else(|| ApiError::NotFound(id.to_owned()))?;
            let mut updated = stored.clone();
            catalog_store_core::Entity::apply_patch(&mut updated, patch);
            *stored = updated.clone();
            Ok(updated)
        })
    }

    fn delete_now(&self, id: &str) -> Result<(), ApiError> {
        self.with_table(|table| {
            table
                .products
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| ApiError::NotFound(id.to_owned()))
        })
    }
}

impl Default for InMemoryProductApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductApi for InMemoryProductApi {
    fn list(&self) -> ApiFuture<'_, Vec<Product>> {
        let products = self.with_table(|table| table.products.values().cloned().collect());
        Box::pin(futures::future::ready(Ok(products)))
    }

    fn create(&self, data: NewProduct) -> ApiFuture<'_, Product> {
        Box::pin(futures::future::ready(self.create_now(data)))
    }

    fn update(&self, id: String, patch: ProductPatch) -> ApiFuture<'_, Product> {
        Box::pin(futures::future::ready(self.update_now(&id, &patch)))
    }

    fn delete(&self, id: String) -> ApiFuture<'_, ()> {
        Box::pin(futures::future::ready(self.delete_now(&id)))
    }
}
