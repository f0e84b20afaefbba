//! Product catalog demo binary
//!
//! Walks the product store through a cached fetch, a create, an optimistic
//! update, a rejected update that rolls back, and a delete.

use catalog_products::{FetchOptions, InMemoryProductApi, NewProduct, ProductPatch, ProductStore, StoreConfig};
use catalog_store_core::environment::SystemClock;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StoreConfig::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "catalog_products={level},catalog_store_runtime={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    catalog_store_runtime::metrics::register_metrics();

    println!("=== Product Catalog Store ===\n");

    let api = Arc::new(InMemoryProductApi::seeded());
    let store = ProductStore::with_config(api, Arc::new(SystemClock), config);

    // Fetch
    println!(">>> fetch_all");
    store.fetch_all(FetchOptions::default()).await?;
    println!("{}", serde_json::to_string_pretty(&store.sorted())?);
    println!("fresh: {}", store.is_fresh());

    // Cached fetch
    println!("\n>>> fetch_all (served from cache)");
    let cached = store.fetch_all(FetchOptions::default()).await?;
    println!("{} products, version {}", cached.len(), store.version());

    // Create
    println!("\n>>> create Monitor");
    let monitor = store
        .create(NewProduct::new("Monitor", 199.0).with_description("27 inch"))
        .await?;
    println!("{}", serde_json::to_string_pretty(&monitor)?);
    println!("fresh after create: {}", store.is_fresh());

    // Update
    println!("\n>>> update Mouse price");
    let mouse = store.update("2", ProductPatch::new().price(24.99)).await?;
    println!("{}", serde_json::to_string_pretty(&mouse)?);

    // Rejected update
    println!("\n>>> update Laptop with a negative price");
    match store.update("1", ProductPatch::new().price(-1.0)).await {
        Ok(product) => println!("unexpectedly accepted: {product:?}"),
        Err(error) => {
            println!("rejected: {error}");
            println!("update_error(1): {:?}", store.update_error("1").as_ref().map(ToString::to_string));
            println!("Laptop after rollback: {:?}", store.by_id("1").map(|p| p.price));
        },
    }

    // Delete
    println!("\n>>> remove Keyboard");
    store.remove("3").await?;
    println!("ids: {:?}", store.ids());

    // Refetch
    println!("\n>>> fetch_all (forced)");
    store.fetch_all(FetchOptions::forced()).await?;
    println!("{}", serde_json::to_string_pretty(&store.sorted())?);

    println!("\n=== Demo Complete ===");
    Ok(())
}
