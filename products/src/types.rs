//! Domain types for the product catalog.

use catalog_store_core::Entity;
use serde::{Deserialize, Serialize};

/// A catalog product
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier assigned by the backend
    pub id: String,
    /// Display name
    pub name: String,
    /// Unit price, always positive
    pub price: f64,
    /// Optional long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Product {
    /// Creates a product without description
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            description: None,
        }
    }

    /// Sets the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Fields to change on an existing product. Absent fields are left as is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    /// New name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProductPatch {
    /// An empty patch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Change the price
    #[must_use]
    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Change the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the patch changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.price.is_none() && self.description.is_none()
    }
}

impl Entity for Product {
    type Patch = ProductPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn apply_patch(&mut self, patch: &ProductPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
    }
}

/// Payload for creating a product; the backend assigns the id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Display name
    pub name: String,
    /// Unit price, must be positive
    pub price: f64,
    /// Optional long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewProduct {
    /// Creates a payload without description
    #[must_use]
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            price,
            description: None,
        }
    }

    /// Sets the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds the stored product under `id`
    #[must_use]
    pub fn into_product(self, id: impl Into<String>) -> Product {
        Product {
            id: id.into(),
            name: self.name,
            price: self.price,
            description: self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_overwrites_only_present_fields() {
        let mut product = Product::new("1", "Laptop", 999.99).with_description("14 inch");

        product.apply_patch(&ProductPatch::new().price(899.0));

        assert_eq!(
            product,
            Product::new("1", "Laptop", 899.0).with_description("14 inch")
        );
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(ProductPatch::new().is_empty());
        assert!(!ProductPatch::new().name("Mouse").is_empty());
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let json = serde_json::to_value(ProductPatch::new().price(5.0)).ok();
        assert_eq!(json, Some(serde_json::json!({ "price": 5.0 })));
    }

    #[test]
    fn new_product_keeps_description() {
        let product = NewProduct::new("Desk", 250.0)
            .with_description("oak")
            .into_product("4");
        assert_eq!(product.description.as_deref(), Some("oak"));
        assert_eq!(product.id, "4");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn patch_keeps_id_and_absent_fields(
                name in proptest::option::of("[a-zA-Z ]{1,16}"),
                price in proptest::option::of(0.01f64..10_000.0),
            ) {
                let before = Product::new("7", "Lamp", 35.0).with_description("desk");
                let patch = ProductPatch { name: name.clone(), price, description: None };

                let mut patched = before.clone();
                patched.apply_patch(&patch);

                prop_assert_eq!(&patched.id, &before.id);
                prop_assert_eq!(patched.name, name.unwrap_or(before.name));
                prop_assert_eq!(patched.price.to_bits(), price.unwrap_or(before.price).to_bits());
                prop_assert_eq!(patched.description, before.description);
            }
        }
    }
}
