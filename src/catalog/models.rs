// SPDX-License-Identifier: GPL-3.0-only
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Product identity, normalized to its string form.
///
/// Backends disagree on whether ids are numbers or strings, so `1000` and
/// `"1000"` must name the same product. All comparisons go through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<u64> for ProductId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

struct ProductIdVisitor;

impl<'de> Visitor<'de> for ProductIdVisitor {
    type Value = ProductId;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or integer product id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ProductId, E> {
        Ok(ProductId::new(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ProductId, E> {
        Ok(ProductId(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ProductId, E> {
        Ok(ProductId(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ProductId, E> {
        // Spreadsheet cells hand back 1000.0 for an integer id
        if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 {
            Ok(ProductId((v as i64).to_string()))
        } else {
            Err(E::custom(format!("non-integral product id: {}", v)))
        }
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ProductIdVisitor)
    }
}

/// A single inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,

    pub name: String,

    /// Key into the category registry
    #[serde(default)]
    pub category: String,

    #[serde(default, deserialize_with = "deserialize_text")]
    pub description: String,

    /// Unit price, currency-agnostic
    #[serde(default)]
    pub price: f64,

    #[serde(default, deserialize_with = "deserialize_stock")]
    pub stock: u32,

    #[serde(
        default,
        deserialize_with = "deserialize_sku",
        skip_serializing_if = "Option::is_none"
    )]
    pub sku: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, category: impl Into<String>, stock: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            price: 0.0,
            stock,
            sku: None,
        }
    }

    /// Check the record invariants that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Product id cannot be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err(format!("Product {} has an empty name", self.id));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!("Product {} has an invalid price: {}", self.id, self.price));
        }
        Ok(())
    }
}

/// Return the first id that appears more than once
pub fn find_duplicate_id(products: &[Product]) -> Option<&ProductId> {
    let mut seen = HashSet::with_capacity(products.len());
    products.iter().map(|p| &p.id).find(|id| !seen.insert(*id))
}

/// Validate every record plus id uniqueness across the list
pub fn validate_catalog(products: &[Product]) -> Result<(), String> {
    for product in products {
        product.validate()?;
    }
    if let Some(id) = find_duplicate_id(products) {
        return Err(format!("Duplicate product id: {}", id));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseText {
    Text(String),
    Int(i64),
    Float(f64),
}

impl LooseText {
    fn into_string(self) -> String {
        match self {
            LooseText::Text(s) => s,
            LooseText::Int(i) => i.to_string(),
            LooseText::Float(f) => f.to_string(),
        }
    }
}

fn deserialize_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value: Option<LooseText> = Option::deserialize(deserializer)?;
    Ok(value.map(LooseText::into_string).unwrap_or_default())
}

fn deserialize_sku<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<LooseText> = Option::deserialize(deserializer)?;
    Ok(value
        .map(LooseText::into_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

struct StockVisitor;

impl<'de> Visitor<'de> for StockVisitor {
    type Value = u32;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer stock count")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
        u32::try_from(v).map_err(|_| E::custom(format!("stock out of range: {}", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
        u32::try_from(v).map_err(|_| E::custom(format!("stock must be non-negative: {}", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u32, E> {
        if v.is_finite() && v.fract() == 0.0 && v >= 0.0 && v <= u32::MAX as f64 {
            Ok(v as u32)
        } else {
            Err(E::custom(format!("invalid stock: {}", v)))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
        v.trim()
            .parse::<u32>()
            .map_err(|_| E::custom(format!("invalid stock: {:?}", v)))
    }
}

fn deserialize_stock<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    deserializer.deserialize_any(StockVisitor)
}
