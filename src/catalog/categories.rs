// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};

const DEFAULT_ICON: &str = "fas fa-tools";
const DEFAULT_COLOR: &str = "#797d81";
const FALLBACK_ICON: &str = "fas fa-archive";
const FALLBACK_COLOR: &str = "#7f8c8d";

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Key stored on each product
    pub key: String,

    /// Display name
    pub name: String,

    #[serde(default = "default_icon")]
    pub icon: String,

    /// Product file for this category, relative to the products directory
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Category {
    fn builtin(key: &str, file: &str) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            icon: default_icon(),
            file: Some(file.to_string()),
            color: default_color(),
        }
    }

    /// Display entry for a key missing from the registry
    pub fn fallback(key: &str) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            icon: FALLBACK_ICON.to_string(),
            file: None,
            color: FALLBACK_COLOR.to_string(),
        }
    }
}

/// Ordered set of known product categories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            Category::builtin("Cintas", "cintas.json"),
            Category::builtin("PVC", "pvc.json"),
            Category::builtin("Varillas", "varillas.json"),
            Category::builtin("Cables", "cables.json"),
            Category::builtin("Abrazaderas", "abrazaderas.json"),
            Category::builtin("Soportes", "soportes.json"),
        ])
    }

    pub fn get(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.key == key)
    }

    /// Registry entry for `key`, or a generic display when it is unknown
    pub fn display(&self, key: &str) -> Category {
        self.get(key).cloned().unwrap_or_else(|| Category::fallback(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
