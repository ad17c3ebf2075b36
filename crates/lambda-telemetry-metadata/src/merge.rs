//! Merge precedence between the three metadata categories.
//!
//! Every channel builds up to three mappings per invocation and flattens
//! them with a shallow last-write-wins merge. The order is a single
//! explicit setting, [`MergeOrder`], shared by all channels instead of
//! being repeated inline per handler.
//!
//! | Preset | Order (first to last) | Winner on conflict |
//! |--------|-----------------------|--------------------|
//! | [`MergeOrder::DYNAMIC_STATIC_REQUIRED`] (default) | dynamic, static, required | required |
//! | [`MergeOrder::STATIC_DYNAMIC_REQUIRED`] | static, dynamic, required | required |

use crate::error::{MetadataError, Result};
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A metadata category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Deployment-time organisational facts.
    Static,
    /// Facts resolved per invocation from the event, context and environment.
    Dynamic,
    /// Values generated per invocation (identifiers, timestamps, defaults).
    Required,
}

impl Category {
    /// Lowercase category name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Static => "static",
            Category::Dynamic => "dynamic",
            Category::Required => "required",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Category::Static),
            "dynamic" => Ok(Category::Dynamic),
            "required" | "generated" => Ok(Category::Required),
            other => Err(MetadataError::UnknownCategory(other.to_string())),
        }
    }
}

/// The order in which categories are merged; later categories win.
///
/// Always a permutation of the three categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MergeOrderRepr", into = "Vec<Category>")]
pub struct MergeOrder([Category; 3]);

impl MergeOrder {
    /// Dynamic, then static, then required.
    pub const DYNAMIC_STATIC_REQUIRED: MergeOrder =
        MergeOrder([Category::Dynamic, Category::Static, Category::Required]);

    /// Static, then dynamic, then required.
    pub const STATIC_DYNAMIC_REQUIRED: MergeOrder =
        MergeOrder([Category::Static, Category::Dynamic, Category::Required]);

    /// Creates a merge order, rejecting anything that is not a permutation
    /// of the three categories.
    pub fn new(order: [Category; 3]) -> Result<Self> {
        let [a, b, c] = order;
        if a == b || a == c || b == c {
            return Err(MetadataError::InvalidMergeOrder(order.to_vec()));
        }
        Ok(Self(order))
    }

    /// Categories from first merged to last merged.
    pub fn categories(&self) -> &[Category; 3] {
        &self.0
    }

    /// Position of `category` in the order; higher positions win.
    pub fn rank(&self, category: Category) -> usize {
        self.0
            .iter()
            .position(|c| *c == category)
            .unwrap_or_default()
    }

    /// The category whose value survives when both define the same key.
    pub fn winner(&self, a: Category, b: Category) -> Category {
        if self.rank(a) >= self.rank(b) { a } else { b }
    }

    /// Flattens the three layers into one mapping.
    pub fn merge(&self, layers: &MetadataLayers) -> Metadata {
        let mut merged = Metadata::new();
        for category in self.0 {
            merged.merge(layers.get(category));
        }
        merged
    }
}

impl Default for MergeOrder {
    fn default() -> Self {
        Self::DYNAMIC_STATIC_REQUIRED
    }
}

impl fmt::Display for MergeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a},{b},{c}")
    }
}

impl FromStr for MergeOrder {
    type Err = MetadataError;

    /// Parses a comma-separated list such as `static,dynamic,required`.
    fn from_str(s: &str) -> Result<Self> {
        let categories = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Category::from_str)
            .collect::<Result<Vec<_>>>()?;
        MergeOrder::try_from(categories)
    }
}

impl TryFrom<Vec<Category>> for MergeOrder {
    type Error = MetadataError;

    fn try_from(categories: Vec<Category>) -> Result<Self> {
        let order: [Category; 3] = categories
            .clone()
            .try_into()
            .map_err(|_| MetadataError::InvalidMergeOrder(categories))?;
        MergeOrder::new(order)
    }
}

impl From<MergeOrder> for Vec<Category> {
    fn from(order: MergeOrder) -> Self {
        order.0.to_vec()
    }
}

/// Accepts either a list (`["static", "dynamic", "required"]`) or a
/// comma-separated string, since environment variables arrive as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum MergeOrderRepr {
    List(Vec<Category>),
    Text(String),
}

impl TryFrom<MergeOrderRepr> for MergeOrder {
    type Error = MetadataError;

    fn try_from(repr: MergeOrderRepr) -> Result<Self> {
        match repr {
            MergeOrderRepr::List(categories) => MergeOrder::try_from(categories),
            MergeOrderRepr::Text(text) => text.parse(),
        }
    }
}

/// The three per-invocation mappings of one channel, before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataLayers {
    /// Static metadata.
    pub static_metadata: Metadata,
    /// Dynamic metadata.
    pub dynamic: Metadata,
    /// Required/generated metadata.
    pub required: Metadata,
}

impl MetadataLayers {
    /// Returns the mapping for `category`.
    pub fn get(&self, category: Category) -> &Metadata {
        match category {
            Category::Static => &self.static_metadata,
            Category::Dynamic => &self.dynamic,
            Category::Required => &self.required,
        }
    }
}
