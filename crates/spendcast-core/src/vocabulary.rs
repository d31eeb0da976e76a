//! Category vocabulary
//!
//! The fixed, ordered set of spending categories the engine always reports
//! on. Every matrix row, scaler entry and forecast result is indexed by
//! position in this list.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Catch-all category for unknown or empty category strings
pub const OTHER_CATEGORY: &str = "other";

/// Default category taxonomy, in reporting order
pub const DEFAULT_CATEGORIES: [&str; 10] = [
    "food",
    "transportation",
    "shopping",
    "entertainment",
    "utilities",
    "healthcare",
    "education",
    "travel",
    "insurance",
    "other",
];

/// Ordered category vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    categories: Vec<String>,
    other_index: usize,
}

impl Vocabulary {
    /// Build a vocabulary, normalizing names to lowercase
    ///
    /// Fails if the list is empty, has duplicates, or lacks `other`.
    pub fn new<S: AsRef<str>>(categories: &[S]) -> Result<Self> {
        let categories: Vec<String> = categories
            .iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .collect();

        if categories.iter().any(|c| c.is_empty()) {
            return Err(Error::Config("vocabulary contains an empty category".into()));
        }
        for (i, c) in categories.iter().enumerate() {
            if categories[..i].contains(c) {
                return Err(Error::Config(format!("duplicate category in vocabulary: {}", c)));
            }
        }
        let other_index = categories
            .iter()
            .position(|c| c == OTHER_CATEGORY)
            .ok_or_else(|| {
                Error::Config(format!("vocabulary must contain '{}'", OTHER_CATEGORY))
            })?;

        Ok(Self {
            categories,
            other_index,
        })
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    pub fn name(&self, index: usize) -> &str {
        &self.categories[index]
    }

    /// Exact position of a known category
    pub fn position(&self, category: &str) -> Option<usize> {
        let needle = category.trim().to_lowercase();
        self.categories.iter().position(|c| *c == needle)
    }

    /// Column for a raw category string; unknown, empty or missing map to `other`
    pub fn index_of(&self, category: Option<&str>) -> usize {
        category
            .and_then(|c| self.position(c))
            .unwrap_or(self.other_index)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            other_index: DEFAULT_CATEGORIES.len() - 1,
        }
    }
}

impl TryFrom<Vec<String>> for Vocabulary {
    type Error = Error;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(value: Vocabulary) -> Self {
        value.categories
    }
}
