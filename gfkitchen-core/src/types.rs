use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static metadata for one recipe. One descriptor is one unit of image-generation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDescriptor {
    /// Human-readable recipe name, used in the generation prompt.
    pub title: String,
    /// Unique, URL-safe identifier. Key of the results map and the state file.
    pub slug: String,
    /// Coarse grouping such as "Breakfast" or "Dinner".
    pub category: String,
    /// Short free-text description folded into the prompt.
    pub description: String,
}

impl RecipeDescriptor {
    pub fn new(
        title: impl Into<String>,
        slug: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            category: category.into(),
            description: description.into(),
        }
    }
}

/// A generated image for one recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// URL returned by the image API. Expires after a few hours.
    pub url: String,
    /// Where the downloaded bytes were written, if downloading was enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Detected content type of the downloaded bytes (e.g., "image/png").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Slugs that a batch run should skip without calling the generator.
#[derive(Debug, Clone, Default)]
pub struct CompletionSet {
    slugs: HashSet<String>,
}

impl CompletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slug: impl Into<String>) -> bool {
        self.slugs.insert(slug.into())
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.slugs.contains(slug)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CompletionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            slugs: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for CompletionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.slugs.extend(iter.into_iter().map(Into::into));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_set_collects_and_extends() {
        let mut set: CompletionSet = ["a", "b"].into_iter().collect();
        set.extend(vec!["b".to_string(), "c".to_string()]);

        assert_eq!(set.len(), 3);
        assert!(set.contains("c"));
        assert!(!set.contains("d"));
    }
}
