//! Set of unique strings with asymmetric difference

use std::collections::HashSet;

/// A set of unique strings.
#[derive(Debug, Clone, Default)]
pub struct StringSet {
    inner: HashSet<String>,
}

impl StringSet {
    pub fn new() -> Self {
        Self {
            inner: HashSet::new(),
        }
    }

    /// Insert an element, returning false if it was already present
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        self.inner.insert(value.into())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.inner.contains(value)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Elements present in `self` but absent from `other`.
    ///
    /// Asymmetric; no ordering guarantee on the returned sequence.
    pub fn difference(&self, other: &StringSet) -> Vec<String> {
        self.inner
            .iter()
            .filter(|k| !other.inner.contains(*k))
            .cloned()
            .collect()
    }

    /// Consume the set into a plain vector
    pub fn into_vec(self) -> Vec<String> {
        self.inner.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for StringSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(Into::into).collect(),
        }
    }
}
