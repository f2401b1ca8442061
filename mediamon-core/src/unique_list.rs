//! Ordered, duplicate-free sequence shared by folders and extensions.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Insertion-ordered list that never holds two equal elements.
///
/// Equality is the element's `PartialEq`. Lookups are linear; the lists this
/// crate keeps are small (folders, extensions) or append-only (the ledger).
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UniqueList<T> {
    items: Vec<T>,
}

impl<T> Default for UniqueList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: fmt::Debug> fmt::Debug for UniqueList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T: PartialEq> UniqueList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn position(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|existing| existing == item)
    }

    /// Appends `item` unless an equal element is already present. Returns
    /// `true` when the list grew.
    pub fn push(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Replaces the element at `index`, returning the previous value.
    ///
    /// Returns `None` when `index` is out of range. If `item` already lives
    /// at another position the list would hold a duplicate, so the old slot
    /// is removed instead and the existing element keeps its place.
    pub fn replace(&mut self, index: usize, item: T) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        match self.position(&item) {
            Some(existing) if existing != index => Some(self.items.remove(index)),
            _ => Some(std::mem::replace(&mut self.items[index], item)),
        }
    }

    /// Removes the element equal to `item`, keeping the relative order of
    /// the rest.
    pub fn remove(&mut self, item: &T) -> Option<T> {
        let index = self.position(item)?;
        Some(self.items.remove(index))
    }

    /// Removes every element matching `predicate`, preserving order.
    pub fn retain(&mut self, predicate: impl FnMut(&T) -> bool) {
        self.items.retain(predicate);
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: PartialEq> FromIterator<T> for UniqueList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<T: PartialEq> Extend<T> for UniqueList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a UniqueList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for UniqueList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'de, T> Deserialize<'de> for UniqueList<T>
where
    T: Deserialize<'de> + PartialEq,
{
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_skips_duplicates_and_keeps_order() {
        let mut list = UniqueList::new();
        assert!(list.push("b"));
        assert!(list.push("a"));
        assert!(!list.push("b"));
        assert_eq!(list.as_slice(), &["b", "a"]);
    }

    #[test]
    fn remove_compacts_left() {
        let mut list: UniqueList<_> = ["x", "y", "z"].into_iter().collect();
        assert_eq!(list.remove(&"y"), Some("y"));
        assert_eq!(list.as_slice(), &["x", "z"]);
        assert_eq!(list.remove(&"missing"), None);
    }

    #[test]
    fn replace_out_of_range_is_none() {
        let mut list: UniqueList<_> = [1, 2].into_iter().collect();
        assert_eq!(list.replace(2, 5), None);
        assert_eq!(list.replace(0, 7), Some(1));
        assert_eq!(list.as_slice(), &[7, 2]);
    }

    #[test]
    fn replace_with_existing_value_drops_old_slot() {
        let mut list: UniqueList<_> = [1, 2, 3].into_iter().collect();
        assert_eq!(list.replace(0, 3), Some(1));
        assert_eq!(list.as_slice(), &[2, 3]);
    }

    #[test]
    fn deserialize_dedups() {
        let list: UniqueList<String> =
            serde_json::from_str(r#"[".mp4", ".mkv", ".mp4"]"#).unwrap();
        assert_eq!(list.len(), 2);
    }
}
