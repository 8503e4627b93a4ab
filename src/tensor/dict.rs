//! Insertion-ordered tensor dictionaries

/// Name -> value mapping that remembers insertion order.
///
/// Replacing the value of an existing name keeps the name at its original position.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDict<V> {
    entries: Vec<(String, V)>,
}

impl<V> TensorDict<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or replace `name`, returning the previous value if there was one
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        let name = name.into();
        match self.position(&name) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.position(name).map(|index| &self.entries[index].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.position(name).map(move |index| &mut self.entries[index].1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<V> {
        self.position(name).map(|index| self.entries.remove(index).1)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `f` to every value, keeping names and order
    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(&str, V) -> Result<U, E>,
    ) -> Result<TensorDict<U>, E> {
        let mut mapped = TensorDict::with_capacity(self.entries.len());
        for (name, value) in self.entries {
            let value = f(&name, value)?;
            mapped.entries.push((name, value));
        }
        Ok(mapped)
    }
}

impl<V> Default for TensorDict<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for TensorDict<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = TensorDict::new();
        for (name, value) in iter {
            dict.insert(name, value);
        }
        dict
    }
}

impl<V> IntoIterator for TensorDict<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_is_kept() {
        let dict: TensorDict<i32> = [("b", 1), ("a", 2), ("c", 3)].into_iter().collect();
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut dict = TensorDict::new();
        dict.insert("x", 1);
        dict.insert("y", 2);
        assert_eq!(dict.insert("x", 10), Some(1));
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(dict.get("x"), Some(&10));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_remove_and_lookup() {
        let mut dict: TensorDict<&str> = [("x", "a"), ("y", "b")].into_iter().collect();
        assert!(dict.contains_key("y"));
        assert_eq!(dict.remove("y"), Some("b"));
        assert!(!dict.contains_key("y"));
        assert_eq!(dict.get("missing"), None);
    }
}
