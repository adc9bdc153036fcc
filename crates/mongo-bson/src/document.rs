//! Ordered BSON document.

use indexmap::map::{Entry, IndexMap, IntoIter, Iter, IterMut, Keys, Values};

use crate::value::Bson;

/// An ordered map of keys to BSON values.
///
/// Insertion order is emission order. Inserting an existing key replaces the
/// value in place. Equality is order-sensitive, since key order is
/// observable on the wire.
#[derive(Debug, Clone, Default)]
pub struct Document {
    inner: IndexMap<String, Bson>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: IndexMap::with_capacity(capacity),
        }
    }

    /// Inserts a value, returning the value previously stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> Option<Bson> {
        self.inner.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Bson> {
        self.inner.get_mut(key)
    }

    /// Resolves a dotted path such as `"Address.City"` through nested
    /// documents.
    pub fn get_path(&self, path: &str) -> Option<&Bson> {
        let mut segments = path.split('.');
        let mut current = self.inner.get(segments.next()?)?;
        for segment in segments {
            current = current.as_document()?.get(segment)?;
        }
        Some(current)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Bson::as_str)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(Bson::as_i32)
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Bson::as_document)
    }

    pub fn get_array(&self, key: &str) -> Option<&[Bson]> {
        self.get(key).and_then(Bson::as_array)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Removes `key`, preserving the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Bson> {
        self.inner.shift_remove(key)
    }

    pub fn entry(&mut self, key: impl Into<String>) -> Entry<'_, String, Bson> {
        self.inner.entry(key.into())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn keys(&self) -> Keys<'_, String, Bson> {
        self.inner.keys()
    }

    pub fn values(&self) -> Values<'_, String, Bson> {
        self.inner.values()
    }

    pub fn iter(&self) -> Iter<'_, String, Bson> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, String, Bson> {
        self.inner.iter_mut()
    }

    /// Copies every entry of `other` into `self`, overwriting shared keys.
    pub fn merge(&mut self, other: Document) -> &mut Self {
        for (key, value) in other {
            self.inner.insert(key, value);
        }
        self
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl IntoIterator for Document {
    type Item = (String, Bson);
    type IntoIter = IntoIter<String, Bson>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Bson);
    type IntoIter = Iter<'a, String, Bson>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<K: Into<String>, V: Into<Bson>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut document = Document::new();
        for (key, value) in iter {
            document.insert(key, value);
        }
        document
    }
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```
/// use mongo_bson::{doc, Bson};
///
/// let d = doc! { "FirstName" => "Jack", "Age" => 21 };
/// assert_eq!(d.get("Age"), Some(&Bson::Int32(21)));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $( document.insert($key, $value); )+
        document
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn reinsert_keeps_position() {
        let mut d = doc! { "a" => 1, "b" => 2 };
        d.insert("a", 3);
        let keys: Vec<&String> = d.keys().collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(d.get_i32("a"), Some(3));
    }

    #[test]
    fn equality_is_order_sensitive() {
        let ab = doc! { "a" => 1, "b" => 2 };
        let ba = doc! { "b" => 2, "a" => 1 };
        assert_ne!(ab, ba);
        assert_eq!(ab, doc! { "a" => 1, "b" => 2 });
    }

    #[test]
    fn dotted_path_lookup() {
        let d = doc! { "Address" => doc! { "City" => "Paris" } };
        assert_eq!(d.get_path("Address.City"), Some(&Bson::from("Paris")));
        assert_eq!(d.get_path("Address.Zip"), None);
        assert_eq!(d.get_path("Address.City.Name"), None);
    }

    #[test]
    fn remove_preserves_order() {
        let mut d = doc! { "a" => 1, "b" => 2, "c" => 3 };
        d.remove("b");
        let keys: Vec<&String> = d.keys().collect();
        assert_eq!(keys, ["a", "c"]);
    }

    #[test]
    fn merge_overwrites() {
        let mut d = doc! { "a" => 1, "b" => 2 };
        d.merge(doc! { "b" => 5, "c" => 6 });
        assert_eq!(d, doc! { "a" => 1, "b" => 5, "c" => 6 });
    }
}
