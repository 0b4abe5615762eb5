//! Record
//!
//! One row of a statement result: an ordered set of named values.

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use super::error::{DriverError, DriverResult};
use super::types::{Node, Path, Relationship, Value};

// ============================================================================
// Record
// ============================================================================

/// A result record. Values are reachable by column name or by position.
///
/// Indexing with `record["name"]` or `record[0]` panics when the column does
/// not exist; use [`Record::get`] or [`Record::get_by_index`] to avoid that.
#[derive(Debug, Clone)]
pub struct Record {
    /// Column names, shared by every record of a result
    keys: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Creates a record. `keys` and `values` are paired up by position and
    /// must have the same length.
    pub fn new(keys: impl Into<Arc<[String]>>, values: Vec<Value>) -> Self {
        let keys = keys.into();
        debug_assert_eq!(keys.len(), values.len(), "record keys and values differ in length");
        Self { keys, values }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// `(key, value)` pairs in column order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Position of a column.
    pub fn index(&self, key: &str) -> DriverResult<usize> {
        self.keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| DriverError::type_conversion(format!("Key '{}' not found", key)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Typed lookup by column name.
    pub fn get_as<T>(&self, key: &str) -> DriverResult<T>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        self.get(key)
            .cloned()
            .ok_or_else(|| DriverError::type_conversion(format!("Key '{}' not found", key)))
            .and_then(T::try_from)
    }

    pub fn get_bool(&self, key: &str) -> DriverResult<bool> {
        self.get_as::<bool>(key)
    }

    pub fn get_int(&self, key: &str) -> DriverResult<i64> {
        self.get_as::<i64>(key)
    }

    pub fn get_float(&self, key: &str) -> DriverResult<f64> {
        self.get_as::<f64>(key)
    }

    pub fn get_string(&self, key: &str) -> DriverResult<String> {
        self.get_as::<String>(key)
    }

    pub fn get_node(&self, key: &str) -> DriverResult<Node> {
        self.get_as::<Node>(key)
    }

    pub fn get_relationship(&self, key: &str) -> DriverResult<Relationship> {
        self.get_as::<Relationship>(key)
    }

    pub fn get_path(&self, key: &str) -> DriverResult<Path> {
        self.get_as::<Path>(key)
    }

    /// Like [`Record::get_as`], with `Null` and missing columns mapped to `None`.
    pub fn get_optional<T>(&self, key: &str) -> DriverResult<Option<T>>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        match self.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(v) => T::try_from(v.clone()).map(Some),
        }
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        self.keys
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.keys[..] == other.keys[..] && self.values == other.values
    }
}

impl Index<&str> for Record {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        match self.get(key) {
            Some(value) => value,
            None => panic!("no column named {:?} in {}", key, self),
        }
    }
}

impl Index<usize> for Record {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Record")?;
        for (key, value) in self.items() {
            write!(f, " {}={}", key, value)?;
        }
        write!(f, ">")
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::iter::Zip<std::vec::IntoIter<String>, std::vec::IntoIter<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.to_vec().into_iter().zip(self.values)
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::iter::Zip<std::slice::Iter<'a, String>, std::slice::Iter<'a, Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter().zip(self.values.iter())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new(
            vec!["a".to_string(), "b".to_string()],
            vec![Value::Integer(1), Value::Integer(2)],
        )
    }

    #[test]
    fn test_lookup_by_key_and_position_agree() {
        let record = sample();
        assert_eq!(record["b"], Value::Integer(2));
        assert_eq!(record[1], Value::Integer(2));
        assert_eq!(record.index("b").unwrap(), 1);
        assert!(record.index("c").is_err());
    }

    #[test]
    fn test_keys_values_items() {
        let record = sample();
        assert_eq!(record.keys(), &["a".to_string(), "b".to_string()]);
        assert_eq!(record.values(), &[Value::Integer(1), Value::Integer(2)]);
        let items: Vec<_> = record.items().collect();
        assert_eq!(items, vec![("a", &Value::Integer(1)), ("b", &Value::Integer(2))]);
        assert_eq!(record.len(), 2);
        assert!(record.contains_key("a"));
        assert!(!record.contains_key("z"));
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "<Record a=1 b=2>");
    }

    #[test]
    fn test_equality() {
        assert_eq!(sample(), sample());
        let other = Record::new(
            vec!["a".to_string(), "b".to_string()],
            vec![Value::Integer(1), Value::Integer(3)],
        );
        assert_ne!(sample(), other);
    }

    #[test]
    fn test_typed_getters() {
        let record = Record::new(
            vec!["name".to_string(), "age".to_string()],
            vec![Value::from("Alice"), Value::Null],
        );
        assert_eq!(record.get_string("name").unwrap(), "Alice");
        assert!(record.get_int("name").is_err());
        assert_eq!(record.get_optional::<i64>("age").unwrap(), None);
        assert!(record.get_string("missing").is_err());
    }

    #[test]
    #[should_panic]
    fn test_index_missing_key_panics() {
        let _ = &sample()["missing"];
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "differ in length")]
    fn test_mismatched_lengths_rejected() {
        let _ = Record::new(vec!["a".to_string()], vec![]);
    }
}
