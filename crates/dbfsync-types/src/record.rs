//! Records and keys.
//!
//! A [`Record`] is an ordered mapping from target field name to a scalar
//! [`Value`]. Field order is the declared column-mapping order, which keeps
//! fingerprinting and SQL generation deterministic.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// An ordered field-name → value mapping.
///
/// Field names are target names (post-mapping) and are unique within a
/// record. Lookup is linear; records carry at most a few dozen fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Set a field, replacing any existing value under the same name and
    /// otherwise appending at the end.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Iterate fields in declared order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Field names in declared order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build the identity [`Key`] from this record's key fields.
    ///
    /// # Errors
    ///
    /// Returns the name of the first declared key field absent from the
    /// record.
    pub fn key(&self, key_fields: &[String]) -> Result<Key, String> {
        let mut parts = Vec::with_capacity(key_fields.len());
        for field in key_fields {
            match self.get(field) {
                Some(v) => parts.push(v.canonical_text()),
                None => return Err(field.clone()),
            }
        }
        Ok(Key(parts))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.set(name, value);
        }
        record
    }
}

/// Ordered tuple of canonicalized key-field values identifying a record.
///
/// Unique within one extraction batch and in the sink table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Vec<String>);

impl Key {
    #[must_use]
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("|"))
    }
}
