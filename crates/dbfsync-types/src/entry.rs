//! Entry schema documents.
//!
//! An [`Entry`] declares one synchronization unit: which source table it
//! reads, which sink table it writes, the ordered source→target column
//! mapping, and the key and hash field lists. An [`EntrySet`] is the parsed
//! schema document grouping entries into catalogs and transactional tables.

use serde::{Deserialize, Serialize};

/// One source field → target field rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: String,
    pub target: String,
}

/// Declared synchronization unit. Immutable during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Source identifier (the flat file's name, without extension).
    pub id: String,
    /// Target table name in the sink.
    pub table: String,
    /// Ordered source→target column mappings.
    pub columns: Vec<ColumnMapping>,
    /// Target fields that uniquely identify a record.
    pub key_fields: Vec<String>,
    /// Target fields that feed the fingerprint. May differ from the keys.
    pub hash_fields: Vec<String>,
}

impl Entry {
    /// Source field names in mapping order, for the extract request.
    #[must_use]
    pub fn source_fields(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.source.clone()).collect()
    }

    /// Check structural consistency of the declaration.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first problem found: an empty key list,
    /// a duplicate target column, or a key/hash field not covered by the
    /// column mapping.
    pub fn validate(&self) -> Result<(), String> {
        if self.key_fields.is_empty() {
            return Err(format!("entry '{}' declares no key fields", self.id));
        }
        let mut seen = std::collections::HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.target.to_lowercase()) {
                return Err(format!(
                    "entry '{}' maps target column '{}' more than once",
                    self.id, col.target
                ));
            }
        }
        for field in self.key_fields.iter().chain(&self.hash_fields) {
            if !self
                .columns
                .iter()
                .any(|c| c.target.eq_ignore_ascii_case(field))
            {
                return Err(format!(
                    "entry '{}' references field '{}' outside its column mapping",
                    self.id, field
                ));
            }
        }
        Ok(())
    }
}

/// Parsed schema document: entries grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySet {
    #[serde(rename = "CATALOGS", default)]
    pub catalogs: Vec<Entry>,
    #[serde(rename = "TRANSACTIONAL", default)]
    pub transactional: Vec<Entry>,
}

impl EntrySet {
    /// Parse a schema document from JSON text and validate every entry.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error, or a validation message for the
    /// first malformed entry.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let set: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        for entry in set.iter() {
            entry.validate()?;
        }
        Ok(set)
    }

    /// All entries, catalogs first, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.catalogs.iter().chain(self.transactional.iter())
    }

    /// Case-insensitive lookup across both groups.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.iter().find(|e| e.id.eq_ignore_ascii_case(name))
    }
}
