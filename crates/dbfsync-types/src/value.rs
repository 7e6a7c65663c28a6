//! Scalar field values and their canonical text rendering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A scalar value carried by a [`Record`](crate::record::Record) field.
///
/// This is the full set of types the flat-file reader produces: text,
/// integers, decimals, calendar dates, and null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Date(NaiveDate),
}

impl Value {
    /// Render this value in the canonical form used for fingerprinting.
    ///
    /// Canonicalization rules:
    /// - null renders as the empty string;
    /// - a real with zero fractional part renders as its integer form
    ///   (`5.0` and `5` contribute identically);
    /// - text is trimmed of surrounding whitespace;
    /// - dates render as ISO `YYYY-MM-DD`.
    #[must_use]
    pub fn canonical_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Real(f)
    }
}
