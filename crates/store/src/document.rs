//! Store-native value and document shapes.
//!
//! A [`Document`] is a flat mapping from dotted path to [`StoreValue`]. The
//! store cannot distinguish identifier bytes from arbitrary binary, nor a
//! high-precision decimal from its textual form; the mapper's tag table
//! (`__t.<path>` marker fields) records which paths need reconstruction.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// Primary-key path inside a stored document.
pub const PRIMARY_KEY: &str = "_id";

/// Entity-side name of the primary key.
pub const ID_FIELD: &str = "id";

/// Sibling tag document key (legacy layout, read-only).
pub const TAG_FIELD: &str = "__t";

/// Inline tag marker prefix (written layout).
pub const TAG_PREFIX: &str = "__t.";

/// Store bookkeeping field stripped on read.
pub const VERSION_FIELD: &str = "__v";

/// Type-tag code: reconstruct as an identifier.
pub const TAG_ID: i64 = 0;

/// Type-tag code: reconstruct as an arbitrary-precision decimal.
pub const TAG_DECIMAL: i64 = 1;

/// A flat stored document.
pub type Document = BTreeMap<String, StoreValue>;

/// A value as the store natively represents it.
///
/// `Decimal128` holds the canonical string form of a high-precision decimal;
/// `Doc` only occurs inside arrays (top-level nesting is flattened away).
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Binary(Vec<u8>),
    Decimal128(String),
    Array(Vec<StoreValue>),
    Doc(Document),
}

impl StoreValue {
    /// Store equality: structural, with numeric kinds comparing across
    /// `Int`/`Float` the way the store does.
    pub fn store_eq(&self, other: &StoreValue) -> bool {
        if self == other {
            return true;
        }
        matches!(self.compare(other), Some(Ordering::Equal))
    }

    /// Ordering between two store values, when the store defines one.
    ///
    /// Values of different kinds (other than the numeric cross) never
    /// compare; `Array` and `Doc` support equality only.
    pub fn compare(&self, other: &StoreValue) -> Option<Ordering> {
        match (self, other) {
            (StoreValue::Int(a), StoreValue::Int(b)) => Some(a.cmp(b)),
            (StoreValue::Float(a), StoreValue::Float(b)) => a.partial_cmp(b),
            (StoreValue::Int(a), StoreValue::Float(b)) => (*a as f64).partial_cmp(b),
            (StoreValue::Float(a), StoreValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (StoreValue::Text(a), StoreValue::Text(b)) => Some(a.cmp(b)),
            (StoreValue::DateTime(a), StoreValue::DateTime(b)) => Some(a.cmp(b)),
            (StoreValue::Binary(a), StoreValue::Binary(b)) => Some(a.cmp(b)),
            (StoreValue::Bool(a), StoreValue::Bool(b)) => Some(a.cmp(b)),
            (StoreValue::Null, StoreValue::Null) => Some(Ordering::Equal),
            (StoreValue::Decimal128(a), StoreValue::Decimal128(b)) => {
                let a: BigDecimal = a.parse().ok()?;
                let b: BigDecimal = b.parse().ok()?;
                a.partial_cmp(&b)
            }
            _ => None,
        }
    }
}

/// Index field direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    Ascending,
    Descending,
}

/// One index declaration on a collection.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub fields: Vec<(String, IndexOrder)>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn ascending(fields: &[&str]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|f| ((*f).to_owned(), IndexOrder::Ascending))
                .collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_kinds_compare_across_int_and_float() {
        assert!(StoreValue::Int(5).store_eq(&StoreValue::Float(5.0)));
        assert_eq!(
            StoreValue::Int(3).compare(&StoreValue::Float(4.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn mismatched_kinds_never_compare() {
        assert_eq!(
            StoreValue::Text("5".into()).compare(&StoreValue::Int(5)),
            None
        );
        assert!(!StoreValue::Text("5".into()).store_eq(&StoreValue::Int(5)));
    }

    #[test]
    fn decimals_compare_numerically_not_textually() {
        let a = StoreValue::Decimal128("1.10".into());
        let b = StoreValue::Decimal128("1.1".into());
        assert!(a.store_eq(&b));

        let c = StoreValue::Decimal128("10.0".into());
        assert_eq!(b.compare(&c), Some(Ordering::Less));
    }
}
