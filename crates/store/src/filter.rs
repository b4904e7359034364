//! Declarative filters and their translation to the store's query shape.
//!
//! A filter maps field names to either a literal (implying equality) or a
//! set of recognized conditions. The reserved field `id` targets the primary
//! key; `or` holds alternative filters combined as a disjunction. Every
//! literal and condition value passes through the same leaf normalization as
//! the document mapper, so identifier and decimal operands match what is
//! actually stored.

use std::collections::BTreeMap;

use tidings_core::{Identifier, Value};

use crate::document::{StoreValue, ID_FIELD, PRIMARY_KEY};
use crate::error::StoreError;

/// Per-field filter entry: a bare literal means equality.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Literal(Value),
    Where(Conditions),
}

/// The recognized comparison operators, all optional.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    pub equal: Option<Value>,
    pub not_equal: Option<Value>,
    pub any_of: Option<Vec<Value>>,
    pub none_of: Option<Vec<Value>>,
    pub greater_than: Option<Value>,
    pub greater_than_or_equal: Option<Value>,
    pub lesser_than: Option<Value>,
    pub lesser_than_or_equal: Option<Value>,
}

impl Conditions {
    pub fn equal(value: impl Into<Value>) -> Self {
        Self {
            equal: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn any_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self {
            any_of: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn none_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self {
            none_of: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn lesser_than_or_equal(value: impl Into<Value>) -> Self {
        Self {
            lesser_than_or_equal: Some(value.into()),
            ..Self::default()
        }
    }
}

/// A declarative filter over one entity collection.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    fields: BTreeMap<String, FilterValue>,
    or: Vec<Filter>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal equality on a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(name.into(), FilterValue::Literal(value.into()));
        self
    }

    /// Conditions on a field.
    pub fn where_field(mut self, name: impl Into<String>, conditions: Conditions) -> Self {
        self.fields
            .insert(name.into(), FilterValue::Where(conditions));
        self
    }

    /// Primary-key equality shorthand.
    pub fn id(self, id: Identifier) -> Self {
        self.field(ID_FIELD, id)
    }

    /// Primary-key conditions (e.g. inclusion over a set of identifiers).
    pub fn id_where(self, conditions: Conditions) -> Self {
        self.where_field(ID_FIELD, conditions)
    }

    /// Alternatives combined as logical OR.
    pub fn or(mut self, alternatives: Vec<Filter>) -> Self {
        self.or = alternatives;
        self
    }
}

/// Comparison operator in the store's native query shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// The store's native query representation: conjunction of per-path clauses,
/// plus an optional disjunction of sub-queries.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub clauses: BTreeMap<String, Vec<(QueryOp, StoreValue)>>,
    pub or: Vec<Query>,
}

impl Query {
    /// Primary-key equality query.
    pub fn by_id(id: Identifier) -> Self {
        let mut clauses = BTreeMap::new();
        clauses.insert(
            PRIMARY_KEY.to_owned(),
            vec![(QueryOp::Eq, StoreValue::Binary(id.as_bytes().to_vec()))],
        );
        Self {
            clauses,
            or: Vec::new(),
        }
    }
}

/// Normalize a filter leaf into its store form.
///
/// Identifiers become raw bytes, decimals the store's decimal type, arrays
/// are normalized element-wise. Nested records are not valid filter leaves.
fn normalize_leaf(value: &Value) -> Result<StoreValue, StoreError> {
    Ok(match value {
        Value::Null => StoreValue::Null,
        Value::Bool(b) => StoreValue::Bool(*b),
        Value::Int(n) => StoreValue::Int(*n),
        Value::Float(f) => StoreValue::Float(*f),
        Value::Text(s) => StoreValue::Text(s.clone()),
        Value::Timestamp(ts) => StoreValue::DateTime(*ts),
        Value::Binary(b) => StoreValue::Binary(b.clone()),
        Value::Id(id) => StoreValue::Binary(id.as_bytes().to_vec()),
        Value::Decimal(d) => StoreValue::Decimal128(d.to_string()),
        Value::List(items) => StoreValue::Array(
            items
                .iter()
                .map(normalize_leaf)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Record(_) => {
            return Err(StoreError::UnsupportedFilterFieldType(
                "nested record is not a filter value".to_owned(),
            ));
        }
    })
}

fn normalize_many(values: &[Value]) -> Result<StoreValue, StoreError> {
    Ok(StoreValue::Array(
        values
            .iter()
            .map(normalize_leaf)
            .collect::<Result<Vec<_>, _>>()?,
    ))
}

/// Translate a declarative filter into the store's query shape.
pub fn translate(filter: &Filter) -> Result<Query, StoreError> {
    let mut query = Query::default();

    for (name, entry) in &filter.fields {
        let path = if name == ID_FIELD {
            PRIMARY_KEY.to_owned()
        } else {
            name.clone()
        };
        let ops = match entry {
            FilterValue::Literal(value) => vec![(QueryOp::Eq, normalize_leaf(value)?)],
            FilterValue::Where(c) => {
                let mut ops = Vec::new();
                if let Some(v) = &c.equal {
                    ops.push((QueryOp::Eq, normalize_leaf(v)?));
                }
                if let Some(v) = &c.not_equal {
                    ops.push((QueryOp::Ne, normalize_leaf(v)?));
                }
                if let Some(vs) = &c.any_of {
                    ops.push((QueryOp::In, normalize_many(vs)?));
                }
                if let Some(vs) = &c.none_of {
                    ops.push((QueryOp::NotIn, normalize_many(vs)?));
                }
                if let Some(v) = &c.greater_than {
                    ops.push((QueryOp::Gt, normalize_leaf(v)?));
                }
                if let Some(v) = &c.greater_than_or_equal {
                    ops.push((QueryOp::Gte, normalize_leaf(v)?));
                }
                if let Some(v) = &c.lesser_than {
                    ops.push((QueryOp::Lt, normalize_leaf(v)?));
                }
                if let Some(v) = &c.lesser_than_or_equal {
                    ops.push((QueryOp::Lte, normalize_leaf(v)?));
                }
                ops
            }
        };
        query.clauses.insert(path, ops);
    }

    for alternative in &filter.or {
        query.or.push(translate(alternative)?);
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidings_core::{IdGenerator, IdKind};

    #[test]
    fn literal_translates_to_equality() {
        let q = translate(&Filter::new().field("status", "PENDING")).unwrap();
        assert_eq!(
            q.clauses.get("status"),
            Some(&vec![(QueryOp::Eq, StoreValue::Text("PENDING".into()))])
        );
    }

    #[test]
    fn inclusion_translates_to_normalized_in() {
        let g = IdGenerator::new();
        let a = g.generate(IdKind::User);
        let b = g.generate(IdKind::User);

        let q = translate(&Filter::new().id_where(Conditions::any_of([a, b]))).unwrap();
        let ops = q.clauses.get("_id").unwrap();
        assert_eq!(
            ops,
            &vec![(
                QueryOp::In,
                StoreValue::Array(vec![
                    StoreValue::Binary(a.as_bytes().to_vec()),
                    StoreValue::Binary(b.as_bytes().to_vec()),
                ])
            )]
        );
    }

    #[test]
    fn or_translates_to_disjunction() {
        let q = translate(
            &Filter::new().or(vec![
                Filter::new().field("status", "PENDING"),
                Filter::new().field("status", "FAILED"),
            ]),
        )
        .unwrap();
        assert_eq!(q.or.len(), 2);
        assert!(q.or[0].clauses.contains_key("status"));
    }

    #[test]
    fn id_shorthand_targets_primary_key() {
        let g = IdGenerator::new();
        let id = g.generate(IdKind::Job);
        let q = translate(&Filter::new().id(id)).unwrap();
        assert!(q.clauses.contains_key("_id"));
        assert!(!q.clauses.contains_key("id"));
    }

    #[test]
    fn record_literal_is_unsupported() {
        let filter = Filter::new().field("broken", Value::Record(Default::default()));
        let err = translate(&filter).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFilterFieldType(_)));
    }

    #[test]
    fn decimal_operands_normalize_to_canonical_string() {
        let q = translate(&Filter::new().where_field(
            "amount",
            Conditions::lesser_than_or_equal(Value::Decimal("2.50".parse().unwrap())),
        ))
        .unwrap();
        assert_eq!(
            q.clauses.get("amount"),
            Some(&vec![(QueryOp::Lte, StoreValue::Decimal128("2.50".into()))])
        );
    }
}
