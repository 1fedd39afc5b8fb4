//! Record trait and index query types

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A value stored in a secondary index
///
/// Values of different variants never compare equal and are never ordered
/// against each other by [`Filter::matches`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl IndexValue {
    /// Compare two values of the same variant
    pub fn compare(&self, other: &IndexValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

/// Comparison operator for a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A predicate over one indexed field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Shorthand for an equality filter
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Check whether a record's index fields satisfy this filter
    ///
    /// A record that does not expose the field, or exposes it with a
    /// different variant, never matches.
    pub fn matches(&self, fields: &HashMap<String, IndexValue>) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        let Some(ordering) = actual.compare(&self.value) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A type that can be persisted in a [`crate::Store`] collection
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Primary key, unique within the collection
    fn id(&self) -> &str;

    /// Last modification time (Unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Collection (file) name
    fn collection_name() -> &'static str;

    /// Fields exposed to the secondary index
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, IndexValue)]) -> HashMap<String, IndexValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_filter_int_comparisons() {
        let row = fields(&[("due_at", IndexValue::Int(100))]);
        assert!(Filter::new("due_at", FilterOp::Le, IndexValue::Int(100)).matches(&row));
        assert!(Filter::new("due_at", FilterOp::Lt, IndexValue::Int(101)).matches(&row));
        assert!(!Filter::new("due_at", FilterOp::Lt, IndexValue::Int(100)).matches(&row));
        assert!(Filter::new("due_at", FilterOp::Ge, IndexValue::Int(100)).matches(&row));
        assert!(!Filter::new("due_at", FilterOp::Gt, IndexValue::Int(100)).matches(&row));
        assert!(Filter::new("due_at", FilterOp::Ne, IndexValue::Int(5)).matches(&row));
    }

    #[test]
    fn test_filter_missing_field_never_matches() {
        let row = fields(&[("active", IndexValue::Bool(true))]);
        assert!(!Filter::eq("due_at", IndexValue::Int(1)).matches(&row));
        assert!(!Filter::new("due_at", FilterOp::Ne, IndexValue::Int(1)).matches(&row));
    }

    #[test]
    fn test_filter_variant_mismatch_never_matches() {
        let row = fields(&[("active", IndexValue::Bool(true))]);
        assert!(!Filter::eq("active", IndexValue::String("true".to_string())).matches(&row));
        assert!(!Filter::new("active", FilterOp::Ne, IndexValue::Int(0)).matches(&row));
    }

    #[test]
    fn test_index_value_display() {
        assert_eq!(IndexValue::Int(42).to_string(), "42");
        assert_eq!(IndexValue::Bool(false).to_string(), "false");
        assert_eq!(IndexValue::String("abc".to_string()).to_string(), "abc");
    }
}
