//! Per-widget display configuration

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Operator used for filters derived from a selection
pub const EQUALS: &str = "==";

/// A filter clause, serialized as a `[column, operator, value]` triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause(pub String, pub String, pub Value);

impl FilterClause {
    /// Create a new filter clause
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(column.into(), operator.into(), value.into())
    }

    /// Create an equality clause
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, EQUALS, value)
    }

    pub fn column(&self) -> &str {
        &self.0
    }

    pub fn operator(&self) -> &str {
        &self.1
    }

    pub fn value(&self) -> &Value {
        &self.2
    }
}

/// A sort clause, serialized as a `[column, direction]` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause(pub String, pub String);

/// A named derived-column expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    pub name: String,
    pub expr: String,
}

impl Expression {
    pub fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
        }
    }
}

/// Display configuration of a single widget.
///
/// Collections accept `null` on input and normalize it to empty. Keys this
/// type does not know are kept in `extra` so they survive a save/restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Name of the data source in the table registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Display name (tab title)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Plugin identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    #[serde(deserialize_with = "null_as_default")]
    pub group_by: Vec<String>,

    #[serde(deserialize_with = "null_as_default")]
    pub split_by: Vec<String>,

    #[serde(deserialize_with = "null_as_default")]
    pub columns: Vec<Value>,

    #[serde(deserialize_with = "null_as_default")]
    pub filter: Vec<FilterClause>,

    #[serde(deserialize_with = "null_as_default")]
    pub sort: Vec<SortClause>,

    #[serde(deserialize_with = "null_as_default")]
    pub expressions: Vec<Expression>,

    #[serde(deserialize_with = "null_as_default")]
    pub aggregates: IndexMap<String, Value>,

    /// Receives filters from linked selections
    #[serde(skip_serializing_if = "is_false")]
    pub linked: bool,

    /// Lives in the master area
    #[serde(skip_serializing_if = "is_false")]
    pub master: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    /// Whether the settings panel is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WidgetConfig {
    /// Create a config bound to the given table
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Whether this widget groups its rows and so can originate a selection
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// Replace any clause on the same column, then append `clause`
    pub fn upsert_filter(&mut self, clause: FilterClause) {
        self.filter.retain(|existing| existing.column() != clause.column());
        self.filter.push(clause);
    }

    /// Remove every clause on `column`, returning whether any was removed
    pub fn remove_filter(&mut self, column: &str) -> bool {
        let before = self.filter.len();
        self.filter.retain(|existing| existing.column() != column);
        before != self.filter.len()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_false(value: &bool) -> bool {
    !*value
}
