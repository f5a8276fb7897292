use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::field::{FieldName, FieldSet};

/// Value of a single metric.
///
/// `Null` means the field was looked up and the source had nothing; a field
/// that is absent from a [`Record`] was never attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Builds a number, mapping NaN and infinities to `Null`.
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Null
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::number)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

/// Field-to-value mapping produced by a provider, a cache read or a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<FieldName, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn insert(&mut self, field: FieldName, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(field, value)
    }

    /// Present with a non-null value.
    pub fn is_resolved(&self, field: FieldName) -> bool {
        self.get(field).is_some_and(|value| !value.is_null())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &FieldValue)> + '_ {
        self.fields.iter().map(|(field, value)| (*field, value))
    }

    pub fn field_names(&self) -> FieldSet {
        self.fields.keys().copied().collect()
    }

    /// Copies the fields of `other` over `self`, except that a `Null` never
    /// replaces a resolved value.
    pub fn merge_known(&mut self, other: &Record) {
        for (field, value) in other.iter() {
            if value.is_null() && self.is_resolved(field) {
                continue;
            }
            self.fields.insert(field, value.clone());
        }
    }

    /// Copies the fields of `other` that belong to `keys` over `self`.
    ///
    /// Fields of `other` outside `keys` are ignored, so callers pass the set of
    /// fields `self` is still missing to keep resolved values intact.
    pub fn fill_from(&mut self, other: &Record, keys: &FieldSet) {
        for field in keys.iter() {
            if let Some(value) = other.get(field) {
                self.fields.insert(field, value.clone());
            }
        }
    }

    /// Keeps only the fields in `keys`; keys with no entry become `Null`.
    pub fn project(&self, keys: &FieldSet) -> Record {
        keys.iter()
            .map(|field| {
                let value = self.get(field).cloned().unwrap_or(FieldValue::Null);
                (field, value)
            })
            .collect()
    }
}

impl FromIterator<(FieldName, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (FieldName, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (FieldName, FieldValue);
    type IntoIter = btree_map::IntoIter<FieldName, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
