//! Decides which requested fields are still unknown.

use crate::{FieldSet, Record};

/// Fields of `requested` that `record` does not resolve.
///
/// With no record everything is missing; otherwise a field is missing when it
/// is absent from the record or present as `null`.
pub fn missing_fields(record: Option<&Record>, requested: &FieldSet) -> FieldSet {
    match record {
        None => requested.clone(),
        Some(record) => requested
            .iter()
            .filter(|field| !record.is_resolved(*field))
            .collect(),
    }
}
