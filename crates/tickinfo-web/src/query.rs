//! Query-string parsing for the resolution endpoint.
//!
//! Parameters are read leniently: unknown field names are dropped, unknown
//! sources fall back to the full chain and flags accept several spellings.

use std::collections::HashMap;

use tickinfo_core::{CacheControl, FieldSet, SourceStrategy};

const TRUTHY: [&str; 7] = ["1", "s", "sim", "y", "yes", "t", "true"];

/// Parsed options of one `GET /{kind}/{ticker}` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveQuery {
    pub fields: FieldSet,
    pub strategy: SourceStrategy,
    pub cache: CacheControl,
}

impl ResolveQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| params.get(key).map(String::as_str);

        let fields = get("info_names")
            .map(FieldSet::parse_lenient)
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(FieldSet::all);

        let strategy = get("source")
            .map(SourceStrategy::from_source_param)
            .unwrap_or_default();

        let cache = CacheControl {
            use_cache: flag(get("should_use_cache"), true),
            clear_cached_data: flag(
                get("should_clear_cached_data").or_else(|| get("should_clear_cache")),
                false,
            ),
            delete_all_cache: flag(
                get("should_delete_all_cache").or_else(|| get("should_delete_cache")),
                false,
            ),
        };

        Self {
            fields,
            strategy,
            cache,
        }
    }
}

/// Absent flags take `default`; present ones are true only when truthy.
pub fn flag(value: Option<&str>, default: bool) -> bool {
    match value {
        None => default,
        Some(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            TRUTHY.contains(&normalized.as_str())
        }
    }
}
