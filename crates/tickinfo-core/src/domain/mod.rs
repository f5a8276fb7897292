//! # Domain Models
//!
//! Canonical types shared by the cache, the providers and the resolver.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Validated, uppercase entity identifier |
//! | [`EntityKind`] | Stock, REIT or ETF |
//! | [`FieldName`] | One metric of the closed vocabulary |
//! | [`FieldSet`] | Ordered set of requested metrics |
//! | [`FieldValue`] | Number, text or null |
//! | [`Record`] | Field-to-value mapping (null vs. absent is significant) |
//! | [`UtcDateTime`] | UTC timestamp |

mod field;
mod record;
mod ticker;
mod timestamp;

pub use field::{EntityKind, FieldName, FieldSet};
pub use record::{FieldValue, Record};
pub use ticker::Ticker;
pub use timestamp::UtcDateTime;
