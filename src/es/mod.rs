//! Version-abstracted cluster adapter (spec.md §4.1) and the settings
//! translator (spec.md §4.2).
mod adapter;
mod settings;
mod types;

pub use adapter::{BulkBuffer, ClusterAdapter};
pub use settings::translate;
pub use types::{ClusterMajor, Doc, IndexSettings, Op, ScrollCursor, ScrollOptions};
