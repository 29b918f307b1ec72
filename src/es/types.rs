//! Wire-agnostic types shared by every cluster adapter variant.
use serde_json::Value;

/// The four major versions this engine understands (spec.md §4.1). An
/// unrecognized version string fails the whole task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterMajor {
    V5,
    V6,
    V7,
    V8,
}

impl ClusterMajor {
    /// Parses the major version out of a detected version string
    /// (`version.number` from the cluster root endpoint), by prefix.
    pub fn detect(version_number: &str) -> Option<Self> {
        if version_number.starts_with("8.") {
            Some(ClusterMajor::V8)
        } else if version_number.starts_with("7.") {
            Some(ClusterMajor::V7)
        } else if version_number.starts_with("6.") {
            Some(ClusterMajor::V6)
        } else if version_number.starts_with("5.") {
            Some(ClusterMajor::V5)
        } else {
            None
        }
    }

    /// True for versions where mappings are typeless (7.x/8.x).
    pub fn is_typeless(self) -> bool {
        matches!(self, ClusterMajor::V7 | ClusterMajor::V8)
    }
}

/// A single indexed document. `type_` is empty for 7.x/8.x clusters
/// (typeless). `hash` is populated only on the compare path. `op`
/// records the classification assigned by the diff kernel, or the
/// intended bulk action for a write-path document.
#[derive(Debug, Clone)]
pub struct Doc {
    pub id: String,
    pub type_: String,
    pub source: Value,
    pub hash: Option<String>,
    pub op: Op,
}

impl Doc {
    pub fn new(id: impl Into<String>, type_: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            source,
            hash: None,
            op: Op::Same,
        }
    }
}

/// The four diff classifications emitted by the Diff Kernel (spec.md
/// GLOSSARY), reused as the bulk-write action selector for `upsert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Delete,
    Same,
}

/// Options governing one scroll's lifetime (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct ScrollOptions {
    pub query: Option<Value>,
    pub sort_fields: Vec<String>,
    pub page_size: u32,
    pub keepalive_minutes: u32,
    pub slice: Option<(u32, u32)>,
}

impl ScrollOptions {
    pub fn new(page_size: u32, keepalive_minutes: u32) -> Self {
        Self {
            query: None,
            sort_fields: Vec::new(),
            page_size,
            keepalive_minutes,
            slice: None,
        }
    }

    /// Builds the JSON search body for this set of options, including
    /// `slice` even when the query is empty (spec.md §4.1).
    pub fn to_search_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        body.insert(
            "query".to_string(),
            self.query.clone().unwrap_or_else(|| serde_json::json!({"match_all": {}})),
        );
        if !self.sort_fields.is_empty() {
            body.insert(
                "sort".to_string(),
                Value::Array(self.sort_fields.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some((id, max)) = self.slice {
            body.insert(
                "slice".to_string(),
                serde_json::json!({ "id": id, "max": max }),
            );
        }
        Value::Object(body)
    }
}

/// Opaque scroll cursor. Every opened cursor must be closed on all exit
/// paths (spec.md §3 invariant). Carries the keep-alive it was opened
/// with so every continuation request renews the same window (spec.md
/// §5: "Each scroll request sets a keep-alive of `scroll_time_minutes`").
#[derive(Debug, Clone)]
pub struct ScrollCursor {
    pub scroll_id: String,
    pub remaining: bool,
    pub keepalive_minutes: u32,
}

/// A version-specific index settings/mappings/aliases record (spec.md
/// §3). All four variants share the same shape; the variant tag exists
/// so the translator (§4.2) can dispatch without re-detecting the
/// cluster major from string probing.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub major: ClusterMajor,
    pub settings: Value,
    pub mappings: Value,
    pub aliases: Option<Value>,
    pub index: String,
}

impl IndexSettings {
    pub fn new(major: ClusterMajor, settings: Value, mappings: Value, index: impl Into<String>) -> Self {
        Self {
            major,
            settings,
            mappings,
            aliases: None,
            index: index.into(),
        }
    }

    pub fn with_aliases(mut self, aliases: Option<Value>) -> Self {
        self.aliases = aliases;
        self
    }

    /// The merged body used by `create_index`: settings ∪ mappings ∪
    /// aliases, all at the top level (spec.md §6 "Wire formats").
    pub fn create_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        if let Value::Object(map) = &self.settings {
            body.extend(map.clone());
        }
        if let Value::Object(map) = &self.mappings {
            body.extend(map.clone());
        }
        if let Some(Value::Object(map)) = &self.aliases {
            body.extend(map.clone());
        }
        Value::Object(body)
    }
}
