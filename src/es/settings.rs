//! Settings Translator (spec.md §4.2).
//!
//! Converts one cluster's index settings + mappings (+ aliases) into the
//! target cluster's dialect. Grounded on `es5settings.go` /
//! `es8settings.go` in the original tool, whose `ToTargetV*Settings`
//! methods this mirrors one-for-one.
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::es::types::{ClusterMajor, IndexSettings};

const UNSUPPORTED_SETTING_KEYS: &[&str] = &["provided_name", "creation_date", "uuid", "version"];

fn unwrap_settings(settings: &Value, source_index: &str) -> Result<Map<String, Value>> {
    let inner = settings
        .pointer(&format!("/{source_index}/settings/index"))
        .ok_or_else(|| Error::Data(format!("missing settings for index {source_index}")))?;
    let mut map = inner.as_object().cloned().unwrap_or_default();
    for key in UNSUPPORTED_SETTING_KEYS {
        map.remove(*key);
    }
    Ok(map)
}

fn unwrap_mappings(mappings: &Value, source_index: &str) -> Result<Map<String, Value>> {
    let inner = mappings
        .pointer(&format!("/{source_index}/mappings"))
        .ok_or_else(|| Error::Data(format!("missing mappings for index {source_index}")))?;
    Ok(inner.as_object().cloned().unwrap_or_default())
}

/// Collapses per-type mapping entries into a single typeless `properties`
/// map (spec.md §4.2 rule 2, §8 property 5 "V8 mapping merge idempotence").
///
/// Drops any type whose `_source.enabled == false`. Remaining types are
/// ordered by descending property count (ties broken by the underlying
/// map's iteration order — `serde_json`'s default `Map` is a `BTreeMap`,
/// so that order is alphabetical-by-type-name and therefore
/// deterministic); properties are merged in that order with later
/// (smaller) entries overwriting earlier (larger) ones on key collision,
/// matching `mergeUnWrappedMapping` in the original.
pub fn merge_typed_mappings(unwrapped: &Map<String, Value>) -> Map<String, Value> {
    // Already collapsed (typeless source re-translated to V8): idempotent.
    if unwrapped.contains_key("properties") && !unwrapped.values().any(|v| v.get("properties").is_some()) {
        return unwrapped.clone();
    }

    let mut type_properties: Vec<Map<String, Value>> = Vec::new();
    for type_props in unwrapped.values() {
        let Some(type_map) = type_props.as_object() else {
            continue;
        };
        let Some(properties) = type_map.get("properties").and_then(Value::as_object) else {
            continue;
        };
        let enabled = type_map
            .get("_source")
            .and_then(|s| s.get("enabled"))
            .and_then(Value::as_bool);
        if enabled == Some(false) {
            continue;
        }
        type_properties.push(properties.clone());
    }

    type_properties.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut merged = Map::new();
    for properties in type_properties {
        for (key, value) in properties {
            merged.insert(key, value);
        }
    }

    let mut result = Map::new();
    result.insert("properties".to_string(), Value::Object(merged));
    result
}

fn rekeyed_aliases(aliases: &Value, source_index: &str) -> Option<Value> {
    let alias_map = aliases.pointer(&format!("/{source_index}/aliases"))?.clone();
    Some(alias_map)
}

/// Translates `source` into the target cluster's dialect, renaming the
/// embedded index key to `target_index` (spec.md §4.2 rule 4).
pub fn translate(source: &IndexSettings, target_major: ClusterMajor, target_index: &str) -> Result<IndexSettings> {
    let settings_map = unwrap_settings(&source.settings, &source.index)?;

    let settings_value = match target_major {
        ClusterMajor::V8 => serde_json::json!({ "settings": Value::Object(settings_map) }),
        _ => serde_json::json!({ "settings": { "index": Value::Object(settings_map) } }),
    };

    let unwrapped_mappings = unwrap_mappings(&source.mappings, &source.index)?;
    let mappings_value = match target_major {
        ClusterMajor::V8 => {
            let merged = merge_typed_mappings(&unwrapped_mappings);
            serde_json::json!({ "mappings": Value::Object(merged) })
        }
        _ => serde_json::json!({ "mappings": Value::Object(unwrapped_mappings) }),
    };

    let aliases_value = source
        .aliases
        .as_ref()
        .and_then(|a| rekeyed_aliases(a, &source.index))
        .map(|alias_map| serde_json::json!({ "aliases": alias_map }));

    Ok(IndexSettings {
        major: target_major,
        settings: settings_value,
        mappings: mappings_value,
        aliases: aliases_value,
        index: target_index.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_source(typed: bool) -> IndexSettings {
        let settings = serde_json::json!({
            "orders": {
                "settings": {
                    "index": {
                        "number_of_shards": "3",
                        "provided_name": "orders",
                        "uuid": "abc123",
                    }
                }
            }
        });
        let mappings = if typed {
            serde_json::json!({
                "orders": {
                    "mappings": {
                        "a": { "properties": { "f1": {"type": "text"}, "f2": {"type": "text"}, "f3": {"type": "keyword"} } },
                        "b": { "properties": { "f4": {"type": "text"}, "f5": {"type": "text"} } },
                    }
                }
            })
        } else {
            serde_json::json!({
                "orders": { "mappings": { "properties": { "f1": {"type": "text"} } } }
            })
        };
        IndexSettings::new(ClusterMajor::V5, settings, mappings, "orders")
    }

    #[test]
    fn v5_to_v5_strips_unsupported_keys_and_rewraps() {
        let source = sample_source(true);
        let out = translate(&source, ClusterMajor::V5, "orders").unwrap();
        let idx = out.settings.pointer("/settings/index").unwrap();
        assert!(idx.get("provided_name").is_none());
        assert!(idx.get("uuid").is_none());
        assert_eq!(idx.get("number_of_shards").unwrap(), "3");
        assert_eq!(out.index, "orders");
    }

    #[test]
    fn v5_to_v7_forwards_typed_mapping_unchanged() {
        let source = sample_source(true);
        let out = translate(&source, ClusterMajor::V7, "orders2").unwrap();
        let mappings = out.mappings.pointer("/mappings").unwrap();
        assert!(mappings.get("a").is_some());
        assert!(mappings.get("b").is_some());
        assert_eq!(out.index, "orders2");
    }

    #[test]
    fn v5_to_v8_merges_properties_by_descending_count() {
        let source = sample_source(true);
        let out = translate(&source, ClusterMajor::V8, "orders8").unwrap();
        let properties = out
            .mappings
            .pointer("/mappings/properties")
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(properties.len(), 5);
        assert!(properties.contains_key("f1"));
        assert!(properties.contains_key("f5"));
        let idx_settings = out.settings.pointer("/settings").unwrap();
        assert!(idx_settings.get("index").is_none(), "v8 settings are not double-wrapped");
    }

    #[test]
    fn v8_merge_drops_disabled_source_types() {
        let mappings = serde_json::json!({
            "orders": {
                "mappings": {
                    "a": { "properties": { "f1": {} } },
                    "b": { "_source": { "enabled": false }, "properties": { "f2": {} } },
                }
            }
        });
        let source = IndexSettings::new(
            ClusterMajor::V5,
            sample_source(true).settings,
            mappings,
            "orders",
        );
        let out = translate(&source, ClusterMajor::V8, "orders8").unwrap();
        let properties = out.mappings.pointer("/mappings/properties").unwrap().as_object().unwrap();
        assert!(properties.contains_key("f1"));
        assert!(!properties.contains_key("f2"));
    }

    #[test]
    fn v8_merge_is_idempotent() {
        let once = merge_typed_mappings(&{
            let mut m = Map::new();
            m.insert(
                "a".to_string(),
                serde_json::json!({ "properties": { "f1": {"type": "text"} } }),
            );
            m
        });
        let twice = merge_typed_mappings(&once);
        assert_eq!(Value::Object(once), Value::Object(twice));
    }
}
