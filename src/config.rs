//! Configuration decoding and validation.
//!
//! Mirrors `config/cfg.go` in the original tool: a YAML file unmarshalled
//! directly into the task/cluster structs below. Out of scope per
//! spec.md §1 is CLI argument parsing itself (see `cli.rs`), not this
//! decode/validate step, which the crate needs in order to run at all.
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

/// One Elasticsearch-compatible cluster's connection details.
///
/// Immutable after construction (spec.md §3).
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub addresses: Vec<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.addresses.is_empty() {
            return Err(Error::Config(
                "cluster config must have at least one address".into(),
            ));
        }
        Ok(())
    }
}

/// One source-index/target-index binding inside a task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Hash)]
pub struct IndexPair {
    pub source_index: String,
    pub target_index: String,
}

impl IndexPair {
    /// Unique key within a task, per spec.md §3: `"<source>:<target>"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_index, self.target_index)
    }
}

/// The action a task requests the engine to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    CopyIndex,
    Sync,
    SyncDiff,
    Compare,
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskAction::CopyIndex => "copy_index",
            TaskAction::Sync => "sync",
            TaskAction::SyncDiff => "sync_diff",
            TaskAction::Compare => "compare",
        };
        write!(f, "{s}")
    }
}

fn default_scroll_time() -> u32 {
    10
}
fn default_parallelism() -> usize {
    12
}
fn default_slice_size() -> u32 {
    20
}
fn default_buffer_count() -> usize {
    10_000
}
fn default_write_parallelism() -> usize {
    10
}
fn default_write_size_mib() -> u64 {
    5
}

/// One configured migration task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub source_es: String,
    pub target_es: String,
    #[serde(default)]
    pub index_pattern: Option<String>,
    #[serde(default)]
    pub index_pairs: Vec<IndexPair>,
    pub action: TaskAction,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_scroll_time")]
    pub scroll_time_minutes: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_slice_size")]
    pub slice_size: u32,
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,
    #[serde(default = "default_write_parallelism")]
    pub write_parallelism: usize,
    #[serde(default = "default_write_size_mib")]
    pub write_size_mib: u64,
}

impl TaskSpec {
    /// Compiles `index_pattern`, if present, failing fast on a bad regex
    /// (spec.md §7: "Config: unknown source/target cluster ref,
    /// unparseable regex. Fatal for the task.").
    pub fn compiled_pattern(&self) -> Result<Option<Regex>> {
        match &self.index_pattern {
            Some(pattern) => Ok(Some(Regex::new(pattern)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Top-level decoded configuration file (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub elastics: HashMap<String, ClusterConfig>,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub level: LogLevel,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("reading config file: {e}")))?;
        let cfg: Config = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("parsing config file: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates every task's cluster references and pattern regex up
    /// front, so a single misconfigured task fails before any task runs
    /// (mirrors `NewTaskMgr` in the original, which resolves every
    /// cluster reference before returning).
    pub fn validate(&self) -> Result<()> {
        for cluster in self.elastics.values() {
            cluster.validate()?;
        }

        for task in &self.tasks {
            if !self.elastics.contains_key(&task.source_es) {
                return Err(Error::Config(format!(
                    "task {}: source es config not found: {}",
                    task.name, task.source_es
                )));
            }
            if !self.elastics.contains_key(&task.target_es) {
                return Err(Error::Config(format!(
                    "task {}: target es config not found: {}",
                    task.name, task.target_es
                )));
            }
            task.compiled_pattern()
                .map_err(|e| Error::Config(format!("task {}: {e}", task.name)))?;
        }
        Ok(())
    }

    pub fn tasks_named<'a>(&'a self, names: &'a [String]) -> Vec<&'a TaskSpec> {
        self.tasks
            .iter()
            .filter(|t| names.iter().any(|n| n == &t.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
elastics:
  src:
    addresses: ["http://localhost:9200"]
  dst:
    addresses: ["http://localhost:9201"]
    user: admin
    password: secret
tasks:
  - name: copy-orders
    source_es: src
    target_es: dst
    action: sync_diff
    index_pairs:
      - source_index: orders
        target_index: orders
level: debug
"#;

    #[test]
    fn decodes_minimal_config() {
        let cfg: Config = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(cfg.level, LogLevel::Debug);
        assert_eq!(cfg.tasks.len(), 1);
        assert_eq!(cfg.tasks[0].action, TaskAction::SyncDiff);
        assert_eq!(cfg.tasks[0].parallelism, 12);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_cluster_ref() {
        let mut cfg: Config = serde_yaml::from_str(YAML).unwrap();
        cfg.tasks[0].source_es = "missing".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_pattern() {
        let mut cfg: Config = serde_yaml::from_str(YAML).unwrap();
        cfg.tasks[0].index_pattern = Some("(unterminated".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn index_pair_key_joins_source_and_target() {
        let pair = IndexPair {
            source_index: "a".into(),
            target_index: "b".into(),
        };
        assert_eq!(pair.key(), "a:b");
    }
}
