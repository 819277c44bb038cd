//! Fleet configuration loading and management.
//!
//! The fleet file names every node the capacity ledger should know about
//! and how many capacity units each one offers.
//!
//! The expected YAML structure is:
//! ```yaml
//! fleet:
//!   node01:
//!     capacity: 128.0
//!     location: "home_rack"
//!     description: "Primary batching node"
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// This is kept private – callers work with [`FleetNodeConfig`] /
/// [`FleetConfigManager`] instead.
#[derive(Debug, Deserialize)]
struct FleetConfigFile {
    fleet: HashMap<String, FleetNodeEntry>,
}

/// Per-node fields as they appear in the YAML file.
///
/// Everything except `capacity` is optional so that partial configs are
/// accepted gracefully.
#[derive(Debug, Deserialize)]
struct FleetNodeEntry {
    /// Capacity units this node offers to the ledger.
    capacity: f64,
    location: Option<String>,
    description: Option<String>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Declared capacity and metadata for a single fleet node.
#[derive(Debug, Clone)]
pub struct FleetNodeConfig {
    pub name: String,
    /// Capacity units this node offers to the ledger.
    pub capacity: f64,
    pub location: String,
    pub description: String,
}

impl FleetNodeConfig {
    /// Returns the fallback node used when no configuration file is
    /// supplied or the file declares no nodes.
    pub fn default_config(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 64.0,
            location: String::from("default_location"),
            description: String::from("Default fleet node"),
        }
    }
}

// ── FleetConfigManager ────────────────────────────────────────────────────────

/// Loads and manages fleet node declarations from a YAML file.
#[derive(Debug, Default)]
pub struct FleetConfigManager {
    /// Map of node name → [`FleetNodeConfig`].
    nodes: HashMap<String, FleetNodeConfig>,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl FleetConfigManager {
    /// Creates a new, empty `FleetConfigManager`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and populates the internal node map.
    ///
    /// * If the file contains no nodes a single `"default_node"` is
    ///   inserted so the scheduler always has somewhere to place work.
    /// * Calling this method a second time replaces all previously loaded
    ///   nodes.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid, or if a node declares a non-positive capacity.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading fleet configuration from: {}", path.display());

        // Reset state before (re-)loading
        self.nodes.clear();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: FleetConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        for (name, entry) in file.fleet {
            if !(entry.capacity > 0.0) {
                anyhow::bail!(
                    "Node {name} declares non-positive capacity {}",
                    entry.capacity
                );
            }
            let node = FleetNodeConfig {
                name: name.clone(),
                capacity: entry.capacity,
                location: entry.location.unwrap_or_default(),
                description: entry.description.unwrap_or_default(),
            };

            debug!(
                "  Node: {} | Capacity: {} | Location: {}",
                node.name, node.capacity, node.location,
            );

            self.nodes.insert(name, node);
        }

        // Fallback: no nodes parsed → insert a default entry
        if self.nodes.is_empty() {
            warn!("No nodes found in configuration file, using default configuration");
            let default = FleetNodeConfig::default_config("default_node");
            self.nodes.insert("default_node".to_string(), default);
        }

        self.loaded = true;

        info!(
            "Successfully loaded {} fleet node configuration(s):",
            self.nodes.len()
        );
        for node in self.nodes.values() {
            info!(
                "  Node: {} | Capacity: {} | Location: {}",
                node.name, node.capacity, node.location,
            );
        }

        Ok(())
    }

    /// Inserts (or replaces) a single node declaration directly, without a
    /// file.  Used by drivers that run with no configuration on disk.
    pub fn insert_node(&mut self, node: FleetNodeConfig) {
        self.nodes.insert(node.name.clone(), node);
        self.loaded = true;
    }

    /// Returns a reference to the [`FleetNodeConfig`] for `name`, or `None`
    /// if no node with that name has been loaded.
    pub fn get_node_config(&self, name: &str) -> Option<&FleetNodeConfig> {
        self.nodes.get(name)
    }

    /// Returns a reference to the full map of loaded node configurations.
    pub fn get_all_nodes(&self) -> &HashMap<String, FleetNodeConfig> {
        &self.nodes
    }

    /// Returns the declared capacity for `name`, falling back to the
    /// default node's capacity when the node is unknown.
    pub fn get_capacity(&self, name: &str) -> f64 {
        self.nodes
            .get(name)
            .map(|n| n.capacity)
            .unwrap_or_else(|| FleetNodeConfig::default_config(name).capacity)
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── FleetNodeConfig ───────────────────────────────────────────────────────

    #[test]
    fn default_config_has_expected_values() {
        let cfg = FleetNodeConfig::default_config("default_node");
        assert_eq!(cfg.name, "default_node");
        assert_eq!(cfg.capacity, 64.0);
        assert_eq!(cfg.location, "default_location");
        assert!(!cfg.description.is_empty());
    }

    // ── FleetConfigManager: load_from_file ────────────────────────────────────

    #[test]
    fn load_example_yaml() {
        let yaml = r#"
fleet:
  node01:
    capacity: 128.0
    location: "home_rack"
    description: "Primary batching node"
  node02:
    capacity: 2048.0
    location: "purchased_tier1"
    description: "Bulk capacity node"
  node03:
    capacity: 32.0
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = FleetConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        assert!(mgr.is_loaded());
        assert_eq!(mgr.get_all_nodes().len(), 3);

        let n1 = mgr.get_node_config("node01").unwrap();
        assert_eq!(n1.capacity, 128.0);
        assert_eq!(n1.location, "home_rack");

        let n2 = mgr.get_node_config("node02").unwrap();
        assert_eq!(n2.capacity, 2048.0);

        let n3 = mgr.get_node_config("node03").unwrap();
        assert_eq!(n3.location, ""); // default (empty)
    }

    #[test]
    fn empty_fleet_section_inserts_default_node() {
        let yaml = "fleet: {}\n";
        let f = yaml_tempfile(yaml);
        let mut mgr = FleetConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        assert!(mgr.is_loaded());
        assert!(mgr.get_node_config("default_node").is_some());
    }

    #[test]
    fn missing_file_returns_error() {
        let mut mgr = FleetConfigManager::new();
        let result = mgr.load_from_file(Path::new("/nonexistent/path/config.yaml"));
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        let mut mgr = FleetConfigManager::new();
        let result = mgr.load_from_file(f.path());
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn non_positive_capacity_is_rejected() {
        let yaml = "fleet:\n  bad:\n    capacity: 0.0\n";
        let f = yaml_tempfile(yaml);
        let mut mgr = FleetConfigManager::new();
        assert!(mgr.load_from_file(f.path()).is_err());
        assert!(!mgr.is_loaded());
    }

    // ── FleetConfigManager: get_capacity ──────────────────────────────────────

    #[test]
    fn get_capacity_falls_back_for_unknown_node() {
        let mgr = FleetConfigManager::new();
        assert_eq!(mgr.get_capacity("nonexistent"), 64.0);
    }

    // ── FleetConfigManager: reload ────────────────────────────────────────────

    #[test]
    fn reload_replaces_previous_nodes() {
        let yaml1 = "fleet:\n  n1:\n    capacity: 8.0\n";
        let yaml2 = "fleet:\n  n2:\n    capacity: 16.0\n";

        let f1 = yaml_tempfile(yaml1);
        let f2 = yaml_tempfile(yaml2);

        let mut mgr = FleetConfigManager::new();
        mgr.load_from_file(f1.path()).unwrap();
        assert!(mgr.get_node_config("n1").is_some());

        mgr.load_from_file(f2.path()).unwrap();
        assert!(mgr.get_node_config("n1").is_none(), "old node must be gone");
        assert!(mgr.get_node_config("n2").is_some());
    }
}
