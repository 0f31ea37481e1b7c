//! Overview schema model.
//!
//! The schema is produced by the text-generation service and persisted
//! verbatim as `overview.json`; this module only reads the parts the engine
//! consumes: unit identities and their change classification.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::lm::strip_code_fences;

/// Parsed overview schema: the units ("nodes") of the generated diagram.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverviewSchema {
    #[serde(default)]
    pub nodes: Vec<SchemaNode>,
}

/// One generation unit as classified by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: NodeStatus,
}

/// Change classification supplied by the service.
///
/// Anything the service reports outside the known vocabulary maps to
/// `Unknown`, which always forces regeneration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Unchanged,
    Changed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OverviewSchema {
    /// Parse schema text as returned by the service or read from disk.
    pub fn parse(text: &str) -> Result<Self> {
        let cleaned = strip_code_fences(text);
        serde_json::from_str(&cleaned).context("parse overview schema")
    }

    /// Ids of every node that carries a usable one, in schema order,
    /// deduplicated. Ids become file names inside a run directory, so
    /// anything with a path separator is dropped.
    pub fn unit_ids(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for node in &self.nodes {
            if !is_safe_unit_id(&node.id) {
                continue;
            }
            if seen.insert(node.id.clone()) {
                ids.push(node.id.clone());
            }
        }
        ids
    }

    /// Ids the service classified as unchanged.
    pub fn unchanged_ids(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter(|node| is_safe_unit_id(&node.id) && node.status == NodeStatus::Unchanged)
            .map(|node| node.id.clone())
            .collect()
    }
}

fn is_safe_unit_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != ".."
}
