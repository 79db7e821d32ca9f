use serde::{Deserialize, Serialize};
use std::path::Path;

/// A node of the size-weighted tree handed to the layout engine.
///
/// `size` is in bytes. It is stored as a float because snapshots can come from
/// external producers; use [`TreemapNode::weight`] to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreemapNode {
    pub name: String,
    /// Stable unique identifier across the tree
    pub path: String,
    pub size: f64,
    pub is_dir: bool,
    #[serde(default)]
    pub children: Vec<TreemapNode>,
}

impl TreemapNode {
    pub fn leaf(name: impl Into<String>, path: impl Into<String>, size: f64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_dir: false,
            children: Vec::new(),
        }
    }

    pub fn dir(
        name: impl Into<String>,
        path: impl Into<String>,
        size: f64,
        children: Vec<TreemapNode>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_dir: true,
            children,
        }
    }

    /// Layout weight: negative, NaN and infinite sizes count as zero.
    pub fn weight(&self) -> f64 {
        if self.size.is_finite() && self.size > 0.0 {
            self.size
        } else {
            0.0
        }
    }

    /// True when at least one child would receive a rectangle.
    pub fn has_visible_children(&self) -> bool {
        self.children.iter().any(|c| c.weight() > 0.0)
    }

    /// Number of nodes below this one (not counting itself).
    pub fn descendant_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&TreemapNode> = self.children.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Copy of this node without its subtree.
    pub fn detached(&self) -> TreemapNode {
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            size: self.size,
            is_dir: self.is_dir,
            children: Vec::new(),
        }
    }

    /// Find a node in this subtree by its path.
    pub fn find(&self, path: &str) -> Option<&TreemapNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.path == path {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }
}

/// Complete snapshot delivered by the scanner once a scan finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub root: TreemapNode,
    pub scan_time_ms: u64,
    pub file_count: u64,
    pub total_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to access snapshot file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanResult {
    /// Load a scan snapshot previously written by [`ScanResult::save`].
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path)?;
        let result = serde_json::from_str(&content)?;
        Ok(result)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        tracing::info!("Saved scan snapshot to {}", path.display());
        Ok(())
    }
}
