use serde::{Deserialize, Serialize};

use crate::node::TreemapNode;
use crate::treemap::{squarify, Rect};

/// Deepest level a block can be emitted at.
pub const MAX_DEPTH: usize = 6;

/// A node whose rectangle is narrower or shorter than this is never subdivided.
pub const MIN_BLOCK_SIZE: f64 = 16.0;

/// Margin between the container edge and the root rectangle.
pub const CONTAINER_INSET: f64 = 2.0;

/// Budgets for one layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub max_depth: usize,
    pub min_block_size: f64,
    pub inset: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            min_block_size: MIN_BLOCK_SIZE,
            inset: CONTAINER_INSET,
        }
    }
}

/// One placed rectangle. `node` may stand for a whole collapsed subtree.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub node: &'a TreemapNode,
    pub depth: usize,
}

impl<'a> Block<'a> {
    fn new(node: &'a TreemapNode, rect: Rect, depth: usize) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            w: rect.width,
            h: rect.height,
            node,
            depth,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }
}

/// Lay out `root` in a `width` x `height` container with the default budgets.
pub fn layout_treemap(root: &TreemapNode, width: f64, height: f64) -> Vec<Block<'_>> {
    layout_with_config(root, width, height, &LayoutConfig::default())
}

pub fn layout_with_config<'a>(
    root: &'a TreemapNode,
    width: f64,
    height: f64,
    config: &LayoutConfig,
) -> Vec<Block<'a>> {
    let container = Rect::new(0.0, 0.0, width, height).inset(config.inset);
    layout_in_rect(root, container, config)
}

/// Lay out `root` directly into `rect` (no inset), root at depth 0.
///
/// Each node either becomes a single block or is split among its children by
/// [`squarify`]. Splitting stops when the node has no visible children, the
/// depth budget is spent, or its rectangle is under `min_block_size` on either
/// side. The blocks come out in depth-first pre-order.
pub fn layout_in_rect<'a>(
    root: &'a TreemapNode,
    rect: Rect,
    config: &LayoutConfig,
) -> Vec<Block<'a>> {
    if rect.is_empty() {
        tracing::debug!(
            "Skipping layout of {}: container {}x{} has no area",
            root.path,
            rect.width,
            rect.height
        );
        return vec![];
    }

    let mut blocks = Vec::new();
    let mut pending: Vec<(&TreemapNode, Rect, usize)> = vec![(root, rect, 0)];
    let mut deepest = 0;

    while let Some((node, rect, depth)) = pending.pop() {
        if is_terminal(node, &rect, depth, config) {
            deepest = deepest.max(depth);
            blocks.push(Block::new(node, rect, depth));
            continue;
        }

        let placed = squarify(&node.children, rect);
        if placed.is_empty() {
            // Child weights summed past f64::MAX
            tracing::debug!("Children of {} could not be packed", node.path);
            deepest = deepest.max(depth);
            blocks.push(Block::new(node, rect, depth));
            continue;
        }
        // Reverse so the largest child is visited first.
        for (child, child_rect) in placed.into_iter().rev() {
            pending.push((child, child_rect, depth + 1));
        }
    }

    tracing::debug!(
        "Laid out {} into {} blocks (deepest level {})",
        root.path,
        blocks.len(),
        deepest
    );

    blocks
}

fn is_terminal(node: &TreemapNode, rect: &Rect, depth: usize, config: &LayoutConfig) -> bool {
    !node.has_visible_children()
        || depth >= config.max_depth
        || rect.width < config.min_block_size
        || rect.height < config.min_block_size
}
