//! Disk-usage treemaps.
//!
//! A scanned directory tree ([`node::TreemapNode`]) is laid out by
//! [`layout::layout_treemap`] into non-overlapping, area-proportional
//! [`layout::Block`]s using squarified row packing ([`treemap::squarify`]).
//! [`render::Surface`] turns blocks into colored, labelled tiles and
//! [`render::HoverTracker`] reports the node under the pointer.
//! [`worker::ScanWorker`] produces the trees by scanning on a background thread.

pub mod config;
pub mod crawler;
pub mod layout;
pub mod node;
pub mod render;
pub mod tree;
pub mod treemap;
pub mod worker;

pub use layout::{layout_treemap, Block, LayoutConfig, MAX_DEPTH, MIN_BLOCK_SIZE};
pub use node::{ScanResult, TreemapNode};
pub use treemap::{squarify, Rect};
