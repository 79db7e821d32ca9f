use crate::layout::{layout_with_config, Block, LayoutConfig};
use crate::node::TreemapNode;
use crate::treemap::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Fill colors by nesting level. Purely a visual cue.
pub const PALETTE: [Rgb; 7] = [
    Rgb(59, 130, 246),
    Rgb(139, 92, 246),
    Rgb(20, 184, 166),
    Rgb(245, 158, 11),
    Rgb(239, 68, 68),
    Rgb(34, 197, 94),
    Rgb(236, 72, 153),
];

/// Labels are drawn only on blocks strictly larger than this.
pub const LABEL_MIN_WIDTH: f64 = 40.0;
pub const LABEL_MIN_HEIGHT: f64 = 22.0;

const LABEL_MAX_CHARS: usize = 12;
const LABEL_KEEP_CHARS: usize = 10;

pub fn color_for_depth(depth: usize) -> Rgb {
    PALETTE[depth % PALETTE.len()]
}

/// Shorten names longer than 12 characters to 10 characters plus an ellipsis.
pub fn truncate_label(name: &str) -> String {
    if name.chars().count() > LABEL_MAX_CHARS {
        let mut short: String = name.chars().take(LABEL_KEEP_CHARS).collect();
        short.push('…');
        short
    } else {
        name.to_string()
    }
}

pub fn label_for(block: &Block) -> Option<String> {
    if block.w > LABEL_MIN_WIDTH && block.h > LABEL_MIN_HEIGHT {
        Some(truncate_label(&block.node.name))
    } else {
        None
    }
}

/// A block ready to draw. `node` is a detached copy of the block's node
/// so a surface can outlive the tree it was laid out from.
#[derive(Debug, Clone)]
pub struct Tile {
    pub rect: Rect,
    pub color: Rgb,
    pub label: Option<String>,
    pub depth: usize,
    pub node: TreemapNode,
}

/// Drawable tiles of one layout pass plus point lookup.
#[derive(Debug, Default)]
pub struct Surface {
    tiles: Vec<Tile>,
}

impl Surface {
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let tiles = blocks
            .iter()
            .map(|block| Tile {
                rect: block.rect(),
                color: color_for_depth(block.depth),
                label: label_for(block),
                depth: block.depth,
                node: block.node.detached(),
            })
            .collect();
        Self { tiles }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Index of the tile under the point. Later tiles win where rounding
    /// makes neighbours share a point.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<usize> {
        self.tiles.iter().rposition(|tile| tile.rect.contains(x, y))
    }
}

/// Surface of the last layout pass, kept until the tree generation or the
/// container size changes.
#[derive(Debug, Default)]
pub struct SurfaceCache {
    key: Option<(u64, f64, f64)>,
    surface: Surface,
    passes: u64,
}

impl SurfaceCache {
    /// Run a layout pass if `generation`, `width` or `height` differ from the
    /// previous call. Returns true when the surface was rebuilt.
    pub fn refresh(
        &mut self,
        root: &TreemapNode,
        generation: u64,
        width: f64,
        height: f64,
        config: &LayoutConfig,
    ) -> bool {
        let key = (generation, width, height);
        if self.key == Some(key) {
            return false;
        }

        let blocks = layout_with_config(root, width, height, config);
        self.surface = Surface::from_blocks(&blocks);
        self.key = Some(key);
        self.passes += 1;
        true
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Number of layout passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn clear(&mut self) {
        self.key = None;
        self.surface = Surface::default();
    }
}

/// Single-focus hover state. Every event is reported to the observer, the
/// most recent one wins.
#[derive(Debug, Default)]
pub struct HoverTracker {
    hovered: Option<String>,
}

impl HoverTracker {
    /// Path of the hovered node, if any.
    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn pointer_enter<F>(&mut self, surface: &Surface, index: usize, mut observer: F)
    where
        F: FnMut(Option<&TreemapNode>),
    {
        let Some(tile) = surface.tiles().get(index) else {
            return;
        };
        self.hovered = Some(tile.node.path.clone());
        observer(Some(&tile.node));
    }

    pub fn pointer_leave<F>(&mut self, mut observer: F)
    where
        F: FnMut(Option<&TreemapNode>),
    {
        self.hovered = None;
        observer(None);
    }

    /// Turn a pointer position into enter/leave events. Nothing is reported
    /// while the pointer stays over the same node.
    pub fn pointer_moved<F>(&mut self, surface: &Surface, x: f64, y: f64, observer: F)
    where
        F: FnMut(Option<&TreemapNode>),
    {
        match surface.hit_test(x, y) {
            Some(index) => {
                let path = &surface.tiles()[index].node.path;
                if self.hovered.as_deref() != Some(path.as_str()) {
                    self.pointer_enter(surface, index, observer);
                }
            }
            None => {
                if self.hovered.is_some() {
                    self.pointer_leave(observer);
                }
            }
        }
    }

    /// Forget the hovered node without notifying, e.g. after a relayout.
    pub fn reset(&mut self) {
        self.hovered = None;
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    if unit_index == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout_treemap;

    fn sample_tree() -> TreemapNode {
        TreemapNode::dir(
            "root",
            "/root",
            100.0,
            vec![
                TreemapNode::leaf("alpha", "/root/alpha", 60.0),
                TreemapNode::leaf("a_really_long_file_name.bin", "/root/long", 40.0),
            ],
        )
    }

    #[test]
    fn test_palette_cycles_by_depth() {
        assert_eq!(color_for_depth(0), PALETTE[0]);
        assert_eq!(color_for_depth(3), PALETTE[3]);
        assert_eq!(color_for_depth(PALETTE.len()), PALETTE[0]);
        assert_eq!(color_for_depth(PALETTE.len() + 2), PALETTE[2]);
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("short"), "short");
        assert_eq!(truncate_label("exactly12chr"), "exactly12chr");
        assert_eq!(truncate_label("thirteen_char"), "thirteen_c…");
        // Character based, not byte based
        assert_eq!(truncate_label("ääääääääääääää"), "ääääääääää…");
    }

    #[test]
    fn test_label_thresholds() {
        let node = TreemapNode::leaf("file", "/file", 1.0);
        let block = |w: f64, h: f64| Block {
            x: 0.0,
            y: 0.0,
            w,
            h,
            node: &node,
            depth: 0,
        };

        assert_eq!(label_for(&block(41.0, 23.0)), Some("file".to_string()));
        assert_eq!(label_for(&block(40.0, 23.0)), None);
        assert_eq!(label_for(&block(41.0, 22.0)), None);
    }

    #[test]
    fn test_surface_tiles_follow_blocks() {
        let tree = sample_tree();
        let blocks = layout_treemap(&tree, 104.0, 54.0);
        let surface = Surface::from_blocks(&blocks);

        assert_eq!(surface.tiles().len(), 2);
        let first = &surface.tiles()[0];
        assert_eq!(first.node.name, "alpha");
        assert_eq!(first.color, PALETTE[1]);
        assert_eq!(first.label.as_deref(), Some("alpha"));
        assert_eq!(surface.tiles()[1].label, None); // 40px wide, not > 40
    }

    #[test]
    fn test_hit_test() {
        let tree = sample_tree();
        let blocks = layout_treemap(&tree, 104.0, 54.0);
        let surface = Surface::from_blocks(&blocks);

        assert_eq!(surface.hit_test(10.0, 10.0), Some(0));
        assert_eq!(surface.hit_test(80.0, 10.0), Some(1));
        assert_eq!(surface.hit_test(1.0, 1.0), None);
        assert_eq!(surface.hit_test(500.0, 10.0), None);
    }

    #[test]
    fn test_hover_enter_then_enter_reports_both_in_order() {
        let tree = sample_tree();
        let blocks = layout_treemap(&tree, 104.0, 54.0);
        let surface = Surface::from_blocks(&blocks);
        let mut hover = HoverTracker::default();
        let mut events: Vec<Option<String>> = Vec::new();

        hover.pointer_enter(&surface, 0, |n| events.push(n.map(|n| n.name.clone())));
        assert_eq!(hover.hovered(), Some("/root/alpha"));
        hover.pointer_enter(&surface, 1, |n| events.push(n.map(|n| n.name.clone())));
        assert_eq!(hover.hovered(), Some("/root/long"));

        assert_eq!(
            events,
            vec![
                Some("alpha".to_string()),
                Some("a_really_long_file_name.bin".to_string())
            ]
        );
    }

    #[test]
    fn test_hover_leave_reports_none() {
        let tree = sample_tree();
        let blocks = layout_treemap(&tree, 104.0, 54.0);
        let surface = Surface::from_blocks(&blocks);
        let mut hover = HoverTracker::default();
        let mut last: Option<Option<String>> = None;

        hover.pointer_enter(&surface, 0, |n| last = Some(n.map(|n| n.path.clone())));
        hover.pointer_leave(|n| last = Some(n.map(|n| n.path.clone())));

        assert_eq!(last, Some(None));
        assert_eq!(hover.hovered(), None);
    }

    #[test]
    fn test_pointer_moved_dispatches_only_changes() {
        let tree = sample_tree();
        let blocks = layout_treemap(&tree, 104.0, 54.0);
        let surface = Surface::from_blocks(&blocks);
        let mut hover = HoverTracker::default();
        let mut events: Vec<Option<String>> = Vec::new();

        for (x, y) in [(10.0, 10.0), (20.0, 30.0), (80.0, 10.0), (0.5, 0.5), (0.7, 0.7)] {
            hover.pointer_moved(&surface, x, y, |n| events.push(n.map(|n| n.name.clone())));
        }

        assert_eq!(
            events,
            vec![
                Some("alpha".to_string()),
                Some("a_really_long_file_name.bin".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_surface_cache_relayouts_on_resize_and_new_tree() {
        let tree = sample_tree();
        let config = LayoutConfig::default();
        let mut cache = SurfaceCache::default();

        assert!(cache.refresh(&tree, 1, 104.0, 54.0, &config));
        assert!(!cache.refresh(&tree, 1, 104.0, 54.0, &config));
        assert!(!cache.refresh(&tree, 1, 104.0, 54.0, &config));
        assert_eq!(cache.passes(), 1);
        assert_eq!(cache.surface().tiles().len(), 2);

        assert!(cache.refresh(&tree, 1, 204.0, 54.0, &config));
        assert_eq!(cache.passes(), 2);
        assert_eq!(cache.surface().tiles()[0].rect.width, 120.0);

        let replacement = TreemapNode::leaf("solo", "/solo", 5.0);
        assert!(cache.refresh(&replacement, 2, 204.0, 54.0, &config));
        assert_eq!(cache.passes(), 3);
        assert_eq!(cache.surface().tiles().len(), 1);
        assert_eq!(cache.surface().tiles()[0].node.name, "solo");

        cache.clear();
        assert!(cache.surface().is_empty());
        assert!(cache.refresh(&replacement, 2, 204.0, 54.0, &config));
    }

    #[test]
    fn test_tiles_carry_detached_nodes() {
        let tree = TreemapNode::dir(
            "root",
            "/root",
            10.0,
            vec![TreemapNode::dir(
                "sub",
                "/root/sub",
                10.0,
                vec![TreemapNode::leaf("f", "/root/sub/f", 10.0)],
            )],
        );
        let config = LayoutConfig {
            max_depth: 1,
            ..LayoutConfig::default()
        };
        let blocks = layout_with_config(&tree, 100.0, 100.0, &config);
        let surface = Surface::from_blocks(&blocks);

        assert_eq!(surface.tiles().len(), 1);
        let node = &surface.tiles()[0].node;
        assert_eq!(node.path, "/root/sub");
        assert!(node.is_dir);
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
