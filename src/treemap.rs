use crate::node::TreemapNode;

/// Rectangle in container space (origin top-left, y grows downward)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Both sides strictly positive (NaN sides count as empty).
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Half-open containment, so a point on a shared edge belongs to one rect only.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Shrink by `margin` on every side. Sides never go negative.
    pub fn inset(&self, margin: f64) -> Rect {
        Rect::new(
            self.x + margin,
            self.y + margin,
            (self.width - 2.0 * margin).max(0.0),
            (self.height - 2.0 * margin).max(0.0),
        )
    }
}

/// Squarified row packing (Bruls, Huizing, van Wijk).
///
/// Tiles `rect` with one sub-rectangle per node whose weight is positive, each
/// with area proportional to its share of the total. Nodes are taken largest
/// first (stable, so equal sizes keep their input order). Rows are stacked
/// along the longer side of `rect`; items inside a row split the other side.
/// A row keeps growing while adding the next node does not make its worst
/// aspect ratio larger.
///
/// Returns nothing when no node has a positive weight or `rect` has no area.
pub fn squarify(nodes: &[TreemapNode], rect: Rect) -> Vec<(&TreemapNode, Rect)> {
    if rect.is_empty() {
        return vec![];
    }

    let mut items: Vec<(&TreemapNode, f64)> = nodes
        .iter()
        .filter_map(|node| {
            let weight = node.weight();
            (weight > 0.0).then_some((node, weight))
        })
        .collect();

    if items.is_empty() {
        return vec![];
    }

    let total: f64 = items.iter().map(|(_, size)| size).sum();
    if !(total > 0.0 && total.is_finite()) {
        return vec![];
    }

    // sort_by is stable: ties keep input order
    items.sort_by(|a, b| b.1.total_cmp(&a.1));

    let horizontal = rect.width >= rect.height;
    let mut packer = RowPacker {
        free: rect,
        remaining_total: total,
        horizontal,
    };
    let mut result = Vec::with_capacity(items.len());

    let mut start = 0;
    while start < items.len() {
        let mut end = start + 1;
        let mut row_sum = items[start].1;
        let mut worst = packer.worst_aspect_ratio(&items[start..end], row_sum);

        while end < items.len() {
            let candidate_sum = row_sum + items[end].1;
            let candidate_worst = packer.worst_aspect_ratio(&items[start..=end], candidate_sum);
            if candidate_worst > worst {
                break;
            }
            row_sum = candidate_sum;
            worst = candidate_worst;
            end += 1;
        }

        let last_row = end == items.len();
        packer.layout_row(&items[start..end], row_sum, last_row, &mut result);
        start = end;
    }

    result
}

/// Running state of one packing pass: the still-free part of the rectangle
/// and the total weight not yet placed.
struct RowPacker {
    free: Rect,
    remaining_total: f64,
    horizontal: bool,
}

impl RowPacker {
    /// (main, perpendicular) lengths of the free rectangle
    fn lengths(&self) -> (f64, f64) {
        if self.horizontal {
            (self.free.width, self.free.height)
        } else {
            (self.free.height, self.free.width)
        }
    }

    fn row_thickness(&self, row_sum: f64) -> f64 {
        let (main, _) = self.lengths();
        (main * row_sum / self.remaining_total).min(main)
    }

    /// Worst of `thickness/extent` and `extent/thickness` over the row.
    /// `row` is sorted descending, so only its first and last members matter.
    fn worst_aspect_ratio(&self, row: &[(&TreemapNode, f64)], row_sum: f64) -> f64 {
        let (Some(&(_, largest)), Some(&(_, smallest))) = (row.first(), row.last()) else {
            return f64::INFINITY;
        };

        let (_, perp) = self.lengths();
        let thickness = self.row_thickness(row_sum);

        let ratio = |size: f64| {
            let extent = perp * size / row_sum;
            (thickness / extent).max(extent / thickness)
        };

        ratio(largest).max(ratio(smallest))
    }

    fn layout_row<'a>(
        &mut self,
        row: &[(&'a TreemapNode, f64)],
        row_sum: f64,
        last_row: bool,
        result: &mut Vec<(&'a TreemapNode, Rect)>,
    ) {
        let (main, perp) = self.lengths();
        // The final row takes whatever is left so no sliver remains.
        let thickness = if last_row {
            main
        } else {
            self.row_thickness(row_sum)
        };

        let mut offset = 0.0;
        for (i, &(node, size)) in row.iter().enumerate() {
            let extent = if i + 1 == row.len() {
                perp - offset
            } else {
                perp * size / row_sum
            };

            let rect = if self.horizontal {
                Rect::new(self.free.x, self.free.y + offset, thickness, extent)
            } else {
                Rect::new(self.free.x + offset, self.free.y, extent, thickness)
            };

            result.push((node, rect));
            offset += extent;
        }

        if self.horizontal {
            self.free.x += thickness;
            self.free.width -= thickness;
        } else {
            self.free.y += thickness;
            self.free.height -= thickness;
        }
        self.remaining_total -= row_sum;
    }
}
