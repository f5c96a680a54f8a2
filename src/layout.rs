use eframe::egui::{Vec2, vec2};

pub const NODE_WIDTH: f32 = 150.0;
pub const NODE_HEIGHT: f32 = 260.0;

/// Tidy tree layout over an index-based tree: leaves claim columns left to
/// right, inner nodes center over their children, y is depth alone. The tree
/// is described by per-slot child lists so the caller's node representation
/// stays out of the picture.
pub fn tree_layout(children: &[Vec<usize>], root: usize) -> Vec<Vec2> {
    let mut positions = vec![Vec2::ZERO; children.len()];
    if children.is_empty() {
        return positions;
    }

    let mut next_column = 0.0f32;
    place(children, root, 0, &mut next_column, &mut positions);
    positions
}

fn place(
    children: &[Vec<usize>],
    idx: usize,
    depth: usize,
    next_column: &mut f32,
    positions: &mut Vec<Vec2>,
) -> f32 {
    let y = depth as f32 * NODE_HEIGHT;

    let kids = &children[idx];
    let x = if kids.is_empty() {
        let x = *next_column * NODE_WIDTH;
        *next_column += 1.0;
        x
    } else {
        let mut first = 0.0;
        let mut last = 0.0;
        for (position, &child) in kids.iter().enumerate() {
            let child_x = place(children, child, depth + 1, next_column, positions);
            if position == 0 {
                first = child_x;
            }
            last = child_x;
        }
        (first + last) / 2.0
    };

    positions[idx] = vec2(x, y);
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_get_distinct_columns_and_parents_center() {
        // 0 -> (1, 2), 1 -> (3, 4)
        let children = vec![vec![1, 2], vec![3, 4], vec![], vec![], vec![]];
        let positions = tree_layout(&children, 0);

        assert_eq!(positions[3], vec2(0.0, 2.0 * NODE_HEIGHT));
        assert_eq!(positions[4], vec2(NODE_WIDTH, 2.0 * NODE_HEIGHT));
        assert_eq!(positions[2], vec2(2.0 * NODE_WIDTH, NODE_HEIGHT));
        assert_eq!(positions[1].x, NODE_WIDTH / 2.0);
        assert_eq!(positions[0].x, (positions[1].x + positions[2].x) / 2.0);
        assert_eq!(positions[0].y, 0.0);
    }

    #[test]
    fn single_node_sits_at_the_origin() {
        let positions = tree_layout(&[Vec::new()], 0);
        assert_eq!(positions, vec![Vec2::ZERO]);
    }
}
