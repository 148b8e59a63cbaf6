//! Guillotine rectangle packer.
//!
//! The packer carves a fixed rectangle into a binary tree of space nodes with
//! straight cuts. Nodes live in an arena and refer to each other by index.
//!
//! ```text
//!   allocate 64x64 in 256x256:
//!
//!   ┌──────┬───────────────┐
//!   │ occ  │               │
//!   ├──────┤    right      │   root ─ split ─┬─ left strip ─ split ─┬─ occupied
//!   │      │  remainder    │                 │                      └─ bottom remainder
//!   │bottom│  192 x 256    │                 └─ right remainder
//!   │64x192│               │
//!   └──────┴───────────────┘
//! ```
//!
//! Free leaves are kept in a list sorted by width. Allocation binary-searches
//! the first node wide enough, then scans the rest for the best fit. Releasing
//! an allocation merges it with its sibling while both are free, walking up
//! the tree, so two free siblings never coexist.

use std::collections::HashMap;

use crate::types::Rect;

type NodeIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Free,
    Occupied(u32),
    Split([NodeIndex; 2]),
}

#[derive(Debug, Clone)]
struct Node {
    rect: Rect,
    parent: Option<NodeIndex>,
    kind: NodeKind,
}

/// A successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRect {
    /// Entry id, unique for the packer's lifetime and never zero.
    pub id: u32,
    /// The allocated cell.
    pub rect: Rect,
}

/// Leftover-space score of a candidate node; smaller is better.
///
/// Ordered by leftover area, then by the smaller of the two leftover deltas
/// (an exact match on one axis wins), then by the total leftover.
type FitKey = (u64, u32, u32);

fn fit_key(node: Rect, width: u32, height: u32) -> FitKey {
    let dw = node.width - width;
    let dh = node.height - height;
    (dw as u64 * dh as u64, dw.min(dh), dw + dh)
}

/// Guillotine bin packer over a fixed rectangle.
///
/// # Example
///
/// ```
/// use ember_graphics::atlas::GuillotinePacker;
/// use ember_graphics::types::Rect;
///
/// let mut packer = GuillotinePacker::new(256, 256);
/// let a = packer.allocate(64, 64).unwrap();
/// assert_eq!(a.id, 1);
/// assert_eq!(a.rect, Rect::new(0, 0, 64, 64));
///
/// assert!(packer.release(a.id));
/// assert_eq!(packer.free_regions(), vec![Rect::new(0, 0, 256, 256)]);
/// ```
#[derive(Debug, Clone)]
pub struct GuillotinePacker {
    bounds: Rect,
    nodes: Vec<Option<Node>>,
    vacant: Vec<NodeIndex>,
    free_list: Vec<NodeIndex>,
    entries: HashMap<u32, NodeIndex>,
    next_id: u32,
}

impl GuillotinePacker {
    /// Create a packer covering `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        let bounds = Rect::from_size(width, height);
        let mut packer = Self {
            bounds,
            nodes: Vec::new(),
            vacant: Vec::new(),
            free_list: Vec::new(),
            entries: HashMap::new(),
            next_id: 1,
        };
        if !bounds.is_empty() {
            let root = packer.add_node(bounds, None, NodeKind::Free);
            packer.insert_free(root);
        }
        packer
    }

    /// The packed rectangle.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total free area.
    pub fn free_area(&self) -> u64 {
        self.free_list.iter().map(|&i| self.node(i).rect.area()).sum()
    }

    /// Cell of a live allocation.
    pub fn entry_rect(&self, id: u32) -> Option<Rect> {
        self.entries.get(&id).map(|&i| self.node(i).rect)
    }

    /// Free regions in free-list order (ascending width).
    pub fn free_regions(&self) -> Vec<Rect> {
        self.free_list.iter().map(|&i| self.node(i).rect).collect()
    }

    /// Every leaf of the space tree with the id occupying it, if any.
    pub fn leaves(&self) -> Vec<(Rect, Option<u32>)> {
        self.nodes
            .iter()
            .flatten()
            .filter_map(|node| match node.kind {
                NodeKind::Free => Some((node.rect, None)),
                NodeKind::Occupied(id) => Some((node.rect, Some(id))),
                NodeKind::Split(_) => None,
            })
            .collect()
    }

    /// Reserve a `width` x `height` cell.
    ///
    /// Returns `None` if no free region can hold it.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<PackedRect> {
        if width == 0 || height == 0 {
            return None;
        }

        let start = self
            .free_list
            .partition_point(|&i| self.node(i).rect.width < width);

        let mut best: Option<(usize, FitKey)> = None;
        for (pos, &index) in self.free_list.iter().enumerate().skip(start) {
            let rect = self.node(index).rect;
            if rect.height < height {
                continue;
            }
            let key = fit_key(rect, width, height);
            if best.is_none_or(|(_, best_key)| key < best_key) {
                best = Some((pos, key));
                if key == (0, 0, 0) {
                    break;
                }
            }
        }

        let (pos, _) = best?;
        let index = self.free_list.remove(pos);
        let occupied = self.split(index, width, height);

        let id = self.next_id;
        self.next_id += 1;
        self.node_mut(occupied).kind = NodeKind::Occupied(id);
        self.entries.insert(id, occupied);

        Some(PackedRect {
            id,
            rect: self.node(occupied).rect,
        })
    }

    /// Release an allocation and coalesce its space.
    ///
    /// Returns `false` if `id` is not a live allocation.
    pub fn release(&mut self, id: u32) -> bool {
        let Some(mut current) = self.entries.remove(&id) else {
            return false;
        };
        self.node_mut(current).kind = NodeKind::Free;

        while let Some(parent) = self.node(current).parent {
            let NodeKind::Split(children) = self.node(parent).kind else {
                break;
            };
            let sibling = if children[0] == current {
                children[1]
            } else {
                children[0]
            };
            if self.node(sibling).kind != NodeKind::Free {
                break;
            }

            self.remove_free(sibling);
            self.remove_node(sibling);
            self.remove_node(current);
            self.node_mut(parent).kind = NodeKind::Free;
            current = parent;
        }

        self.insert_free(current);
        true
    }

    /// Drop every allocation, returning to a single free region.
    pub fn clear(&mut self) {
        *self = Self {
            next_id: self.next_id,
            ..Self::new(self.bounds.width, self.bounds.height)
        };
    }

    /// Check the structural invariants of the space tree.
    ///
    /// Verifies that the leaves tile the bounds exactly, that the free list is
    /// sorted and holds each free leaf once, that the id table matches the
    /// occupied leaves, that parent links are consistent, and that no split
    /// node has two free children.
    pub fn validate(&self) -> Result<(), String> {
        let leaves = self.leaves();

        let mut area = 0u64;
        for (i, (a, _)) in leaves.iter().enumerate() {
            if a.is_empty() {
                return Err(format!("empty leaf {a:?}"));
            }
            if !self.bounds.contains_rect(a) {
                return Err(format!("leaf {a:?} outside bounds {:?}", self.bounds));
            }
            for (b, _) in &leaves[i + 1..] {
                if a.intersects(b) {
                    return Err(format!("leaves {a:?} and {b:?} overlap"));
                }
            }
            area += a.area();
        }
        if !self.bounds.is_empty() && area != self.bounds.area() {
            return Err(format!(
                "leaves cover {area} pixels, bounds have {}",
                self.bounds.area()
            ));
        }

        let free_leaves = leaves.iter().filter(|(_, id)| id.is_none()).count();
        if free_leaves != self.free_list.len() {
            return Err(format!(
                "{free_leaves} free leaves but {} free-list entries",
                self.free_list.len()
            ));
        }
        for pair in self.free_list.windows(2) {
            if self.node(pair[0]).rect.width > self.node(pair[1]).rect.width {
                return Err("free list not sorted by width".into());
            }
        }
        for (pos, &index) in self.free_list.iter().enumerate() {
            if self.free_list[pos + 1..].contains(&index) {
                return Err(format!("node {index} listed twice"));
            }
            if self.nodes.get(index).and_then(Option::as_ref).map(|n| n.kind) != Some(NodeKind::Free)
            {
                return Err(format!("free-list entry {index} is not a free leaf"));
            }
        }

        let occupied = leaves.iter().filter(|(_, id)| id.is_some()).count();
        if occupied != self.entries.len() {
            return Err(format!(
                "{occupied} occupied leaves but {} ids",
                self.entries.len()
            ));
        }
        for (&id, &index) in &self.entries {
            if self.nodes.get(index).and_then(Option::as_ref).map(|n| n.kind)
                != Some(NodeKind::Occupied(id))
            {
                return Err(format!("id {id} does not map to its leaf"));
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let Some(node) = node else { continue };
            if let NodeKind::Split(children) = node.kind {
                for child in children {
                    let parent = self.nodes.get(child).and_then(Option::as_ref).and_then(|c| c.parent);
                    if parent != Some(index) {
                        return Err(format!("child {child} of {index} has a stale parent link"));
                    }
                }
                if children
                    .iter()
                    .all(|&c| self.node(c).kind == NodeKind::Free)
                {
                    return Err(format!("split node {index} has two free children"));
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Tree surgery
    // ------------------------------------------------------------------------

    /// Carve a `width` x `height` cell from the top-left of a free node that
    /// has already been taken off the free list. Remainders go back on the
    /// free list. Returns the index of the cell.
    fn split(&mut self, index: NodeIndex, width: u32, height: u32) -> NodeIndex {
        let rect = self.node(index).rect;
        let dw = rect.width - width;
        let dh = rect.height - height;

        match (dw > 0, dh > 0) {
            (true, true) => {
                let (strip, right) = self.cut(
                    index,
                    Rect::new(rect.x, rect.y, width, rect.height),
                    Rect::new(rect.x + width, rect.y, dw, rect.height),
                );
                let (cell, bottom) = self.cut(
                    strip,
                    Rect::new(rect.x, rect.y, width, height),
                    Rect::new(rect.x, rect.y + height, width, dh),
                );
                self.insert_free(right);
                self.insert_free(bottom);
                cell
            }
            (true, false) => {
                let (cell, right) = self.cut(
                    index,
                    Rect::new(rect.x, rect.y, width, height),
                    Rect::new(rect.x + width, rect.y, dw, height),
                );
                self.insert_free(right);
                cell
            }
            (false, true) => {
                let (cell, bottom) = self.cut(
                    index,
                    Rect::new(rect.x, rect.y, width, height),
                    Rect::new(rect.x, rect.y + height, width, dh),
                );
                self.insert_free(bottom);
                cell
            }
            (false, false) => index,
        }
    }

    fn cut(&mut self, parent: NodeIndex, first: Rect, second: Rect) -> (NodeIndex, NodeIndex) {
        let a = self.add_node(first, Some(parent), NodeKind::Free);
        let b = self.add_node(second, Some(parent), NodeKind::Free);
        self.node_mut(parent).kind = NodeKind::Split([a, b]);
        (a, b)
    }

    fn add_node(&mut self, rect: Rect, parent: Option<NodeIndex>, kind: NodeKind) -> NodeIndex {
        let node = Node { rect, parent, kind };
        match self.vacant.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                index
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn remove_node(&mut self, index: NodeIndex) {
        self.nodes[index] = None;
        self.vacant.push(index);
    }

    fn insert_free(&mut self, index: NodeIndex) {
        let width = self.node(index).rect.width;
        let pos = self
            .free_list
            .partition_point(|&i| self.node(i).rect.width < width);
        self.free_list.insert(pos, index);
    }

    fn remove_free(&mut self, index: NodeIndex) {
        let width = self.node(index).rect.width;
        let start = self
            .free_list
            .partition_point(|&i| self.node(i).rect.width < width);
        if let Some(offset) = self.free_list[start..].iter().position(|&i| i == index) {
            self.free_list.remove(start + offset);
        }
    }

    fn node(&self, index: NodeIndex) -> &Node {
        match &self.nodes[index] {
            Some(node) => node,
            None => unreachable!("space node {index} was freed"),
        }
    }

    fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        match &mut self.nodes[index] {
            Some(node) => node,
            None => unreachable!("space node {index} was freed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    #[test]
    fn test_first_allocation_splits_both_axes() {
        let mut packer = GuillotinePacker::new(256, 256);
        let a = packer.allocate(64, 64).unwrap();
        assert_eq!(a, PackedRect { id: 1, rect: Rect::new(0, 0, 64, 64) });
        assert_eq!(
            packer.free_regions(),
            vec![Rect::new(0, 64, 64, 192), Rect::new(64, 0, 192, 256)]
        );
        packer.validate().unwrap();
    }

    #[test]
    fn test_released_cell_is_reused_exactly() {
        let mut packer = GuillotinePacker::new(256, 256);
        let a = packer.allocate(64, 64).unwrap();
        let b = packer.allocate(64, 64).unwrap();
        assert_eq!(b.id, 2);
        assert!(!a.rect.intersects(&b.rect));

        assert!(packer.release(a.id));
        let c = packer.allocate(64, 64).unwrap();
        assert_eq!(c.id, 3);
        assert_eq!(c.rect, a.rect);
        packer.validate().unwrap();
    }

    #[rstest]
    #[case::exact(256, 256)]
    #[case::width_slack(128, 256)]
    #[case::height_slack(256, 100)]
    #[case::both_slack(17, 33)]
    fn test_split_policies(#[case] width: u32, #[case] height: u32) {
        let mut packer = GuillotinePacker::new(256, 256);
        let a = packer.allocate(width, height).unwrap();
        assert_eq!(a.rect, Rect::new(0, 0, width, height));
        packer.validate().unwrap();
        assert_eq!(
            packer.free_area(),
            256 * 256 - width as u64 * height as u64
        );

        assert!(packer.release(a.id));
        assert_eq!(packer.free_regions(), vec![Rect::new(0, 0, 256, 256)]);
        packer.validate().unwrap();
    }

    #[rstest]
    #[case::too_wide(257, 1)]
    #[case::too_tall(1, 257)]
    #[case::zero(0, 10)]
    fn test_rejects_impossible_requests(#[case] width: u32, #[case] height: u32) {
        let mut packer = GuillotinePacker::new(256, 256);
        assert!(packer.allocate(width, height).is_none());
        assert!(packer.is_empty());
    }

    #[test]
    fn test_fills_up_then_fails() {
        let mut packer = GuillotinePacker::new(128, 128);
        let cells: Vec<_> = (0..16).map(|_| packer.allocate(32, 32).unwrap()).collect();
        assert_eq!(packer.free_area(), 0);
        assert!(packer.allocate(1, 1).is_none());
        packer.validate().unwrap();

        for cell in &cells {
            assert!(packer.release(cell.id));
            packer.validate().unwrap();
        }
        assert_eq!(packer.free_regions(), vec![Rect::new(0, 0, 128, 128)]);
    }

    #[test]
    fn test_prefers_exact_fit() {
        let mut packer = GuillotinePacker::new(100, 100);
        let a = packer.allocate(30, 30).unwrap();
        let _b = packer.allocate(30, 30).unwrap();
        packer.release(a.id);

        // The freed 30x30 cell beats every larger remainder.
        let c = packer.allocate(30, 30).unwrap();
        assert_eq!(c.rect, a.rect);
    }

    #[test]
    fn test_release_unknown_id() {
        let mut packer = GuillotinePacker::new(64, 64);
        assert!(!packer.release(1));
        let a = packer.allocate(8, 8).unwrap();
        assert!(packer.release(a.id));
        assert!(!packer.release(a.id));
    }

    #[test]
    fn test_ids_never_repeat() {
        let mut packer = GuillotinePacker::new(64, 64);
        let a = packer.allocate(64, 64).unwrap();
        packer.release(a.id);
        packer.clear();
        let b = packer.allocate(64, 64).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_round_trip_allocation() {
        let mut packer = GuillotinePacker::new(512, 512);
        let a = packer.allocate(100, 40).unwrap();
        packer.release(a.id);
        let b = packer.allocate(100, 40).unwrap();
        assert_eq!((b.rect.width, b.rect.height), (100, 40));
    }

    #[test]
    fn test_random_sequences_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let mut packer = GuillotinePacker::new(256, 256);
            let mut live: Vec<PackedRect> = Vec::new();

            for _ in 0..200 {
                if live.is_empty() || rng.gen_range(0..3) > 0 {
                    let w = rng.gen_range(1..=64);
                    let h = rng.gen_range(1..=64);
                    if let Some(cell) = packer.allocate(w, h) {
                        assert_eq!((cell.rect.width, cell.rect.height), (w, h));
                        assert!(live.iter().all(|other| !other.rect.intersects(&cell.rect)));
                        live.push(cell);
                    }
                } else {
                    let victim = live.swap_remove(rng.gen_range(0..live.len()));
                    assert!(packer.release(victim.id));
                }
                packer.validate().unwrap();
            }

            for cell in live.drain(..) {
                assert!(packer.release(cell.id));
            }
            packer.validate().unwrap();
            assert_eq!(packer.free_regions(), vec![Rect::new(0, 0, 256, 256)]);
        }
    }
}
