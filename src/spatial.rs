//! k-nearest-neighbour lookup over gauge locations.
//!
//! Points are stored as `[lat, lon]` in radians and compared with plain
//! Euclidean distance in that space. Multiply a returned distance by
//! [`METRES_PER_RADIAN`](crate::types::METRES_PER_RADIAN) for metres on the
//! same scale as every other planar distance in the crate; the result ignores
//! the cos(latitude) shrink of longitude and is only meaningful over small
//! extents.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Euclidean distance in radian space.
    pub distance: f64,
    /// Index into the reference set the index was built from.
    pub index: usize,
}

// Max-heap on distance so the current worst candidate is on top.
impl Eq for Neighbour {}

impl Ord for Neighbour {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Neighbour {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct Node {
    point: [f64; 2],
    index: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Static 2-d tree. Rebuild when the reference set changes.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl SpatialIndex {
    pub fn build(points: &[GeoPoint]) -> Self {
        let mut items: Vec<([f64; 2], usize)> =
            points.iter().enumerate().map(|(i, p)| (p.to_radians(), i)).collect();
        let mut index = SpatialIndex { nodes: Vec::with_capacity(points.len()), root: None };
        index.root = index.build_rec(&mut items, 0);
        index
    }

    fn build_rec(&mut self, items: &mut [([f64; 2], usize)], depth: usize) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        let axis = depth % 2;
        items.sort_by(|a, b| a.0[axis].partial_cmp(&b.0[axis]).unwrap_or(Ordering::Equal));
        let mid = items.len() / 2;
        let (point, index) = items[mid];
        let slot = self.nodes.len();
        self.nodes.push(Node { point, index, axis, left: None, right: None });
        let (lo, rest) = items.split_at_mut(mid);
        let left = self.build_rec(lo, depth + 1);
        let right = self.build_rec(&mut rest[1..], depth + 1);
        self.nodes[slot].left = left;
        self.nodes[slot].right = right;
        Some(slot)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Up to `k` reference points within `max_distance` (radians) of `query`,
    /// nearest first. Empty if none qualify.
    pub fn nearest(&self, query: &GeoPoint, k: usize, max_distance: f64) -> Vec<Neighbour> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k.min(self.len()) + 1);
        if let Some(root) = self.root {
            self.search(root, query.to_radians(), k, max_distance, &mut heap);
        }
        let mut out = heap.into_vec();
        out.sort();
        out
    }

    /// `nearest` for every query point.
    pub fn query_many(&self, queries: &[GeoPoint], k: usize, max_distance: f64) -> Vec<Vec<Neighbour>> {
        queries.iter().map(|q| self.nearest(q, k, max_distance)).collect()
    }

    fn search(&self, slot: usize, q: [f64; 2], k: usize, max_distance: f64, heap: &mut BinaryHeap<Neighbour>) {
        let node = &self.nodes[slot];
        let d = ((node.point[0] - q[0]).powi(2) + (node.point[1] - q[1]).powi(2)).sqrt();
        if d <= max_distance {
            heap.push(Neighbour { distance: d, index: node.index });
            if heap.len() > k {
                heap.pop();
            }
        }

        let diff = q[node.axis] - node.point[node.axis];
        let (near, far) = if diff < 0.0 { (node.left, node.right) } else { (node.right, node.left) };
        if let Some(n) = near {
            self.search(n, q, k, max_distance, heap);
        }
        let worst = if heap.len() == k { heap.peek().map_or(max_distance, |n| n.distance) } else { max_distance };
        if diff.abs() <= worst
            && let Some(f) = far
        {
            self.search(f, q, k, max_distance, heap);
        }
    }
}
