//! # Fixed-radius neighbor search
//!
//! The close-pair finder needs, at every sampling step, **all pairs of objects closer
//! than a radius**. This module exposes that query behind the [`SpatialIndex`] trait and
//! provides two implementations:
//!
//! * [`KdTree`] – a 3-D k-d tree built per query, `O(n log n)` build and
//!   output-sensitive search; the default for catalog-scale screening.
//! * [`BruteForce`] – the exhaustive `O(n²)` scan, kept as the reference the tree is
//!   tested and benchmarked against.
//!
//! Both implementations return the same set of pairs: `i < j`, Euclidean distance
//! `≤ radius` (inclusive), sorted by `(i, j)`. Points with a non-finite coordinate never
//! take part in a pair.
use std::cmp::Ordering;

use nalgebra::Vector3;

/// Two point indices (`i < j`) and their distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborPair {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
}

/// All-pairs fixed-radius query over a point cloud.
pub trait SpatialIndex: Send + Sync {
    /// Every pair of `points` at distance `≤ radius`, with `i < j`, sorted by `(i, j)`.
    fn query_radius(&self, points: &[Vector3<f64>], radius: f64) -> Vec<NeighborPair>;
}

/// Exhaustive pairwise scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForce;

impl SpatialIndex for BruteForce {
    fn query_radius(&self, points: &[Vector3<f64>], radius: f64) -> Vec<NeighborPair> {
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }

        let mut pairs = Vec::new();
        for (i, a) in points.iter().enumerate() {
            for (j, b) in points.iter().enumerate().skip(i + 1) {
                let distance = (a - b).norm();
                if distance <= radius {
                    pairs.push(NeighborPair { i, j, distance });
                }
            }
        }
        pairs
    }
}

/// 3-D k-d tree.
///
/// The tree is implicit: a permutation of the point indices where every range
/// `[lo, hi)` stores its splitting point at `mid = (lo + hi) / 2`, points below the
/// splitting plane in `[lo, mid)` and points above it in `(mid, hi)`. The splitting axis
/// cycles through x, y, z with depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct KdTree;

struct Tree<'a> {
    points: &'a [Vector3<f64>],
    order: Vec<usize>,
}

impl<'a> Tree<'a> {
    fn build(points: &'a [Vector3<f64>]) -> Self {
        let mut order: Vec<usize> = (0..points.len())
            .filter(|&i| points[i].iter().all(|c| c.is_finite()))
            .collect();
        Self::split(points, &mut order, 0);
        Tree { points, order }
    }

    fn split(points: &[Vector3<f64>], slice: &mut [usize], depth: usize) {
        if slice.len() <= 1 {
            return;
        }
        let axis = depth % 3;
        let mid = slice.len() / 2;
        slice.select_nth_unstable_by(mid, |&a, &b| {
            points[a][axis]
                .total_cmp(&points[b][axis])
                .then(a.cmp(&b))
        });

        let (left, right) = slice.split_at_mut(mid);
        Self::split(points, left, depth + 1);
        Self::split(points, &mut right[1..], depth + 1);
    }

    /// Indices of the points within `radius` of `query`.
    fn range_search(&self, query: &Vector3<f64>, radius: f64, out: &mut Vec<usize>) {
        self.search(query, radius, 0, self.order.len(), 0, out);
    }

    fn search(
        &self,
        query: &Vector3<f64>,
        radius: f64,
        lo: usize,
        hi: usize,
        depth: usize,
        out: &mut Vec<usize>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let node = self.order[mid];
        let point = &self.points[node];

        if (point - query).norm() <= radius {
            out.push(node);
        }

        let axis = depth % 3;
        let delta = query[axis] - point[axis];
        match delta.partial_cmp(&0.0) {
            Some(Ordering::Less) => {
                self.search(query, radius, lo, mid, depth + 1, out);
                if -delta <= radius {
                    self.search(query, radius, mid + 1, hi, depth + 1, out);
                }
            }
            _ => {
                self.search(query, radius, mid + 1, hi, depth + 1, out);
                if delta <= radius {
                    self.search(query, radius, lo, mid, depth + 1, out);
                }
            }
        }
    }
}

impl SpatialIndex for KdTree {
    fn query_radius(&self, points: &[Vector3<f64>], radius: f64) -> Vec<NeighborPair> {
        if radius.is_nan() || radius < 0.0 || points.len() < 2 {
            return Vec::new();
        }

        let tree = Tree::build(points);
        let mut pairs = Vec::new();
        let mut hits = Vec::new();

        for &i in &tree.order {
            hits.clear();
            tree.range_search(&points[i], radius, &mut hits);
            pairs.extend(hits.iter().filter(|&&j| j > i).map(|&j| NeighborPair {
                i,
                j,
                distance: (points[i] - points[j]).norm(),
            }));
        }

        pairs.sort_unstable_by(|a, b| (a.i, a.j).cmp(&(b.i, b.j)));
        pairs
    }
}
