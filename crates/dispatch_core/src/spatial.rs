//! Spatial index over road links: a k-d tree of 2D line segments.
//!
//! Unlike a point k-d tree, each node partitions space with a *band* — the
//! axis-aligned extent of its segment on the splitting axis. A segment that
//! straddles a node's band widens the band and descends right, which keeps
//! the invariant that a node's band contains every segment in its subtree.
//! Nearest-link queries are branch-and-bound over squared distances.

use crate::geom::{segment_distance_sq, Point2D};
use crate::map::LinkId;

#[derive(Debug, Clone)]
struct Node {
    link: LinkId,
    /// Segment endpoints, kept here so queries need no map access.
    a: Point2D,
    b: Point2D,
    /// Partition band: the union of bounding boxes of this node's segment
    /// and every straddling segment pushed into its right subtree.
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    /// Left/bottom subtree.
    lb: Option<Box<Node>>,
    /// Right/top subtree.
    rt: Option<Box<Node>>,
}

impl Node {
    fn new(link: LinkId, a: Point2D, b: Point2D) -> Self {
        Self {
            link,
            a,
            b,
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
            lb: None,
            rt: None,
        }
    }

    fn extend_band(&mut self, a: Point2D, b: Point2D) {
        self.min_x = self.min_x.min(a.x.min(b.x));
        self.min_y = self.min_y.min(a.y.min(b.y));
        self.max_x = self.max_x.max(a.x.max(b.x));
        self.max_y = self.max_y.max(a.y.max(b.y));
    }

    fn distance_sq(&self, p: Point2D) -> f64 {
        segment_distance_sq(self.a, self.b, p)
    }
}

/// Which side of a node's partition band a segment falls on.
fn direction_segment_to_band(a: Point2D, b: Point2D, node: &Node, even_level: bool) -> i8 {
    if even_level {
        let (min, max) = (a.x.min(b.x), a.x.max(b.x));
        if max <= node.min_x {
            -1
        } else if min >= node.max_x {
            1
        } else {
            0
        }
    } else {
        let (min, max) = (a.y.min(b.y), a.y.max(b.y));
        if max <= node.min_y {
            -1
        } else if min >= node.max_y {
            1
        } else {
            0
        }
    }
}

/// Signed distance from a point to a node's partition band on the splitting
/// axis; zero when the point lies inside the band. The sign selects the
/// primary branch, the square bounds what the secondary branch can contain.
fn distance_point_to_band(p: Point2D, node: &Node, even_level: bool) -> f64 {
    if even_level {
        if p.x <= node.min_x || p.x >= node.max_x {
            p.x - node.min_x
        } else {
            0.0
        }
    } else if p.y <= node.min_y || p.y >= node.max_y {
        p.y - node.min_y
    } else {
        0.0
    }
}

/// k-d tree over directed link segments.
#[derive(Debug, Clone, Default)]
pub struct KdTree {
    root: Option<Box<Node>>,
    size: usize,
}

impl KdTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert a link segment with endpoints `a` and `b`.
    pub fn insert(&mut self, link: LinkId, a: Point2D, b: Point2D) {
        let root = self.root.take();
        self.root = Some(Self::insert_at(root, link, a, b, true));
        self.size += 1;
    }

    fn insert_at(
        node: Option<Box<Node>>,
        link: LinkId,
        a: Point2D,
        b: Point2D,
        even_level: bool,
    ) -> Box<Node> {
        let Some(mut node) = node else {
            return Box::new(Node::new(link, a, b));
        };

        match direction_segment_to_band(a, b, &node, even_level) {
            -1 => node.lb = Some(Self::insert_at(node.lb.take(), link, a, b, !even_level)),
            1 => node.rt = Some(Self::insert_at(node.rt.take(), link, a, b, !even_level)),
            _ => {
                // Straddles the band: widen it and break the tie rightward.
                node.extend_band(a, b);
                node.rt = Some(Self::insert_at(node.rt.take(), link, a, b, !even_level));
            }
        }
        node
    }

    /// The link whose segment is closest to `p`, or `None` on an empty tree.
    pub fn nearest(&self, p: Point2D) -> Option<LinkId> {
        let root = self.root.as_deref()?;
        let champion = (root.link, root.distance_sq(p));
        Some(Self::nearest_at(Some(root), p, champion, true).0)
    }

    fn nearest_at(
        node: Option<&Node>,
        p: Point2D,
        mut champion: (LinkId, f64),
        even_level: bool,
    ) -> (LinkId, f64) {
        let Some(node) = node else {
            return champion;
        };

        let d = node.distance_sq(p);
        if d < champion.1 {
            champion = (node.link, d);
        }

        let signed = distance_point_to_band(p, node, even_level);
        let (primary, secondary) = if signed < 0.0 {
            (node.lb.as_deref(), node.rt.as_deref())
        } else {
            (node.rt.as_deref(), node.lb.as_deref())
        };

        champion = Self::nearest_at(primary, p, champion, !even_level);
        if champion.1 >= signed * signed {
            champion = Self::nearest_at(secondary, p, champion, !even_level);
        }
        champion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_segment(rng: &mut StdRng) -> (Point2D, Point2D) {
        let a = Point2D::new(rng.gen_range(-1000.0..1000.0), rng.gen_range(-1000.0..1000.0));
        let b = Point2D::new(
            a.x + rng.gen_range(-80.0..80.0),
            a.y + rng.gen_range(-80.0..80.0),
        );
        (a, b)
    }

    #[test]
    fn empty_tree_has_no_nearest() {
        let tree = KdTree::new();
        assert!(tree.nearest(Point2D::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn single_segment_is_always_nearest() {
        let mut tree = KdTree::new();
        tree.insert(LinkId(0), Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0));
        assert_eq!(tree.nearest(Point2D::new(500.0, -3.0)), Some(LinkId(0)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn nearest_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let segments: Vec<(Point2D, Point2D)> =
            (0..300).map(|_| random_segment(&mut rng)).collect();

        let mut tree = KdTree::new();
        for (i, &(a, b)) in segments.iter().enumerate() {
            tree.insert(LinkId(i as u32), a, b);
        }

        for _ in 0..200 {
            let p = Point2D::new(rng.gen_range(-1200.0..1200.0), rng.gen_range(-1200.0..1200.0));
            let reported = tree.nearest(p).unwrap();
            let reported_d = {
                let (a, b) = segments[reported.index()];
                segment_distance_sq(a, b, p)
            };
            let best = segments
                .iter()
                .map(|&(a, b)| segment_distance_sq(a, b, p))
                .fold(f64::INFINITY, f64::min);
            assert!(
                (reported_d - best).abs() < 1e-9,
                "nearest returned {reported_d}, brute force found {best}"
            );
        }
    }
}
