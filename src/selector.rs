use crate::edge::*;
use crate::geom::*;

/// Slack factor on query-point movement when deciding whether a cached edge
/// distance can still beat the current minimum.
pub const DISTANCE_DELTA_FACTOR: f32 = 1.001;

/// Per-edge scratch record for the movement-bounded pruning check. One cache
/// lives per edge for the duration of a bake and is never shared across
/// threads; pruning must never change the selected distance, only skip
/// evaluations that cannot win.
#[derive(Copy, Clone, Debug, Default)]
pub struct EdgeCache {
    pub point: Vec2,
    pub abs_distance: f32,
    pub a_domain_distance: f32,
    pub b_domain_distance: f32,
    pub a_pseudo_distance: f32,
    pub b_pseudo_distance: f32,
}

/// Accumulates the per-channel minimum distance over the edges of a shape
/// for one query point. Implementations are value types local to a single
/// bake; `reset` must run once per query point.
pub trait EdgeSelector: Default {
    type Distance: Copy;

    fn reset(&mut self, p: Vec2);
    fn add_edge(&mut self, cache: &mut EdgeCache, prev: &Edge, edge: &Edge, next: &Edge);
    fn distance(&self) -> Self::Distance;
}

/// Single-channel minimum true distance.
#[derive(Clone)]
pub struct TrueDistanceSelector {
    p: Vec2,
    min_distance: SignedDistance,
}

impl Default for TrueDistanceSelector {
    fn default() -> TrueDistanceSelector {
        TrueDistanceSelector {
            p: Vec2::new(0.0, 0.0),
            min_distance: SignedDistance::INFINITE,
        }
    }
}

impl EdgeSelector for TrueDistanceSelector {
    type Distance = f32;

    fn reset(&mut self, p: Vec2) {
        // Widen the carried minimum by the worst case the move could cost.
        let delta = DISTANCE_DELTA_FACTOR * (p - self.p).length();
        self.min_distance.distance += non_zero_sign(self.min_distance.distance) * delta;
        self.p = p;
    }

    fn add_edge(&mut self, cache: &mut EdgeCache, _prev: &Edge, edge: &Edge, _next: &Edge) {
        let delta = DISTANCE_DELTA_FACTOR * (self.p - cache.point).length();
        if cache.abs_distance - delta <= self.min_distance.distance.abs() {
            let (distance, _) = edge.signed_distance(self.p);
            if distance < self.min_distance {
                self.min_distance = distance;
            }
            cache.point = self.p;
            cache.abs_distance = distance.distance.abs();
        }
    }

    fn distance(&self) -> f32 {
        self.min_distance.distance
    }
}

/// Shared accumulator for the pseudo-distance selectors: the minimum true
/// distance plus the best negative and positive pseudo distances seen.
#[derive(Clone)]
struct PseudoDistanceAccumulator {
    min_true_distance: SignedDistance,
    min_negative_pseudo_distance: f32,
    min_positive_pseudo_distance: f32,
    near_edge: Option<Edge>,
    near_edge_param: f32,
}

impl Default for PseudoDistanceAccumulator {
    fn default() -> PseudoDistanceAccumulator {
        PseudoDistanceAccumulator {
            min_true_distance: SignedDistance::INFINITE,
            min_negative_pseudo_distance: -SignedDistance::INFINITE.distance.abs(),
            min_positive_pseudo_distance: SignedDistance::INFINITE.distance.abs(),
            near_edge: None,
            near_edge_param: 0.0,
        }
    }
}

impl PseudoDistanceAccumulator {
    fn reset(&mut self, delta: f32) {
        self.min_true_distance.distance +=
            non_zero_sign(self.min_true_distance.distance) * delta;
        self.min_negative_pseudo_distance = -self.min_true_distance.distance.abs();
        self.min_positive_pseudo_distance = self.min_true_distance.distance.abs();
        self.near_edge = None;
        self.near_edge_param = 0.0;
    }

    /// Candidate pseudo distance along `edge_dir` from endpoint offset `ep`.
    /// Accepted only past the endpoint and only when it beats `distance`.
    fn pseudo_distance(distance: &mut f32, ep: Vec2, edge_dir: Vec2) -> bool {
        let ts = ep.dot(edge_dir);
        if ts > 0.0 {
            let pseudo_distance = ep.cross(edge_dir);
            if pseudo_distance.abs() < distance.abs() {
                *distance = pseudo_distance;
                return true;
            }
        }
        false
    }

    fn is_edge_relevant(&self, cache: &EdgeCache, p: Vec2) -> bool {
        let delta = DISTANCE_DELTA_FACTOR * (p - cache.point).length();
        cache.abs_distance - delta <= self.min_true_distance.distance.abs()
            || cache.a_domain_distance.abs() < delta
            || cache.b_domain_distance.abs() < delta
            || (cache.a_domain_distance > 0.0
                && if cache.a_pseudo_distance < 0.0 {
                    cache.a_pseudo_distance + delta >= self.min_negative_pseudo_distance
                } else {
                    cache.a_pseudo_distance - delta <= self.min_positive_pseudo_distance
                })
            || (cache.b_domain_distance > 0.0
                && if cache.b_pseudo_distance < 0.0 {
                    cache.b_pseudo_distance + delta >= self.min_negative_pseudo_distance
                } else {
                    cache.b_pseudo_distance - delta <= self.min_positive_pseudo_distance
                })
    }

    fn add_true_distance(&mut self, edge: &Edge, distance: SignedDistance, param: f32) {
        if distance < self.min_true_distance {
            self.min_true_distance = distance;
            self.near_edge = Some(*edge);
            self.near_edge_param = param;
        }
    }

    fn add_pseudo_distance(&mut self, distance: f32) {
        if distance <= 0.0 && distance > self.min_negative_pseudo_distance {
            self.min_negative_pseudo_distance = distance;
        }
        if distance >= 0.0 && distance < self.min_positive_pseudo_distance {
            self.min_positive_pseudo_distance = distance;
        }
    }

    fn compute_distance(&self, p: Vec2) -> f32 {
        let mut min_distance = if self.min_true_distance.distance < 0.0 {
            self.min_negative_pseudo_distance
        } else {
            self.min_positive_pseudo_distance
        };
        if let Some(near_edge) = &self.near_edge {
            let mut distance = self.min_true_distance;
            near_edge.distance_to_pseudo_distance(&mut distance, p, self.near_edge_param);
            if distance.distance.abs() < min_distance.abs() {
                min_distance = distance.distance;
            }
        }
        min_distance
    }
}

/// Corner blending terms shared by every pseudo-distance flavor: which of
/// the edge's endpoints the query point lies beyond, decided against the
/// bisector of the adjacent edge directions.
struct CornerTerms {
    ap: Vec2,
    bp: Vec2,
    a_dir: Vec2,
    b_dir: Vec2,
    add: f32,
    bdd: f32,
}

fn corner_terms(p: Vec2, prev: &Edge, edge: &Edge, next: &Edge) -> CornerTerms {
    let ap = p - edge.start();
    let bp = p - edge.end();
    let a_dir = edge.direction(0.0).normalized_or_zero();
    let b_dir = edge.direction(1.0).normalized_or_zero();
    let prev_dir = prev.direction(1.0).normalized_or_zero();
    let next_dir = next.direction(0.0).normalized_or_zero();
    let add = ap.dot((prev_dir + a_dir).normalized_or_zero());
    let bdd = -bp.dot((b_dir + next_dir).normalized_or_zero());
    CornerTerms {
        ap,
        bp,
        a_dir,
        b_dir,
        add,
        bdd,
    }
}

/// Single-channel distance with pseudo-distance corner extension.
#[derive(Clone, Default)]
pub struct PseudoDistanceSelector {
    p: Vec2,
    acc: PseudoDistanceAccumulator,
}

impl EdgeSelector for PseudoDistanceSelector {
    type Distance = f32;

    fn reset(&mut self, p: Vec2) {
        let delta = DISTANCE_DELTA_FACTOR * (p - self.p).length();
        self.acc.reset(delta);
        self.p = p;
    }

    fn add_edge(&mut self, cache: &mut EdgeCache, prev: &Edge, edge: &Edge, next: &Edge) {
        if !self.acc.is_edge_relevant(cache, self.p) {
            return;
        }
        let (distance, param) = edge.signed_distance(self.p);
        self.acc.add_true_distance(edge, distance, param);
        cache.point = self.p;
        cache.abs_distance = distance.distance.abs();

        let terms = corner_terms(self.p, prev, edge, next);
        if terms.add > 0.0 {
            let mut pd = distance.distance;
            if PseudoDistanceAccumulator::pseudo_distance(&mut pd, terms.ap, -terms.a_dir) {
                pd = -pd;
                self.acc.add_pseudo_distance(pd);
            }
            cache.a_pseudo_distance = pd;
        }
        if terms.bdd > 0.0 {
            let mut pd = distance.distance;
            if PseudoDistanceAccumulator::pseudo_distance(&mut pd, terms.bp, terms.b_dir) {
                self.acc.add_pseudo_distance(pd);
            }
            cache.b_pseudo_distance = pd;
        }
        cache.a_domain_distance = terms.add;
        cache.b_domain_distance = terms.bdd;
    }

    fn distance(&self) -> f32 {
        self.acc.compute_distance(self.p)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct MultiDistance {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct MultiAndTrueDistance {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Three independent channel accumulators; an edge only feeds the channels
/// whose color bits it carries.
#[derive(Clone, Default)]
pub struct MultiDistanceSelector {
    p: Vec2,
    r: PseudoDistanceAccumulator,
    g: PseudoDistanceAccumulator,
    b: PseudoDistanceAccumulator,
}

impl MultiDistanceSelector {
    fn true_distance(&self) -> SignedDistance {
        let mut distance = self.r.min_true_distance;
        if self.g.min_true_distance < distance {
            distance = self.g.min_true_distance;
        }
        if self.b.min_true_distance < distance {
            distance = self.b.min_true_distance;
        }
        distance
    }
}

impl EdgeSelector for MultiDistanceSelector {
    type Distance = MultiDistance;

    fn reset(&mut self, p: Vec2) {
        let delta = DISTANCE_DELTA_FACTOR * (p - self.p).length();
        self.r.reset(delta);
        self.g.reset(delta);
        self.b.reset(delta);
        self.p = p;
    }

    fn add_edge(&mut self, cache: &mut EdgeCache, prev: &Edge, edge: &Edge, next: &Edge) {
        let color = edge.color();
        let relevant = (color.contains(EdgeColor::RED) && self.r.is_edge_relevant(cache, self.p))
            || (color.contains(EdgeColor::GREEN) && self.g.is_edge_relevant(cache, self.p))
            || (color.contains(EdgeColor::BLUE) && self.b.is_edge_relevant(cache, self.p));
        if !relevant {
            return;
        }
        let (distance, param) = edge.signed_distance(self.p);
        if color.contains(EdgeColor::RED) {
            self.r.add_true_distance(edge, distance, param);
        }
        if color.contains(EdgeColor::GREEN) {
            self.g.add_true_distance(edge, distance, param);
        }
        if color.contains(EdgeColor::BLUE) {
            self.b.add_true_distance(edge, distance, param);
        }
        cache.point = self.p;
        cache.abs_distance = distance.distance.abs();

        let terms = corner_terms(self.p, prev, edge, next);
        if terms.add > 0.0 {
            let mut pd = distance.distance;
            if PseudoDistanceAccumulator::pseudo_distance(&mut pd, terms.ap, -terms.a_dir) {
                pd = -pd;
                if color.contains(EdgeColor::RED) {
                    self.r.add_pseudo_distance(pd);
                }
                if color.contains(EdgeColor::GREEN) {
                    self.g.add_pseudo_distance(pd);
                }
                if color.contains(EdgeColor::BLUE) {
                    self.b.add_pseudo_distance(pd);
                }
            }
            cache.a_pseudo_distance = pd;
        }
        if terms.bdd > 0.0 {
            let mut pd = distance.distance;
            if PseudoDistanceAccumulator::pseudo_distance(&mut pd, terms.bp, terms.b_dir) {
                if color.contains(EdgeColor::RED) {
                    self.r.add_pseudo_distance(pd);
                }
                if color.contains(EdgeColor::GREEN) {
                    self.g.add_pseudo_distance(pd);
                }
                if color.contains(EdgeColor::BLUE) {
                    self.b.add_pseudo_distance(pd);
                }
            }
            cache.b_pseudo_distance = pd;
        }
        cache.a_domain_distance = terms.add;
        cache.b_domain_distance = terms.bdd;
    }

    fn distance(&self) -> MultiDistance {
        MultiDistance {
            r: self.r.compute_distance(self.p),
            g: self.g.compute_distance(self.p),
            b: self.b.compute_distance(self.p),
        }
    }
}

/// The three color channels plus a combined true-distance channel used as a
/// stability fallback at ambiguous corners.
#[derive(Clone, Default)]
pub struct MultiAndTrueDistanceSelector {
    multi: MultiDistanceSelector,
}

impl EdgeSelector for MultiAndTrueDistanceSelector {
    type Distance = MultiAndTrueDistance;

    fn reset(&mut self, p: Vec2) {
        self.multi.reset(p);
    }

    fn add_edge(&mut self, cache: &mut EdgeCache, prev: &Edge, edge: &Edge, next: &Edge) {
        self.multi.add_edge(cache, prev, edge, next);
    }

    fn distance(&self) -> MultiAndTrueDistance {
        let multi = self.multi.distance();
        MultiAndTrueDistance {
            r: multi.r,
            g: multi.g,
            b: multi.b,
            a: self.multi.true_distance().distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::*;
    use crate::shape::*;

    fn feed_contour<S: EdgeSelector>(selector: &mut S, caches: &mut [EdgeCache], contour: &Contour) {
        let edges = contour.edges();
        let mut prev = &edges[if edges.len() >= 2 { edges.len() - 2 } else { 0 }];
        let mut cur = &edges[edges.len() - 1];
        for (i, next) in edges.iter().enumerate() {
            selector.add_edge(&mut caches[i], prev, cur, next);
            prev = cur;
            cur = next;
        }
    }

    fn unit_square_contour() -> Contour {
        let shape = Shape::from_points(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            EdgeColor::WHITE,
        );
        shape.contours()[0].clone()
    }

    #[test]
    fn test_true_distance_against_brute_force() {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..20 {
            // Random closed polyline contour.
            let n = rng.random_range(3..9);
            let mut points = Vec::new();
            for _ in 0..n {
                points.push(Vec2::new(
                    rng.random_range(-4.0f32..4.0),
                    rng.random_range(-4.0f32..4.0),
                ));
            }
            let shape = Shape::from_points(&points, EdgeColor::WHITE);
            let contour = &shape.contours()[0];

            // A cached, pruned selector swept over a scanline must agree
            // with a fresh brute-force selector at every sample.
            let mut pruned = TrueDistanceSelector::default();
            let mut caches = vec![EdgeCache::default(); contour.edges().len()];
            for step in 0..64 {
                let p = Vec2::new(-5.0 + 10.0 * step as f32 / 63.0, rng.random_range(-5.0f32..5.0));
                pruned.reset(p);
                feed_contour(&mut pruned, &mut caches, contour);

                let mut reference = TrueDistanceSelector::default();
                let mut fresh = vec![EdgeCache::default(); contour.edges().len()];
                reference.reset(p);
                feed_contour(&mut reference, &mut fresh, contour);

                assert_eq!(pruned.distance(), reference.distance());
            }
        }
    }

    #[test]
    fn test_point_on_edge_resolves_to_zero() {
        let contour = unit_square_contour();
        let mut selector = MultiDistanceSelector::default();
        let mut caches = vec![EdgeCache::default(); contour.edges().len()];
        selector.reset(Vec2::new(0.5, 0.0));
        feed_contour(&mut selector, &mut caches, &contour);
        let d = selector.distance();
        let min_abs = d.r.abs().min(d.g.abs()).min(d.b.abs());
        assert!(min_abs < 1e-5);
    }

    #[test]
    fn test_corner_median_is_robust() {
        // Clockwise outline square with edges colored R, G, B, R in
        // sequence, so distances are positive inside.
        let colors = [
            EdgeColor::RED,
            EdgeColor::GREEN,
            EdgeColor::BLUE,
            EdgeColor::RED,
        ];
        let corners = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ];
        let mut contour = Contour::new();
        for i in 0..4 {
            contour.push(Edge::line(corners[i], corners[(i + 1) % 4], colors[i]));
        }
        assert_eq!(contour.winding(), -1);

        // Just outside the convex corner where the G and B edges meet. The
        // far R channel extrapolates the wrong side there; the two adjacent
        // channels still agree and the median lands outside.
        let mut caches = vec![EdgeCache::default(); contour.edges().len()];
        let mut selector = MultiDistanceSelector::default();
        selector.reset(Vec2::new(1.08, 1.03));
        feed_contour(&mut selector, &mut caches, &contour);
        let d = selector.distance();
        let negative = [d.r, d.g, d.b].iter().filter(|&&v| v < 0.0).count();
        assert!(negative >= 2, "two channels must agree outside: {:?}", d);
        assert!(median(d.r, d.g, d.b) < 0.0);

        // Just inside the same corner.
        let mut selector = MultiDistanceSelector::default();
        let mut caches = vec![EdgeCache::default(); contour.edges().len()];
        selector.reset(Vec2::new(0.92, 0.95));
        feed_contour(&mut selector, &mut caches, &contour);
        let d = selector.distance();
        assert!(median(d.r, d.g, d.b) > 0.0);
    }

    #[test]
    fn test_mtsdf_true_channel_tracks_distance() {
        let contour = unit_square_contour();
        let mut selector = MultiAndTrueDistanceSelector::default();
        let mut caches = vec![EdgeCache::default(); contour.edges().len()];
        let p = Vec2::new(0.5, -1.0);
        selector.reset(p);
        feed_contour(&mut selector, &mut caches, &contour);
        let d = selector.distance();
        assert!((d.a.abs() - 1.0).abs() < 1e-5);
    }
}
