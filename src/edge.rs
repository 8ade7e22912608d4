use bitflags::bitflags;

use crate::geom::*;

bitflags! {
    /// Channel tag deciding which distance-field channels an edge feeds.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct EdgeColor: u8 {
        const RED = 0b001;
        const GREEN = 0b010;
        const BLUE = 0b100;
        const YELLOW = 0b011;
        const MAGENTA = 0b101;
        const CYAN = 0b110;
        const WHITE = 0b111;
    }
}

/// Signed distance from a query point to an edge, ordered by magnitude and,
/// on ties, by how far the nearest point is from being perpendicular.
#[derive(Copy, Clone, Debug)]
pub struct SignedDistance {
    pub distance: f32,
    pub dot: f32,
}

impl SignedDistance {
    pub const INFINITE: SignedDistance = SignedDistance {
        distance: -f32::MAX,
        dot: 1.0,
    };

    #[inline]
    pub fn new(distance: f32, dot: f32) -> SignedDistance {
        SignedDistance { distance, dot }
    }
}

impl PartialEq for SignedDistance {
    #[inline]
    fn eq(&self, other: &SignedDistance) -> bool {
        self.distance.abs() == other.distance.abs() && self.dot == other.dot
    }
}

impl PartialOrd for SignedDistance {
    #[inline]
    fn partial_cmp(&self, other: &SignedDistance) -> Option<std::cmp::Ordering> {
        (self.distance.abs(), self.dot).partial_cmp(&(other.distance.abs(), other.dot))
    }
}

const CUBIC_SEARCH_STARTS: usize = 4;
const CUBIC_SEARCH_STEPS: usize = 4;

/// One curve segment of a contour. Control points are immutable except
/// through the whole-shape transforms.
#[derive(Copy, Clone, Debug)]
pub enum Edge {
    Linear { points: [Vec2; 2], color: EdgeColor },
    Quadratic { points: [Vec2; 3], color: EdgeColor },
    Cubic { points: [Vec2; 4], color: EdgeColor },
}

impl Edge {
    pub fn line(from: Vec2, to: Vec2, color: EdgeColor) -> Edge {
        Edge::Linear {
            points: [from, to],
            color,
        }
    }

    pub fn quadratic(from: Vec2, control: Vec2, to: Vec2, color: EdgeColor) -> Edge {
        Edge::Quadratic {
            points: [from, control, to],
            color,
        }
    }

    pub fn cubic(from: Vec2, control1: Vec2, control2: Vec2, to: Vec2, color: EdgeColor) -> Edge {
        Edge::Cubic {
            points: [from, control1, control2, to],
            color,
        }
    }

    pub fn color(&self) -> EdgeColor {
        match self {
            Edge::Linear { color, .. } => *color,
            Edge::Quadratic { color, .. } => *color,
            Edge::Cubic { color, .. } => *color,
        }
    }

    pub fn set_color(&mut self, new: EdgeColor) {
        match self {
            Edge::Linear { color, .. } => *color = new,
            Edge::Quadratic { color, .. } => *color = new,
            Edge::Cubic { color, .. } => *color = new,
        }
    }

    pub fn points(&self) -> &[Vec2] {
        match self {
            Edge::Linear { points, .. } => points,
            Edge::Quadratic { points, .. } => points,
            Edge::Cubic { points, .. } => points,
        }
    }

    pub(crate) fn points_mut(&mut self) -> &mut [Vec2] {
        match self {
            Edge::Linear { points, .. } => points,
            Edge::Quadratic { points, .. } => points,
            Edge::Cubic { points, .. } => points,
        }
    }

    #[inline]
    pub fn start(&self) -> Vec2 {
        self.points()[0]
    }

    #[inline]
    pub fn end(&self) -> Vec2 {
        *self.points().last().unwrap()
    }

    #[inline]
    pub fn is_linear(&self) -> bool {
        matches!(self, Edge::Linear { .. })
    }

    /// Position on the curve at parameter `t` in [0, 1].
    pub fn point(&self, t: f32) -> Vec2 {
        match self {
            Edge::Linear { points: p, .. } => Vec2::lerp(t, p[0], p[1]),
            Edge::Quadratic { points: p, .. } => {
                let p12 = Vec2::lerp(t, p[0], p[1]);
                let p23 = Vec2::lerp(t, p[1], p[2]);
                Vec2::lerp(t, p12, p23)
            }
            Edge::Cubic { points: p, .. } => {
                let p12 = Vec2::lerp(t, p[0], p[1]);
                let p23 = Vec2::lerp(t, p[1], p[2]);
                let p34 = Vec2::lerp(t, p[2], p[3]);
                let p123 = Vec2::lerp(t, p12, p23);
                let p234 = Vec2::lerp(t, p23, p34);
                Vec2::lerp(t, p123, p234)
            }
        }
    }

    /// Tangent at parameter `t`, with fallbacks where a degenerate control
    /// point collapses the derivative at an endpoint.
    pub fn direction(&self, t: f32) -> Vec2 {
        match self {
            Edge::Linear { points: p, .. } => p[1] - p[0],
            Edge::Quadratic { points: p, .. } => {
                let tangent = Vec2::lerp(t, p[1] - p[0], p[2] - p[1]);
                if tangent.dot(tangent) == 0.0 {
                    return p[2] - p[0];
                }
                tangent
            }
            Edge::Cubic { points: p, .. } => {
                let tangent = Vec2::lerp(
                    t,
                    Vec2::lerp(t, p[1] - p[0], p[2] - p[1]),
                    Vec2::lerp(t, p[2] - p[1], p[3] - p[2]),
                );
                if tangent.dot(tangent) == 0.0 {
                    if t == 0.0 {
                        return p[2] - p[0];
                    }
                    if t == 1.0 {
                        return p[3] - p[1];
                    }
                }
                tangent
            }
        }
    }

    pub(crate) fn scale_and_offset(&mut self, factor: f32, offset: Vec2) {
        for p in self.points_mut() {
            *p = factor * *p + offset;
        }
    }

    /// Minimum signed distance from `origin` to the edge, plus the curve
    /// parameter of the nearest point. The parameter may fall outside
    /// [0, 1] when an endpoint is nearest.
    pub fn signed_distance(&self, origin: Vec2) -> (SignedDistance, f32) {
        match self {
            Edge::Linear { points: p, .. } => {
                let aq = origin - p[0];
                let ab = p[1] - p[0];
                let param = aq.dot(ab) / ab.dot(ab);
                let eq = (if param > 0.5 { p[1] } else { p[0] }) - origin;
                let endpoint_distance = eq.length();
                if param > 0.0 && param < 1.0 {
                    let ortho_distance = ab.orthonormal().dot(aq);
                    if ortho_distance.abs() < endpoint_distance {
                        return (SignedDistance::new(ortho_distance, 0.0), param);
                    }
                }
                (
                    SignedDistance::new(
                        non_zero_sign(aq.cross(eq)) * endpoint_distance,
                        ab.normalized().dot(eq.normalized()).abs(),
                    ),
                    param,
                )
            }
            Edge::Quadratic { points: p, .. } => {
                let qa = p[0] - origin;
                let ab = p[1] - p[0];
                let br = p[2] - p[1] - ab;
                let mut t = [0.0f64; 3];
                let solutions = solve_cubic(
                    &mut t,
                    br.dot(br) as f64,
                    (3.0 * ab.dot(br)) as f64,
                    (2.0 * ab.dot(ab) + qa.dot(br)) as f64,
                    qa.dot(ab) as f64,
                );

                let mut ep_dir = self.direction(0.0);
                let mut min_distance = non_zero_sign(ep_dir.cross(qa)) * qa.length();
                let mut param = -qa.dot(ep_dir) / ep_dir.dot(ep_dir);
                {
                    ep_dir = self.direction(1.0);
                    let distance = (p[2] - origin).length();
                    if distance < min_distance.abs() {
                        min_distance = non_zero_sign(ep_dir.cross(p[2] - origin)) * distance;
                        param = (origin - p[1]).dot(ep_dir) / ep_dir.dot(ep_dir);
                    }
                }
                for i in 0..solutions.max(0) as usize {
                    let ti = t[i] as f32;
                    if ti > 0.0 && ti < 1.0 {
                        let qe = qa + 2.0 * ti * ab + ti * ti * br;
                        let distance = qe.length();
                        if distance <= min_distance.abs() {
                            min_distance = non_zero_sign((ab + ti * br).cross(qe)) * distance;
                            param = ti;
                        }
                    }
                }

                if (0.0..=1.0).contains(&param) {
                    (SignedDistance::new(min_distance, 0.0), param)
                } else if param < 0.5 {
                    (
                        SignedDistance::new(
                            min_distance,
                            self.direction(0.0).normalized().dot(qa.normalized()).abs(),
                        ),
                        param,
                    )
                } else {
                    (
                        SignedDistance::new(
                            min_distance,
                            self.direction(1.0)
                                .normalized()
                                .dot((p[2] - origin).normalized())
                                .abs(),
                        ),
                        param,
                    )
                }
            }
            Edge::Cubic { points: p, .. } => {
                let qa = p[0] - origin;
                let ab = p[1] - p[0];
                let br = p[2] - p[1] - ab;
                let cs = (p[3] - p[2]) - (p[2] - p[1]) - br;

                let mut ep_dir = self.direction(0.0);
                let mut min_distance = non_zero_sign(ep_dir.cross(qa)) * qa.length();
                let mut param = -qa.dot(ep_dir) / ep_dir.dot(ep_dir);
                {
                    ep_dir = self.direction(1.0);
                    let distance = (p[3] - origin).length();
                    if distance < min_distance.abs() {
                        min_distance = non_zero_sign(ep_dir.cross(p[3] - origin)) * distance;
                        param = (ep_dir - (p[3] - origin)).dot(ep_dir) / ep_dir.dot(ep_dir);
                    }
                }
                // Iterative refinement from a few evenly spaced starts.
                for i in 0..=CUBIC_SEARCH_STARTS {
                    let mut t = i as f32 / CUBIC_SEARCH_STARTS as f32;
                    let mut qe = qa + 3.0 * t * ab + 3.0 * t * t * br + t * t * t * cs;
                    for _ in 0..CUBIC_SEARCH_STEPS {
                        let d1 = 3.0 * ab + 6.0 * t * br + 3.0 * t * t * cs;
                        let d2 = 6.0 * br + 6.0 * t * cs;
                        t -= qe.dot(d1) / (d1.dot(d1) + qe.dot(d2));
                        if t <= 0.0 || t >= 1.0 {
                            break;
                        }
                        qe = qa + 3.0 * t * ab + 3.0 * t * t * br + t * t * t * cs;
                        let distance = qe.length();
                        if distance < min_distance.abs() {
                            min_distance = non_zero_sign(d1.cross(qe)) * distance;
                            param = t;
                        }
                    }
                }

                if (0.0..=1.0).contains(&param) {
                    (SignedDistance::new(min_distance, 0.0), param)
                } else if param < 0.5 {
                    (
                        SignedDistance::new(
                            min_distance,
                            self.direction(0.0).normalized().dot(qa.normalized()).abs(),
                        ),
                        param,
                    )
                } else {
                    (
                        SignedDistance::new(
                            min_distance,
                            self.direction(1.0)
                                .normalized()
                                .dot((p[3] - origin).normalized())
                                .abs(),
                        ),
                        param,
                    )
                }
            }
        }
    }

    /// Extends the distance field linearly past an endpoint when the nearest
    /// parameter fell outside the edge's perpendicular domain.
    pub fn distance_to_pseudo_distance(
        &self,
        distance: &mut SignedDistance,
        origin: Vec2,
        param: f32,
    ) {
        if param < 0.0 {
            let dir = self.direction(0.0).normalized();
            let aq = origin - self.start();
            let ts = aq.dot(dir);
            if ts < 0.0 {
                let pseudo_distance = aq.cross(dir);
                if pseudo_distance.abs() <= distance.distance.abs() {
                    distance.distance = pseudo_distance;
                    distance.dot = 0.0;
                }
            }
        } else if param > 1.0 {
            let dir = self.direction(1.0).normalized();
            let bq = origin - self.end();
            let ts = bq.dot(dir);
            if ts > 0.0 {
                let pseudo_distance = bq.cross(dir);
                if pseudo_distance.abs() <= distance.distance.abs() {
                    distance.distance = pseudo_distance;
                    distance.dot = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_hits_endpoints() {
        let e = Edge::cubic(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(3.0, 2.0),
            Vec2::new(4.0, 0.0),
            EdgeColor::WHITE,
        );
        assert_eq!(e.point(0.0), e.start());
        assert_eq!(e.point(1.0), e.end());
    }

    #[test]
    fn test_linear_signed_distance() {
        let e = Edge::line(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0), EdgeColor::WHITE);
        // Right of the travel direction is positive.
        let (d, param) = e.signed_distance(Vec2::new(1.0, 1.0));
        assert!((d.distance + 1.0).abs() < 1e-6);
        assert!((param - 0.5).abs() < 1e-6);
        let (d, _) = e.signed_distance(Vec2::new(1.0, -2.0));
        assert!((d.distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_point_on_edge_has_zero_distance() {
        let e = Edge::quadratic(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(2.0, 0.0),
            EdgeColor::WHITE,
        );
        let on_curve = e.point(0.37);
        let (d, _) = e.signed_distance(on_curve);
        assert!(d.distance.abs() < 1e-3);
    }

    #[test]
    fn test_signed_distance_matches_sampled_minimum() {
        let e = Edge::cubic(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.5, 1.5),
            Vec2::new(1.5, 1.5),
            Vec2::new(2.0, 0.0),
            EdgeColor::WHITE,
        );
        let origin = Vec2::new(0.8, 0.3);
        let (d, _) = e.signed_distance(origin);
        let mut sampled = f32::MAX;
        for i in 0..=1000 {
            let t = i as f32 / 1000.0;
            sampled = sampled.min(origin.distance(e.point(t)));
        }
        assert!((d.distance.abs() - sampled).abs() < 1e-3);
    }

    #[test]
    fn test_pseudo_distance_extends_past_endpoint() {
        let e = Edge::line(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0), EdgeColor::WHITE);
        // Beyond the end, offset upward. True distance goes to the corner,
        // pseudo distance to the extended line.
        let origin = Vec2::new(3.0, 1.0);
        let (mut d, param) = e.signed_distance(origin);
        assert!(param > 1.0);
        assert!(d.distance.abs() > 1.0);
        e.distance_to_pseudo_distance(&mut d, origin, param);
        assert!((d.distance + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_direction_degenerate_control_fallback() {
        let e = Edge::quadratic(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            EdgeColor::WHITE,
        );
        let dir = e.direction(0.0);
        assert!(dir.dot(dir) > 0.0);
    }
}
