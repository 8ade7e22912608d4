use crate::contour::*;
use crate::edge::*;
use crate::geom::*;

/// One glyph's outline: an ordered list of closed contours. Built once from
/// the font extraction stage, optionally transformed into atlas placement,
/// then read-only for triangulation and distance-field baking.
#[derive(Clone, Debug, Default)]
pub struct Shape {
    contours: Vec<Contour>,
}

impl Shape {
    pub fn new() -> Shape {
        Shape {
            contours: Vec::new(),
        }
    }

    /// Builds a single-contour shape from an ordered point loop with
    /// implicit linear edges.
    pub fn from_points(points: &[Vec2], color: EdgeColor) -> Shape {
        let mut contour = Contour::new();
        for i in 0..points.len() {
            contour.push(Edge::line(points[i], points[(i + 1) % points.len()], color));
        }
        let mut shape = Shape::new();
        shape.push(contour);
        shape
    }

    pub fn push(&mut self, contour: Contour) -> &mut Shape {
        self.contours.push(contour);
        self
    }

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// Confirms every contour's edges form a closed loop, wrap-around
    /// included. A broken loop must be rejected before triangulation or
    /// distance-field generation.
    pub fn validate(&self) -> bool {
        self.first_open_contour().is_none()
    }

    pub(crate) fn first_open_contour(&self) -> Option<usize> {
        for (index, contour) in self.contours.iter().enumerate() {
            if let Some(last) = contour.edges().last() {
                let mut corner = last.end();
                for edge in contour.edges() {
                    if edge.start() != corner {
                        return Some(index);
                    }
                    corner = edge.end();
                }
            }
        }
        None
    }

    pub fn scale(&mut self, factor: f32) {
        self.scale_and_offset(factor, Vec2::new(0.0, 0.0));
    }

    pub fn offset(&mut self, offset: Vec2) {
        self.scale_and_offset(1.0, offset);
    }

    /// Applies `p * factor + offset` to every control point of every edge.
    pub fn scale_and_offset(&mut self, factor: f32, offset: Vec2) {
        for contour in &mut self.contours {
            for edge in contour.edges_mut() {
                edge.scale_and_offset(factor, offset);
            }
        }
    }

    /// Control-point bounds over all contours, or None for an empty shape.
    /// Curve control points make this conservative for curved outlines.
    pub fn bounds(&self) -> Option<(Vec2, Vec2)> {
        let mut bounds: Option<(Vec2, Vec2)> = None;
        for contour in &self.contours {
            for edge in contour.edges() {
                for &point in edge.points() {
                    bounds = Some(match bounds {
                        Some((lo, hi)) => (lo.min(point), hi.max(point)),
                        None => (point, point),
                    });
                }
            }
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Shape {
        Shape::from_points(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            EdgeColor::WHITE,
        )
    }

    #[test]
    fn test_validate_closed_loop() {
        assert!(unit_square().validate());
    }

    #[test]
    fn test_validate_rejects_open_contour() {
        let mut contour = Contour::new();
        contour.push(Edge::line(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            EdgeColor::WHITE,
        ));
        contour.push(Edge::line(
            Vec2::new(1.0, 0.5),
            Vec2::new(0.0, 0.0),
            EdgeColor::WHITE,
        ));
        let mut shape = Shape::new();
        shape.push(contour);
        assert!(!shape.validate());
    }

    #[test]
    fn test_offset_round_trip() {
        let mut shape = unit_square();
        let original: Vec<Vec2> = shape.contours()[0]
            .edges()
            .iter()
            .flat_map(|e| e.points().to_vec())
            .collect();
        let v = Vec2::new(17.25, -3.5);
        shape.offset(v);
        shape.offset(-v);
        let restored: Vec<Vec2> = shape.contours()[0]
            .edges()
            .iter()
            .flat_map(|e| e.points().to_vec())
            .collect();
        for (a, b) in original.iter().zip(restored.iter()) {
            assert!((a.x - b.x).abs() < 1e-5);
            assert!((a.y - b.y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_scale_and_offset_places_atlas_cell() {
        let mut shape = unit_square();
        shape.scale_and_offset(2.0, Vec2::new(10.0, 20.0));
        let (lo, hi) = shape.bounds().unwrap();
        assert_eq!(lo, Vec2::new(10.0, 20.0));
        assert_eq!(hi, Vec2::new(12.0, 22.0));
    }

    #[test]
    fn test_bounds_of_empty_shape() {
        assert!(Shape::new().bounds().is_none());
    }
}
