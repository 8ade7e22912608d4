use crate::contour::*;
use crate::error::*;
use crate::geom::*;
use crate::shape::*;
use crate::sweep::*;

/// Triangulates the filled area of every outline in `shape`, respecting
/// holes. Returns a flat point list in consecutive triples, with the second
/// and third vertex of each triple swapped relative to the sweep's internal
/// winding; the consuming renderer keys its front faces to that order.
pub fn triangulate(shape: &Shape) -> GeometryResult<Vec<Vec2>> {
    if let Some(contour) = shape.first_open_contour() {
        return Err(GeometryError::OpenContour { contour });
    }
    let resolution = EdgeResolution::default();

    // Flatten and classify. Winding 0 contours and loops that trim below
    // three points are dropped, not errors.
    let mut outlines: Vec<(usize, Vec<Vec2>)> = Vec::new();
    let mut holes: Vec<(usize, Vec<Vec2>)> = Vec::new();
    for (index, contour) in shape.contours().iter().enumerate() {
        let mut ring = contour.edge_points(resolution);
        trim_ring(&mut ring);
        if ring.len() < 3 {
            log::debug!("contour {} flattens to {} points, skipped", index, ring.len());
            continue;
        }
        match contour.winding() {
            w if w < 0 => outlines.push((index, ring)),
            w if w > 0 => holes.push((index, ring)),
            _ => log::debug!("contour {} has zero winding, skipped", index),
        }
    }

    // Group holes into per-outline slots, sized now that the outline count
    // is known. A hole belongs to the first outline that fully contains it.
    let mut hole_slots: Vec<Vec<usize>> = vec![Vec::new(); outlines.len()];
    for (hole_index, &(hole_contour, _)) in holes.iter().enumerate() {
        let mut assigned = false;
        for (slot, &(outline_contour, _)) in outlines.iter().enumerate() {
            let containment = shape.contours()[outline_contour]
                .contains_contour(&shape.contours()[hole_contour], resolution);
            if containment == Containment::Contains {
                hole_slots[slot].push(hole_index);
                assigned = true;
                break;
            }
        }
        if !assigned {
            log::debug!("hole contour {} fits no outline, skipped", hole_contour);
        }
    }

    let mut points = Vec::new();
    for (slot, (_, outline)) in outlines.iter().enumerate() {
        let mut context = SweepContext::new(outline)?;
        for &hole_index in &hole_slots[slot] {
            context.add_hole(&holes[hole_index].1)?;
        }
        context.triangulate()?;
        for triangle in context.triangle_points() {
            points.push(triangle[0]);
            points.push(triangle[2]);
            points.push(triangle[1]);
        }
    }
    Ok(points)
}

/// Drops a duplicated closing point and coincident consecutive points from
/// a flattened ring.
fn trim_ring(ring: &mut Vec<Vec2>) {
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::*;

    fn shape_from_rings(rings: &[&[(f32, f32)]]) -> Shape {
        let mut shape = Shape::new();
        for ring in rings {
            let mut contour = Contour::new();
            for i in 0..ring.len() {
                let a = ring[i];
                let b = ring[(i + 1) % ring.len()];
                contour.push(Edge::line(
                    Vec2::new(a.0, a.1),
                    Vec2::new(b.0, b.1),
                    EdgeColor::WHITE,
                ));
            }
            shape.push(contour);
        }
        shape
    }

    fn triangle_area_sum(points: &[Vec2]) -> f32 {
        points
            .chunks(3)
            .map(|t| 0.5 * ((t[1] - t[0]).cross(t[2] - t[0])).abs())
            .sum()
    }

    #[test]
    fn test_square_outline_area() {
        // Clockwise ring, winding -1, classified as an outline.
        let shape = shape_from_rings(&[&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]]);
        let points = triangulate(&shape).unwrap();
        assert_eq!(points.len(), 6);
        assert!((triangle_area_sum(&points) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_output_winding_is_reversed() {
        let shape = shape_from_rings(&[&[(0.0, 0.0), (0.0, 1.0), (2.0, 1.0), (2.0, 0.0)]]);
        let points = triangulate(&shape).unwrap();
        // The sweep builds counterclockwise triangles; the public output
        // must come out clockwise.
        for t in points.chunks(3) {
            assert!((t[1] - t[0]).cross(t[2] - t[0]) < 0.0);
        }
    }

    #[test]
    fn test_square_with_hole_area() {
        let shape = shape_from_rings(&[
            // outline: clockwise
            &[(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (4.0, 0.0)],
            // hole: counterclockwise
            &[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0)],
        ]);
        let points = triangulate(&shape).unwrap();
        assert!((triangle_area_sum(&points) - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_hole_outside_outline_is_ignored() {
        let shape = shape_from_rings(&[
            &[(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (4.0, 0.0)],
            // counterclockwise ring far away from the outline
            &[(10.0, 10.0), (11.0, 10.0), (11.0, 11.0), (10.0, 11.0)],
        ]);
        let points = triangulate(&shape).unwrap();
        assert!((triangle_area_sum(&points) - 16.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_contour_is_skipped() {
        let mut shape = shape_from_rings(&[&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]]);
        let mut flat = Contour::new();
        flat.push(Edge::line(
            Vec2::new(5.0, 5.0),
            Vec2::new(6.0, 5.0),
            EdgeColor::WHITE,
        ));
        flat.push(Edge::line(
            Vec2::new(6.0, 5.0),
            Vec2::new(5.0, 5.0),
            EdgeColor::WHITE,
        ));
        shape.push(flat);
        let points = triangulate(&shape).unwrap();
        assert!((triangle_area_sum(&points) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_open_contour_is_rejected() {
        let mut contour = Contour::new();
        contour.push(Edge::line(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            EdgeColor::WHITE,
        ));
        contour.push(Edge::line(
            Vec2::new(0.5, 1.0),
            Vec2::new(0.0, 0.0),
            EdgeColor::WHITE,
        ));
        let mut shape = Shape::new();
        shape.push(contour);
        assert!(matches!(
            triangulate(&shape),
            Err(GeometryError::OpenContour { contour: 0 })
        ));
    }

    #[test]
    fn test_two_outlines_bake_separately() {
        let shape = shape_from_rings(&[
            &[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)],
            &[(3.0, 0.0), (3.0, 2.0), (5.0, 2.0), (5.0, 0.0)],
        ]);
        let points = triangulate(&shape).unwrap();
        assert!((triangle_area_sum(&points) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_curved_outline_area_within_tolerance() {
        // A clockwise loop with one quadratic edge, flattened at the
        // default resolution for both winding and sweep seeding.
        let mut contour = Contour::new();
        contour.push(Edge::line(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            EdgeColor::WHITE,
        ));
        contour.push(Edge::line(
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            EdgeColor::WHITE,
        ));
        contour.push(Edge::quadratic(
            Vec2::new(1.0, 1.0),
            Vec2::new(1.2, 0.5),
            Vec2::new(1.0, 0.0),
            EdgeColor::WHITE,
        ));
        contour.push(Edge::line(
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
            EdgeColor::WHITE,
        ));
        let mut shape = Shape::new();
        shape.push(contour);
        assert_eq!(shape.contours()[0].winding(), -1);
        let points = triangulate(&shape).unwrap();
        // Unit square plus the sampled quadratic midpoint bulge at (1.1, 0.5).
        assert!((triangle_area_sum(&points) - 1.05).abs() < 1e-4);
    }
}
