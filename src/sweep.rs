use std::f64::consts::PI;

use crate::error::*;
use crate::geom::Vec2;

/* Constrained sweep-line triangulation over one outline ring plus its hole
rings. Points are processed bottom to top; an advancing front of the filled
region is kept as a doubly linked node list, new triangles are legalized by
incircle edge flips, and constrained (ring) edges are recovered by edge
events with flip scans. Predicates run in f64; the f32 input only converts
at the boundary.

Everything is stored in index arenas (points, constraint edges, triangles,
front nodes) so the hot path never chases heap pointers. Unlinked front
nodes keep their stale links, which in-flight traversals rely on. */

const EPSILON: f64 = 1e-12;
const ALPHA: f64 = 0.3;
const BASIN_ANGLE_LIMIT: f64 = 3.0 * PI / 4.0;
const HALF_PI: f64 = PI / 2.0;

type PointId = usize;
type EdgeId = usize;
type TriId = usize;
type NodeId = usize;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Orientation {
    Cw,
    Ccw,
    Collinear,
}

fn orient2d(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Orientation {
    let det = (a.0 - c.0) * (b.1 - c.1) - (a.1 - c.1) * (b.0 - c.0);
    if det > -EPSILON && det < EPSILON {
        Orientation::Collinear
    } else if det > 0.0 {
        Orientation::Ccw
    } else {
        Orientation::Cw
    }
}

fn in_scan_area(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> bool {
    let oadb = (a.0 - b.0) * (d.1 - b.1) - (d.0 - b.0) * (a.1 - b.1);
    if oadb >= -EPSILON {
        return false;
    }
    let oadc = (a.0 - c.0) * (d.1 - c.1) - (d.0 - c.0) * (a.1 - c.1);
    if oadc <= EPSILON {
        return false;
    }
    true
}

fn in_circle(pa: (f64, f64), pb: (f64, f64), pc: (f64, f64), pd: (f64, f64)) -> bool {
    let adx = pa.0 - pd.0;
    let ady = pa.1 - pd.1;
    let bdx = pb.0 - pd.0;
    let bdy = pb.1 - pd.1;
    let oabd = adx * bdy - bdx * ady;
    if oabd <= 0.0 {
        return false;
    }
    let cdx = pc.0 - pd.0;
    let cdy = pc.1 - pd.1;
    let ocad = cdx * ady - adx * cdy;
    if ocad <= 0.0 {
        return false;
    }
    let bdxcdy = bdx * cdy;
    let cdxbdy = cdx * bdy;
    let alift = adx * adx + ady * ady;
    let blift = bdx * bdx + bdy * bdy;
    let clift = cdx * cdx + cdy * cdy;
    let det = alift * (bdxcdy - cdxbdy) + blift * ocad + clift * oabd;
    det > 0.0
}

struct SweepPoint {
    x: f64,
    y: f64,
    edges: Vec<EdgeId>,
}

/// Ring constraint, ordered so `q` is the upper endpoint. The edge fires as
/// an event when the sweep reaches `q`.
struct ConstraintEdge {
    p: PointId,
    q: PointId,
}

struct Triangle {
    points: [PointId; 3],
    neighbors: [Option<TriId>; 3],
    constrained: [bool; 3],
    delaunay: [bool; 3],
    interior: bool,
}

impl Triangle {
    fn new(a: PointId, b: PointId, c: PointId) -> Triangle {
        Triangle {
            points: [a, b, c],
            neighbors: [None; 3],
            constrained: [false; 3],
            delaunay: [false; 3],
            interior: false,
        }
    }

    fn index_of(&self, p: PointId) -> usize {
        if self.points[0] == p {
            0
        } else if self.points[1] == p {
            1
        } else {
            debug_assert_eq!(self.points[2], p);
            2
        }
    }

    fn contains(&self, p: PointId) -> bool {
        self.points.contains(&p)
    }

    /// Index of the edge between `p1` and `p2`; edge i is opposite point i.
    fn edge_index(&self, p1: PointId, p2: PointId) -> Option<usize> {
        for i in 0..3 {
            let a = self.points[(i + 1) % 3];
            let b = self.points[(i + 2) % 3];
            if (a == p1 && b == p2) || (a == p2 && b == p1) {
                return Some(i);
            }
        }
        None
    }

    fn point_cw(&self, p: PointId) -> PointId {
        self.points[(self.index_of(p) + 2) % 3]
    }

    fn point_ccw(&self, p: PointId) -> PointId {
        self.points[(self.index_of(p) + 1) % 3]
    }

    fn neighbor_across(&self, p: PointId) -> Option<TriId> {
        self.neighbors[self.index_of(p)]
    }

    fn neighbor_cw(&self, p: PointId) -> Option<TriId> {
        self.neighbors[(self.index_of(p) + 1) % 3]
    }

    fn neighbor_ccw(&self, p: PointId) -> Option<TriId> {
        self.neighbors[(self.index_of(p) + 2) % 3]
    }

    fn constrained_cw(&self, p: PointId) -> bool {
        self.constrained[(self.index_of(p) + 1) % 3]
    }

    fn constrained_ccw(&self, p: PointId) -> bool {
        self.constrained[(self.index_of(p) + 2) % 3]
    }

    fn set_constrained_cw(&mut self, p: PointId, value: bool) {
        self.constrained[(self.index_of(p) + 1) % 3] = value;
    }

    fn set_constrained_ccw(&mut self, p: PointId, value: bool) {
        self.constrained[(self.index_of(p) + 2) % 3] = value;
    }

    fn delaunay_cw(&self, p: PointId) -> bool {
        self.delaunay[(self.index_of(p) + 1) % 3]
    }

    fn delaunay_ccw(&self, p: PointId) -> bool {
        self.delaunay[(self.index_of(p) + 2) % 3]
    }

    fn set_delaunay_cw(&mut self, p: PointId, value: bool) {
        self.delaunay[(self.index_of(p) + 1) % 3] = value;
    }

    fn set_delaunay_ccw(&mut self, p: PointId, value: bool) {
        self.delaunay[(self.index_of(p) + 2) % 3] = value;
    }

    fn mark_constrained_points(&mut self, p: PointId, q: PointId) {
        if let Some(i) = self.edge_index(p, q) {
            self.constrained[i] = true;
        }
    }

    /// Rotates the triangle clockwise around `opoint`, replacing the third
    /// point with `npoint`. One half of an edge flip.
    fn rotate(&mut self, opoint: PointId, npoint: PointId) {
        if opoint == self.points[0] {
            self.points[1] = self.points[0];
            self.points[0] = self.points[2];
            self.points[2] = npoint;
        } else if opoint == self.points[1] {
            self.points[2] = self.points[1];
            self.points[1] = self.points[0];
            self.points[0] = npoint;
        } else {
            self.points[0] = self.points[2];
            self.points[2] = self.points[1];
            self.points[1] = npoint;
        }
    }
}

struct Node {
    point: PointId,
    triangle: Option<TriId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Default)]
struct Basin {
    left_node: NodeId,
    right_node: NodeId,
    width: f64,
    left_highest: bool,
}

#[derive(Default)]
struct EdgeEventState {
    edge: EdgeId,
    right: bool,
}

/// Triangulation state for one outline and its holes.
pub struct SweepContext {
    points: Vec<SweepPoint>,
    edges: Vec<ConstraintEdge>,
    triangles: Vec<Triangle>,
    nodes: Vec<Node>,
    sorted: Vec<PointId>,
    head: PointId,
    tail: PointId,
    front_head: NodeId,
    front_tail: NodeId,
    search_node: NodeId,
    basin: Basin,
    edge_event: EdgeEventState,
}

impl SweepContext {
    /// Seeds the context with the outline ring. The ring must hold at least
    /// three points and no coincident consecutive points.
    pub fn new(polyline: &[Vec2]) -> GeometryResult<SweepContext> {
        let mut context = SweepContext {
            points: Vec::with_capacity(polyline.len() + 2),
            edges: Vec::with_capacity(polyline.len()),
            triangles: Vec::new(),
            nodes: Vec::new(),
            sorted: Vec::new(),
            head: 0,
            tail: 0,
            front_head: 0,
            front_tail: 0,
            search_node: 0,
            basin: Basin::default(),
            edge_event: EdgeEventState::default(),
        };
        if polyline.len() < 3 {
            return Err(GeometryError::SweepFailed {
                message: format!("outline ring has {} points", polyline.len()),
            });
        }
        context.add_ring(polyline)?;
        Ok(context)
    }

    /// Adds a hole ring as interior constraints.
    pub fn add_hole(&mut self, polyline: &[Vec2]) -> GeometryResult<()> {
        if polyline.len() < 3 {
            return Err(GeometryError::SweepFailed {
                message: format!("hole ring has {} points", polyline.len()),
            });
        }
        self.add_ring(polyline)
    }

    fn add_ring(&mut self, polyline: &[Vec2]) -> GeometryResult<()> {
        let first = self.points.len();
        for point in polyline {
            self.points.push(SweepPoint {
                x: point.x as f64,
                y: point.y as f64,
                edges: Vec::new(),
            });
        }
        for i in 0..polyline.len() {
            let a = first + i;
            let b = first + (i + 1) % polyline.len();
            self.init_edge(a, b)?;
        }
        Ok(())
    }

    fn init_edge(&mut self, a: PointId, b: PointId) -> GeometryResult<()> {
        let (ax, ay) = self.coords(a);
        let (bx, by) = self.coords(b);
        let (p, q) = if ay > by || (ay == by && ax > bx) {
            (b, a)
        } else if ax == bx && ay == by {
            return Err(GeometryError::DuplicatePoint {
                x: ax as f32,
                y: ay as f32,
            });
        } else {
            (a, b)
        };
        let id = self.edges.len();
        self.edges.push(ConstraintEdge { p, q });
        self.points[q].edges.push(id);
        Ok(())
    }

    /// Runs the sweep. Triangles are queried afterwards with
    /// `triangle_points`.
    pub fn triangulate(&mut self) -> GeometryResult<()> {
        self.init_triangulation();
        self.create_advancing_front();
        for i in 1..self.sorted.len() {
            let point = self.sorted[i];
            let node = self.point_event(point);
            let events = self.points[point].edges.clone();
            for edge in events {
                self.edge_event_start(edge, node)?;
            }
        }
        self.finalize();
        Ok(())
    }

    /// Interior triangles, in the sweep's own (counterclockwise) winding.
    pub fn triangle_points(&self) -> Vec<[Vec2; 3]> {
        let mut result = Vec::new();
        for triangle in &self.triangles {
            if triangle.interior {
                let [a, b, c] = triangle.points;
                result.push([self.vec2(a), self.vec2(b), self.vec2(c)]);
            }
        }
        result
    }

    #[inline]
    fn coords(&self, p: PointId) -> (f64, f64) {
        (self.points[p].x, self.points[p].y)
    }

    #[inline]
    fn vec2(&self, p: PointId) -> Vec2 {
        Vec2::new(self.points[p].x as f32, self.points[p].y as f32)
    }

    fn init_triangulation(&mut self) {
        let real = self.points.len();
        let (mut xmin, mut ymin) = self.coords(0);
        let (mut xmax, mut ymax) = (xmin, ymin);
        for point in &self.points {
            xmin = xmin.min(point.x);
            xmax = xmax.max(point.x);
            ymin = ymin.min(point.y);
            ymax = ymax.max(point.y);
        }
        let dx = ALPHA * (xmax - xmin);
        let dy = ALPHA * (ymax - ymin);
        self.head = self.points.len();
        self.points.push(SweepPoint {
            x: xmax + dx,
            y: ymin - dy,
            edges: Vec::new(),
        });
        self.tail = self.points.len();
        self.points.push(SweepPoint {
            x: xmin - dx,
            y: ymin - dy,
            edges: Vec::new(),
        });
        self.sorted = (0..real).collect();
        let points = &self.points;
        self.sorted.sort_by(|&a, &b| {
            (points[a].y, points[a].x)
                .partial_cmp(&(points[b].y, points[b].x))
                .unwrap()
        });
    }

    fn create_advancing_front(&mut self) {
        let first = self.sorted[0];
        let triangle = self.new_triangle(first, self.tail, self.head);
        self.front_head = self.new_node(self.tail, Some(triangle));
        let middle = self.new_node(first, Some(triangle));
        self.front_tail = self.new_node(self.head, None);
        self.nodes[self.front_head].next = Some(middle);
        self.nodes[middle].prev = Some(self.front_head);
        self.nodes[middle].next = Some(self.front_tail);
        self.nodes[self.front_tail].prev = Some(middle);
        self.search_node = self.front_head;
    }

    fn new_triangle(&mut self, a: PointId, b: PointId, c: PointId) -> TriId {
        self.triangles.push(Triangle::new(a, b, c));
        self.triangles.len() - 1
    }

    fn new_node(&mut self, point: PointId, triangle: Option<TriId>) -> NodeId {
        self.nodes.push(Node {
            point,
            triangle,
            prev: None,
            next: None,
        });
        self.nodes.len() - 1
    }

    fn mark_neighbor_pair(&mut self, t: TriId, ot: TriId) {
        for i in 0..3 {
            let a = self.triangles[t].points[(i + 1) % 3];
            let b = self.triangles[t].points[(i + 2) % 3];
            if let Some(oi) = self.triangles[ot].edge_index(a, b) {
                self.triangles[t].neighbors[i] = Some(ot);
                self.triangles[ot].neighbors[oi] = Some(t);
                return;
            }
        }
    }

    fn opposite_point(&self, ot: TriId, t: TriId, p: PointId) -> PointId {
        let cw = self.triangles[t].point_cw(p);
        self.triangles[ot].point_cw(cw)
    }

    fn node_x(&self, node: NodeId) -> f64 {
        self.points[self.nodes[node].point].x
    }

    fn node_y(&self, node: NodeId) -> f64 {
        self.points[self.nodes[node].point].y
    }

    fn locate_node(&mut self, x: f64) -> NodeId {
        let mut node = self.search_node;
        if x < self.node_x(node) {
            while let Some(prev) = self.nodes[node].prev {
                node = prev;
                if x >= self.node_x(node) {
                    self.search_node = node;
                    return node;
                }
            }
            self.search_node = self.front_head;
            self.front_head
        } else {
            while let Some(next) = self.nodes[node].next {
                node = next;
                if x < self.node_x(node) {
                    let found = self.nodes[node].prev.unwrap();
                    self.search_node = found;
                    return found;
                }
            }
            // Degenerate input can push x onto the artificial head.
            let found = self.nodes[self.front_tail].prev.unwrap();
            self.search_node = found;
            found
        }
    }

    fn locate_point(&mut self, point: PointId) -> Option<NodeId> {
        let px = self.points[point].x;
        let mut node = self.search_node;
        let nx = self.node_x(node);
        if px == nx {
            if self.nodes[node].point != point {
                let prev = self.nodes[node].prev;
                let next = self.nodes[node].next;
                if prev.map(|n| self.nodes[n].point) == Some(point) {
                    node = prev.unwrap();
                } else if next.map(|n| self.nodes[n].point) == Some(point) {
                    node = next.unwrap();
                } else {
                    return None;
                }
            }
        } else if px < nx {
            loop {
                match self.nodes[node].prev {
                    Some(prev) => {
                        node = prev;
                        if self.nodes[node].point == point {
                            break;
                        }
                    }
                    None => return None,
                }
            }
        } else {
            loop {
                match self.nodes[node].next {
                    Some(next) => {
                        node = next;
                        if self.nodes[node].point == point {
                            break;
                        }
                    }
                    None => return None,
                }
            }
        }
        self.search_node = node;
        Some(node)
    }

    fn map_triangle_to_nodes(&mut self, t: TriId) {
        for i in 0..3 {
            if self.triangles[t].neighbors[i].is_none() {
                let point = self.triangles[t].point_cw(self.triangles[t].points[i]);
                if let Some(node) = self.locate_point(point) {
                    self.nodes[node].triangle = Some(t);
                }
            }
        }
    }

    fn point_event(&mut self, point: PointId) -> NodeId {
        let node = self.locate_node(self.points[point].x);
        let new_node = self.new_front_triangle(point, node);
        // Equal-x points stack on the front; fill the shadowed node at once.
        if self.points[point].x <= self.node_x(node) + EPSILON {
            self.fill(node);
        }
        self.fill_advancing_front(new_node);
        new_node
    }

    fn new_front_triangle(&mut self, point: PointId, node: NodeId) -> NodeId {
        let next = self.nodes[node].next.unwrap();
        let triangle = self.new_triangle(point, self.nodes[node].point, self.nodes[next].point);
        if let Some(node_triangle) = self.nodes[node].triangle {
            self.mark_neighbor_pair(triangle, node_triangle);
        }
        let new_node = self.new_node(point, None);
        self.nodes[new_node].next = Some(next);
        self.nodes[new_node].prev = Some(node);
        self.nodes[next].prev = Some(new_node);
        self.nodes[node].next = Some(new_node);
        if !self.legalize(triangle) {
            self.map_triangle_to_nodes(triangle);
        }
        new_node
    }

    fn fill(&mut self, node: NodeId) {
        let prev = self.nodes[node].prev.unwrap();
        let next = self.nodes[node].next.unwrap();
        let triangle = self.new_triangle(
            self.nodes[prev].point,
            self.nodes[node].point,
            self.nodes[next].point,
        );
        if let Some(t) = self.nodes[prev].triangle {
            self.mark_neighbor_pair(triangle, t);
        }
        if let Some(t) = self.nodes[node].triangle {
            self.mark_neighbor_pair(triangle, t);
        }
        // Unlink the node; its own links stay for in-flight traversals.
        self.nodes[prev].next = Some(next);
        self.nodes[next].prev = Some(prev);
        if !self.legalize(triangle) {
            self.map_triangle_to_nodes(triangle);
        }
    }

    fn legalize(&mut self, t: TriId) -> bool {
        for i in 0..3 {
            if self.triangles[t].delaunay[i] {
                continue;
            }
            let ot = match self.triangles[t].neighbors[i] {
                Some(ot) => ot,
                None => continue,
            };
            let p = self.triangles[t].points[i];
            let op = self.opposite_point(ot, t, p);
            let oi = self.triangles[ot].index_of(op);
            // A constrained or already-settled edge never flips.
            if self.triangles[ot].constrained[oi] || self.triangles[ot].delaunay[oi] {
                self.triangles[t].constrained[i] = self.triangles[ot].constrained[oi];
                continue;
            }
            let inside = in_circle(
                self.coords(p),
                self.coords(self.triangles[t].point_ccw(p)),
                self.coords(self.triangles[t].point_cw(p)),
                self.coords(op),
            );
            if inside {
                self.triangles[t].delaunay[i] = true;
                self.triangles[ot].delaunay[oi] = true;
                self.rotate_triangle_pair(t, p, ot, op);
                if !self.legalize(t) {
                    self.map_triangle_to_nodes(t);
                }
                if !self.legalize(ot) {
                    self.map_triangle_to_nodes(ot);
                }
                self.triangles[t].delaunay[i] = false;
                self.triangles[ot].delaunay[oi] = false;
                return true;
            }
        }
        false
    }

    fn rotate_triangle_pair(&mut self, t: TriId, p: PointId, ot: TriId, op: PointId) {
        let n1 = self.triangles[t].neighbor_ccw(p);
        let n2 = self.triangles[t].neighbor_cw(p);
        let n3 = self.triangles[ot].neighbor_ccw(op);
        let n4 = self.triangles[ot].neighbor_cw(op);
        let ce1 = self.triangles[t].constrained_ccw(p);
        let ce2 = self.triangles[t].constrained_cw(p);
        let ce3 = self.triangles[ot].constrained_ccw(op);
        let ce4 = self.triangles[ot].constrained_cw(op);
        let de1 = self.triangles[t].delaunay_ccw(p);
        let de2 = self.triangles[t].delaunay_cw(p);
        let de3 = self.triangles[ot].delaunay_ccw(op);
        let de4 = self.triangles[ot].delaunay_cw(op);

        self.triangles[t].rotate(p, op);
        self.triangles[ot].rotate(op, p);

        self.triangles[ot].set_delaunay_ccw(p, de1);
        self.triangles[t].set_delaunay_cw(p, de2);
        self.triangles[t].set_delaunay_ccw(op, de3);
        self.triangles[ot].set_delaunay_cw(op, de4);
        self.triangles[ot].set_constrained_ccw(p, ce1);
        self.triangles[t].set_constrained_cw(p, ce2);
        self.triangles[t].set_constrained_ccw(op, ce3);
        self.triangles[ot].set_constrained_cw(op, ce4);

        self.triangles[t].neighbors = [None; 3];
        self.triangles[ot].neighbors = [None; 3];
        if let Some(n) = n1 {
            self.mark_neighbor_pair(ot, n);
        }
        if let Some(n) = n2 {
            self.mark_neighbor_pair(t, n);
        }
        if let Some(n) = n3 {
            self.mark_neighbor_pair(t, n);
        }
        if let Some(n) = n4 {
            self.mark_neighbor_pair(ot, n);
        }
        self.mark_neighbor_pair(t, ot);
    }

    fn fill_advancing_front(&mut self, n: NodeId) {
        let mut node = self.nodes[n].next.unwrap();
        while self.nodes[node].next.is_some() {
            if self.large_hole_dont_fill(node) {
                break;
            }
            self.fill(node);
            node = self.nodes[node].next.unwrap();
        }
        let mut node = self.nodes[n].prev.unwrap();
        while self.nodes[node].prev.is_some() {
            if self.large_hole_dont_fill(node) {
                break;
            }
            self.fill(node);
            node = self.nodes[node].prev.unwrap();
        }
        if let Some(next) = self.nodes[n].next {
            if self.nodes[next].next.is_some() && self.basin_angle(n) < BASIN_ANGLE_LIMIT {
                self.fill_basin(n);
            }
        }
    }

    fn angle(&self, origin: NodeId, a: NodeId, b: NodeId) -> f64 {
        let (ox, oy) = self.coords(self.nodes[origin].point);
        let (ax, ay) = self.coords(self.nodes[a].point);
        let (bx, by) = self.coords(self.nodes[b].point);
        let ax = ax - ox;
        let ay = ay - oy;
        let bx = bx - ox;
        let by = by - oy;
        (ax * by - ay * bx).atan2(ax * bx + ay * by)
    }

    fn large_hole_dont_fill(&self, node: NodeId) -> bool {
        let next = self.nodes[node].next.unwrap();
        let prev = self.nodes[node].prev.unwrap();
        let angle = self.angle(node, next, prev);
        if !(angle > HALF_PI || angle < -HALF_PI) {
            return false;
        }
        if let Some(next2) = self.nodes[next].next {
            let angle = self.angle(node, next2, prev);
            if !(angle > HALF_PI || angle < 0.0) {
                return false;
            }
        }
        if let Some(prev2) = self.nodes[prev].prev {
            let angle = self.angle(node, next, prev2);
            if !(angle > HALF_PI || angle < 0.0) {
                return false;
            }
        }
        true
    }

    fn basin_angle(&self, node: NodeId) -> f64 {
        let next2 = self.nodes[self.nodes[node].next.unwrap()].next.unwrap();
        let ax = self.node_x(node) - self.node_x(next2);
        let ay = self.node_y(node) - self.node_y(next2);
        ay.atan2(ax)
    }

    fn orient2d_nodes(&self, a: NodeId, b: NodeId, c: NodeId) -> Orientation {
        orient2d(
            self.coords(self.nodes[a].point),
            self.coords(self.nodes[b].point),
            self.coords(self.nodes[c].point),
        )
    }

    fn orient2d_points(&self, a: PointId, b: PointId, c: PointId) -> Orientation {
        orient2d(self.coords(a), self.coords(b), self.coords(c))
    }

    fn fill_basin(&mut self, node: NodeId) {
        let next = self.nodes[node].next.unwrap();
        let next2 = self.nodes[next].next.unwrap();
        self.basin.left_node = if self.orient2d_nodes(node, next, next2) == Orientation::Ccw {
            next2
        } else {
            next
        };
        let mut bottom = self.basin.left_node;
        while let Some(n) = self.nodes[bottom].next {
            if self.node_y(bottom) >= self.node_y(n) {
                bottom = n;
            } else {
                break;
            }
        }
        if bottom == self.basin.left_node {
            return;
        }
        let mut right = bottom;
        while let Some(n) = self.nodes[right].next {
            if self.node_y(right) < self.node_y(n) {
                right = n;
            } else {
                break;
            }
        }
        if right == bottom {
            return;
        }
        self.basin.right_node = right;
        self.basin.width = self.node_x(right) - self.node_x(self.basin.left_node);
        self.basin.left_highest = self.node_y(self.basin.left_node) > self.node_y(right);
        self.fill_basin_req(bottom);
    }

    fn fill_basin_req(&mut self, node: NodeId) {
        if self.is_shallow(node) {
            return;
        }
        self.fill(node);
        let prev = self.nodes[node].prev.unwrap();
        let next = self.nodes[node].next.unwrap();
        let next_node;
        if prev == self.basin.left_node && next == self.basin.right_node {
            return;
        } else if prev == self.basin.left_node {
            let next2 = self.nodes[next].next.unwrap();
            if self.orient2d_nodes(node, next, next2) == Orientation::Cw {
                return;
            }
            next_node = next;
        } else if next == self.basin.right_node {
            let prev2 = self.nodes[prev].prev.unwrap();
            if self.orient2d_nodes(node, prev, prev2) == Orientation::Ccw {
                return;
            }
            next_node = prev;
        } else {
            next_node = if self.node_y(prev) < self.node_y(next) {
                prev
            } else {
                next
            };
        }
        self.fill_basin_req(next_node);
    }

    fn is_shallow(&self, node: NodeId) -> bool {
        let height = if self.basin.left_highest {
            self.node_y(self.basin.left_node) - self.node_y(node)
        } else {
            self.node_y(self.basin.right_node) - self.node_y(node)
        };
        self.basin.width > height
    }

    fn is_edge_side_of_triangle(&mut self, t: TriId, ep: PointId, eq: PointId) -> bool {
        if let Some(index) = self.triangles[t].edge_index(ep, eq) {
            self.triangles[t].constrained[index] = true;
            if let Some(ot) = self.triangles[t].neighbors[index] {
                self.triangles[ot].mark_constrained_points(ep, eq);
            }
            return true;
        }
        false
    }

    fn edge_event_start(&mut self, edge: EdgeId, node: NodeId) -> GeometryResult<()> {
        self.edge_event.edge = edge;
        let (ep, eq) = (self.edges[edge].p, self.edges[edge].q);
        self.edge_event.right = self.points[ep].x > self.points[eq].x;
        let triangle = self.nodes[node].triangle.unwrap();
        if self.is_edge_side_of_triangle(triangle, ep, eq) {
            return Ok(());
        }
        self.fill_edge_event(edge, node);
        let triangle = self.nodes[node].triangle.unwrap();
        self.edge_event(ep, eq, triangle, eq)
    }

    fn edge_event(
        &mut self,
        ep: PointId,
        eq: PointId,
        triangle: TriId,
        point: PointId,
    ) -> GeometryResult<()> {
        if self.is_edge_side_of_triangle(triangle, ep, eq) {
            return Ok(());
        }
        let p1 = self.triangles[triangle].point_ccw(point);
        let o1 = self.orient2d_points(eq, p1, ep);
        if o1 == Orientation::Collinear {
            // The constraint runs through a vertex; split it there.
            if self.triangles[triangle].contains(eq) && self.triangles[triangle].contains(p1) {
                self.triangles[triangle].mark_constrained_points(eq, p1);
                self.edges[self.edge_event.edge].q = p1;
                let triangle = self
                    .triangles[triangle]
                    .neighbor_across(point)
                    .ok_or(GeometryError::CollinearConstraint)?;
                return self.edge_event(ep, p1, triangle, p1);
            }
            return Err(GeometryError::CollinearConstraint);
        }
        let p2 = self.triangles[triangle].point_cw(point);
        let o2 = self.orient2d_points(eq, p2, ep);
        if o2 == Orientation::Collinear {
            if self.triangles[triangle].contains(eq) && self.triangles[triangle].contains(p2) {
                self.triangles[triangle].mark_constrained_points(eq, p2);
                self.edges[self.edge_event.edge].q = p2;
                let triangle = self
                    .triangles[triangle]
                    .neighbor_across(point)
                    .ok_or(GeometryError::CollinearConstraint)?;
                return self.edge_event(ep, p2, triangle, p2);
            }
            return Err(GeometryError::CollinearConstraint);
        }
        if o1 == o2 {
            // Not crossing this triangle yet; rotate towards the edge.
            let next = if o1 == Orientation::Cw {
                self.triangles[triangle].neighbor_ccw(point)
            } else {
                self.triangles[triangle].neighbor_cw(point)
            };
            let next = next.ok_or_else(|| GeometryError::SweepFailed {
                message: "edge event walked off the triangulation".into(),
            })?;
            self.edge_event(ep, eq, next, point)
        } else {
            self.flip_edge_event(ep, eq, triangle, point)
        }
    }

    fn flip_edge_event(
        &mut self,
        ep: PointId,
        eq: PointId,
        t: TriId,
        p: PointId,
    ) -> GeometryResult<()> {
        let ot = self
            .triangles[t]
            .neighbor_across(p)
            .ok_or_else(|| GeometryError::SweepFailed {
                message: "flip scan reached an open boundary".into(),
            })?;
        let op = self.opposite_point(ot, t, p);
        if in_scan_area(
            self.coords(p),
            self.coords(self.triangles[t].point_ccw(p)),
            self.coords(self.triangles[t].point_cw(p)),
            self.coords(op),
        ) {
            self.rotate_triangle_pair(t, p, ot, op);
            self.map_triangle_to_nodes(t);
            self.map_triangle_to_nodes(ot);
            if p == eq && op == ep {
                let edge = self.edge_event.edge;
                if eq == self.edges[edge].q && ep == self.edges[edge].p {
                    self.triangles[t].mark_constrained_points(ep, eq);
                    self.triangles[ot].mark_constrained_points(ep, eq);
                    self.legalize(t);
                    self.legalize(ot);
                }
            } else {
                let o = self.orient2d_points(eq, op, ep);
                let t = self.next_flip_triangle(o, t, ot, p, op);
                self.flip_edge_event(ep, eq, t, p)?;
            }
        } else {
            let new_p = self.next_flip_point(ep, eq, ot, op)?;
            self.flip_scan_edge_event(ep, eq, t, ot, new_p)?;
            self.edge_event(ep, eq, t, p)?;
        }
        Ok(())
    }

    fn next_flip_triangle(
        &mut self,
        o: Orientation,
        t: TriId,
        ot: TriId,
        p: PointId,
        op: PointId,
    ) -> TriId {
        if o == Orientation::Ccw {
            let index = self.triangles[ot].edge_index(p, op).unwrap();
            self.triangles[ot].delaunay[index] = true;
            self.legalize(ot);
            self.triangles[ot].delaunay = [false; 3];
            return t;
        }
        let index = self.triangles[t].edge_index(p, op).unwrap();
        self.triangles[t].delaunay[index] = true;
        self.legalize(t);
        self.triangles[t].delaunay = [false; 3];
        ot
    }

    fn next_flip_point(
        &self,
        ep: PointId,
        eq: PointId,
        ot: TriId,
        op: PointId,
    ) -> GeometryResult<PointId> {
        match self.orient2d_points(eq, op, ep) {
            Orientation::Cw => Ok(self.triangles[ot].point_ccw(op)),
            Orientation::Ccw => Ok(self.triangles[ot].point_cw(op)),
            Orientation::Collinear => Err(GeometryError::CollinearConstraint),
        }
    }

    fn flip_scan_edge_event(
        &mut self,
        ep: PointId,
        eq: PointId,
        flip_triangle: TriId,
        t: TriId,
        p: PointId,
    ) -> GeometryResult<()> {
        let ot = self
            .triangles[t]
            .neighbor_across(p)
            .ok_or_else(|| GeometryError::SweepFailed {
                message: "flip scan reached an open boundary".into(),
            })?;
        let op = self.opposite_point(ot, t, p);
        if in_scan_area(
            self.coords(eq),
            self.coords(self.triangles[flip_triangle].point_ccw(eq)),
            self.coords(self.triangles[flip_triangle].point_cw(eq)),
            self.coords(op),
        ) {
            self.flip_edge_event(eq, op, ot, op)
        } else {
            let new_p = self.next_flip_point(ep, eq, ot, op)?;
            self.flip_scan_edge_event(ep, eq, flip_triangle, ot, new_p)
        }
    }

    fn fill_edge_event(&mut self, edge: EdgeId, node: NodeId) {
        if self.edge_event.right {
            self.fill_right_above_edge_event(edge, node);
        } else {
            self.fill_left_above_edge_event(edge, node);
        }
    }

    fn fill_right_above_edge_event(&mut self, edge: EdgeId, mut node: NodeId) {
        let (ep, eq) = (self.edges[edge].p, self.edges[edge].q);
        while self.node_x(self.nodes[node].next.unwrap()) < self.points[ep].x {
            let next = self.nodes[node].next.unwrap();
            if self.orient2d_points(eq, self.nodes[next].point, ep) == Orientation::Ccw {
                self.fill_right_below_edge_event(edge, node);
            } else {
                node = next;
            }
        }
    }

    fn fill_right_below_edge_event(&mut self, edge: EdgeId, node: NodeId) {
        let ep = self.edges[edge].p;
        if self.node_x(node) < self.points[ep].x {
            let next = self.nodes[node].next.unwrap();
            let next2 = self.nodes[next].next.unwrap();
            if self.orient2d_nodes(node, next, next2) == Orientation::Ccw {
                self.fill_right_concave_edge_event(edge, node);
            } else {
                self.fill_right_convex_edge_event(edge, node);
                self.fill_right_below_edge_event(edge, node);
            }
        }
    }

    fn fill_right_concave_edge_event(&mut self, edge: EdgeId, node: NodeId) {
        let next = self.nodes[node].next.unwrap();
        self.fill(next);
        let (ep, eq) = (self.edges[edge].p, self.edges[edge].q);
        let next = self.nodes[node].next.unwrap();
        if self.nodes[next].point != ep {
            if self.orient2d_points(eq, self.nodes[next].point, ep) == Orientation::Ccw {
                let next2 = self.nodes[next].next.unwrap();
                if self.orient2d_nodes(node, next, next2) == Orientation::Ccw {
                    self.fill_right_concave_edge_event(edge, node);
                }
            }
        }
    }

    fn fill_right_convex_edge_event(&mut self, edge: EdgeId, node: NodeId) {
        let next = self.nodes[node].next.unwrap();
        let next2 = self.nodes[next].next.unwrap();
        let next3 = self.nodes[next2].next.unwrap();
        if self.orient2d_nodes(next, next2, next3) == Orientation::Ccw {
            self.fill_right_concave_edge_event(edge, next);
        } else {
            let (ep, eq) = (self.edges[edge].p, self.edges[edge].q);
            if self.orient2d_points(eq, self.nodes[next2].point, ep) == Orientation::Ccw {
                self.fill_right_convex_edge_event(edge, next);
            }
        }
    }

    fn fill_left_above_edge_event(&mut self, edge: EdgeId, mut node: NodeId) {
        let (ep, eq) = (self.edges[edge].p, self.edges[edge].q);
        while self.node_x(self.nodes[node].prev.unwrap()) > self.points[ep].x {
            let prev = self.nodes[node].prev.unwrap();
            if self.orient2d_points(eq, self.nodes[prev].point, ep) == Orientation::Cw {
                self.fill_left_below_edge_event(edge, node);
            } else {
                node = prev;
            }
        }
    }

    fn fill_left_below_edge_event(&mut self, edge: EdgeId, node: NodeId) {
        let ep = self.edges[edge].p;
        if self.node_x(node) > self.points[ep].x {
            let prev = self.nodes[node].prev.unwrap();
            let prev2 = self.nodes[prev].prev.unwrap();
            if self.orient2d_nodes(node, prev, prev2) == Orientation::Cw {
                self.fill_left_concave_edge_event(edge, node);
            } else {
                self.fill_left_convex_edge_event(edge, node);
                self.fill_left_below_edge_event(edge, node);
            }
        }
    }

    fn fill_left_concave_edge_event(&mut self, edge: EdgeId, node: NodeId) {
        let prev = self.nodes[node].prev.unwrap();
        self.fill(prev);
        let (ep, eq) = (self.edges[edge].p, self.edges[edge].q);
        let prev = self.nodes[node].prev.unwrap();
        if self.nodes[prev].point != ep {
            if self.orient2d_points(eq, self.nodes[prev].point, ep) == Orientation::Cw {
                let prev2 = self.nodes[prev].prev.unwrap();
                if self.orient2d_nodes(node, prev, prev2) == Orientation::Cw {
                    self.fill_left_concave_edge_event(edge, node);
                }
            }
        }
    }

    fn fill_left_convex_edge_event(&mut self, edge: EdgeId, node: NodeId) {
        let prev = self.nodes[node].prev.unwrap();
        let prev2 = self.nodes[prev].prev.unwrap();
        let prev3 = self.nodes[prev2].prev.unwrap();
        if self.orient2d_nodes(prev, prev2, prev3) == Orientation::Cw {
            self.fill_left_concave_edge_event(edge, prev);
        } else {
            let (ep, eq) = (self.edges[edge].p, self.edges[edge].q);
            if self.orient2d_points(eq, self.nodes[prev2].point, ep) == Orientation::Cw {
                self.fill_left_convex_edge_event(edge, prev);
            }
        }
    }

    fn finalize(&mut self) {
        let node = self.nodes[self.front_head].next.unwrap();
        let point = self.nodes[node].point;
        let mut triangle = self.nodes[node].triangle;
        while let Some(t) = triangle {
            if self.triangles[t].constrained_cw(point) {
                break;
            }
            triangle = self.triangles[t].neighbor_ccw(point);
        }
        if let Some(t) = triangle {
            self.mesh_clean(t);
        }
    }

    /// Flood from one interior triangle, crossing only unconstrained edges.
    fn mesh_clean(&mut self, start: TriId) {
        let mut stack = vec![start];
        while let Some(t) = stack.pop() {
            if self.triangles[t].interior {
                continue;
            }
            self.triangles[t].interior = true;
            for i in 0..3 {
                if !self.triangles[t].constrained[i] {
                    if let Some(n) = self.triangles[t].neighbors[i] {
                        stack.push(n);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(f32, f32)]) -> Vec<Vec2> {
        points.iter().map(|&(x, y)| Vec2::new(x, y)).collect()
    }

    fn total_area(triangles: &[[Vec2; 3]]) -> f32 {
        triangles
            .iter()
            .map(|t| 0.5 * ((t[1] - t[0]).cross(t[2] - t[0])).abs())
            .sum()
    }

    #[test]
    fn test_square_produces_two_triangles() {
        let mut context =
            SweepContext::new(&ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])).unwrap();
        context.triangulate().unwrap();
        let triangles = context.triangle_points();
        assert_eq!(triangles.len(), 2);
        assert!((total_area(&triangles) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_triangles_wind_counterclockwise() {
        let mut context =
            SweepContext::new(&ring(&[(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0)])).unwrap();
        context.triangulate().unwrap();
        for t in context.triangle_points() {
            assert!((t[1] - t[0]).cross(t[2] - t[0]) > 0.0);
        }
    }

    #[test]
    fn test_concave_polygon_area() {
        // L-shape.
        let outline = ring(&[
            (0.0, 0.0),
            (3.0, 0.0),
            (3.0, 1.0),
            (1.0, 1.0),
            (1.0, 3.0),
            (0.0, 3.0),
        ]);
        let mut context = SweepContext::new(&outline).unwrap();
        context.triangulate().unwrap();
        let triangles = context.triangle_points();
        assert_eq!(triangles.len(), 4);
        assert!((total_area(&triangles) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_square_with_hole_area() {
        let mut context =
            SweepContext::new(&ring(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)])).unwrap();
        context
            .add_hole(&ring(&[(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0)]))
            .unwrap();
        context.triangulate().unwrap();
        let triangles = context.triangle_points();
        assert_eq!(triangles.len(), 8);
        assert!((total_area(&triangles) - 12.0).abs() < 1e-5);
    }

    #[test]
    fn test_random_convex_polygon_triangle_count() {
        // A convex n-gon always triangulates into n - 2 triangles.
        let n = 12;
        let mut points = Vec::new();
        for i in 0..n {
            let angle = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
            points.push(Vec2::new(angle.cos(), angle.sin()));
        }
        let mut context = SweepContext::new(&points).unwrap();
        context.triangulate().unwrap();
        let triangles = context.triangle_points();
        assert_eq!(triangles.len(), n - 2);
        let expected = 0.5 * n as f32 * (2.0 * std::f32::consts::PI / n as f32).sin();
        assert!((total_area(&triangles) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_duplicate_point_is_rejected() {
        let result = SweepContext::new(&ring(&[(0.0, 0.0), (0.0, 0.0), (1.0, 1.0)]));
        assert!(matches!(result, Err(GeometryError::DuplicatePoint { .. })));
    }
}
