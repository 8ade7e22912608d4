use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geom::*;
use crate::selector::*;
use crate::shape::*;

/// Sampling grid and distance range for one glyph bake.
///
/// A sample at texel (x, y) is taken at glyph-space point
/// `(x + 0.5, y + 0.5) / scale - translate`, row 0 at the bottom. `range` is
/// the width of the encoded distance band in glyph units.
#[derive(Copy, Clone, Debug)]
pub struct BakeOptions {
    pub width: usize,
    pub height: usize,
    pub range: f32,
    pub scale: Vec2,
    pub translate: Vec2,
}

impl Default for BakeOptions {
    fn default() -> BakeOptions {
        BakeOptions {
            width: 32,
            height: 32,
            range: 4.0,
            scale: Vec2::new(1.0, 1.0),
            translate: Vec2::new(0.0, 0.0),
        }
    }
}

/// Baked distance texture data. Channel values are
/// `inv_range * distance + 0.5`, so the outline sits at 0.5 and points
/// inside an outline are above it. Clamping and quantization into a texture
/// format belong to the caller.
#[derive(Clone, Debug)]
pub struct DistanceField {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub inv_range: f32,
    pub data: Vec<f32>,
}

impl DistanceField {
    /// An all-outside placeholder, used when a glyph cannot be baked.
    pub fn blank(options: &BakeOptions, channels: usize) -> DistanceField {
        DistanceField {
            width: options.width,
            height: options.height,
            channels,
            inv_range: 1.0 / options.range,
            data: vec![0.0; options.width * options.height * channels],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let base = (y * self.width + x) * self.channels;
        &self.data[base..base + self.channels]
    }
}

/// Median-of-three channel resolution. At most one channel can be corrupted
/// by an acute-corner artifact while the other two agree.
#[inline]
pub fn resolve_distance(r: f32, g: f32, b: f32) -> f32 {
    median(r, g, b)
}

/// Per-bake query state: one selector plus one `EdgeCache` per edge. Local
/// to a single bake and a single thread; spawn one finder per parallel
/// worker instead of sharing.
pub struct DistanceFinder<'a, S: EdgeSelector> {
    shape: &'a Shape,
    selector: S,
    caches: Vec<EdgeCache>,
    degenerate: Vec<bool>,
}

impl<'a, S: EdgeSelector> DistanceFinder<'a, S> {
    pub fn new(shape: &'a Shape) -> DistanceFinder<'a, S> {
        let edge_count = shape.contours().iter().map(|c| c.edges().len()).sum();
        // Windings are derived once here; zero-winding contours contribute
        // no edges to any selector.
        let degenerate = shape.contours().iter().map(|c| c.winding() == 0).collect();
        DistanceFinder {
            shape,
            selector: S::default(),
            caches: vec![EdgeCache::default(); edge_count],
            degenerate,
        }
    }

    /// Minimum distance from `origin` to the shape, per selector channel.
    pub fn distance(&mut self, origin: Vec2) -> S::Distance {
        self.selector.reset(origin);
        let shape = self.shape;
        let mut offset = 0;
        for (index, contour) in shape.contours().iter().enumerate() {
            let edges = contour.edges();
            if edges.is_empty() {
                continue;
            }
            if self.degenerate[index] {
                offset += edges.len();
                continue;
            }
            let mut prev = &edges[if edges.len() >= 2 { edges.len() - 2 } else { 0 }];
            let mut cur = &edges[edges.len() - 1];
            for (i, next) in edges.iter().enumerate() {
                self.selector
                    .add_edge(&mut self.caches[offset + i], prev, cur, next);
                prev = cur;
                cur = next;
            }
            offset += edges.len();
        }
        self.selector.distance()
    }
}

trait Channels: Copy {
    const COUNT: usize;
    fn write(self, inv_range: f32, out: &mut Vec<f32>);
}

impl Channels for f32 {
    const COUNT: usize = 1;
    fn write(self, inv_range: f32, out: &mut Vec<f32>) {
        out.push(inv_range * self + 0.5);
    }
}

impl Channels for MultiDistance {
    const COUNT: usize = 3;
    fn write(self, inv_range: f32, out: &mut Vec<f32>) {
        out.push(inv_range * self.r + 0.5);
        out.push(inv_range * self.g + 0.5);
        out.push(inv_range * self.b + 0.5);
    }
}

impl Channels for MultiAndTrueDistance {
    const COUNT: usize = 4;
    fn write(self, inv_range: f32, out: &mut Vec<f32>) {
        out.push(inv_range * self.r + 0.5);
        out.push(inv_range * self.g + 0.5);
        out.push(inv_range * self.b + 0.5);
        out.push(inv_range * self.a + 0.5);
    }
}

fn generate<S>(shape: &Shape, options: &BakeOptions) -> DistanceField
where
    S: EdgeSelector,
    S::Distance: Channels,
{
    let inv_range = 1.0 / options.range;
    let mut finder: DistanceFinder<S> = DistanceFinder::new(shape);
    let mut data = Vec::with_capacity(options.width * options.height * S::Distance::COUNT);
    // Rows sweep bottom to top, columns left to right, so consecutive
    // sample points stay close and the edge caches keep pruning.
    for y in 0..options.height {
        for x in 0..options.width {
            let p = Vec2::new(
                (x as f32 + 0.5) / options.scale.x - options.translate.x,
                (y as f32 + 0.5) / options.scale.y - options.translate.y,
            );
            finder.distance(p).write(inv_range, &mut data);
        }
    }
    DistanceField {
        width: options.width,
        height: options.height,
        channels: S::Distance::COUNT,
        inv_range,
        data,
    }
}

/// Single-channel true-distance field.
pub fn generate_sdf(shape: &Shape, options: &BakeOptions) -> DistanceField {
    generate::<TrueDistanceSelector>(shape, options)
}

/// Single-channel field with pseudo-distance corner extension.
pub fn generate_pseudo_sdf(shape: &Shape, options: &BakeOptions) -> DistanceField {
    generate::<PseudoDistanceSelector>(shape, options)
}

/// Three-channel multi-distance field, resolved by `resolve_distance` at
/// sampling time.
pub fn generate_msdf(shape: &Shape, options: &BakeOptions) -> DistanceField {
    generate::<MultiDistanceSelector>(shape, options)
}

/// Multi-distance field plus a true-distance alpha channel.
pub fn generate_mtsdf(shape: &Shape, options: &BakeOptions) -> DistanceField {
    generate::<MultiAndTrueDistanceSelector>(shape, options)
}

/// Cooperative cancellation flag for batch bakes. Cheap to clone and share
/// with whatever owns the user interface.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct BakeReport {
    pub fields: Vec<DistanceField>,
    pub baked: usize,
    pub cancelled: bool,
}

/// Bakes a multi-channel field for every glyph in `shapes`. A glyph that
/// fails validation is replaced by a blank placeholder rather than failing
/// the batch. Cancellation is honored between glyphs, never inside one, so
/// every emitted texture is complete.
pub fn bake_glyphs(shapes: &[Shape], options: &BakeOptions, cancel: &CancelToken) -> BakeReport {
    let mut fields = Vec::new();
    let mut baked = 0;
    for (index, shape) in shapes.iter().enumerate() {
        if cancel.is_cancelled() {
            log::debug!("bake cancelled after {} of {} glyphs", index, shapes.len());
            return BakeReport {
                fields,
                baked,
                cancelled: true,
            };
        }
        if !shape.validate() {
            log::warn!("glyph {} has a broken contour loop, baking placeholder", index);
            fields.push(DistanceField::blank(options, 3));
            continue;
        }
        fields.push(generate_msdf(shape, options));
        baked += 1;
    }
    BakeReport {
        fields,
        baked,
        cancelled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::*;
    use crate::edge::*;

    /// Clockwise unit square, i.e. an outline with positive inside.
    fn outline_square() -> Shape {
        Shape::from_points(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 0.0),
            ],
            EdgeColor::WHITE,
        )
    }

    fn options_16() -> BakeOptions {
        BakeOptions {
            width: 16,
            height: 16,
            range: 0.5,
            scale: Vec2::new(16.0, 16.0),
            translate: Vec2::new(0.0, 0.0),
        }
    }

    #[test]
    fn test_sdf_sign_flips_across_boundary() {
        let shape = outline_square();
        let options = options_16();
        let field = generate_sdf(&shape, &options);
        assert_eq!(field.channels, 1);
        // Center is inside, corners of the grid are near the outline.
        assert!(field.pixel(8, 8)[0] > 0.5);
        let mut finder: DistanceFinder<TrueDistanceSelector> = DistanceFinder::new(&shape);
        assert!(finder.distance(Vec2::new(0.5, 0.5)) > 0.0);
        assert!(finder.distance(Vec2::new(0.5, -0.25)) < 0.0);
    }

    #[test]
    fn test_msdf_median_at_boundary_is_half() {
        let shape = outline_square();
        let options = options_16();
        let field = generate_msdf(&shape, &options);
        assert_eq!(field.channels, 3);
        // Sample point on the left outline edge.
        let mut finder: DistanceFinder<MultiDistanceSelector> = DistanceFinder::new(&shape);
        let d = finder.distance(Vec2::new(0.0, 0.5));
        let value = field.inv_range * resolve_distance(d.r, d.g, d.b) + 0.5;
        assert!((value - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_contour_feeds_no_edges() {
        let mut shape = outline_square();
        let mut flat = Contour::new();
        flat.push(Edge::line(
            Vec2::new(0.4, 0.5),
            Vec2::new(0.6, 0.5),
            EdgeColor::WHITE,
        ));
        flat.push(Edge::line(
            Vec2::new(0.6, 0.5),
            Vec2::new(0.4, 0.5),
            EdgeColor::WHITE,
        ));
        shape.push(flat);
        let mut with_flat: DistanceFinder<TrueDistanceSelector> = DistanceFinder::new(&shape);
        let plain_shape = outline_square();
        let mut plain: DistanceFinder<TrueDistanceSelector> = DistanceFinder::new(&plain_shape);
        let p = Vec2::new(0.5, 0.45);
        assert_eq!(with_flat.distance(p), plain.distance(p));
    }

    #[test]
    fn test_bake_substitutes_placeholder_for_broken_glyph() {
        let mut open = Contour::new();
        open.push(Edge::line(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            EdgeColor::WHITE,
        ));
        open.push(Edge::line(
            Vec2::new(1.0, 0.5),
            Vec2::new(0.0, 0.0),
            EdgeColor::WHITE,
        ));
        let mut broken = Shape::new();
        broken.push(open);

        let shapes = vec![outline_square(), broken, outline_square()];
        let report = bake_glyphs(&shapes, &options_16(), &CancelToken::new());
        assert_eq!(report.fields.len(), 3);
        assert_eq!(report.baked, 2);
        assert!(!report.cancelled);
        // Placeholder is all outside.
        assert!(report.fields[1].data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_bake_cancellation_stops_between_glyphs() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let shapes = vec![outline_square(), outline_square()];
        let report = bake_glyphs(&shapes, &options_16(), &cancel);
        assert!(report.cancelled);
        assert_eq!(report.baked, 0);
        assert!(report.fields.is_empty());
    }
}
