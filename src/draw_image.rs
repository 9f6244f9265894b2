use euclid::{Angle, Box2D, Point2D, Transform2D, Vector2D};

use crate::id::{ShaderId, TextureHandle};

/// Top-left-origin pixel space of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSpace;

/// The unit square a quad is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSpace;

/// Normalized texture coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UvSpace;

pub type PixelPoint = Point2D<f32, PixelSpace>;
pub type UvPoint = Point2D<f32, UvSpace>;

/// Source sub-rectangle of a texture, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceRect {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

/// Parameters of one paint operation.
///
/// Only the shader, the texture with its native size, and the destination origin are
/// required. Everything else defaults: the source rectangle to the whole texture, the
/// destination size to the source size, rotation to zero around the destination origin.
///
/// ```
/// use pinta::{DrawImageRequest, ShaderId, TextureHandle};
///
/// let request = DrawImageRequest::new(ShaderId(1), TextureHandle(7), (64, 32), (10.0, 20.0))
///     .source_rect(16.0, 0.0, 16.0, 16.0)
///     .destination_size(32.0, 32.0);
///
/// let quad = request.quad();
/// assert_eq!(quad.bounds().min.to_array(), [10.0, 20.0]);
/// assert_eq!(quad.bounds().max.to_array(), [42.0, 52.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DrawImageRequest {
    pub shader: ShaderId,
    pub texture: TextureHandle,
    pub texture_width: u32,
    pub texture_height: u32,
    pub source: SourceRect,
    pub destination_x: f32,
    pub destination_y: f32,
    pub destination_width: Option<f32>,
    pub destination_height: Option<f32>,
    pub rotation_radian: f32,
    pub rotation_offset_x: f32,
    pub rotation_offset_y: f32,
    pub flip_y: bool,
}

impl DrawImageRequest {
    pub fn new(
        shader: ShaderId,
        texture: TextureHandle,
        texture_size: (u32, u32),
        destination: (f32, f32),
    ) -> Self {
        Self {
            shader,
            texture,
            texture_width: texture_size.0,
            texture_height: texture_size.1,
            source: SourceRect::default(),
            destination_x: destination.0,
            destination_y: destination.1,
            destination_width: None,
            destination_height: None,
            rotation_radian: 0.0,
            rotation_offset_x: 0.0,
            rotation_offset_y: 0.0,
            flip_y: false,
        }
    }

    pub fn source_rect(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.source = SourceRect {
            x: Some(x),
            y: Some(y),
            width: Some(width),
            height: Some(height),
        };
        self
    }

    pub fn destination_size(mut self, width: f32, height: f32) -> Self {
        self.destination_width = Some(width);
        self.destination_height = Some(height);
        self
    }

    /// Rotation in radians, clockwise on screen (pixel space is y-down).
    pub fn rotation(mut self, radians: f32) -> Self {
        self.rotation_radian = radians;
        self
    }

    /// Pivot of the rotation, relative to the destination origin.
    pub fn rotation_offset(mut self, x: f32, y: f32) -> Self {
        self.rotation_offset_x = x;
        self.rotation_offset_y = y;
        self
    }

    pub fn flip_y(mut self, flip: bool) -> Self {
        self.flip_y = flip;
        self
    }

    pub fn with_shader(mut self, shader: ShaderId) -> Self {
        self.shader = shader;
        self
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = texture;
        self
    }

    pub fn texture_size(&self) -> (u32, u32) {
        (self.texture_width, self.texture_height)
    }

    /// `(x, y, width, height)` of the sampled region with defaults applied.
    pub fn resolved_source(&self) -> (f32, f32, f32, f32) {
        (
            self.source.x.unwrap_or(0.0),
            self.source.y.unwrap_or(0.0),
            self.source.width.unwrap_or(self.texture_width as f32),
            self.source.height.unwrap_or(self.texture_height as f32),
        )
    }

    /// `(width, height)` of the painted region with defaults applied.
    pub fn resolved_destination_size(&self) -> (f32, f32) {
        let (_, _, source_width, source_height) = self.resolved_source();
        (
            self.destination_width.unwrap_or(source_width),
            self.destination_height.unwrap_or(source_height),
        )
    }

    /// Resolves the request into quad geometry.
    pub fn quad(&self) -> QuadGeometry {
        let (destination_width, destination_height) = self.resolved_destination_size();
        let pivot = Vector2D::new(self.rotation_offset_x, self.rotation_offset_y);
        let origin = Vector2D::new(self.destination_x, self.destination_y);

        let transform = Transform2D::<f32, UnitSpace, PixelSpace>::scale(
            destination_width,
            destination_height,
        )
        .then_translate(-pivot)
        .then_rotate(Angle::radians(self.rotation_radian))
        .then_translate(pivot + origin);

        let (source_x, source_y, source_width, source_height) = self.resolved_source();
        let texture_width = self.texture_width.max(1) as f32;
        let texture_height = self.texture_height.max(1) as f32;

        let flip = if self.flip_y {
            Transform2D::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0)
        } else {
            Transform2D::identity()
        };
        let tex_transform = flip
            .then(&Transform2D::<f32, UnitSpace, UvSpace>::scale(
                source_width / texture_width,
                source_height / texture_height,
            ))
            .then_translate(Vector2D::new(
                source_x / texture_width,
                source_y / texture_height,
            ));

        QuadGeometry {
            transform,
            tex_transform,
        }
    }
}

/// Resolved geometry of a textured quad: where the unit square lands on the target and which
/// texture region it samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadGeometry {
    pub transform: Transform2D<f32, UnitSpace, PixelSpace>,
    pub tex_transform: Transform2D<f32, UnitSpace, UvSpace>,
}

/// Unit square corners in triangle-strip order.
const UNIT_CORNERS: [(f32, f32); 4] = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];

/// Vertex fed to GPU contexts.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadGeometry {
    /// Geometry covering a whole `size` target with the whole texture.
    pub fn full_target(size: (u32, u32)) -> Self {
        Self {
            transform: Transform2D::scale(size.0 as f32, size.1 as f32),
            tex_transform: Transform2D::identity(),
        }
    }

    pub fn corners(&self) -> [PixelPoint; 4] {
        UNIT_CORNERS.map(|(x, y)| self.transform.transform_point(Point2D::new(x, y)))
    }

    pub fn tex_coords(&self) -> [UvPoint; 4] {
        UNIT_CORNERS.map(|(x, y)| self.tex_transform.transform_point(Point2D::new(x, y)))
    }

    /// Axis-aligned bounds of the painted quad.
    pub fn bounds(&self) -> Box2D<f32, PixelSpace> {
        Box2D::from_points(self.corners())
    }

    /// Texture coordinate painted at `point`, or `None` when the point is outside the quad
    /// or the quad is degenerate. Edges follow the top-left rule: the minimum edges are
    /// inside, the maximum edges are not.
    pub fn uv_at(&self, point: PixelPoint) -> Option<UvPoint> {
        let unit = self.transform.inverse()?.transform_point(point);
        let inside = (0.0..1.0).contains(&unit.x) && (0.0..1.0).contains(&unit.y);
        inside.then(|| self.tex_transform.transform_point(unit))
    }

    /// Strip-ordered vertices in normalized device coordinates for a target of `target_size`.
    pub fn vertices(&self, target_size: (u32, u32)) -> [QuadVertex; 4] {
        let corners = self.corners();
        let tex_coords = self.tex_coords();
        std::array::from_fn(|index| QuadVertex {
            position: crate::util::pixel_to_ndc(corners[index].to_array(), target_size),
            uv: tex_coords[index].to_array(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    const EPSILON: f32 = 1e-4;

    fn request() -> DrawImageRequest {
        DrawImageRequest::new(ShaderId(1), TextureHandle(1), (40, 20), (100.0, 50.0))
    }

    fn assert_point(actual: PixelPoint, expected: [f32; 2]) {
        assert!(
            (actual.x - expected[0]).abs() < EPSILON && (actual.y - expected[1]).abs() < EPSILON,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn destination_defaults_to_texture_size() {
        let bounds = request().quad().bounds();
        assert_eq!(bounds.min.to_array(), [100.0, 50.0]);
        assert_eq!(bounds.max.to_array(), [140.0, 70.0]);
    }

    #[test]
    fn destination_defaults_to_source_size_when_cropped() {
        let request = request().source_rect(10.0, 5.0, 8.0, 6.0);
        assert_eq!(request.resolved_destination_size(), (8.0, 6.0));

        let tex_coords = request.quad().tex_coords();
        assert!((tex_coords[0].x - 0.25).abs() < EPSILON);
        assert!((tex_coords[0].y - 0.25).abs() < EPSILON);
        assert!((tex_coords[3].x - 0.45).abs() < EPSILON);
        assert!((tex_coords[3].y - 0.55).abs() < EPSILON);
    }

    #[test]
    fn rotation_without_offset_pivots_on_destination_origin() {
        let corners = request().rotation(FRAC_PI_2).quad().corners();
        // Quarter turn clockwise in y-down space: +x maps to +y.
        assert_point(corners[0], [100.0, 50.0]);
        assert_point(corners[1], [100.0, 90.0]);
        assert_point(corners[2], [80.0, 50.0]);
    }

    #[test]
    fn rotation_offset_moves_the_pivot() {
        let quad = request()
            .destination_size(20.0, 20.0)
            .rotation(FRAC_PI_2)
            .rotation_offset(10.0, 10.0)
            .quad();
        // A square rotated around its own center keeps its bounds.
        let bounds = quad.bounds();
        assert_point(bounds.min, [100.0, 50.0]);
        assert_point(bounds.max, [120.0, 70.0]);
        assert_point(quad.corners()[0], [120.0, 50.0]);
    }

    #[test]
    fn flip_y_mirrors_vertical_texture_coordinates() {
        let tex_coords = request().flip_y(true).quad().tex_coords();
        assert_eq!(tex_coords[0].to_array(), [0.0, 1.0]);
        assert_eq!(tex_coords[3].to_array(), [1.0, 0.0]);
    }

    #[test]
    fn uv_at_uses_top_left_fill_rule() {
        let quad = request().quad();
        assert!(quad.uv_at(Point2D::new(100.0, 50.0)).is_some());
        assert!(quad.uv_at(Point2D::new(140.0, 60.0)).is_none());
        assert!(quad.uv_at(Point2D::new(99.5, 60.0)).is_none());

        let uv = quad.uv_at(Point2D::new(120.0, 60.0)).unwrap();
        assert!((uv.x - 0.5).abs() < EPSILON && (uv.y - 0.5).abs() < EPSILON);
    }

    #[test]
    fn degenerate_quads_cover_nothing() {
        let quad = request().destination_size(0.0, 10.0).quad();
        assert!(quad.uv_at(Point2D::new(100.0, 55.0)).is_none());
    }

    #[test]
    fn vertices_are_in_device_coordinates() {
        let vertices = QuadGeometry::full_target((64, 32)).vertices((64, 32));
        assert_eq!(vertices[0].position, [-1.0, 1.0]);
        assert_eq!(vertices[3].position, [1.0, -1.0]);
        assert_eq!(vertices[3].uv, [1.0, 1.0]);
    }
}
