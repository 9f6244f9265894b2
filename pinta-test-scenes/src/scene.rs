use std::f32::consts::PI;

use pinta::{
    Color, DrawImageRequest, ObjectId, PipelineError, RenderContext, RenderPipeline, Sprite,
    TextureHandle, Uniforms,
};

use crate::expectations::{PickExpectation, PixelExpectation};
use crate::shaders::{grayscale, invert, tint};

// ── Grid layout constants ────────────────────────────────────────────────────

const TILE_SIZE: u32 = 80;
const COLUMNS: u32 = 3;
const ROWS: u32 = 2;

pub const CANVAS_WIDTH: u32 = TILE_SIZE * COLUMNS;
pub const CANVAS_HEIGHT: u32 = TILE_SIZE * ROWS;

/// Returns the pixel origin (top-left corner) of tile number `n` (1-based).
fn tile_origin(tile_number: u32) -> (f32, f32) {
    let index = tile_number - 1;
    let column = index % COLUMNS;
    let row = index / COLUMNS;
    ((column * TILE_SIZE) as f32, (row * TILE_SIZE) as f32)
}

/// What a scene should look like once its frame is drawn.
#[derive(Default)]
pub struct SceneExpectations {
    pub pixels: Vec<PixelExpectation>,
    pub picks: Vec<PickExpectation>,
}

impl SceneExpectations {
    fn extend(&mut self, other: SceneExpectations) {
        self.pixels.extend(other.pixels);
        self.picks.extend(other.picks);
    }
}

/// Uploads a 1×1 opaque texture.
pub fn solid_texture(
    ctx: &mut impl RenderContext,
    color: Color,
) -> Result<TextureHandle, PipelineError> {
    Ok(ctx.upload_texture(1, 1, &color.to_array())?)
}

fn square<C: RenderContext + 'static>(
    pipeline: &RenderPipeline<C>,
    texture: TextureHandle,
    origin: (f32, f32),
    size: f32,
) -> DrawImageRequest {
    DrawImageRequest::new(pipeline.sprite_shader(), texture, (1, 1), origin)
        .destination_size(size, size)
}

/// Queues the main test scene on `pipeline` and returns what the drawn frame must contain.
///
/// Shared between the software and the wgpu regression tests.
pub fn build_main_scene<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
) -> Result<SceneExpectations, PipelineError> {
    let mut expectations = SceneExpectations::default();

    expectations.extend(tile_01_pickable_sprite(pipeline)?);
    expectations.extend(tile_02_y_sorted_overlap(pipeline)?);
    expectations.extend(tile_03_container_shader(pipeline)?);
    expectations.extend(tile_04_nested_container_order(pipeline)?);
    expectations.extend(tile_05_inactive_shader_skipped(pipeline)?);
    expectations.extend(tile_06_rotated_crop(pipeline)?);

    Ok(expectations)
}

fn tile_01_pickable_sprite<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
) -> Result<SceneExpectations, PipelineError> {
    let (ox, oy) = tile_origin(1);
    let red = solid_texture(pipeline.context_mut(), Color::rgb(220, 50, 50))?;
    let request = square(pipeline, red, (ox + 10.0, oy + 10.0), 60.0);
    pipeline.enqueue_sprite([ox, oy], Sprite::new(request).with_object(ObjectId(1)));

    Ok(SceneExpectations {
        pixels: vec![
            PixelExpectation::color(40, 40, Color::rgb(220, 50, 50), "t01_center"),
            PixelExpectation::transparent(5, 5, "t01_outside"),
        ],
        picks: vec![
            PickExpectation::hit(40.0, 40.0, 1, "t01_pick_center"),
            PickExpectation::miss(5.0, 75.0, "t01_pick_outside"),
        ],
    })
}

/// The green sprite is queued last but sorts first, so blue ends up on top.
fn tile_02_y_sorted_overlap<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
) -> Result<SceneExpectations, PipelineError> {
    let (ox, oy) = tile_origin(2);
    let blue = solid_texture(pipeline.context_mut(), Color::rgb(0, 0, 255))?;
    let green = solid_texture(pipeline.context_mut(), Color::rgb(0, 255, 0))?;

    let back = square(pipeline, blue, (ox + 10.0, oy + 10.0), 40.0);
    let front = square(pipeline, green, (ox + 30.0, oy + 30.0), 40.0);
    pipeline.enqueue_sprite([ox, oy + 20.0], Sprite::new(back).with_object(ObjectId(21)));
    pipeline.enqueue_sprite([ox, oy + 10.0], Sprite::new(front).with_object(ObjectId(22)));

    Ok(SceneExpectations {
        pixels: vec![
            PixelExpectation::color(120, 40, Color::rgb(0, 0, 255), "t02_overlap_blue"),
            PixelExpectation::color(140, 60, Color::rgb(0, 255, 0), "t02_green_only"),
            PixelExpectation::color(95, 15, Color::rgb(0, 0, 255), "t02_blue_only"),
        ],
        picks: vec![
            PickExpectation::hit(120.0, 40.0, 21, "t02_pick_overlap"),
            PickExpectation::hit(140.0, 60.0, 22, "t02_pick_green"),
        ],
    })
}

fn tile_03_container_shader<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
) -> Result<SceneExpectations, PipelineError> {
    let (ox, oy) = tile_origin(3);
    let invert = pipeline.load_shader(invert(), Uniforms::new())?;
    let red = solid_texture(pipeline.context_mut(), Color::rgb(255, 0, 0))?;

    pipeline.open_container([ox, oy], &[invert]);
    let request = square(pipeline, red, (ox + 10.0, oy + 10.0), 60.0);
    pipeline.enqueue_sprite([ox, oy], Sprite::new(request).with_object(ObjectId(3)));
    pipeline.close_container()?;

    Ok(SceneExpectations {
        pixels: vec![PixelExpectation::color(200, 40, Color::rgb(0, 255, 255), "t03_inverted")],
        picks: vec![PickExpectation::hit(200.0, 40.0, 3, "t03_pick")],
    })
}

/// Inner containers apply first: yellow → tint(0,1,1) → green → invert → magenta.
fn tile_04_nested_container_order<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
) -> Result<SceneExpectations, PipelineError> {
    let (ox, oy) = tile_origin(4);
    let invert = pipeline.load_shader(invert(), Uniforms::new())?;
    let tint = pipeline.load_shader(
        tint(),
        Uniforms::new().with("u_tint", [0.0, 1.0, 1.0, 1.0]),
    )?;
    let yellow = solid_texture(pipeline.context_mut(), Color::rgb(255, 255, 0))?;

    pipeline.open_container([ox, oy], &[invert]);
    pipeline.open_container([ox, oy], &[tint]);
    let request = square(pipeline, yellow, (ox + 10.0, oy + 10.0), 60.0);
    pipeline.enqueue_sprite([ox, oy], Sprite::new(request));
    pipeline.close_container()?;
    pipeline.close_container()?;

    Ok(SceneExpectations {
        pixels: vec![PixelExpectation::color(40, 120, Color::rgb(255, 0, 255), "t04_magenta")],
        picks: vec![PickExpectation::miss(40.0, 120.0, "t04_not_pickable")],
    })
}

fn tile_05_inactive_shader_skipped<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
) -> Result<SceneExpectations, PipelineError> {
    let (ox, oy) = tile_origin(5);
    let grayscale = pipeline.load_shader(grayscale(), Uniforms::new())?;
    pipeline.shaders_mut().shader_mut(grayscale)?.deactivate();
    let color = solid_texture(pipeline.context_mut(), Color::rgb(200, 50, 50))?;

    pipeline.open_container([ox, oy], &[grayscale]);
    let request = square(pipeline, color, (ox + 10.0, oy + 10.0), 60.0);
    pipeline.enqueue_sprite([ox, oy], Sprite::new(request));
    pipeline.close_container()?;

    Ok(SceneExpectations {
        pixels: vec![PixelExpectation::color(120, 120, Color::rgb(200, 50, 50), "t05_unchanged")],
        picks: Vec::new(),
    })
}

/// Top row of a red|green / blue|white texture, turned half a circle around its center.
fn tile_06_rotated_crop<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
) -> Result<SceneExpectations, PipelineError> {
    let (ox, oy) = tile_origin(6);
    #[rustfmt::skip]
    let quadrants = [
        255, 0, 0, 255,   0, 255, 0, 255,
        0, 0, 255, 255,   255, 255, 255, 255,
    ];
    let texture = pipeline.context_mut().upload_texture(2, 2, &quadrants)?;

    let request = DrawImageRequest::new(
        pipeline.sprite_shader(),
        texture,
        (2, 2),
        (ox + 10.0, oy + 10.0),
    )
    .source_rect(0.0, 0.0, 2.0, 1.0)
    .destination_size(60.0, 60.0)
    .rotation(PI)
    .rotation_offset(30.0, 30.0);
    pipeline.enqueue_sprite([ox, oy], Sprite::new(request).with_object(ObjectId(6)));

    Ok(SceneExpectations {
        pixels: vec![
            PixelExpectation::color(180, 120, Color::rgb(0, 255, 0), "t06_left_green"),
            PixelExpectation::color(220, 120, Color::rgb(255, 0, 0), "t06_right_red"),
            PixelExpectation::transparent(165, 85, "t06_outside"),
        ],
        picks: vec![PickExpectation::hit(200.0, 120.0, 6, "t06_pick")],
    })
}
