/// Visual regression tests for the render pipeline.
///
/// The main scene is rendered on the software context and, when an adapter is available, on
/// wgpu; specific pixels and probe positions are validated against expected results.
///
/// Run with:   cargo test --test visual_regression
use futures::executor::block_on;
use pinta::{PipelineConfig, RenderContext, RenderPipeline, SoftwareContext, WgpuContext};
use pinta_test_scenes::{
    build_main_scene, check_picks, check_pixels, PixelExpectation, CANVAS_HEIGHT, CANVAS_WIDTH,
};

fn run_main_scene<C: RenderContext + 'static>(context: C) {
    let mut pipeline = RenderPipeline::new(context, PipelineConfig::default()).unwrap();

    let expectations = build_main_scene(&mut pipeline).unwrap();
    pipeline.draw_frame().unwrap();

    let mut failures = check_pixels(pipeline.context_mut(), &expectations.pixels);
    failures.extend(check_picks(&mut pipeline, &expectations.picks));
    if !failures.is_empty() {
        let message = format!(
            "{} expectation(s) failed:\n{}",
            failures.len(),
            failures.join("\n"),
        );
        panic!("{message}");
    }
}

/// Main regression test on the CPU reference context.
#[test]
fn main_scene_software() {
    run_main_scene(SoftwareContext::new(CANVAS_WIDTH, CANVAS_HEIGHT));
}

/// Same scene on the GPU. Skipped on machines without an adapter.
#[test]
fn main_scene_wgpu() {
    let Some(context) = block_on(WgpuContext::try_new_headless(CANVAS_WIDTH, CANVAS_HEIGHT))
    else {
        eprintln!("no wgpu adapter available, skipping");
        return;
    };
    run_main_scene(context);
}

/// An empty queue still clears the canvas.
#[test]
fn empty_queue_clears_the_canvas() {
    let mut context = SoftwareContext::new(CANVAS_WIDTH, CANVAS_HEIGHT);
    context
        .clear_framebuffer(None, pinta::Color::rgb(9, 9, 9))
        .unwrap();
    let mut pipeline = RenderPipeline::new(context, PipelineConfig::default()).unwrap();

    let stats = pipeline.draw_frame().unwrap();

    assert_eq!(stats.leaves_drawn, 0);
    let failures = check_pixels(
        pipeline.context_mut(),
        &[PixelExpectation::transparent(10, 10, "cleared")],
    );
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

/// A second frame does not repaint the first frame's queue.
#[test]
fn second_frame_starts_empty() {
    let mut pipeline = RenderPipeline::new(
        SoftwareContext::new(CANVAS_WIDTH, CANVAS_HEIGHT),
        PipelineConfig::default(),
    )
    .unwrap();
    let expectations = build_main_scene(&mut pipeline).unwrap();
    pipeline.draw_frame().unwrap();

    let stats = pipeline.draw_frame().unwrap();

    assert_eq!(stats.leaves_drawn, 0);
    let first = &expectations.picks[0];
    assert_eq!(pipeline.probe_position(first.x, first.y).unwrap(), None);
    let failures = check_pixels(
        pipeline.context_mut(),
        &[PixelExpectation::transparent(40, 40, "t01_gone")],
    );
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}
