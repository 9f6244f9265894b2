use pinta::{Color, ObjectId, RenderContext, RenderPipeline};

/// Canvas pixel `at` should read back as `expected`, each channel within `tolerance`.
pub struct PixelExpectation {
    pub at: (u32, u32),
    pub expected: Color,
    pub tolerance: u8,
    pub label: &'static str,
}

impl PixelExpectation {
    /// Colors pass through premultiplied blending and shader math, so an exact match is not
    /// required by default.
    const DEFAULT_TOLERANCE: u8 = 2;

    pub fn color(x: u32, y: u32, expected: Color, label: &'static str) -> Self {
        Self {
            at: (x, y),
            expected,
            tolerance: Self::DEFAULT_TOLERANCE,
            label,
        }
    }

    /// Nothing was painted at `(x, y)`.
    pub fn transparent(x: u32, y: u32, label: &'static str) -> Self {
        Self::color(x, y, Color::TRANSPARENT, label)
    }

    pub fn within(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn matches(&self, actual: Color) -> bool {
        actual
            .to_array()
            .iter()
            .zip(self.expected.to_array())
            .all(|(&actual, expected)| actual.abs_diff(expected) <= self.tolerance)
    }
}

/// Expected result of probing the mask layer at a canvas position.
pub struct PickExpectation {
    pub x: f32,
    pub y: f32,
    pub expected: Option<ObjectId>,
    pub label: &'static str,
}

impl PickExpectation {
    pub fn hit(x: f32, y: f32, object: u64, label: &'static str) -> Self {
        Self {
            x,
            y,
            expected: Some(ObjectId(object)),
            label,
        }
    }

    pub fn miss(x: f32, y: f32, label: &'static str) -> Self {
        Self {
            x,
            y,
            expected: None,
            label,
        }
    }
}

/// Validates pixel expectations against the canvas of `ctx`.
///
/// Returns a list of human-readable failure descriptions. An empty list means
/// all expectations passed.
pub fn check_pixels(ctx: &mut impl RenderContext, expectations: &[PixelExpectation]) -> Vec<String> {
    let mut failures = Vec::new();
    let (width, height) = ctx.drawing_buffer_size();

    for expectation in expectations {
        let (x, y) = expectation.at;
        if x >= width || y >= height {
            failures.push(format!(
                "[{}] pixel ({x},{y}) is outside the {width}x{height} canvas",
                expectation.label,
            ));
            continue;
        }

        match ctx.read_pixel(x, y, None) {
            Ok(actual) if expectation.matches(actual) => {}
            Ok(actual) => failures.push(format!(
                "[{}] pixel ({x},{y}) expected {:?} ±{} but got {:?}",
                expectation.label, expectation.expected, expectation.tolerance, actual,
            )),
            Err(error) => failures.push(format!("[{}] read failed: {}", expectation.label, error)),
        }
    }

    failures
}

/// Probes the mask layer of `pipeline` at every expectation.
pub fn check_picks<C: RenderContext + 'static>(
    pipeline: &mut RenderPipeline<C>,
    expectations: &[PickExpectation],
) -> Vec<String> {
    let mut failures = Vec::new();

    for expectation in expectations {
        match pipeline.probe_position(expectation.x, expectation.y) {
            Ok(actual) if actual == expectation.expected => {}
            Ok(actual) => failures.push(format!(
                "[{}] probe ({},{}) expected {:?} but got {:?}",
                expectation.label, expectation.x, expectation.y, expectation.expected, actual,
            )),
            Err(error) => failures.push(format!("[{}] probe failed: {}", expectation.label, error)),
        }
    }

    failures
}
