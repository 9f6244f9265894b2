pub mod expectations;
pub mod scene;
pub mod shaders;

pub use expectations::{check_picks, check_pixels, PickExpectation, PixelExpectation};
pub use scene::{build_main_scene, solid_texture, SceneExpectations, CANVAS_HEIGHT, CANVAS_WIDTH};
