use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Construction parameters of a [`RenderPipeline`](crate::RenderPipeline).
///
/// Every field has a default, so partial documents deserialize:
///
/// ```
/// use pinta::{Color, PipelineConfig};
///
/// let config: PipelineConfig = serde_json::from_str(r#"{ "picking": false }"#).unwrap();
/// assert!(!config.picking);
/// assert_eq!(config.clear_color, Some(Color::TRANSPARENT));
/// assert_eq!(config.canvas_size(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Resizes the drawing buffer on construction when set together with `canvas_height`.
    pub canvas_width: Option<u32>,
    pub canvas_height: Option<u32>,
    /// Enables the mask layer and object picking.
    pub picking: bool,
    /// Canvas clear color at the start of every frame. `None` keeps the previous frame.
    pub clear_color: Option<Color>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canvas_width: None,
            canvas_height: None,
            picking: true,
            clear_color: Some(Color::TRANSPARENT),
        }
    }
}

impl PipelineConfig {
    pub fn with_canvas_size(mut self, width: u32, height: u32) -> Self {
        self.canvas_width = Some(width);
        self.canvas_height = Some(height);
        self
    }

    pub fn with_picking(mut self, picking: bool) -> Self {
        self.picking = picking;
        self
    }

    pub fn with_clear_color(mut self, clear_color: Option<Color>) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// The requested canvas size, if both dimensions are set.
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        self.canvas_width.zip(self.canvas_height)
    }
}
