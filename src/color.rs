use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::normalize_rgba_color;

/// Represents a color in RGBA format.
///
/// Each channel is an 8-bit unsigned integer. Textures and render targets are stored with
/// premultiplied alpha, so a color read back from a target is premultiplied as well.
///
/// # Examples
///
/// ```
/// use pinta::Color;
///
/// let red = Color::rgb(255, 0, 0);
/// assert_eq!(red.normalize(), [1.0, 0.0, 0.0, 1.0]);
///
/// let semi_blue = Color::rgba(0, 0, 255, 128);
/// assert_eq!(semi_blue.to_array(), [0, 0, 255, 128]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color(pub [u8; 4]);

impl Color {
    /// A transparent color. All channels are zero.
    pub const TRANSPARENT: Self = Self([0, 0, 0, 0]);
    /// Opaque black.
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    /// Opaque white.
    pub const WHITE: Self = Self([255, 255, 255, 255]);

    /// Creates a new color with the specified RGB values and full opacity.
    ///
    /// ```
    /// use pinta::Color;
    ///
    /// let green = Color::rgb(0, 255, 0);
    /// assert_eq!(green, Color([0, 255, 0, 255]));
    /// ```
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    /// Creates a new color with the specified RGBA values.
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Normalizes the color values to the range [0.0, 1.0].
    pub fn normalize(&self) -> [f32; 4] {
        normalize_rgba_color(&self.0)
    }

    /// Inverse of [`Color::normalize`]. Channels are clamped and rounded to the nearest step,
    /// so `Color::from_normalized(c.normalize()) == c` for every color.
    pub fn from_normalized(channels: [f32; 4]) -> Self {
        let quantize = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self([
            quantize(channels[0]),
            quantize(channels[1]),
            quantize(channels[2]),
            quantize(channels[3]),
        ])
    }

    /// Returns the color as an array of 4 `u8` values.
    pub fn to_array(&self) -> [u8; 4] {
        self.0
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// Lookup key used by the mask layer. See [`ColorKey`].
    pub fn key(&self) -> ColorKey {
        ColorKey::from(*self)
    }
}

/// Mask-layer lookup key: six lowercase hex digits of RGB, an underscore, then the decimal
/// alpha value (`"ff8000_255"`).
///
/// The allocation path and the probe path both go through this type, so the two encodings
/// can't drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorKey(String);

impl ColorKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Color> for ColorKey {
    fn from(color: Color) -> Self {
        let [r, g, b, a] = color.0;
        Self(format!("{r:02x}{g:02x}{b:02x}_{a}"))
    }
}

impl fmt::Display for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_key_uses_hex_rgb_and_decimal_alpha() {
        assert_eq!(Color::rgb(255, 128, 0).key().as_str(), "ff8000_255");
        assert_eq!(Color::rgba(1, 2, 3, 7).key().as_str(), "010203_7");
        assert_eq!(Color::TRANSPARENT.key().as_str(), "000000_0");
    }

    #[test]
    fn from_normalized_inverts_normalize_for_every_channel_value() {
        for value in 0..=255u8 {
            let color = Color::rgba(value, 255 - value, value / 2, value);
            assert_eq!(Color::from_normalized(color.normalize()), color);
        }
    }

    #[test]
    fn from_normalized_clamps_out_of_range_channels() {
        assert_eq!(
            Color::from_normalized([-0.5, 1.5, 0.5, 1.0]),
            Color::rgba(0, 255, 128, 255)
        );
    }
}
