pub fn normalize_rgba_color(color: &[u8; 4]) -> [f32; 4] {
    [
        color[0] as f32 / 255.0,
        color[1] as f32 / 255.0,
        color[2] as f32 / 255.0,
        color[3] as f32 / 255.0,
    ]
}

/// Maps a top-left-origin pixel position into normalized device coordinates.
#[inline(always)]
pub(crate) fn pixel_to_ndc(point: [f32; 2], target_size: (u32, u32)) -> [f32; 2] {
    [
        2.0 * point[0] / target_size.0 as f32 - 1.0,
        1.0 - 2.0 * point[1] / target_size.1 as f32,
    ]
}

/// Rows copied out of a texture must be padded to `COPY_BYTES_PER_ROW_ALIGNMENT`.
/// Returns `(unpadded, padded)` bytes per row.
pub(crate) fn compute_padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> (u32, u32) {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;
    (unpadded, padded)
}

/// Converts straight-alpha RGBA8 pixels to premultiplied alpha in place.
///
/// Every bundled context blends with premultiplied alpha; upload textures in that form to
/// avoid dark fringes around transparent edges.
pub fn premultiply_rgba8_inplace(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        let alpha = pixel[3] as u32;
        if alpha == 255 {
            continue;
        }
        for channel in &mut pixel[..3] {
            *channel = ((*channel as u32 * alpha + 127) / 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_to_ndc_maps_corners() {
        assert_eq!(pixel_to_ndc([0.0, 0.0], (100, 50)), [-1.0, 1.0]);
        assert_eq!(pixel_to_ndc([100.0, 50.0], (100, 50)), [1.0, -1.0]);
        assert_eq!(pixel_to_ndc([50.0, 25.0], (100, 50)), [0.0, 0.0]);
    }

    #[test]
    fn padded_bytes_per_row_rounds_up_to_alignment() {
        assert_eq!(compute_padded_bytes_per_row(1, 4), (4, 256));
        assert_eq!(compute_padded_bytes_per_row(64, 4), (256, 256));
        assert_eq!(compute_padded_bytes_per_row(65, 4), (260, 512));
    }

    #[test]
    fn premultiply_scales_color_channels_by_alpha() {
        let mut pixels = vec![255, 128, 0, 128, 10, 20, 30, 255, 200, 200, 200, 0];
        premultiply_rgba8_inplace(&mut pixels);
        assert_eq!(pixels, vec![128, 64, 0, 128, 10, 20, 30, 255, 0, 0, 0, 0]);
    }
}
