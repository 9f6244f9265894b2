//! Post-processing programs used by the scenes, each with a WGSL body and an equivalent CPU
//! fragment so the same scene renders on every context.

use pinta::{ProgramSource, UniformKind};

/// `rgb' = a - rgb` on premultiplied colors, alpha unchanged.
pub const INVERT_WGSL: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, in.uv);
    return vec4<f32>(vec3<f32>(color.a) - color.rgb, color.a);
}
"#;

/// Multiplies every channel by `u_tint`.
pub const TINT_WGSL: &str = r#"
struct Params {
    tint: vec4<f32>,
}
@group(1) @binding(1) var<uniform> params: Params;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(t_input, s_input, in.uv) * params.tint;
}
"#;

/// Rec. 601 luma.
pub const GRAYSCALE_WGSL: &str = r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, in.uv);
    let luma = dot(color.rgb, vec3<f32>(0.299, 0.587, 0.114));
    return vec4<f32>(vec3<f32>(luma), color.a);
}
"#;

pub fn invert() -> ProgramSource {
    ProgramSource::new("invert", INVERT_WGSL).with_cpu_fragment(|input| {
        let [r, g, b, a] = input.texel;
        Some([a - r, a - g, a - b, a])
    })
}

/// Expects a `u_tint` vec4 in the shader's uniform bag.
pub fn tint() -> ProgramSource {
    ProgramSource::new("tint", TINT_WGSL)
        .with_uniform("u_tint", UniformKind::Vec4)
        .with_cpu_fragment(|input| {
            let tint = input.vec4("u_tint");
            Some(std::array::from_fn(|channel| input.texel[channel] * tint[channel]))
        })
}

pub fn grayscale() -> ProgramSource {
    ProgramSource::new("grayscale", GRAYSCALE_WGSL).with_cpu_fragment(|input| {
        let [r, g, b, a] = input.texel;
        let luma = r * 0.299 + g * 0.587 + b * 0.114;
        Some([luma, luma, luma, a])
    })
}
