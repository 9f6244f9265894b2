//! Compilation of [`ProgramSource`]s into wgpu render pipelines.

use wgpu::util::DeviceExt;

use crate::context::{BlendMode, GlobalUniforms, ProgramSource};
use crate::draw_image::QuadVertex;
use crate::error::ContextError;
use crate::id::TextureHandle;
use crate::uniforms::UniformKind;

use super::CANVAS_FORMAT;

/// Vertex stage and engine bindings prepended to every program's fragment body.
pub(super) const PROGRAM_PREAMBLE: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

struct Globals {
    resolution: vec2<f32>,
    time: f32,
    _padding: f32,
};

@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;
@group(1) @binding(0) var<uniform> globals: Globals;

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(vertex.position, 0.0, 1.0);
    out.uv = vertex.uv;
    return out;
}
"#;

/// Concatenates the preamble, the texture-slot declarations and the fragment body.
pub(super) fn build_program_wgsl(source: &ProgramSource) -> String {
    let mut wgsl = String::from(PROGRAM_PREAMBLE);
    let texture_slots = source
        .uniforms
        .iter()
        .filter(|slot| slot.kind == UniformKind::Texture);
    for (binding, slot) in texture_slots.enumerate() {
        wgsl.push_str(&format!(
            "@group(2) @binding({binding}) var {}: texture_2d<f32>;\n",
            slot.name
        ));
    }
    wgsl.push('\n');
    wgsl.push_str(&source.wgsl_fragment);
    wgsl
}

/// Bind group layouts shared by every program of a context.
pub(super) struct SharedLayouts {
    pub input: wgpu::BindGroupLayout,
    pub globals: wgpu::BindGroupLayout,
    pub globals_and_params: wgpu::BindGroupLayout,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

impl SharedLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let input = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program_input_bgl"),
            entries: &[
                texture_entry(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let globals = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program_globals_bgl"),
            entries: &[uniform_entry(0)],
        });
        let globals_and_params = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program_globals_params_bgl"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });

        Self {
            input,
            globals,
            globals_and_params,
        }
    }
}

/// A compiled program and its per-program uniform storage.
pub(super) struct GpuProgram {
    pub source: ProgramSource,
    pub pipeline: wgpu::RenderPipeline,
    pub globals_buffer: wgpu::Buffer,
    pub params_buffer: Option<wgpu::Buffer>,
    pub uniform_bind_group: wgpu::BindGroup,
    pub texture_layout: Option<wgpu::BindGroupLayout>,
    /// Textures bound by the last upload, in slot order.
    pub texture_bindings: Vec<TextureHandle>,
    pub uploaded: bool,
}

fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Replace => None,
        BlendMode::PremultipliedOver => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

/// Compiles `source`. Validation errors raised by wgpu while building the module and the
/// pipeline are returned as [`ContextError::ProgramCompilation`].
pub(super) fn compile_program(
    device: &wgpu::Device,
    layouts: &SharedLayouts,
    source: &ProgramSource,
) -> Result<GpuProgram, ContextError> {
    let params_size: usize = source
        .uniforms
        .iter()
        .map(|slot| slot.kind.packed_size())
        .sum();
    let texture_slots = source.texture_slot_count();

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&source.label),
        source: wgpu::ShaderSource::Wgsl(build_program_wgsl(source).into()),
    });

    let texture_layout = (texture_slots > 0).then(|| {
        let entries: Vec<_> = (0..texture_slots as u32).map(texture_entry).collect();
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program_textures_bgl"),
            entries: &entries,
        })
    });

    let uniform_layout = if params_size > 0 {
        &layouts.globals_and_params
    } else {
        &layouts.globals
    };
    let mut bind_group_layouts = vec![&layouts.input, uniform_layout];
    if let Some(texture_layout) = texture_layout.as_ref() {
        bind_group_layouts.push(texture_layout);
    }

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("program_pipeline_layout"),
        bind_group_layouts: &bind_group_layouts,
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&source.label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: CANVAS_FORMAT,
                blend: blend_state(source.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(ContextError::ProgramCompilation(format!(
            "`{}`: {}",
            source.label, error
        )));
    }

    let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("program_globals"),
        contents: bytemuck::bytes_of(&GlobalUniforms::default()),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let params_buffer = (params_size > 0).then(|| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("program_params"),
            size: params_size as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    });

    let mut entries = vec![wgpu::BindGroupEntry {
        binding: 0,
        resource: globals_buffer.as_entire_binding(),
    }];
    if let Some(params_buffer) = params_buffer.as_ref() {
        entries.push(wgpu::BindGroupEntry {
            binding: 1,
            resource: params_buffer.as_entire_binding(),
        });
    }
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("program_uniforms_bg"),
        layout: uniform_layout,
        entries: &entries,
    });

    Ok(GpuProgram {
        source: source.clone(),
        pipeline,
        globals_buffer,
        params_buffer,
        uniform_bind_group,
        texture_layout,
        texture_bindings: Vec::new(),
        uploaded: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_slots_are_declared_in_group_two() {
        let source = ProgramSource::new("overlay", "@fragment fn fs_main() {}")
            .with_uniform("u_amount", UniformKind::Float)
            .with_uniform("u_overlay", UniformKind::Texture)
            .with_uniform("u_noise", UniformKind::Texture);

        let wgsl = build_program_wgsl(&source);

        assert!(wgsl.contains("@group(2) @binding(0) var u_overlay: texture_2d<f32>;"));
        assert!(wgsl.contains("@group(2) @binding(1) var u_noise: texture_2d<f32>;"));
        assert!(!wgsl.contains("var u_amount"));
        assert!(wgsl.ends_with("@fragment fn fs_main() {}"));
    }

    #[test]
    fn preamble_matches_the_global_uniform_layout() {
        assert_eq!(std::mem::size_of::<GlobalUniforms>(), 16);
        assert!(PROGRAM_PREAMBLE.contains("@group(1) @binding(0) var<uniform> globals"));
    }
}
