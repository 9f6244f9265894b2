//! [`RenderContext`] on top of wgpu.
//!
//! Every handle maps to a wgpu object: textures to `Rgba8Unorm` textures, framebuffers to a
//! texture attachment, programs to a render pipeline built from the program's WGSL body (see
//! [`ProgramSource`] for the bindings the body can rely on). The canvas is an off-screen
//! texture; hosts that present it copy it out through [`WgpuContext::canvas_texture`].
//!
//! Each draw, clear and read is submitted on its own. The context favors predictable
//! ordering over batching, which suits the pipeline's one-sprite-at-a-time access pattern.

use ahash::{HashMap, HashMapExt};
use tracing::{debug, info, trace};
use wgpu::util::DeviceExt;
use wgpu::InstanceDescriptor;

use crate::color::Color;
use crate::context::{validate_texture_data, DrawCall, ProgramSource, RenderContext};
use crate::error::{ContextError, ResourceKind};
use crate::id::{FramebufferHandle, HandleAllocator, ProgramHandle, TextureHandle};

mod program;
mod textures;

use program::{GpuProgram, SharedLayouts};
use textures::{create_nearest_sampler, read_texel, GpuTexture, TextureStorage};

/// Format of every texture the context creates, the canvas included. Contents are
/// premultiplied.
pub const CANVAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layouts: SharedLayouts,
    sampler: wgpu::Sampler,
    handles: HandleAllocator,
    canvas: TextureStorage,
    textures: HashMap<TextureHandle, GpuTexture>,
    framebuffers: HashMap<FramebufferHandle, Option<TextureHandle>>,
    programs: HashMap<ProgramHandle, GpuProgram>,
    bound: Option<FramebufferHandle>,
    viewport: Option<(u32, u32)>,
}

impl WgpuContext {
    /// Creates a context on the best available adapter without a surface. Returns `None`
    /// when no adapter or device is available (e.g. on CI without a GPU).
    pub async fn try_new_headless(width: u32, height: u32) -> Option<Self> {
        let instance = wgpu::Instance::new(&InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .ok()?;

        info!("Using adapter {:?}", adapter.get_info().name);
        Some(Self::from_device(device, queue, (width, height)))
    }

    /// Blocking variant of [`WgpuContext::try_new_headless`].
    pub fn new_headless(width: u32, height: u32) -> Option<Self> {
        pollster::block_on(Self::try_new_headless(width, height))
    }

    /// Wraps a device the host already owns.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, size: (u32, u32)) -> Self {
        let layouts = SharedLayouts::new(&device);
        let sampler = create_nearest_sampler(&device);
        let canvas = TextureStorage::new(&device, size, "canvas");

        Self {
            device,
            queue,
            layouts,
            sampler,
            handles: HandleAllocator::default(),
            canvas,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            bound: None,
            viewport: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The drawing buffer. Copy it to a surface texture to present a frame.
    pub fn canvas_texture(&self) -> &wgpu::Texture {
        &self.canvas.texture
    }

    /// The texture backing a handle, once it has storage.
    pub fn texture(&self, texture: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures
            .get(&texture)?
            .storage
            .as_ref()
            .map(|storage| &storage.texture)
    }

    fn storage(&self, texture: TextureHandle) -> Result<&TextureStorage, ContextError> {
        self.textures
            .get(&texture)
            .and_then(|texture| texture.storage.as_ref())
            .ok_or(ContextError::UnknownTexture(texture))
    }

    /// Texture a framebuffer renders into. `None` stands for the canvas.
    fn target_texture(
        &self,
        framebuffer: Option<FramebufferHandle>,
    ) -> Result<Option<TextureHandle>, ContextError> {
        let Some(framebuffer) = framebuffer else {
            return Ok(None);
        };
        let attached = self
            .framebuffers
            .get(&framebuffer)
            .ok_or(ContextError::UnknownFramebuffer(framebuffer))?
            .ok_or(ContextError::IncompleteFramebuffer(framebuffer))?;
        Ok(Some(attached))
    }

    fn target_storage(
        &self,
        target: Option<TextureHandle>,
    ) -> Result<&TextureStorage, ContextError> {
        match target {
            None => Ok(&self.canvas),
            Some(texture) => self.storage(texture),
        }
    }

    fn upload_uniforms(&mut self, call: &DrawCall<'_>) -> Result<(), ContextError> {
        let program = self
            .programs
            .get_mut(&call.program)
            .ok_or(ContextError::UnknownProgram(call.program))?;

        match call.uniforms {
            Some(uniforms) => {
                let params = uniforms.pack(&program.source.uniforms)?;
                program.texture_bindings = uniforms.textures(&program.source.uniforms)?;
                if let Some(buffer) = program.params_buffer.as_ref() {
                    self.queue.write_buffer(buffer, 0, &params);
                }
                program.uploaded = true;
                trace!("Uploaded {} uniforms to program {}", uniforms.len(), call.program);
            }
            None if !program.uploaded && !program.source.uniforms.is_empty() => {
                return Err(ContextError::UniformMismatch {
                    name: program.source.uniforms[0].name.to_string(),
                    reason: format!("program {} was drawn before any upload", call.program),
                });
            }
            None => {}
        }

        self.queue
            .write_buffer(&program.globals_buffer, 0, bytemuck::bytes_of(call.globals));
        Ok(())
    }
}

impl RenderContext for WgpuContext {
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, ContextError> {
        let handle = FramebufferHandle(self.handles.next());
        self.framebuffers.insert(handle, None);
        Ok(handle)
    }

    fn create_texture(&mut self) -> Result<TextureHandle, ContextError> {
        let handle = TextureHandle(self.handles.next());
        self.textures.insert(handle, GpuTexture::default());
        Ok(handle)
    }

    fn attach_texture_to_framebuffer(
        &mut self,
        texture: TextureHandle,
        framebuffer: FramebufferHandle,
    ) -> Result<(), ContextError> {
        if !self.textures.contains_key(&texture) {
            return Err(ContextError::UnknownTexture(texture));
        }
        let attachment = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(ContextError::UnknownFramebuffer(framebuffer))?;
        *attachment = Some(texture);
        Ok(())
    }

    fn bind_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        viewport: Option<(u32, u32)>,
    ) -> Result<(), ContextError> {
        if let Some(handle) = framebuffer {
            if !self.framebuffers.contains_key(&handle) {
                return Err(ContextError::UnknownFramebuffer(handle));
            }
        }
        self.bound = framebuffer;
        self.viewport = viewport;
        Ok(())
    }

    fn specify_texture_image(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<(), ContextError> {
        validate_texture_data(width, height, data)?;
        let slot = self
            .textures
            .get_mut(&texture)
            .ok_or(ContextError::UnknownTexture(texture))?;

        let storage = TextureStorage::new(&self.device, (width, height), "pinta_texture");
        if let Some(data) = data {
            storage.write(&self.queue, data);
        }
        slot.storage = Some(storage);
        Ok(())
    }

    fn clear_framebuffer(
        &mut self,
        framebuffer: Option<FramebufferHandle>,
        color: Color,
    ) -> Result<(), ContextError> {
        let target = self.target_texture(framebuffer)?;
        let storage = self.target_storage(target)?;
        let [r, g, b, a] = color.normalize().map(f64::from);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear_encoder"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &storage.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ContextError> {
        let program = program::compile_program(&self.device, &self.layouts, source)?;
        let handle = ProgramHandle(self.handles.next());
        self.programs.insert(handle, program);
        debug!("Compiled wgpu program {} ({})", handle, source.label);
        Ok(handle)
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), ContextError> {
        let target_handle = self.target_texture(self.bound)?;
        if target_handle == Some(call.texture) {
            return Err(ContextError::UniformMismatch {
                name: "t_input".into(),
                reason: format!("texture {} is also the render target", call.texture),
            });
        }

        self.upload_uniforms(call)?;

        let program = self
            .programs
            .get(&call.program)
            .ok_or(ContextError::UnknownProgram(call.program))?;
        let target = self.target_storage(target_handle)?;
        let input = self.storage(call.texture)?;

        let (viewport_width, viewport_height) = self.viewport.unwrap_or(target.size);
        let viewport = (
            viewport_width.min(target.size.0).max(1),
            viewport_height.min(target.size.1).max(1),
        );

        let vertices = call.geometry.vertices(viewport);
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad_vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let input_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("program_input_bg"),
            layout: &self.layouts.input,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let texture_bind_group = match program.texture_layout.as_ref() {
            Some(layout) => {
                let views = program
                    .texture_bindings
                    .iter()
                    .map(|&texture| self.storage(texture).map(|storage| &storage.view))
                    .collect::<Result<Vec<_>, _>>()?;
                let entries: Vec<_> = views
                    .iter()
                    .enumerate()
                    .map(|(binding, view)| wgpu::BindGroupEntry {
                        binding: binding as u32,
                        resource: wgpu::BindingResource::TextureView(view),
                    })
                    .collect();
                Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("program_textures_bg"),
                    layout,
                    entries: &entries,
                }))
            }
            None => None,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("draw_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&program.source.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_viewport(
                0.0,
                0.0,
                viewport.0 as f32,
                viewport.1 as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &input_bind_group, &[]);
            pass.set_bind_group(1, &program.uniform_bind_group, &[]);
            if let Some(texture_bind_group) = texture_bind_group.as_ref() {
                pass.set_bind_group(2, texture_bind_group, &[]);
            }
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..4, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixel(
        &mut self,
        x: u32,
        y: u32,
        framebuffer: Option<FramebufferHandle>,
    ) -> Result<Color, ContextError> {
        let target = self.target_texture(framebuffer)?;
        let storage = self.target_storage(target)?;
        if x >= storage.size.0 || y >= storage.size.1 {
            return Err(ContextError::Readback(format!(
                "pixel ({x}, {y}) is outside the {}x{} target",
                storage.size.0, storage.size.1
            )));
        }
        read_texel(&self.device, &self.queue, storage, x, y)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(storage) = self.textures.remove(&texture).and_then(|t| t.storage) {
            storage.texture.destroy();
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer);
        if self.bound == Some(framebuffer) {
            self.bound = None;
            self.viewport = None;
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.canvas.size
    }

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) -> Result<(), ContextError> {
        if width == 0 || height == 0 {
            return Err(ContextError::ResourceCreation(ResourceKind::Texture));
        }
        self.canvas.texture.destroy();
        self.canvas = TextureStorage::new(&self.device, (width, height), "canvas");
        Ok(())
    }
}
