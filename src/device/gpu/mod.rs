//! [`GraphicsDevice`] on top of wgpu.
//!
//! Object handles map onto wgpu resources. State calls only update the
//! binding state; every clear and draw is recorded together with a snapshot
//! of the uniforms and textures it needs and encoded into render passes when
//! the frame ends (see `frame.rs`).

mod convert;
mod frame;
mod program;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use wgpu::util::DeviceExt;
use winit::window::Window;

use self::frame::{Command, Draw, FrameRecorder};
use self::program::{PipelineKey, Program};
use super::types::*;
use super::GraphicsDevice;
use crate::errors::{RenderError, Result};

/// Adapter and presentation preferences.
#[derive(Debug, Clone)]
pub struct GpuOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub present_mode: wgpu::PresentMode,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::default(),
            present_mode: wgpu::PresentMode::Fifo,
        }
    }
}

/// Collects errors wgpu could not hand back through a return value.
#[derive(Debug, Clone, Default)]
pub(super) struct ErrorSink(Arc<Mutex<Vec<String>>>);

impl ErrorSink {
    fn push(&self, message: String) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(message);
    }

    pub(super) fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

pub(super) struct GpuTexture {
    pub(super) texture: wgpu::Texture,
    pub(super) view: wgpu::TextureView,
    pub(super) sampler: wgpu::Sampler,
    pub(super) desc: TextureDescriptor,
}

impl GpuTexture {
    fn new(device: &wgpu::Device, desc: &TextureDescriptor) -> Self {
        let mut usage =
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT;
        if !desc.format.is_depth() {
            usage |= wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let address = convert::address_mode(desc.wrap);
        let filter = convert::filter(desc.filter);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
            desc: desc.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct Framebuffer {
    pub(super) attachments: BTreeMap<AttachmentPoint, TextureId>,
    pub(super) draw_buffers: Vec<AttachmentPoint>,
}

pub(super) enum DefaultTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        /// Whether the surface allows copies out of it.
        readable: bool,
        current: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    },
    Offscreen {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: DefaultTarget,
    target_format: TextureFormat,
    errors: ErrorSink,
    handles: HandleAllocator,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayDescriptor>,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    programs: HashMap<ProgramId, Program>,
    /// Sampled by units that have no texture bound.
    placeholder: GpuTexture,
    uniform_alignment: usize,
    state: BindingState,
    frame: FrameRecorder,
    in_frame: bool,
    capture_requested: bool,
    capture: Option<image::RgbaImage>,
}

impl WgpuDevice {
    /// Render into the surface of `window`.
    pub async fn windowed(window: Arc<Window>, options: &GpuOptions) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::allocation("surface", e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::allocation("adapter", e.to_string()))?;
        let (device, queue) = Self::open(&adapter).await?;

        let caps = surface.get_capabilities(&adapter);
        // Shaders write final values, so a non-sRGB surface shows them as is.
        let format = caps
            .formats
            .iter()
            .copied()
            .filter(|f| convert::from_wgpu_format(*f).is_some())
            .min_by_key(|f| f.is_srgb())
            .ok_or_else(|| RenderError::allocation("surface", "no supported surface format"))?;
        let target_format = convert::from_wgpu_format(format)
            .ok_or_else(|| RenderError::allocation("surface", "no supported surface format"))?;
        let readable = caps.usages.contains(wgpu::TextureUsages::COPY_SRC);
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if readable {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        let config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if caps.present_modes.contains(&options.present_mode) {
                options.present_mode
            } else {
                wgpu::PresentMode::Fifo
            },
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "Surface configured: {}x{} {:?} (readback {})",
            config.width,
            config.height,
            format,
            if readable { "available" } else { "unavailable" }
        );

        let target = DefaultTarget::Surface {
            surface,
            config,
            readable,
            current: None,
        };
        Ok(Self::assemble(device, queue, target, target_format))
    }

    /// Render into an offscreen texture standing in for a window.
    pub async fn headless(width: u32, height: u32, options: &GpuOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::allocation("adapter", e.to_string()))?;
        let (device, queue) = Self::open(&adapter).await?;
        let target_format = TextureFormat::Rgba8Unorm;
        let (texture, view) = Self::offscreen_texture(&device, width, height, target_format);
        Ok(Self::assemble(
            device,
            queue,
            DefaultTarget::Offscreen { texture, view },
            target_format,
        ))
    }

    async fn open(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
        let info = adapter.get_info();
        log::info!("Using adapter \"{}\" ({:?})", info.name, info.backend);
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("defer-ngin device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| RenderError::allocation("device", e.to_string()))
    }

    fn assemble(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: DefaultTarget,
        target_format: TextureFormat,
    ) -> Self {
        let errors = ErrorSink::default();
        let sink = errors.clone();
        device.on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            log::error!("wgpu: {e}");
            sink.push(e.to_string());
        }));

        let placeholder = GpuTexture::new(
            &device,
            &TextureDescriptor {
                label: "placeholder".to_string(),
                width: 1,
                height: 1,
                format: TextureFormat::Rgba8Unorm,
                filter: FilterMode::Nearest,
                wrap: WrapMode::ClampToEdge,
            },
        );
        Self::write_pixels(&queue, &placeholder, &[0, 0, 0, 255]);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Self {
            device,
            queue,
            target,
            target_format,
            errors,
            handles: HandleAllocator::default(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            placeholder,
            uniform_alignment,
            state: BindingState::default(),
            frame: FrameRecorder::default(),
            in_frame: false,
            capture_requested: false,
            capture: None,
        }
    }

    fn offscreen_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn write_pixels(queue: &wgpu::Queue, texture: &GpuTexture, pixels: &[u8]) {
        let desc = &texture.desc;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.format.bytes_per_pixel() * desc.width),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target_format(&self) -> TextureFormat {
        self.target_format
    }

    fn check_texture_size(&self, what: &str, width: u32, height: u32) -> Result<()> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::allocation(
                what,
                format!("{}x{} is outside 1..={}", width, height, max),
            ));
        }
        Ok(())
    }

    /// Color formats of the draw buffers and the depth format of `target`,
    /// or `None` if it cannot be rendered to.
    fn target_formats(
        &self,
        target: RenderTargetId,
    ) -> Option<(Vec<TextureFormat>, Option<TextureFormat>)> {
        match target {
            RenderTargetId::Default => Some((vec![self.target_format], None)),
            RenderTargetId::Framebuffer(id) => {
                if !self.framebuffer_status(id).is_complete() {
                    return None;
                }
                let fb = self.framebuffers.get(&id)?;
                let format = |texture: &TextureId| self.textures.get(texture).map(|t| t.desc.format);
                let colors = fb
                    .draw_buffers
                    .iter()
                    .map(|point| fb.attachments.get(point).and_then(format))
                    .collect::<Option<Vec<_>>>()?;
                let depth = fb.attachments.get(&AttachmentPoint::Depth).and_then(format);
                Some((colors, depth))
            }
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId> {
        if contents.len() as u64 > self.device.limits().max_buffer_size {
            return Err(RenderError::allocation(label, "buffer exceeds device limit"));
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        let id = BufferId(self.handles.next());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> Result<VertexArrayId> {
        if let Some(missing) = desc.bindings.iter().find(|b| !self.buffers.contains_key(&b.buffer)) {
            return Err(RenderError::Validation(format!(
                "vertex array '{}' refers to unknown buffer {}",
                desc.label,
                missing.buffer.raw()
            )));
        }
        let id = VertexArrayId(self.handles.next());
        self.vertex_arrays.insert(id, desc.clone());
        Ok(id)
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId) {
        if self.state.vertex_array == Some(vertex_array) {
            self.state.vertex_array = None;
        }
        self.vertex_arrays.remove(&vertex_array);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId> {
        self.check_texture_size(&desc.label, desc.width, desc.height)?;
        let texture = GpuTexture::new(&self.device, desc);
        let id = TextureId(self.handles.next());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, pixels: &[u8]) -> Result<()> {
        let gpu = self.textures.get(&texture).ok_or_else(|| {
            RenderError::RenderState(format!("texture {} does not exist", texture.raw()))
        })?;
        let desc = &gpu.desc;
        if desc.format.is_depth() {
            return Err(RenderError::Validation(format!(
                "depth texture '{}' cannot be uploaded to",
                desc.label
            )));
        }
        let expected = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
        if pixels.len() != expected {
            return Err(RenderError::Validation(format!(
                "texture '{}' expects {} bytes, got {}",
                desc.label,
                expected,
                pixels.len()
            )));
        }
        Self::write_pixels(&self.queue, gpu, pixels);
        Ok(())
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<()> {
        let mut desc = match self.textures.get(&texture) {
            Some(gpu) => gpu.desc.clone(),
            None => {
                return Err(RenderError::RenderState(format!(
                    "texture {} does not exist",
                    texture.raw()
                )));
            }
        };
        self.check_texture_size(&desc.label, width, height)?;
        desc.width = width;
        desc.height = height;
        let replacement = GpuTexture::new(&self.device, &desc);
        if let Some(old) = self.textures.insert(texture, replacement) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo> {
        self.textures.get(&texture).map(|t| TextureInfo {
            width: t.desc.width,
            height: t.desc.height,
            format: t.desc.format,
        })
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        for unit in self.state.units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
        if let Some(gpu) = self.textures.remove(&texture) {
            gpu.texture.destroy();
        }
    }

    fn create_framebuffer(&mut self, _label: &str) -> Result<FramebufferId> {
        let id = FramebufferId(self.handles.next());
        self.framebuffers.insert(id, Framebuffer::default());
        Ok(id)
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        texture: TextureId,
    ) -> Result<()> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::RenderState(format!(
                "texture {} does not exist",
                texture.raw()
            )));
        }
        let fb = self.framebuffers.get_mut(&framebuffer).ok_or_else(|| {
            RenderError::RenderState(format!("framebuffer {} does not exist", framebuffer.raw()))
        })?;
        fb.attachments.insert(point, texture);
        Ok(())
    }

    fn set_draw_buffers(
        &mut self,
        framebuffer: FramebufferId,
        buffers: &[AttachmentPoint],
    ) -> Result<()> {
        let fb = self.framebuffers.get_mut(&framebuffer).ok_or_else(|| {
            RenderError::RenderState(format!("framebuffer {} does not exist", framebuffer.raw()))
        })?;
        fb.draw_buffers = buffers.to_vec();
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::MissingAttachment;
        };
        let attachments: Vec<_> = fb
            .attachments
            .iter()
            .map(|(point, texture)| (*point, self.texture_info(*texture)))
            .collect();
        check_completeness(&attachments, &fb.draw_buffers)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.state.target == RenderTargetId::Framebuffer(framebuffer) {
            self.state.target = RenderTargetId::Default;
        }
        self.framebuffers.remove(&framebuffer);
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> Result<ProgramId> {
        let program = Program::link(&self.device, desc, &self.errors);
        if !program.linked() {
            log::error!("Program '{}' failed to link: {}", desc.label, program.log);
        }
        let id = ProgramId(self.handles.next());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn program_linked(&self, program: ProgramId) -> bool {
        self.programs.get(&program).is_some_and(Program::linked)
    }

    fn program_log(&self, program: ProgramId) -> String {
        self.programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program).filter(|p| p.linked())?;
        program
            .desc
            .uniforms
            .iter()
            .position(|u| u.name == name)
            .map(|i| UniformLocation(i as u32))
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.state.program == Some(program) {
            self.state.program = None;
        }
        self.programs.remove(&program);
    }

    fn bind_target(&mut self, target: RenderTargetId) {
        self.state.target = target;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.state.clear_color = color;
    }

    fn clear(&mut self, mask: ClearMask) {
        self.frame.commands.push(Command::Clear {
            target: self.state.target,
            mask,
            color: self.state.clear_color,
        });
    }

    fn set_depth_test(&mut self, func: Option<DepthFunc>) {
        self.state.depth_test = func;
    }

    fn set_cull_face(&mut self, face: Option<CullFace>) {
        self.state.cull_face = face;
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.state.program = program;
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<()> {
        let id = self
            .state
            .program
            .ok_or_else(|| RenderError::RenderState("no program in use".to_string()))?;
        let program = self
            .programs
            .get_mut(&id)
            .ok_or_else(|| RenderError::RenderState(format!("program {} does not exist", id.raw())))?;
        if !program.block.write(location, value) {
            return Err(RenderError::Validation(format!(
                "value {:?} does not fit uniform {} of '{}'",
                value, location.0, program.desc.label
            )));
        }
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match self.state.units.get_mut(unit as usize) {
            Some(slot) => *slot = texture,
            None => log::warn!("Texture unit {} is out of range", unit),
        }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.state.vertex_array = vertex_array;
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<()> {
        let program_id = self
            .state
            .program
            .ok_or_else(|| RenderError::RenderState("draw without a program".to_string()))?;
        let program = self
            .programs
            .get(&program_id)
            .filter(|p| p.linked())
            .ok_or_else(|| {
                RenderError::RenderState(format!("program {} is not linked", program_id.raw()))
            })?;
        let vertex_array = self
            .state
            .vertex_array
            .and_then(|id| self.vertex_arrays.get(&id))
            .ok_or_else(|| RenderError::RenderState("draw without a vertex array".to_string()))?;
        if count == 0 {
            return Ok(());
        }
        let Some((color_formats, depth_format)) = self.target_formats(self.state.target) else {
            log::warn!(
                "Skipping draw of '{}': target {:?} is not complete",
                program.desc.label,
                self.state.target
            );
            return Ok(());
        };
        let key = PipelineKey {
            vertex_layout: vertex_array
                .bindings
                .iter()
                .map(|b| b.layout.clone())
                .collect(),
            color_formats,
            depth_format,
            depth_test: self.state.depth_test,
            cull: self.state.cull_face,
        };
        let textures = program
            .block
            .sampler_units()
            .iter()
            .map(|unit| self.state.units.get(*unit as usize).copied().flatten())
            .collect();
        let vertex_buffers = vertex_array.bindings.iter().map(|b| b.buffer).collect();
        let uniform_offset = self
            .frame
            .push_uniforms(program.block.bytes(), self.uniform_alignment);
        self.frame.commands.push(Command::Draw(Draw {
            target: self.state.target,
            viewport: self.state.viewport,
            program: program_id,
            key,
            uniform_offset,
            textures,
            vertex_buffers,
            first,
            count,
        }));
        Ok(())
    }
}
