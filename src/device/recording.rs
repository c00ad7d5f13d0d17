//! A CPU-only [`GraphicsDevice`] that remembers what it was asked to do.
//!
//! Objects are tracked with the same validation rules as the GPU backend, draws
//! and clears are appended to a command log together with the binding state
//! they were issued under. Failures can be injected to exercise error paths.

use std::collections::{BTreeMap, HashMap};

use super::types::*;
use super::{GraphicsDevice, RenderTarget};
use crate::errors::{RenderError, Result};

/// A draw call together with the state it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub frame: u64,
    pub target: RenderTargetId,
    pub viewport: Option<Viewport>,
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub first: u32,
    pub count: u32,
    pub depth_test: Option<DepthFunc>,
    pub cull_face: Option<CullFace>,
    pub texture_units: [Option<TextureId>; MAX_TEXTURE_UNITS],
    /// Uniform values of the program at draw time, by name.
    pub uniforms: HashMap<String, UniformValue>,
}

impl RecordedDraw {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Clear {
        frame: u64,
        target: RenderTargetId,
        mask: ClearMask,
        color: [f32; 4],
    },
    Draw(RecordedDraw),
}

#[derive(Debug)]
struct TextureRecord {
    desc: TextureDescriptor,
    uploads: usize,
}

#[derive(Debug, Default)]
struct FramebufferRecord {
    attachments: BTreeMap<AttachmentPoint, TextureId>,
    draw_buffers: Vec<AttachmentPoint>,
}

#[derive(Debug)]
struct ProgramRecord {
    desc: ProgramDescriptor,
    linked: bool,
    log: String,
    values: HashMap<UniformLocation, UniformValue>,
}

#[derive(Debug)]
pub struct RecordingDevice {
    handles: HandleAllocator,
    size: (u32, u32),
    buffers: HashMap<BufferId, usize>,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayDescriptor>,
    textures: HashMap<TextureId, TextureRecord>,
    framebuffers: HashMap<FramebufferId, FramebufferRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    state: BindingState,
    commands: Vec<Command>,
    frame: u64,
    frames_completed: u64,
    in_frame: bool,
    allocations_left: Option<usize>,
    max_texture_size: u32,
    force_incomplete: bool,
    capture_requested: bool,
    capture: Option<image::RgbaImage>,
    visible_color: [f32; 4],
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            handles: HandleAllocator::default(),
            size: (width, height),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            state: BindingState::default(),
            commands: Vec::new(),
            frame: 0,
            frames_completed: 0,
            in_frame: false,
            allocations_left: None,
            max_texture_size: 8192,
            force_incomplete: false,
            capture_requested: false,
            capture: None,
            visible_color: [0.0; 4],
        }
    }

    /// Let `count` more objects be created, then refuse every allocation.
    pub fn fail_allocations_after(&mut self, count: usize) {
        self.allocations_left = Some(count);
    }

    pub fn set_max_texture_size(&mut self, size: u32) {
        self.max_texture_size = size;
    }

    /// Make every framebuffer report itself incomplete.
    pub fn force_incomplete_framebuffers(&mut self, incomplete: bool) {
        self.force_incomplete = incomplete;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_log(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw(draw) => Some(draw),
            Command::Clear { .. } => None,
        })
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn buffer_len(&self, buffer: BufferId) -> Option<usize> {
        self.buffers.get(&buffer).copied()
    }

    pub fn vertex_array(&self, vertex_array: VertexArrayId) -> Option<&VertexArrayDescriptor> {
        self.vertex_arrays.get(&vertex_array)
    }

    pub fn texture_descriptor(&self, texture: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(&texture).map(|t| &t.desc)
    }

    pub fn texture_uploads(&self, texture: TextureId) -> usize {
        self.textures.get(&texture).map_or(0, |t| t.uploads)
    }

    pub fn attachment(&self, framebuffer: FramebufferId, point: AttachmentPoint) -> Option<TextureId> {
        self.framebuffers
            .get(&framebuffer)
            .and_then(|fb| fb.attachments.get(&point).copied())
    }

    pub fn draw_buffers(&self, framebuffer: FramebufferId) -> Option<&[AttachmentPoint]> {
        self.framebuffers
            .get(&framebuffer)
            .map(|fb| fb.draw_buffers.as_slice())
    }

    pub fn current_target(&self) -> RenderTargetId {
        self.state.target
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.state.viewport
    }

    pub fn depth_test(&self) -> Option<DepthFunc> {
        self.state.depth_test
    }

    pub fn cull_face(&self) -> Option<CullFace> {
        self.state.cull_face
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.state.program
    }

    pub fn texture_unit(&self, unit: u32) -> Option<TextureId> {
        self.state.units.get(unit as usize).copied().flatten()
    }

    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let record = self.programs.get(&program)?;
        let location = self.uniform_location(program, name)?;
        record.values.get(&location).copied()
    }

    fn allocate(&mut self, what: &str) -> Result<u32> {
        match self.allocations_left {
            Some(0) => Err(RenderError::allocation(what, "allocation limit reached")),
            Some(ref mut left) => {
                *left -= 1;
                Ok(self.handles.next())
            }
            None => Ok(self.handles.next()),
        }
    }

    fn check_size(&self, what: &str, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 || width > self.max_texture_size || height > self.max_texture_size {
            return Err(RenderError::allocation(
                what,
                format!(
                    "{}x{} is outside 1..={}",
                    width, height, self.max_texture_size
                ),
            ));
        }
        Ok(())
    }

    fn link(desc: &ProgramDescriptor) -> (bool, String) {
        for stage in [&desc.vertex, &desc.fragment] {
            if stage.source.trim().is_empty() {
                return (false, "empty shader stage".to_string());
            }
            if !stage.source.contains(&format!("fn {}", stage.entry_point)) {
                return (
                    false,
                    format!("entry point '{}' not found", stage.entry_point),
                );
            }
        }
        let mut names: Vec<&str> = desc.uniforms.iter().map(|u| u.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return (false, format!("uniform '{}' declared twice", pair[0]));
        }
        (true, String::new())
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId> {
        let id = BufferId(self.allocate(label)?);
        self.buffers.insert(id, contents.len());
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> Result<VertexArrayId> {
        if let Some(missing) = desc.bindings.iter().find(|b| !self.buffers.contains_key(&b.buffer)) {
            return Err(RenderError::Validation(format!(
                "vertex array '{}' refers to unknown buffer {}",
                desc.label,
                missing.buffer.raw()
            )));
        }
        let id = VertexArrayId(self.allocate(&desc.label)?);
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
        self.check_size(&desc.label, desc.width, desc.height)?;
        let id = TextureId(self.allocate(&desc.label)?);
        self.textures.insert(
            id,
            TextureRecord {
                desc: desc.clone(),
                uploads: 0,
            },
        );
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, pixels: &[u8]) -> Result<()> {
        let record = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| RenderError::RenderState(format!("texture {} does not exist", texture.raw())))?;
        let expected =
            (record.desc.width * record.desc.height * record.desc.format.bytes_per_pixel()) as usize;
        if pixels.len() != expected {
            return Err(RenderError::Validation(format!(
                "texture '{}' expects {} bytes, got {}",
                record.desc.label,
                expected,
                pixels.len()
            )));
        }
        record.uploads += 1;
        Ok(())
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<()> {
        let label = match self.textures.get(&texture) {
            Some(record) => record.desc.label.clone(),
            None => {
                return Err(RenderError::RenderState(format!(
                    "texture {} does not exist",
                    texture.raw()
                )));
            }
        };
        self.check_size(&label, width, height)?;
        if let Some(record) = self.textures.get_mut(&texture) {
            record.desc.width = width;
            record.desc.height = height;
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
        self.textures.remove(&texture);
    }

    fn create_framebuffer(&mut self, label: &str) -> Result<FramebufferId> {
        let id = FramebufferId(self.allocate(label)?);
        self.framebuffers.insert(id, FramebufferRecord::default());
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
        if self.force_incomplete {
            return FramebufferStatus::IncompleteAttachment;
        }
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
        let id = ProgramId(self.allocate(&desc.label)?);
        let (linked, log) = Self::link(desc);
        self.programs.insert(
            id,
            ProgramRecord {
                desc: desc.clone(),
                linked,
                log,
                values: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn program_linked(&self, program: ProgramId) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    fn program_log(&self, program: ProgramId) -> String {
        self.programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let record = self.programs.get(&program)?;
        if !record.linked {
            return None;
        }
        record
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
        if self.state.target == RenderTargetId::Default && mask.contains(ClearMask::COLOR) {
            self.visible_color = self.state.clear_color;
        }
        self.commands.push(Command::Clear {
            frame: self.frame,
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
        let program = self
            .state
            .program
            .ok_or_else(|| RenderError::RenderState("no program in use".to_string()))?;
        let record = self
            .programs
            .get_mut(&program)
            .ok_or_else(|| RenderError::RenderState(format!("program {} does not exist", program.raw())))?;
        let decl = record.desc.uniforms.get(location.0 as usize).ok_or_else(|| {
            RenderError::Validation(format!("program '{}' has no uniform {}", record.desc.label, location.0))
        })?;
        if !value.fits(decl.ty) {
            return Err(RenderError::Validation(format!(
                "uniform '{}' is {:?}, got {:?}",
                decl.name, decl.ty, value
            )));
        }
        record.values.insert(location, value);
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
        let program = self
            .state
            .program
            .ok_or_else(|| RenderError::RenderState("draw without a program".to_string()))?;
        let record = self
            .programs
            .get(&program)
            .filter(|p| p.linked)
            .ok_or_else(|| RenderError::RenderState(format!("program {} is not linked", program.raw())))?;
        let vertex_array = self
            .state
            .vertex_array
            .filter(|v| self.vertex_arrays.contains_key(v))
            .ok_or_else(|| RenderError::RenderState("draw without a vertex array".to_string()))?;
        let uniforms = record
            .values
            .iter()
            .filter_map(|(location, value)| {
                record
                    .desc
                    .uniforms
                    .get(location.0 as usize)
                    .map(|decl| (decl.name.clone(), *value))
            })
            .collect();
        let draw = RecordedDraw {
            frame: self.frame,
            target: self.state.target,
            viewport: self.state.viewport,
            program,
            vertex_array,
            first,
            count,
            depth_test: self.state.depth_test,
            cull_face: self.state.cull_face,
            texture_units: self.state.units,
            uniforms,
        };
        self.commands.push(Command::Draw(draw));
        Ok(())
    }
}

impl RenderTarget for RecordingDevice {
    fn begin_frame(&mut self) -> Result<()> {
        if self.in_frame {
            return Err(RenderError::RenderState("frame already begun".to_string()));
        }
        self.in_frame = true;
        self.frame += 1;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            return Err(RenderError::RenderState("end_frame without begin_frame".to_string()));
        }
        self.in_frame = false;
        self.frames_completed += 1;
        if self.capture_requested {
            self.capture_requested = false;
            let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            let [r, g, b, a] = self.visible_color.map(to_u8);
            self.capture = Some(image::RgbaImage::from_pixel(
                self.size.0,
                self.size.1,
                image::Rgba([r, g, b, a]),
            ));
        }
        Ok(())
    }

    fn abort_frame(&mut self) {
        let frame = self.frame;
        self.commands.retain(|c| match c {
            Command::Clear { frame: f, .. } => *f != frame,
            Command::Draw(draw) => draw.frame != frame,
        });
        self.in_frame = false;
        self.capture_requested = false;
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn request_capture(&mut self) {
        self.capture_requested = true;
    }

    fn take_capture(&mut self) -> Option<image::RgbaImage> {
        self.capture.take()
    }
}
