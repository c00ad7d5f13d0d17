//! Explicit binding state on top of a [`GraphicsDevice`].
//!
//! [`RenderContext`] owns the device and mirrors every binding it forwards, so
//! the renderer can ask what is bound instead of relying on hidden global
//! state. [`GeometryPass`] is the capability handed out while an offscreen
//! target is bound; meshes can only be drawn through it.

use crate::{
    device::{
        ClearMask, CullFace, DepthFunc, GraphicsDevice, MAX_TEXTURE_UNITS, ProgramId,
        RenderTarget, RenderTargetId, TextureId, UniformLocation, UniformValue, VertexArrayId,
        Viewport,
    },
    errors::{RenderError, Result},
    shader::Shader,
};

/// What the context believes is currently bound on the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings {
    pub target: RenderTargetId,
    pub viewport: Option<Viewport>,
    pub program: Option<ProgramId>,
    pub vertex_array: Option<VertexArrayId>,
    pub texture_units: [Option<TextureId>; MAX_TEXTURE_UNITS],
    pub depth_test: Option<DepthFunc>,
    pub cull_face: Option<CullFace>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            target: RenderTargetId::Default,
            viewport: None,
            program: None,
            vertex_array: None,
            texture_units: [None; MAX_TEXTURE_UNITS],
            depth_test: None,
            cull_face: None,
        }
    }
}

#[derive(Debug)]
pub struct RenderContext<D: GraphicsDevice> {
    device: D,
    bindings: Bindings,
}

impl<D: GraphicsDevice> RenderContext<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            bindings: Bindings::default(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Direct device access for object creation. Binding changes should go
    /// through the context so [`RenderContext::bindings`] stays accurate.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn bind_target(&mut self, target: RenderTargetId) {
        self.device.bind_target(target);
        self.bindings.target = target;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.device.set_viewport(viewport);
        self.bindings.viewport = Some(viewport);
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.device.set_clear_color(color);
    }

    pub fn clear(&mut self, mask: ClearMask) {
        self.device.clear(mask);
    }

    pub fn set_depth_test(&mut self, func: Option<DepthFunc>) {
        self.device.set_depth_test(func);
        self.bindings.depth_test = func;
    }

    pub fn set_cull_face(&mut self, face: Option<CullFace>) {
        self.device.set_cull_face(face);
        self.bindings.cull_face = face;
    }

    /// Make `shader` current. Fails if its program never linked.
    pub fn use_shader(&mut self, shader: &Shader) -> Result<()> {
        if !self.device.program_linked(shader.program()) {
            return Err(RenderError::RenderState(format!(
                "shader '{}' is not linked",
                shader.label()
            )));
        }
        self.device.use_program(Some(shader.program()));
        self.bindings.program = Some(shader.program());
        Ok(())
    }

    pub fn release_program(&mut self) {
        self.device.use_program(None);
        self.bindings.program = None;
    }

    /// Uniforms the program does not declare resolve to `None` and are
    /// silently skipped.
    pub fn set_uniform(
        &mut self,
        location: Option<UniformLocation>,
        value: impl Into<UniformValue>,
    ) -> Result<()> {
        match location {
            Some(location) => self.device.set_uniform(location, value.into()),
            None => Ok(()),
        }
    }

    pub fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.device.bind_texture(unit, texture);
        if let Some(slot) = self.bindings.texture_units.get_mut(unit as usize) {
            *slot = texture;
        }
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.device.bind_vertex_array(vertex_array);
        self.bindings.vertex_array = vertex_array;
    }

    pub fn draw_arrays(&mut self, first: u32, count: u32) -> Result<()> {
        self.device.draw_arrays(first, count)
    }
}

impl<D: GraphicsDevice + RenderTarget> RenderContext<D> {
    pub fn begin_frame(&mut self) -> Result<()> {
        self.device.begin_frame()
    }

    pub fn end_frame(&mut self) -> Result<()> {
        self.device.end_frame()
    }

    pub fn abort_frame(&mut self) {
        self.device.abort_frame();
    }

    pub fn resize_target(&mut self, width: u32, height: u32) {
        RenderTarget::resize(&mut self.device, width, height);
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.device.size()
    }

    /// Ask for the visible target of the next completed frame.
    pub fn request_capture(&mut self) {
        self.device.request_capture();
    }

    pub fn take_capture(&mut self) -> Option<image::RgbaImage> {
        self.device.take_capture()
    }
}

/// Proof that an offscreen framebuffer is bound for the geometry pass.
///
/// Dropping it, or calling [`GeometryPass::unbind`], binds the default target
/// again.
pub struct GeometryPass<'a, D: GraphicsDevice> {
    ctx: &'a mut RenderContext<D>,
    size: (u32, u32),
}

impl<'a, D: GraphicsDevice> GeometryPass<'a, D> {
    pub(crate) fn new(ctx: &'a mut RenderContext<D>, size: (u32, u32)) -> Self {
        Self { ctx, size }
    }

    pub fn context(&mut self) -> &mut RenderContext<D> {
        self.ctx
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn unbind(self) {}
}

impl<D: GraphicsDevice> Drop for GeometryPass<'_, D> {
    fn drop(&mut self) {
        self.ctx.bind_target(RenderTargetId::Default);
    }
}
