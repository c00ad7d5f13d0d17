//! The two-pass deferred renderer.
//!
//! [`RenderPipeline`] owns the scene, the G-buffer, the full-screen quad and
//! the programs of both passes. Each [`RenderPipeline::render_frame`] runs the
//! geometry pass (every actor into the G-buffer, in insertion order) and then
//! the lighting pass (the G-buffer shaded onto the visible target).
//!
//! # Lifecycle
//!
//! `Uninitialized` until the first [`RenderPipeline::resize`], then `Ready`
//! until [`RenderPipeline::teardown`] moves it to the terminal `TornDown`.

use std::collections::HashMap;

use cgmath::{Deg, Matrix4, SquareMatrix};

use crate::{
    config::RendererConfig,
    context::RenderContext,
    data_structures::{
        gbuffer::GBuffer,
        mesh::MeshResource,
        quad::ScreenQuad,
        scene::{Actor, Scene, ShaderSlot},
    },
    device::{ClearMask, CullFace, DepthFunc, GraphicsDevice, RenderTargetId, UniformValue, Viewport},
    errors::{RenderError, Result},
    pipelines::{geometry::GeometryShader, lighting::LightingShader},
};

/// Maps OpenGL clip space depth (-1..1) to the 0..1 range wgpu expects.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    TornDown,
}

/// Per-frame inputs shared by every draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    /// Seconds since the pipeline was created.
    pub time: f32,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            time: 0.0,
        }
    }
}

/// Perspective projection for a `width` x `height` target.
pub fn projection(config: &RendererConfig, width: u32, height: u32) -> Matrix4<f32> {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    OPENGL_TO_WGPU_MATRIX * cgmath::perspective(Deg(config.fov_y), aspect, config.near, config.far)
}

pub struct RenderPipeline {
    config: RendererConfig,
    state: PipelineState,
    frame: FrameState,
    surface_size: (u32, u32),
    scene: Scene,
    gbuffer: GBuffer,
    quad: ScreenQuad,
    geometry_shader: GeometryShader,
    lighting_shader: LightingShader,
    shaders: HashMap<String, GeometryShader>,
    started: instant::Instant,
}

impl RenderPipeline {
    /// Link the built-in programs. A link failure is fatal: there is no
    /// fallback shader.
    pub fn new<D: GraphicsDevice>(ctx: &mut RenderContext<D>, config: RendererConfig) -> Result<Self> {
        let geometry_shader = GeometryShader::builtin(ctx)?;
        let lighting_shader = match LightingShader::builtin(ctx) {
            Ok(shader) => shader,
            Err(e) => {
                geometry_shader.release(ctx);
                return Err(e);
            }
        };
        Ok(Self::with_shaders(config, geometry_shader, lighting_shader))
    }

    pub fn with_shaders(
        config: RendererConfig,
        geometry_shader: GeometryShader,
        lighting_shader: LightingShader,
    ) -> Self {
        Self {
            config,
            state: PipelineState::Uninitialized,
            frame: FrameState::default(),
            surface_size: (0, 0),
            scene: Scene::new(),
            gbuffer: GBuffer::new("g-buffer"),
            quad: ScreenQuad::new(),
            geometry_shader,
            lighting_shader,
            shaders: HashMap::new(),
            started: instant::Instant::now(),
        }
    }

    /// Make `shader` available to actors as `ShaderSlot::Named(name)`. A
    /// previous shader of the same name is released. A torn-down pipeline
    /// releases `shader` right away and refuses it.
    pub fn register_geometry_shader<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        name: &str,
        shader: GeometryShader,
    ) -> Result<()> {
        if self.state == PipelineState::TornDown {
            shader.release(ctx);
            return Err(RenderError::RenderState(format!(
                "shader '{name}' registered after teardown"
            )));
        }
        if let Some(old) = self.shaders.insert(name.to_string(), shader) {
            old.release(ctx);
        }
        Ok(())
    }

    /// Append to the scene. Draw order is insertion order.
    pub fn add_actor<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        name: &str,
        mesh: MeshResource,
    ) -> Result<()> {
        self.add_actor_with_shader(ctx, name, mesh, ShaderSlot::Default)
    }

    /// Like [`RenderPipeline::add_actor`]. After teardown the mesh is released
    /// instead of added.
    pub fn add_actor_with_shader<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        name: &str,
        mesh: MeshResource,
        shader: ShaderSlot,
    ) -> Result<()> {
        if self.state == PipelineState::TornDown {
            mesh.release(ctx);
            return Err(RenderError::RenderState(format!(
                "actor '{name}' added after teardown"
            )));
        }
        log::debug!("Adding actor '{}' ({:?})", name, shader);
        self.scene.push(Actor {
            name: name.to_string(),
            mesh,
            shader,
        });
        Ok(())
    }

    /// Apply a new surface size in device pixels: projection from the new
    /// aspect ratio, identity view, G-buffer resized to match.
    pub fn resize<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.state == PipelineState::TornDown {
            return Err(RenderError::RenderState("resize after teardown".to_string()));
        }
        let (width, height) = (width.max(1), height.max(1));
        // Nothing changes unless the G-buffer could follow.
        self.gbuffer.ensure_size(ctx, width, height)?;
        self.frame.projection = projection(&self.config, width, height);
        self.frame.view = Matrix4::identity();
        self.surface_size = (width, height);
        self.state = PipelineState::Ready;
        Ok(())
    }

    fn shader_for(&self, slot: &ShaderSlot) -> Result<&GeometryShader> {
        match slot {
            ShaderSlot::Default => Ok(&self.geometry_shader),
            ShaderSlot::Named(name) => self.shaders.get(name).ok_or_else(|| {
                RenderError::RenderState(format!("no geometry shader named '{name}'"))
            }),
        }
    }

    /// Every program the frame will use must be linked before anything is
    /// drawn.
    fn validate_shaders<D: GraphicsDevice>(&self, ctx: &RenderContext<D>) -> Result<()> {
        let lighting = self.lighting_shader.shader();
        if !ctx.device().program_linked(lighting.program()) {
            return Err(RenderError::RenderState(format!(
                "shader '{}' is not linked",
                lighting.label()
            )));
        }
        for actor in self.scene.actors() {
            let shader = self.shader_for(&actor.shader)?.shader();
            if !ctx.device().program_linked(shader.program()) {
                return Err(RenderError::RenderState(format!(
                    "shader '{}' of actor '{}' is not linked",
                    shader.label(),
                    actor.name
                )));
            }
        }
        Ok(())
    }

    /// Run the geometry pass then the lighting pass. An error aborts the
    /// frame; the caller should discard what was recorded.
    pub fn render_frame<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        elapsed: f32,
    ) -> Result<()> {
        if self.state != PipelineState::Ready {
            return Err(RenderError::RenderState(format!(
                "cannot render in state {:?}",
                self.state
            )));
        }
        self.validate_shaders(ctx)?;
        self.frame.time = elapsed;
        self.geometry_pass(ctx)?;
        self.lighting_pass(ctx)
    }

    fn geometry_pass<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) -> Result<()> {
        let mut pass = self.gbuffer.bind_as_target(ctx)?;
        let gl = pass.context();
        // Position alpha 0 marks texels no mesh was drawn to.
        let [r, g, b, _] = self.config.clear_colour;
        gl.set_clear_color([r, g, b, 0.0]);
        gl.clear(ClearMask::COLOR | ClearMask::DEPTH);
        // Less-or-equal lets a later mesh at the same depth win.
        gl.set_depth_test(Some(DepthFunc::LessEqual));
        gl.set_cull_face(self.config.backface_culling.then_some(CullFace::Back));

        for actor in self.scene.actors() {
            let shader = self.shader_for(&actor.shader)?;
            actor.mesh.draw(&mut pass, shader, &self.frame)?;
        }
        pass.unbind();
        Ok(())
    }

    fn lighting_pass<D: GraphicsDevice>(&mut self, ctx: &mut RenderContext<D>) -> Result<()> {
        let attachments = self.gbuffer.color_attachments().ok_or_else(|| {
            RenderError::RenderState("G-buffer is not allocated".to_string())
        })?;
        let (width, height) = self.surface_size;

        ctx.bind_target(RenderTargetId::Default);
        ctx.set_viewport(Viewport::full(width, height));
        ctx.set_clear_color(self.config.clear_colour);
        ctx.clear(ClearMask::COLOR);
        ctx.set_depth_test(None);
        ctx.set_cull_face(None);

        ctx.use_shader(self.lighting_shader.shader())?;
        for (unit, (texture, sampler)) in attachments
            .iter()
            .zip(self.lighting_shader.samplers())
            .enumerate()
        {
            ctx.bind_texture(unit as u32, Some(*texture));
            ctx.set_uniform(sampler, UniformValue::Int(unit as i32))?;
        }
        ctx.set_uniform(self.lighting_shader.projection(), self.frame.projection)?;

        let drawn = self.quad.draw(ctx);
        ctx.release_program();
        drawn
    }

    /// Release every GPU object the pipeline owns. Later calls do nothing.
    pub fn teardown<D: GraphicsDevice>(&mut self, ctx: &mut RenderContext<D>) {
        if self.state == PipelineState::TornDown {
            return;
        }
        for actor in self.scene.drain() {
            actor.mesh.release(ctx);
        }
        for (_, shader) in self.shaders.drain() {
            shader.release(ctx);
        }
        self.quad.release(ctx);
        self.gbuffer.release(ctx);
        self.geometry_shader.release(ctx);
        self.lighting_shader.release(ctx);
        self.state = PipelineState::TornDown;
        log::info!("Render pipeline torn down");
    }

    /// Wall-clock seconds since the pipeline was created.
    pub fn elapsed_seconds(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn frame(&self) -> &FrameState {
        &self.frame
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn quad(&self) -> &ScreenQuad {
        &self.quad
    }

    pub fn geometry_shader(&self) -> &GeometryShader {
        &self.geometry_shader
    }

    pub fn lighting_shader(&self) -> &LightingShader {
        &self.lighting_shader
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }
}
