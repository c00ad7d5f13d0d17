use std::path::Path;

use crate::{
    context::RenderContext,
    device::{GraphicsDevice, ProgramDescriptor, ShaderStage, UniformDecl, UniformLocation, UniformType},
    errors::Result,
    shader::Shader,
};

pub const G_BUFFER_VERT: &str = include_str!("g_buffer_vert.wgsl");
pub const G_BUFFER_FRAG: &str = include_str!("g_buffer_frag.wgsl");
pub const WATER_VERT: &str = include_str!("water_vert.wgsl");

/// The uniform interface every geometry-pass program exposes. Block members
/// come first in the order the WGSL `Uniforms` struct declares them.
pub fn geometry_uniforms() -> Vec<UniformDecl> {
    vec![
        UniformDecl::new("view", UniformType::Mat4),
        UniformDecl::new("projection", UniformType::Mat4),
        UniformDecl::new("model", UniformType::Mat4),
        UniformDecl::new("normalMatrix", UniformType::Mat3),
        UniformDecl::new("time", UniformType::Float),
        UniformDecl::new("hasDiffuseTex", UniformType::Bool),
        UniformDecl::new("hasEmissionTex", UniformType::Bool),
        UniformDecl::new("texDiffuse", UniformType::Sampler),
        UniformDecl::new("texEmission", UniformType::Sampler),
    ]
}

/// Uniform locations resolved once at link time.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryLocations {
    pub view: Option<UniformLocation>,
    pub projection: Option<UniformLocation>,
    pub model: Option<UniformLocation>,
    pub normal_matrix: Option<UniformLocation>,
    pub time: Option<UniformLocation>,
    pub has_diffuse_tex: Option<UniformLocation>,
    pub has_emission_tex: Option<UniformLocation>,
    pub tex_diffuse: Option<UniformLocation>,
    pub tex_emission: Option<UniformLocation>,
}

/// A program that writes the G-buffer layout.
#[derive(Debug)]
pub struct GeometryShader {
    shader: Shader,
    locations: GeometryLocations,
}

impl GeometryShader {
    /// The standard G-buffer shader.
    pub fn builtin<D: GraphicsDevice>(ctx: &mut RenderContext<D>) -> Result<Self> {
        Self::with_vertex_source(ctx, "g-buffer", G_BUFFER_VERT)
    }

    /// Animated water surface. Same outputs, displaced vertices.
    pub fn water<D: GraphicsDevice>(ctx: &mut RenderContext<D>) -> Result<Self> {
        Self::with_vertex_source(ctx, "water", WATER_VERT)
    }

    /// Pair a custom vertex stage with the standard G-buffer fragment stage.
    pub fn with_vertex_source<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        label: &str,
        vertex_source: &str,
    ) -> Result<Self> {
        let shader = Shader::build(ctx, &Self::descriptor(label, vertex_source, G_BUFFER_FRAG))?;
        Ok(Self::from_shader(shader))
    }

    pub fn from_files<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        label: &str,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let shader = Shader::from_files(ctx, label, vertex_path, fragment_path, geometry_uniforms())?;
        Ok(Self::from_shader(shader))
    }

    pub fn descriptor(label: &str, vertex_source: &str, fragment_source: &str) -> ProgramDescriptor {
        ProgramDescriptor {
            label: label.to_string(),
            vertex: ShaderStage::new(vertex_source, "vs_main"),
            fragment: ShaderStage::new(fragment_source, "fs_main"),
            uniforms: geometry_uniforms(),
        }
    }

    pub fn from_shader(shader: Shader) -> Self {
        let locations = GeometryLocations {
            view: shader.location("view"),
            projection: shader.location("projection"),
            model: shader.location("model"),
            normal_matrix: shader.location("normalMatrix"),
            time: shader.location("time"),
            has_diffuse_tex: shader.location("hasDiffuseTex"),
            has_emission_tex: shader.location("hasEmissionTex"),
            tex_diffuse: shader.location("texDiffuse"),
            tex_emission: shader.location("texEmission"),
        };
        Self { shader, locations }
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    pub fn locations(&self) -> &GeometryLocations {
        &self.locations
    }

    pub fn release<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        self.shader.release(ctx);
    }
}
