use crate::{
    context::RenderContext,
    data_structures::gbuffer::COLOR_ATTACHMENTS,
    device::{GraphicsDevice, ProgramDescriptor, ShaderStage, UniformDecl, UniformLocation, UniformType},
    errors::Result,
    shader::Shader,
};

pub const QUAD_VERT: &str = include_str!("quad_vert.wgsl");
pub const LIGHTING_FRAG: &str = include_str!("lighting_frag.wgsl");

/// Sampler uniform names in G-buffer attachment order.
pub const GBUFFER_SAMPLERS: [&str; COLOR_ATTACHMENTS] =
    ["gPosition", "gNormal", "gAlbedoSpec", "gEmission"];

pub fn lighting_uniforms() -> Vec<UniformDecl> {
    let mut uniforms = vec![UniformDecl::new("projection", UniformType::Mat4)];
    uniforms.extend(
        GBUFFER_SAMPLERS
            .iter()
            .map(|name| UniformDecl::new(name, UniformType::Sampler)),
    );
    uniforms
}

/// The full-screen pass that shades the G-buffer onto the visible target.
#[derive(Debug)]
pub struct LightingShader {
    shader: Shader,
    projection: Option<UniformLocation>,
    samplers: [Option<UniformLocation>; COLOR_ATTACHMENTS],
}

impl LightingShader {
    pub fn builtin<D: GraphicsDevice>(ctx: &mut RenderContext<D>) -> Result<Self> {
        let shader = Shader::build(ctx, &Self::descriptor(QUAD_VERT, LIGHTING_FRAG))?;
        Ok(Self::from_shader(shader))
    }

    pub fn descriptor(vertex_source: &str, fragment_source: &str) -> ProgramDescriptor {
        ProgramDescriptor {
            label: "lighting".to_string(),
            vertex: ShaderStage::new(vertex_source, "vs_main"),
            fragment: ShaderStage::new(fragment_source, "fs_main"),
            uniforms: lighting_uniforms(),
        }
    }

    pub fn from_shader(shader: Shader) -> Self {
        let samplers = GBUFFER_SAMPLERS.map(|name| shader.location(name));
        Self {
            projection: shader.location("projection"),
            samplers,
            shader,
        }
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    pub fn projection(&self) -> Option<UniformLocation> {
        self.projection
    }

    /// Sampler locations for position, normal, albedo + specular and emission.
    pub fn samplers(&self) -> [Option<UniformLocation>; COLOR_ATTACHMENTS] {
        self.samplers
    }

    pub fn release<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        self.shader.release(ctx);
    }
}
