use std::{collections::HashMap, path::Path};

use crate::{
    context::RenderContext,
    device::{GraphicsDevice, ProgramDescriptor, ProgramId, ShaderStage, UniformDecl, UniformLocation},
    errors::{RenderError, Result},
};

/// A linked program plus a cache of its uniform locations.
#[derive(Debug)]
pub struct Shader {
    program: ProgramId,
    label: String,
    locations: HashMap<String, UniformLocation>,
}

impl Shader {
    /// Compile and link `desc`. A failed link frees the program and returns
    /// the device's log.
    pub fn build<D: GraphicsDevice>(ctx: &mut RenderContext<D>, desc: &ProgramDescriptor) -> Result<Self> {
        let device = ctx.device_mut();
        let program = device.create_program(desc)?;
        if !device.program_linked(program) {
            let log = device.program_log(program);
            device.destroy_program(program);
            return Err(RenderError::ShaderLink {
                label: desc.label.clone(),
                log,
            });
        }
        let locations = desc
            .uniforms
            .iter()
            .filter_map(|decl| {
                device
                    .uniform_location(program, &decl.name)
                    .map(|loc| (decl.name.clone(), loc))
            })
            .collect();
        log::debug!("Linked shader '{}'", desc.label);
        Ok(Self {
            program,
            label: desc.label.clone(),
            locations,
        })
    }

    /// Read both stages from disk. Entry points are `vs_main` and `fs_main`.
    pub fn from_files<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        label: &str,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
        uniforms: Vec<UniformDecl>,
    ) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                RenderError::AssetMissing(format!("{}: {}", path.display(), e))
            })
        };
        let desc = ProgramDescriptor {
            label: label.to_string(),
            vertex: ShaderStage::new(read(vertex_path.as_ref())?, "vs_main"),
            fragment: ShaderStage::new(read(fragment_path.as_ref())?, "fs_main"),
            uniforms,
        };
        Self::build(ctx, &desc)
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.locations.get(name).copied()
    }

    pub fn release<D: GraphicsDevice>(&self, ctx: &mut RenderContext<D>) {
        ctx.device_mut().destroy_program(self.program);
    }
}
