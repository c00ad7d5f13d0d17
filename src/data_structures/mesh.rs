//! GPU-resident meshes.
//!
//! A [`MeshResource`] owns four tightly packed vertex buffers (position, colour,
//! texture coordinate, normal), the vertex array binding them to attribute
//! slots 0..=3, an optional diffuse and emission texture, and a model
//! transform. It can only be drawn inside a geometry pass.

use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix};

use crate::{
    context::{GeometryPass, RenderContext},
    data_structures::texture::{ImageData, Texture},
    device::{
        BufferId, GraphicsDevice, UniformValue, VertexArrayDescriptor, VertexArrayId,
        VertexBinding, VertexBufferLayout, VertexFormat,
    },
    errors::{RenderError, Result},
    pipelines::geometry::GeometryShader,
    render::FrameState,
};

/// Texture unit the diffuse map is bound to.
pub const DIFFUSE_UNIT: u32 = 0;
/// Texture unit the emission map is bound to.
pub const EMISSION_UNIT: u32 = 1;

/// Per-vertex attribute arrays as produced by the model loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Debug)]
pub struct MeshResource {
    label: String,
    vertex_count: u32,
    buffers: [BufferId; 4],
    vertex_array: VertexArrayId,
    transform: Matrix4<f32>,
    diffuse: Option<Texture>,
    emission: Option<Texture>,
    released: bool,
}

impl MeshResource {
    /// Upload the four attribute arrays. They must be non-empty and of equal
    /// length. Nothing is left allocated when this fails.
    pub fn create<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        label: &str,
        positions: &[[f32; 3]],
        colors: &[[f32; 3]],
        uvs: &[[f32; 2]],
        normals: &[[f32; 3]],
    ) -> Result<Self> {
        let n = positions.len();
        if n == 0 {
            return Err(RenderError::Validation(format!(
                "mesh '{label}' has no vertices"
            )));
        }
        if colors.len() != n || uvs.len() != n || normals.len() != n {
            return Err(RenderError::Validation(format!(
                "mesh '{label}' attribute lengths differ: {} positions, {} colors, {} uvs, {} normals",
                n,
                colors.len(),
                uvs.len(),
                normals.len()
            )));
        }
        let vertex_count = u32::try_from(n).map_err(|_| {
            RenderError::Validation(format!("mesh '{label}' has too many vertices ({n})"))
        })?;

        let attributes: [(&str, &[u8], VertexFormat); 4] = [
            ("position", bytemuck::cast_slice(positions), VertexFormat::Float32x3),
            ("color", bytemuck::cast_slice(colors), VertexFormat::Float32x3),
            ("uv", bytemuck::cast_slice(uvs), VertexFormat::Float32x2),
            ("normal", bytemuck::cast_slice(normals), VertexFormat::Float32x3),
        ];

        let device = ctx.device_mut();
        let mut created = Vec::with_capacity(4);
        for (name, bytes, _) in &attributes {
            match device.create_buffer(&format!("{label} {name}"), bytes) {
                Ok(buffer) => created.push(buffer),
                Err(e) => {
                    created.into_iter().for_each(|b| device.destroy_buffer(b));
                    return Err(e);
                }
            }
        }
        let bindings = created
            .iter()
            .zip(&attributes)
            .enumerate()
            .map(|(slot, (&buffer, (_, _, format)))| VertexBinding {
                buffer,
                layout: VertexBufferLayout::single(slot as u32, *format),
            })
            .collect();
        let vertex_array = match device.create_vertex_array(&VertexArrayDescriptor {
            label: label.to_string(),
            bindings,
        }) {
            Ok(vertex_array) => vertex_array,
            Err(e) => {
                created.into_iter().for_each(|b| device.destroy_buffer(b));
                return Err(e);
            }
        };
        let buffers = [created[0], created[1], created[2], created[3]];

        log::debug!("Uploaded mesh '{}' with {} vertices", label, vertex_count);
        Ok(Self {
            label: label.to_string(),
            vertex_count,
            buffers,
            vertex_array,
            transform: Matrix4::identity(),
            diffuse: None,
            emission: None,
            released: false,
        })
    }

    pub fn from_data<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        label: &str,
        data: &MeshData,
    ) -> Result<Self> {
        Self::create(ctx, label, &data.positions, &data.colors, &data.uvs, &data.normals)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Position, colour, uv and normal buffers, in attribute slot order.
    pub fn buffers(&self) -> [BufferId; 4] {
        self.buffers
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array
    }

    pub fn transform(&self) -> Matrix4<f32> {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Matrix4<f32>) {
        self.transform = transform;
    }

    pub fn has_diffuse_texture(&self) -> bool {
        self.diffuse.is_some()
    }

    pub fn has_emission_texture(&self) -> bool {
        self.emission.is_some()
    }

    pub fn diffuse_texture(&self) -> Option<&Texture> {
        self.diffuse.as_ref()
    }

    pub fn emission_texture(&self) -> Option<&Texture> {
        self.emission.as_ref()
    }

    /// Replace the diffuse map. An empty image removes it.
    pub fn set_diffuse_texture<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        image: &ImageData,
    ) -> Result<()> {
        let label = format!("{} diffuse", self.label);
        Self::replace_texture(&mut self.diffuse, ctx, &label, image)
    }

    /// Replace the emission map. An empty image removes it.
    pub fn set_emission_texture<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        image: &ImageData,
    ) -> Result<()> {
        let label = format!("{} emission", self.label);
        Self::replace_texture(&mut self.emission, ctx, &label, image)
    }

    fn replace_texture<D: GraphicsDevice>(
        slot: &mut Option<Texture>,
        ctx: &mut RenderContext<D>,
        label: &str,
        image: &ImageData,
    ) -> Result<()> {
        // The previous texture goes first so a replacement never leaks it.
        if let Some(old) = slot.take() {
            old.release(ctx);
        }
        if image.is_empty() {
            return Ok(());
        }
        *slot = Some(Texture::from_image(ctx, label, image)?);
        Ok(())
    }

    /// Inverse-transpose of the upper-left 3x3 of the model matrix.
    pub fn normal_matrix(&self) -> Matrix3<f32> {
        normal_matrix(&self.transform)
    }

    /// Issue this mesh's draw into the bound G-buffer.
    ///
    /// Leaves `shader` unbound afterwards; texture units 0 and 1 and the
    /// vertex array stay as this mesh set them.
    pub fn draw<D: GraphicsDevice>(
        &self,
        pass: &mut GeometryPass<'_, D>,
        shader: &GeometryShader,
        frame: &FrameState,
    ) -> Result<()> {
        let ctx = pass.context();
        ctx.use_shader(shader.shader())?;
        let loc = shader.locations();
        ctx.set_uniform(loc.view, frame.view)?;
        ctx.set_uniform(loc.projection, frame.projection)?;
        ctx.set_uniform(loc.model, self.transform)?;
        ctx.set_uniform(loc.normal_matrix, self.normal_matrix())?;
        ctx.set_uniform(loc.time, UniformValue::Float(frame.time))?;

        match &self.diffuse {
            Some(texture) => {
                ctx.set_uniform(loc.has_diffuse_tex, UniformValue::Bool(true))?;
                ctx.bind_texture(DIFFUSE_UNIT, Some(texture.id()));
                ctx.set_uniform(loc.tex_diffuse, UniformValue::Int(DIFFUSE_UNIT as i32))?;
            }
            None => {
                ctx.set_uniform(loc.has_diffuse_tex, UniformValue::Bool(false))?;
                ctx.bind_texture(DIFFUSE_UNIT, None);
            }
        }
        match &self.emission {
            Some(texture) => {
                ctx.set_uniform(loc.has_emission_tex, UniformValue::Bool(true))?;
                ctx.bind_texture(EMISSION_UNIT, Some(texture.id()));
                ctx.set_uniform(loc.tex_emission, UniformValue::Int(EMISSION_UNIT as i32))?;
            }
            None => {
                ctx.set_uniform(loc.has_emission_tex, UniformValue::Bool(false))?;
                ctx.bind_texture(EMISSION_UNIT, None);
            }
        }

        ctx.bind_vertex_array(Some(self.vertex_array));
        let drawn = ctx.draw_arrays(0, self.vertex_count);
        ctx.release_program();
        drawn
    }

    /// Free every buffer and texture this mesh owns.
    pub fn release<D: GraphicsDevice>(mut self, ctx: &mut RenderContext<D>) {
        if let Some(texture) = self.diffuse.take() {
            texture.release(ctx);
        }
        if let Some(texture) = self.emission.take() {
            texture.release(ctx);
        }
        let device = ctx.device_mut();
        device.destroy_vertex_array(self.vertex_array);
        for buffer in self.buffers {
            device.destroy_buffer(buffer);
        }
        self.released = true;
    }
}

impl Drop for MeshResource {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "Mesh '{}' dropped without release, its GPU objects are leaked",
                self.label
            );
        }
    }
}

/// Inverse-transpose of the upper-left 3x3 of `model`. A singular matrix has
/// no inverse, in which case the identity is used.
pub fn normal_matrix(model: &Matrix4<f32>) -> Matrix3<f32> {
    let upper = Matrix3::from_cols(model.x.truncate(), model.y.truncate(), model.z.truncate());
    upper
        .invert()
        .map(|inverse| inverse.transpose())
        .unwrap_or_else(Matrix3::identity)
}
