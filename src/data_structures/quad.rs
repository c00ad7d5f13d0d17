use crate::{
    context::RenderContext,
    device::{
        BufferId, GraphicsDevice, VertexArrayDescriptor, VertexArrayId, VertexAttribute,
        VertexBinding, VertexBufferLayout, VertexFormat,
    },
    errors::Result,
};

/// Two triangles covering NDC -1..1, interleaved as `x, y, u, v`.
#[rustfmt::skip]
const QUAD_VERTICES: [f32; 24] = [
    -1.0,  1.0, 0.0, 1.0,
    -1.0, -1.0, 0.0, 0.0,
     1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0, 0.0, 1.0,
     1.0, -1.0, 1.0, 0.0,
     1.0,  1.0, 1.0, 1.0,
];

pub const QUAD_VERTEX_COUNT: u32 = 6;

/// The full-screen quad of the lighting pass, created on first draw.
#[derive(Debug, Default)]
pub struct ScreenQuad {
    objects: Option<(BufferId, VertexArrayId)>,
}

impl ScreenQuad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> Option<BufferId> {
        self.objects.map(|(buffer, _)| buffer)
    }

    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.objects.map(|(_, vertex_array)| vertex_array)
    }

    fn get_or_create<D: GraphicsDevice>(&mut self, ctx: &mut RenderContext<D>) -> Result<VertexArrayId> {
        if let Some((_, vertex_array)) = self.objects {
            return Ok(vertex_array);
        }
        let device = ctx.device_mut();
        let buffer = device.create_buffer("screen quad", bytemuck::cast_slice(&QUAD_VERTICES))?;
        let layout = VertexBufferLayout {
            stride: 4 * 4,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x2,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x2,
                    offset: 2 * 4,
                },
            ],
        };
        let vertex_array = device
            .create_vertex_array(&VertexArrayDescriptor {
                label: "screen quad".to_string(),
                bindings: vec![VertexBinding { buffer, layout }],
            })
            .inspect_err(|_| device.destroy_buffer(buffer))?;
        self.objects = Some((buffer, vertex_array));
        Ok(vertex_array)
    }

    /// Draw the quad with whatever program is bound.
    pub fn draw<D: GraphicsDevice>(&mut self, ctx: &mut RenderContext<D>) -> Result<()> {
        let vertex_array = self.get_or_create(ctx)?;
        ctx.bind_vertex_array(Some(vertex_array));
        let drawn = ctx.draw_arrays(0, QUAD_VERTEX_COUNT);
        ctx.bind_vertex_array(None);
        drawn
    }

    pub fn release<D: GraphicsDevice>(&mut self, ctx: &mut RenderContext<D>) {
        if let Some((buffer, vertex_array)) = self.objects.take() {
            let device = ctx.device_mut();
            device.destroy_vertex_array(vertex_array);
            device.destroy_buffer(buffer);
        }
    }
}
