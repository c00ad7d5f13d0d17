use defer_ngin::{
    config::RendererConfig,
    context::RenderContext,
    data_structures::{mesh::MeshResource, texture::ImageData},
    device::recording::RecordingDevice,
    render::RenderPipeline,
};

pub(crate) type TestContext = RenderContext<RecordingDevice>;

pub(crate) fn recording_context(width: u32, height: u32) -> TestContext {
    let _ = env_logger::builder().is_test(true).try_init();
    RenderContext::new(RecordingDevice::new(width, height))
}

/// One counter-clockwise triangle facing +z.
pub(crate) struct TriangleData {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
}

pub(crate) fn triangle_data() -> TriangleData {
    TriangleData {
        positions: vec![[0.0, 0.0, -5.0], [1.0, 0.0, -5.0], [0.0, 1.0, -5.0]],
        colors: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
    }
}

pub(crate) fn triangle_mesh(ctx: &mut TestContext, label: &str) -> MeshResource {
    let data = triangle_data();
    MeshResource::create(
        ctx,
        label,
        &data.positions,
        &data.colors,
        &data.uvs,
        &data.normals,
    )
    .expect("triangle upload")
}

pub(crate) fn checker(width: u32, height: u32) -> ImageData {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = if (x + y) % 2 == 0 { 255 } else { 0 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    ImageData::from_rgba(width, height, pixels).expect("checker pixels")
}

/// A pipeline that has seen its first resize and can render.
pub(crate) fn ready_pipeline(ctx: &mut TestContext, width: u32, height: u32) -> RenderPipeline {
    let mut pipeline =
        RenderPipeline::new(ctx, RendererConfig::default()).expect("built-in shaders link");
    pipeline.resize(ctx, width, height).expect("initial resize");
    pipeline
}

/// Run one full frame with begin/end around it.
pub(crate) fn render_one(ctx: &mut TestContext, pipeline: &mut RenderPipeline, elapsed: f32) {
    ctx.begin_frame().expect("begin");
    pipeline.render_frame(ctx, elapsed).expect("render");
    ctx.end_frame().expect("end");
}
