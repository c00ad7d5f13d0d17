use cgmath::{Matrix4, SquareMatrix};
use defer_ngin::{
    capture::render_to_file,
    config::RendererConfig,
    data_structures::{quad::QUAD_VERTEX_COUNT, scene::ShaderSlot},
    device::{
        ClearMask, CullFace, DepthFunc, RenderTargetId, UniformValue, Viewport,
        recording::Command,
    },
    errors::RenderError,
    pipelines::geometry::GeometryShader,
    render::{PipelineState, RenderPipeline, projection},
};

use crate::common::test_utils::{
    checker, ready_pipeline, recording_context, render_one, triangle_mesh,
};
mod common;

#[test]
fn one_triangle_is_one_geometry_draw_and_one_lighting_draw() {
    let mut ctx = recording_context(800, 600);
    let mut pipeline = ready_pipeline(&mut ctx, 800, 600);
    let mesh = triangle_mesh(&mut ctx, "tri");
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();

    render_one(&mut ctx, &mut pipeline, 0.0);

    let fb = pipeline.gbuffer().framebuffer().unwrap();
    let draws: Vec<_> = ctx.device().draws().cloned().collect();
    assert_eq!(draws.len(), 2);

    let geometry = &draws[0];
    assert_eq!(geometry.target, RenderTargetId::Framebuffer(fb));
    assert_eq!(geometry.count, 3);
    assert_eq!(geometry.depth_test, Some(DepthFunc::LessEqual));
    assert_eq!(geometry.cull_face, Some(CullFace::Back));
    assert_eq!(geometry.viewport, Some(Viewport::full(800, 600)));
    assert_eq!(geometry.program, pipeline.geometry_shader().shader().program());

    let lighting = &draws[1];
    assert_eq!(lighting.target, RenderTargetId::Default);
    assert_eq!(lighting.count, QUAD_VERTEX_COUNT);
    assert_eq!(lighting.depth_test, None);
    assert_eq!(lighting.cull_face, None);
    assert_eq!(lighting.program, pipeline.lighting_shader().shader().program());
    assert_eq!(
        lighting.uniform("projection"),
        Some(UniformValue::from(projection(pipeline.config(), 800, 600)))
    );

    assert_eq!(ctx.device().frames_completed(), 1);
    pipeline.teardown(&mut ctx);
}

#[test]
fn geometry_pass_clears_colour_and_depth_first() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let mesh = triangle_mesh(&mut ctx, "tri");
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();
    render_one(&mut ctx, &mut pipeline, 0.0);

    let fb = pipeline.gbuffer().framebuffer().unwrap();
    let commands = ctx.device().commands();
    match &commands[0] {
        Command::Clear {
            target,
            mask,
            color,
            ..
        } => {
            assert_eq!(*target, RenderTargetId::Framebuffer(fb));
            assert_eq!(*mask, ClearMask::COLOR | ClearMask::DEPTH);
            assert_eq!(color[3], 0.0);
        }
        other => panic!("expected a clear, got {other:?}"),
    }
    let default_clear = commands.iter().position(|c| {
        matches!(
            c,
            Command::Clear {
                target: RenderTargetId::Default,
                ..
            }
        )
    });
    let lighting_draw = commands.iter().position(|c| {
        matches!(c, Command::Draw(d) if d.target == RenderTargetId::Default)
    });
    assert!(default_clear.unwrap() < lighting_draw.unwrap());
    pipeline.teardown(&mut ctx);
}

#[test]
fn lighting_reads_gbuffer_attachments_in_order() {
    let mut ctx = recording_context(128, 128);
    let mut pipeline = ready_pipeline(&mut ctx, 128, 128);
    render_one(&mut ctx, &mut pipeline, 0.0);

    let attachments = pipeline.gbuffer().color_attachments().unwrap();
    let lighting = ctx.device().draws().last().cloned().unwrap();
    for (unit, texture) in attachments.iter().enumerate() {
        assert_eq!(lighting.texture_units[unit], Some(*texture));
    }
    for (unit, name) in ["gPosition", "gNormal", "gAlbedoSpec", "gEmission"]
        .iter()
        .enumerate()
    {
        assert_eq!(lighting.uniform(name), Some(UniformValue::Int(unit as i32)));
    }
    pipeline.teardown(&mut ctx);
}

#[test]
fn quad_is_created_once() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    assert!(pipeline.quad().buffer().is_none());

    render_one(&mut ctx, &mut pipeline, 0.0);
    let buffer = pipeline.quad().buffer();
    assert!(buffer.is_some());
    let live = ctx.device().live_buffers();

    for i in 1..4 {
        render_one(&mut ctx, &mut pipeline, i as f32);
    }
    assert_eq!(pipeline.quad().buffer(), buffer);
    assert_eq!(ctx.device().live_buffers(), live);
    assert_eq!(ctx.device().frames_completed(), 4);
    pipeline.teardown(&mut ctx);
}

#[test]
fn rendering_before_resize_is_a_state_error() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = RenderPipeline::new(&mut ctx, RendererConfig::default()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);

    let err = pipeline.render_frame(&mut ctx, 0.0).unwrap_err();
    assert!(matches!(err, RenderError::RenderState(_)));
    assert_eq!(ctx.device().commands().len(), 0);
    pipeline.teardown(&mut ctx);
}

#[test]
fn resize_sets_projection_and_resizes_gbuffer() {
    let mut ctx = recording_context(800, 600);
    let mut pipeline = ready_pipeline(&mut ctx, 800, 600);
    let colors = pipeline.gbuffer().color_attachments();

    ctx.resize_target(1024, 768);
    pipeline.resize(&mut ctx, 1024, 768).unwrap();
    assert_eq!(pipeline.surface_size(), (1024, 768));
    assert_eq!(pipeline.gbuffer().size(), (1024, 768));
    assert_eq!(pipeline.gbuffer().color_attachments(), colors);
    assert_eq!(pipeline.frame().view, Matrix4::identity());
    assert_eq!(
        pipeline.frame().projection,
        projection(pipeline.config(), 1024, 768)
    );

    render_one(&mut ctx, &mut pipeline, 0.0);
    let lighting = ctx.device().draws().last().cloned().unwrap();
    assert_eq!(lighting.viewport, Some(Viewport::full(1024, 768)));
    pipeline.teardown(&mut ctx);
}

#[test]
fn teardown_frees_every_object() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let mut lamp = triangle_mesh(&mut ctx, "lamp");
    lamp.set_diffuse_texture(&mut ctx, &checker(4, 4)).unwrap();
    lamp.set_emission_texture(&mut ctx, &checker(4, 4)).unwrap();
    pipeline.add_actor(&mut ctx, "lamp", lamp).unwrap();
    let water = GeometryShader::water(&mut ctx).unwrap();
    pipeline.register_geometry_shader(&mut ctx, "water", water).unwrap();
    let mesh = triangle_mesh(&mut ctx, "sea");
    pipeline.add_actor_with_shader(
        &mut ctx,
        "sea",
        mesh,
        ShaderSlot::Named("water".to_string()),
    )
    .unwrap();
    render_one(&mut ctx, &mut pipeline, 1.0);

    pipeline.teardown(&mut ctx);
    assert_eq!(pipeline.state(), PipelineState::TornDown);
    let device = ctx.device();
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_vertex_arrays(), 0);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_framebuffers(), 0);
    assert_eq!(device.live_programs(), 0);

    pipeline.teardown(&mut ctx);
    assert!(matches!(
        pipeline.render_frame(&mut ctx, 0.0),
        Err(RenderError::RenderState(_))
    ));
    assert!(pipeline.resize(&mut ctx, 32, 32).is_err());
}

#[test]
fn actors_draw_in_insertion_order() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let names = ["c", "a", "b"];
    let mut arrays = Vec::new();
    for name in names {
        let mesh = triangle_mesh(&mut ctx, name);
        arrays.push(mesh.vertex_array());
        pipeline.add_actor(&mut ctx, name, mesh).unwrap();
    }
    render_one(&mut ctx, &mut pipeline, 0.0);

    let fb = pipeline.gbuffer().framebuffer().unwrap();
    let drawn: Vec<_> = ctx
        .device()
        .draws()
        .filter(|d| d.target == RenderTargetId::Framebuffer(fb))
        .map(|d| d.vertex_array)
        .collect();
    assert_eq!(drawn, arrays);
    let scene_names: Vec<_> = pipeline.scene().actors().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(scene_names, names);
    pipeline.teardown(&mut ctx);
}

#[test]
fn geometry_uniforms_carry_frame_state() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let mut mesh = triangle_mesh(&mut ctx, "tri");
    let model = Matrix4::from_translation([0.0, 0.0, -3.0].into()) * Matrix4::from_scale(2.0);
    mesh.set_transform(model);
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();
    render_one(&mut ctx, &mut pipeline, 4.0);

    let geometry = ctx.device().draws().next().cloned().unwrap();
    assert_eq!(geometry.uniform("model"), Some(UniformValue::from(model)));
    assert_eq!(
        geometry.uniform("view"),
        Some(UniformValue::from(Matrix4::<f32>::identity()))
    );
    assert_eq!(
        geometry.uniform("projection"),
        Some(UniformValue::from(pipeline.frame().projection))
    );
    assert_eq!(geometry.uniform("time"), Some(UniformValue::Float(4.0)));
    pipeline.teardown(&mut ctx);
}

#[test]
fn missing_named_shader_aborts_before_drawing() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let mesh = triangle_mesh(&mut ctx, "tri");
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();
    let mesh = triangle_mesh(&mut ctx, "glass");
    pipeline.add_actor_with_shader(
        &mut ctx,
        "glass",
        mesh,
        ShaderSlot::Named("glass".to_string()),
    )
    .unwrap();

    ctx.begin_frame().unwrap();
    let err = pipeline.render_frame(&mut ctx, 0.0).unwrap_err();
    ctx.abort_frame();
    assert!(matches!(err, RenderError::RenderState(_)));
    assert_eq!(ctx.device().draws().count(), 0);
    assert_eq!(ctx.device().frames_completed(), 0);
    pipeline.teardown(&mut ctx);
}

#[test]
fn culling_follows_config() {
    let mut ctx = recording_context(64, 64);
    let config = RendererConfig {
        backface_culling: false,
        ..RendererConfig::default()
    };
    let mut pipeline = RenderPipeline::new(&mut ctx, config).unwrap();
    pipeline.resize(&mut ctx, 64, 64).unwrap();
    let mesh = triangle_mesh(&mut ctx, "tri");
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();
    render_one(&mut ctx, &mut pipeline, 0.0);

    let geometry = ctx.device().draws().next().cloned().unwrap();
    assert_eq!(geometry.cull_face, None);
    pipeline.teardown(&mut ctx);
}

#[test]
fn render_to_file_writes_the_visible_target() {
    let mut ctx = recording_context(32, 16);
    let config = RendererConfig {
        clear_colour: [1.0, 0.0, 0.0, 1.0],
        ..RendererConfig::default()
    };
    let mut pipeline = RenderPipeline::new(&mut ctx, config).unwrap();
    pipeline.resize(&mut ctx, 32, 16).unwrap();
    let mesh = triangle_mesh(&mut ctx, "tri");
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    render_to_file(&mut ctx, &mut pipeline, &path).unwrap();

    let image = image::open(&path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (32, 16));
    assert!(image.pixels().all(|p| *p == image::Rgba([255, 0, 0, 255])));
    assert_eq!(ctx.device().frames_completed(), 1);
    pipeline.teardown(&mut ctx);
}

#[test]
fn failed_frame_is_not_captured() {
    let mut ctx = recording_context(32, 16);
    let mut pipeline = RenderPipeline::new(&mut ctx, RendererConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");

    let err = render_to_file(&mut ctx, &mut pipeline, &path).unwrap_err();
    assert!(matches!(err, RenderError::RenderState(_)));
    assert!(!path.exists());
    pipeline.teardown(&mut ctx);
}

#[test]
fn failed_resize_keeps_the_previous_frame_state() {
    let mut ctx = recording_context(800, 600);
    let mut pipeline = ready_pipeline(&mut ctx, 800, 600);
    ctx.device_mut().set_max_texture_size(1024);

    let err = pipeline.resize(&mut ctx, 2048, 100).unwrap_err();
    assert!(matches!(err, RenderError::ResourceAllocation { .. }));
    assert_eq!(pipeline.state(), PipelineState::Ready);
    assert_eq!(pipeline.surface_size(), (800, 600));
    assert_eq!(pipeline.gbuffer().size(), (800, 600));
    assert_eq!(
        pipeline.frame().projection,
        projection(pipeline.config(), 800, 600)
    );

    render_one(&mut ctx, &mut pipeline, 0.0);
    let lighting = ctx.device().draws().last().cloned().unwrap();
    assert_eq!(lighting.viewport, Some(Viewport::full(800, 600)));
    pipeline.teardown(&mut ctx);
}

#[test]
fn zero_resize_clamps_and_still_renders() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let mesh = triangle_mesh(&mut ctx, "tri");
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();

    pipeline.resize(&mut ctx, 0, 0).unwrap();
    assert_eq!(pipeline.surface_size(), (1, 1));
    assert_eq!(pipeline.gbuffer().size(), (1, 1));

    render_one(&mut ctx, &mut pipeline, 0.0);
    assert_eq!(ctx.device().draws().count(), 2);
    assert_eq!(ctx.device().frames_completed(), 1);
    pipeline.teardown(&mut ctx);
}

#[test]
fn incomplete_gbuffer_still_completes_the_frame() {
    let mut ctx = recording_context(64, 64);
    ctx.device_mut().force_incomplete_framebuffers(true);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let mesh = triangle_mesh(&mut ctx, "tri");
    pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();

    render_one(&mut ctx, &mut pipeline, 0.0);
    assert_eq!(ctx.device().draws().count(), 2);
    assert_eq!(ctx.device().frames_completed(), 1);
    pipeline.teardown(&mut ctx);
}

#[test]
fn torn_down_pipeline_refuses_and_releases_new_objects() {
    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    pipeline.teardown(&mut ctx);

    let mesh = triangle_mesh(&mut ctx, "late");
    let err = pipeline.add_actor(&mut ctx, "late", mesh).unwrap_err();
    assert!(matches!(err, RenderError::RenderState(_)));
    let water = GeometryShader::water(&mut ctx).unwrap();
    let err = pipeline
        .register_geometry_shader(&mut ctx, "water", water)
        .unwrap_err();
    assert!(matches!(err, RenderError::RenderState(_)));

    assert!(pipeline.scene().is_empty());
    let device = ctx.device();
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_vertex_arrays(), 0);
    assert_eq!(device.live_programs(), 0);
}

#[test]
fn aborted_capture_is_not_carried_into_the_next_frame() {
    let mut ctx = recording_context(32, 16);
    let mut pipeline = RenderPipeline::new(&mut ctx, RendererConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    assert!(render_to_file(&mut ctx, &mut pipeline, &path).is_err());

    pipeline.resize(&mut ctx, 32, 16).unwrap();
    render_one(&mut ctx, &mut pipeline, 0.0);
    assert!(ctx.take_capture().is_none());
    pipeline.teardown(&mut ctx);
}
