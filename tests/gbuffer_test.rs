use defer_ngin::{
    data_structures::gbuffer::{COLOR_ATTACHMENTS, COLOR_FORMATS, DEPTH_FORMAT, GBuffer},
    device::{AttachmentPoint, FramebufferStatus, RenderTargetId, TextureFormat, Viewport},
    errors::RenderError,
};

use crate::common::test_utils::{TestContext, recording_context};
mod common;

fn attachment_sizes(ctx: &TestContext, gbuffer: &GBuffer) -> Vec<(u32, u32)> {
    let mut textures: Vec<_> = gbuffer.color_attachments().unwrap().to_vec();
    textures.push(gbuffer.depth_attachment().unwrap());
    textures
        .iter()
        .map(|t| {
            let desc = ctx.device().texture_descriptor(*t).unwrap();
            (desc.width, desc.height)
        })
        .collect()
}

#[test]
fn allocates_four_colour_attachments_and_depth() {
    let mut ctx = recording_context(320, 240);
    let mut gbuffer = GBuffer::new("g-buffer");
    assert!(!gbuffer.is_allocated());
    assert_eq!(gbuffer.size(), (0, 0));

    gbuffer.ensure_size(&mut ctx, 320, 240).unwrap();
    assert!(gbuffer.is_allocated());
    assert_eq!(gbuffer.size(), (320, 240));
    assert_eq!(ctx.device().live_framebuffers(), 1);
    assert_eq!(ctx.device().live_textures(), COLOR_ATTACHMENTS + 1);
    assert_eq!(attachment_sizes(&ctx, &gbuffer), vec![(320, 240); 5]);

    let fb = gbuffer.framebuffer().unwrap();
    for i in 0..COLOR_ATTACHMENTS {
        let texture = gbuffer.color_attachment(i).unwrap();
        assert_eq!(
            ctx.device().attachment(fb, AttachmentPoint::Color(i as u8)),
            Some(texture)
        );
        assert_eq!(
            ctx.device().texture_descriptor(texture).unwrap().format,
            COLOR_FORMATS[i]
        );
    }
    let depth = gbuffer.depth_attachment().unwrap();
    assert_eq!(ctx.device().attachment(fb, AttachmentPoint::Depth), Some(depth));
    assert_eq!(
        ctx.device().texture_descriptor(depth).unwrap().format,
        TextureFormat::Depth32Float
    );
    assert_eq!(DEPTH_FORMAT, TextureFormat::Depth32Float);
    gbuffer.release(&mut ctx);
}

#[test]
fn complete_at_extreme_sizes() {
    let mut ctx = recording_context(1920, 1080);
    let mut gbuffer = GBuffer::new("g-buffer");
    for (w, h) in [(1, 1), (1920, 1080)] {
        gbuffer.ensure_size(&mut ctx, w, h).unwrap();
        assert_eq!(gbuffer.status(&ctx), Some(FramebufferStatus::Complete));
        assert_eq!(attachment_sizes(&ctx, &gbuffer), vec![(w, h); 5]);
    }
    gbuffer.release(&mut ctx);
}

#[test]
fn same_size_is_a_no_op() {
    let mut ctx = recording_context(64, 64);
    let mut gbuffer = GBuffer::new("g-buffer");
    gbuffer.ensure_size(&mut ctx, 64, 64).unwrap();
    let before = (gbuffer.framebuffer(), gbuffer.color_attachments(), gbuffer.depth_attachment());
    gbuffer.ensure_size(&mut ctx, 64, 64).unwrap();
    let after = (gbuffer.framebuffer(), gbuffer.color_attachments(), gbuffer.depth_attachment());
    assert_eq!(before, after);
    assert_eq!(ctx.device().live_textures(), 5);
    gbuffer.release(&mut ctx);
}

#[test]
fn resize_keeps_handles_and_changes_storage() {
    let mut ctx = recording_context(800, 600);
    let mut gbuffer = GBuffer::new("g-buffer");
    gbuffer.ensure_size(&mut ctx, 800, 600).unwrap();
    let framebuffer = gbuffer.framebuffer();
    let colors = gbuffer.color_attachments();
    let depth = gbuffer.depth_attachment();

    gbuffer.ensure_size(&mut ctx, 1024, 768).unwrap();
    assert_eq!(gbuffer.framebuffer(), framebuffer);
    assert_eq!(gbuffer.color_attachments(), colors);
    assert_eq!(gbuffer.depth_attachment(), depth);
    assert_eq!(gbuffer.size(), (1024, 768));
    assert_eq!(attachment_sizes(&ctx, &gbuffer), vec![(1024, 768); 5]);
    assert_eq!(ctx.device().live_textures(), 5);
    assert_eq!(ctx.device().live_framebuffers(), 1);
    assert_eq!(gbuffer.status(&ctx), Some(FramebufferStatus::Complete));
    gbuffer.release(&mut ctx);
}

#[test]
fn zero_size_is_clamped_to_one() {
    let mut ctx = recording_context(64, 64);
    let mut gbuffer = GBuffer::new("g-buffer");
    gbuffer.ensure_size(&mut ctx, 0, 0).unwrap();
    assert_eq!(gbuffer.size(), (1, 1));
    assert_eq!(attachment_sizes(&ctx, &gbuffer), vec![(1, 1); 5]);

    gbuffer.ensure_size(&mut ctx, 200, 0).unwrap();
    assert_eq!(gbuffer.size(), (200, 1));
    gbuffer.release(&mut ctx);
}

#[test]
fn incomplete_framebuffer_is_not_fatal() {
    let mut ctx = recording_context(64, 64);
    ctx.device_mut().force_incomplete_framebuffers(true);
    let mut gbuffer = GBuffer::new("g-buffer");
    gbuffer.ensure_size(&mut ctx, 64, 64).unwrap();
    assert!(gbuffer.is_allocated());
    assert_eq!(gbuffer.status(&ctx), Some(FramebufferStatus::IncompleteAttachment));
    gbuffer.release(&mut ctx);
}

#[test]
fn oversized_allocation_fails_cleanly() {
    let mut ctx = recording_context(64, 64);
    ctx.device_mut().set_max_texture_size(512);
    let mut gbuffer = GBuffer::new("g-buffer");
    let err = gbuffer.ensure_size(&mut ctx, 1024, 1024).unwrap_err();
    assert!(matches!(err, RenderError::ResourceAllocation { .. }));
    assert!(!gbuffer.is_allocated());
    assert_eq!(ctx.device().live_textures(), 0);
    assert_eq!(ctx.device().live_framebuffers(), 0);
}

#[test]
fn release_frees_everything_once() {
    let mut ctx = recording_context(64, 64);
    let mut gbuffer = GBuffer::new("g-buffer");
    gbuffer.ensure_size(&mut ctx, 64, 64).unwrap();
    gbuffer.release(&mut ctx);
    assert_eq!(ctx.device().live_textures(), 0);
    assert_eq!(ctx.device().live_framebuffers(), 0);
    assert!(!gbuffer.is_allocated());
    assert_eq!(gbuffer.size(), (0, 0));

    gbuffer.release(&mut ctx);
    assert_eq!(ctx.device().live_textures(), 0);
}

#[test]
fn binding_sets_target_viewport_and_draw_buffers() {
    let mut ctx = recording_context(1280, 720);
    let mut gbuffer = GBuffer::new("g-buffer");
    gbuffer.ensure_size(&mut ctx, 640, 360).unwrap();
    let fb = gbuffer.framebuffer().unwrap();

    let pass = gbuffer.bind_as_target(&mut ctx).unwrap();
    assert_eq!(pass.size(), (640, 360));
    drop(pass);
    assert_eq!(
        ctx.device().draw_buffers(fb).unwrap(),
        &[
            AttachmentPoint::Color(0),
            AttachmentPoint::Color(1),
            AttachmentPoint::Color(2),
            AttachmentPoint::Color(3),
        ]
    );
    assert_eq!(ctx.device().viewport(), Some(Viewport::full(640, 360)));
    gbuffer.release(&mut ctx);
}

#[test]
fn pass_targets_the_framebuffer_until_it_ends() {
    let mut ctx = recording_context(64, 64);
    let mut gbuffer = GBuffer::new("g-buffer");
    gbuffer.ensure_size(&mut ctx, 64, 64).unwrap();
    let fb = gbuffer.framebuffer().unwrap();

    {
        let mut pass = gbuffer.bind_as_target(&mut ctx).unwrap();
        assert_eq!(
            pass.context().bindings().target,
            RenderTargetId::Framebuffer(fb)
        );
        assert_eq!(
            pass.context().device().current_target(),
            RenderTargetId::Framebuffer(fb)
        );
    }
    assert_eq!(ctx.bindings().target, RenderTargetId::Default);
    assert_eq!(ctx.device().current_target(), RenderTargetId::Default);
    gbuffer.release(&mut ctx);
}

#[test]
fn binding_before_allocation_is_a_state_error() {
    let mut ctx = recording_context(64, 64);
    let gbuffer = GBuffer::new("g-buffer");
    let err = gbuffer.bind_as_target(&mut ctx).err().unwrap();
    assert!(matches!(err, RenderError::RenderState(_)));
    assert_eq!(ctx.bindings().target, RenderTargetId::Default);
}
