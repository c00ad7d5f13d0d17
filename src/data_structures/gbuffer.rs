//! The offscreen multi-target framebuffer of the geometry pass.
//!
//! Four colour attachments (position, normal, albedo + specular, emission)
//! and a depth attachment, all of one size. Storage is allocated on the first
//! [`GBuffer::ensure_size`] and re-specified in place on later size changes, so
//! the texture handles stay stable for the lifetime of the buffer.

use crate::{
    context::{GeometryPass, RenderContext},
    device::{
        AttachmentPoint, FilterMode, FramebufferId, FramebufferStatus, GraphicsDevice,
        RenderTargetId, TextureDescriptor, TextureFormat, TextureId, Viewport, WrapMode,
    },
    errors::{RenderError, RenderWarning, Result},
};

/// Number of colour attachments.
pub const COLOR_ATTACHMENTS: usize = 4;

/// Attachment names, in colour attachment order.
pub const ATTACHMENT_NAMES: [&str; COLOR_ATTACHMENTS] = ["position", "normal", "albedo_spec", "emission"];

/// Formats of the colour attachments. There is no three-channel half float
/// format, so the unused alpha of position, normal and emission rides along.
pub const COLOR_FORMATS: [TextureFormat; COLOR_ATTACHMENTS] = [
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba16Float,
];

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const DRAW_BUFFERS: [AttachmentPoint; COLOR_ATTACHMENTS] = [
    AttachmentPoint::Color(0),
    AttachmentPoint::Color(1),
    AttachmentPoint::Color(2),
    AttachmentPoint::Color(3),
];

#[derive(Debug, Clone, Copy)]
struct Targets {
    framebuffer: FramebufferId,
    colors: [TextureId; COLOR_ATTACHMENTS],
    depth: TextureId,
}

impl Targets {
    fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.colors.iter().copied().chain(std::iter::once(self.depth))
    }
}

#[derive(Debug)]
pub struct GBuffer {
    label: String,
    targets: Option<Targets>,
    size: (u32, u32),
}

impl Default for GBuffer {
    fn default() -> Self {
        Self::new("g-buffer")
    }
}

impl GBuffer {
    /// A G-buffer with no storage yet. Nothing is allocated until
    /// [`GBuffer::ensure_size`].
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            targets: None,
            size: (0, 0),
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.targets.is_some()
    }

    /// Current attachment size; `(0, 0)` before the first allocation.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.targets.map(|t| t.framebuffer)
    }

    pub fn color_attachment(&self, index: usize) -> Option<TextureId> {
        self.targets.and_then(|t| t.colors.get(index).copied())
    }

    pub fn color_attachments(&self) -> Option<[TextureId; COLOR_ATTACHMENTS]> {
        self.targets.map(|t| t.colors)
    }

    pub fn depth_attachment(&self) -> Option<TextureId> {
        self.targets.map(|t| t.depth)
    }

    /// Allocate, or resize in place, to `width` x `height` (each at least 1).
    ///
    /// An incomplete framebuffer is logged and otherwise ignored.
    pub fn ensure_size<D: GraphicsDevice>(
        &mut self,
        ctx: &mut RenderContext<D>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        match self.targets {
            Some(_) if self.size == (width, height) => return Ok(()),
            Some(targets) => {
                log::debug!(
                    "Resizing '{}' from {:?} to {}x{}",
                    self.label,
                    self.size,
                    width,
                    height
                );
                let device = ctx.device_mut();
                for texture in targets.textures() {
                    device.resize_texture(texture, width, height)?;
                }
            }
            None => {
                log::debug!("Allocating '{}' at {}x{}", self.label, width, height);
                self.targets = Some(self.allocate(ctx.device_mut(), width, height)?);
            }
        }
        self.size = (width, height);
        self.check_complete(ctx);
        Ok(())
    }

    fn allocate<D: GraphicsDevice>(&self, device: &mut D, width: u32, height: u32) -> Result<Targets> {
        let mut textures = Vec::with_capacity(COLOR_ATTACHMENTS + 1);
        let mut framebuffer = None;
        let result = self.try_allocate(device, width, height, &mut textures, &mut framebuffer);
        if result.is_err() {
            // Free whatever was created before the failure.
            if let Some(fb) = framebuffer {
                device.destroy_framebuffer(fb);
            }
            for texture in textures {
                device.destroy_texture(texture);
            }
        }
        result
    }

    fn try_allocate<D: GraphicsDevice>(
        &self,
        device: &mut D,
        width: u32,
        height: u32,
        textures: &mut Vec<TextureId>,
        framebuffer: &mut Option<FramebufferId>,
    ) -> Result<Targets> {
        let fb = device.create_framebuffer(&self.label)?;
        *framebuffer = Some(fb);

        let formats = COLOR_FORMATS.iter().zip(ATTACHMENT_NAMES);
        for (format, name) in formats.chain(std::iter::once((&DEPTH_FORMAT, "depth"))) {
            let texture = device.create_texture(&TextureDescriptor {
                label: format!("{} {}", self.label, name),
                width,
                height,
                format: *format,
                filter: FilterMode::Nearest,
                wrap: WrapMode::ClampToEdge,
            })?;
            textures.push(texture);
        }

        let colors = [textures[0], textures[1], textures[2], textures[3]];
        let depth = textures[COLOR_ATTACHMENTS];
        for (i, texture) in colors.iter().enumerate() {
            device.attach_texture(fb, AttachmentPoint::Color(i as u8), *texture)?;
        }
        device.attach_texture(fb, AttachmentPoint::Depth, depth)?;
        device.set_draw_buffers(fb, &DRAW_BUFFERS)?;

        Ok(Targets {
            framebuffer: fb,
            colors,
            depth,
        })
    }

    /// Completeness as the device reports it; `None` before allocation.
    pub fn status<D: GraphicsDevice>(&self, ctx: &RenderContext<D>) -> Option<FramebufferStatus> {
        self.targets
            .map(|t| ctx.device().framebuffer_status(t.framebuffer))
    }

    fn check_complete<D: GraphicsDevice>(&self, ctx: &RenderContext<D>) {
        if let Some(status) = self.status(ctx)
            && !status.is_complete()
        {
            RenderWarning::FramebufferIncomplete {
                label: self.label.clone(),
                status,
            }
            .emit();
        }
    }

    /// Bind the G-buffer with its own viewport. The returned pass restores the
    /// default target when it ends.
    pub fn bind_as_target<'a, D: GraphicsDevice>(
        &self,
        ctx: &'a mut RenderContext<D>,
    ) -> Result<GeometryPass<'a, D>> {
        let targets = self.targets.ok_or_else(|| {
            RenderError::RenderState(format!("'{}' is bound before it was allocated", self.label))
        })?;
        ctx.device_mut()
            .set_draw_buffers(targets.framebuffer, &DRAW_BUFFERS)?;
        ctx.bind_target(RenderTargetId::Framebuffer(targets.framebuffer));
        ctx.set_viewport(Viewport::full(self.size.0, self.size.1));
        Ok(GeometryPass::new(ctx, self.size))
    }

    /// Free the framebuffer and all five attachments. Calling it again does
    /// nothing.
    pub fn release<D: GraphicsDevice>(&mut self, ctx: &mut RenderContext<D>) {
        let Some(targets) = self.targets.take() else {
            return;
        };
        if ctx.bindings().target == RenderTargetId::Framebuffer(targets.framebuffer) {
            ctx.bind_target(RenderTargetId::Default);
        }
        let device = ctx.device_mut();
        device.destroy_framebuffer(targets.framebuffer);
        for texture in targets.textures() {
            device.destroy_texture(texture);
        }
        self.size = (0, 0);
        log::debug!("Released '{}'", self.label);
    }
}
