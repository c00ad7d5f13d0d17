//! The seam between the renderer and the GPU.
//!
//! [`GraphicsDevice`] is a small object-and-state API: objects are created
//! up front and referred to by typed handles, while binding state (target,
//! program, vertex array, texture units) is changed by explicit calls and
//! consumed by [`GraphicsDevice::draw_arrays`]. Two backends exist:
//!
//! - [`gpu::WgpuDevice`] renders for real, onto a window surface or headless
//! - [`recording::RecordingDevice`] keeps everything on the CPU and records
//!   what was asked of it, which is what the test-suite inspects

pub mod recording;
mod types;
pub(crate) mod uniforms;
pub mod gpu;

pub use types::*;

use crate::errors::Result;

pub trait GraphicsDevice {
    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> Result<VertexArrayId>;
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId>;
    /// Replace the whole image. `pixels` must hold `width * height` texels,
    /// first row first.
    fn upload_texture(&mut self, texture: TextureId, pixels: &[u8]) -> Result<()>;
    /// Re-specify the storage of `texture` at a new size. The handle stays
    /// valid and every framebuffer it is attached to sees the new storage.
    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<()>;
    fn texture_info(&self, texture: TextureId) -> Option<TextureInfo>;
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, label: &str) -> Result<FramebufferId>;
    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        texture: TextureId,
    ) -> Result<()>;
    /// Which color attachments fragment outputs `0..n` are written to.
    fn set_draw_buffers(
        &mut self,
        framebuffer: FramebufferId,
        buffers: &[AttachmentPoint],
    ) -> Result<()>;
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Compile and link. A program that fails to link still gets a handle so
    /// that callers can query [`GraphicsDevice::program_linked`] and the log.
    fn create_program(&mut self, desc: &ProgramDescriptor) -> Result<ProgramId>;
    fn program_linked(&self, program: ProgramId) -> bool;
    fn program_log(&self, program: ProgramId) -> String;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn destroy_program(&mut self, program: ProgramId);

    fn bind_target(&mut self, target: RenderTargetId);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_clear_color(&mut self, color: [f32; 4]);
    fn clear(&mut self, mask: ClearMask);
    fn set_depth_test(&mut self, func: Option<DepthFunc>);
    fn set_cull_face(&mut self, face: Option<CullFace>);
    fn use_program(&mut self, program: Option<ProgramId>);
    /// Applies to the program currently in use.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<()>;
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);
    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<()>;
}

/// The visible output of a device and its frame boundaries.
pub trait RenderTarget {
    fn begin_frame(&mut self) -> Result<()>;
    fn end_frame(&mut self) -> Result<()>;
    /// Drop whatever was recorded since [`RenderTarget::begin_frame`], along
    /// with a pending capture request.
    fn abort_frame(&mut self);
    /// New size in physical pixels.
    fn resize(&mut self, width: u32, height: u32);
    fn size(&self) -> (u32, u32);
    /// Ask for the visible contents of the next completed frame.
    fn request_capture(&mut self);
    fn take_capture(&mut self) -> Option<image::RgbaImage>;
}
