use std::collections::{HashMap, HashSet};

use wgpu::util::DeviceExt;

use super::program::PipelineKey;
use super::{DefaultTarget, GpuTexture, WgpuDevice};
use crate::device::{
    AttachmentPoint, BufferId, ClearMask, GraphicsDevice, ProgramId, RenderTarget, RenderTargetId, TextureFormat,
    TextureId, Viewport,
};
use crate::errors::{RenderError, Result};

pub(super) enum Command {
    Clear {
        target: RenderTargetId,
        mask: ClearMask,
        color: [f32; 4],
    },
    Draw(Draw),
}

impl Command {
    fn target(&self) -> RenderTargetId {
        match self {
            Command::Clear { target, .. } => *target,
            Command::Draw(draw) => draw.target,
        }
    }
}

pub(super) struct Draw {
    pub(super) target: RenderTargetId,
    pub(super) viewport: Option<Viewport>,
    pub(super) program: ProgramId,
    pub(super) key: PipelineKey,
    /// Offset of this draw's uniform snapshot inside the frame arena.
    pub(super) uniform_offset: u32,
    /// Texture read by each sampler slot of the program.
    pub(super) textures: Vec<Option<TextureId>>,
    pub(super) vertex_buffers: Vec<BufferId>,
    pub(super) first: u32,
    pub(super) count: u32,
}

#[derive(Default)]
pub(super) struct FrameRecorder {
    pub(super) commands: Vec<Command>,
    uniforms: Vec<u8>,
}

impl FrameRecorder {
    pub(super) fn push_uniforms(&mut self, bytes: &[u8], alignment: usize) -> u32 {
        let offset = self.uniforms.len().div_ceil(alignment) * alignment;
        self.uniforms.resize(offset, 0);
        self.uniforms.extend_from_slice(bytes);
        offset as u32
    }
}

struct PassTarget<'a> {
    colors: Vec<&'a wgpu::TextureView>,
    depth: Option<&'a wgpu::TextureView>,
    size: (u32, u32),
}

struct Readback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
    swap_red_blue: bool,
}

impl Readback {
    fn read(self, device: &wgpu::Device) -> Result<image::RgbaImage> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| RenderError::Capture(e.to_string()))?;
        futures::executor::block_on(rx.receive())
            .ok_or_else(|| RenderError::Capture("readback channel closed".to_string()))?
            .map_err(|e| RenderError::Capture(e.to_string()))?;

        let row = (self.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row * self.height as usize);
        {
            let data = slice.get_mapped_range();
            for chunk in data.chunks(self.padded_row as usize).take(self.height as usize) {
                pixels.extend_from_slice(&chunk[..row]);
            }
        }
        self.buffer.unmap();
        if self.swap_red_blue {
            pixels.chunks_exact_mut(4).for_each(|px| px.swap(0, 2));
        }
        image::RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| RenderError::Capture("readback size mismatch".to_string()))
    }
}

/// Converts a bottom-left origin viewport into a wgpu rectangle inside `size`.
fn viewport_rect(viewport: Option<Viewport>, (width, height): (u32, u32)) -> Option<[f32; 4]> {
    let v = viewport.unwrap_or(Viewport::full(width, height));
    let x = v.x.min(width);
    let y = v.y.min(height);
    let w = v.width.min(width - x);
    let h = v.height.min(height - y);
    if w == 0 || h == 0 {
        return None;
    }
    Some([x as f32, (height - y - h) as f32, w as f32, h as f32])
}

impl WgpuDevice {
    fn default_size(&self) -> (u32, u32) {
        match &self.target {
            DefaultTarget::Surface { config, .. } => (config.width, config.height),
            DefaultTarget::Offscreen { texture, .. } => (texture.width(), texture.height()),
        }
    }

    fn resolve(&self, target: RenderTargetId) -> Option<PassTarget<'_>> {
        match target {
            RenderTargetId::Default => {
                let view = match &self.target {
                    DefaultTarget::Surface { current, .. } => &current.as_ref()?.1,
                    DefaultTarget::Offscreen { view, .. } => view,
                };
                Some(PassTarget {
                    colors: vec![view],
                    depth: None,
                    size: self.default_size(),
                })
            }
            RenderTargetId::Framebuffer(id) => {
                if !self.framebuffer_status(id).is_complete() {
                    return None;
                }
                let fb = self.framebuffers.get(&id)?;
                let texture = |point: &AttachmentPoint| {
                    fb.attachments
                        .get(point)
                        .and_then(|t| self.textures.get(t))
                };
                let colors: Vec<&GpuTexture> = fb
                    .draw_buffers
                    .iter()
                    .map(texture)
                    .collect::<Option<_>>()?;
                let depth = texture(&AttachmentPoint::Depth);
                let size = colors
                    .first()
                    .or(depth.as_ref())
                    .map(|t| (t.desc.width, t.desc.height))?;
                Some(PassTarget {
                    colors: colors.into_iter().map(|t| &t.view).collect(),
                    depth: depth.map(|t| &t.view),
                    size,
                })
            }
        }
    }

    fn attached_textures(&self, target: RenderTargetId) -> HashSet<TextureId> {
        match target {
            RenderTargetId::Default => HashSet::new(),
            RenderTargetId::Framebuffer(id) => self
                .framebuffers
                .get(&id)
                .map(|fb| fb.attachments.values().copied().collect())
                .unwrap_or_default(),
        }
    }

    fn texture_group(&self, draw: &Draw) -> Option<wgpu::BindGroup> {
        let program = self.programs.get(&draw.program)?;
        let layout = program.texture_layout()?;
        let attached = self.attached_textures(draw.target);
        let resolved: Vec<&GpuTexture> = draw
            .textures
            .iter()
            .map(|&texture| {
                texture
                    .filter(|id| {
                        let feedback = attached.contains(id);
                        if feedback {
                            log::warn!(
                                "Texture {} is both sampled and rendered to, sampling a placeholder",
                                id.raw()
                            );
                        }
                        !feedback
                    })
                    .and_then(|id| self.textures.get(&id))
                    .filter(|t| !t.desc.format.is_depth())
                    .unwrap_or(&self.placeholder)
            })
            .collect();
        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .enumerate()
            .flat_map(|(slot, &texture)| {
                [
                    wgpu::BindGroupEntry {
                        binding: slot as u32 * 2,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: slot as u32 * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(&texture.sampler),
                    },
                ]
            })
            .collect();
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.desc.label),
            layout,
            entries: &entries,
        }))
    }

    fn encode(&self, recorder: &FrameRecorder, encoder: &mut wgpu::CommandEncoder) {
        let commands = &recorder.commands;
        let arena = (!recorder.uniforms.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("frame uniforms"),
                    contents: &recorder.uniforms,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let mut uniform_groups: HashMap<ProgramId, wgpu::BindGroup> = HashMap::new();
        let mut texture_groups: Vec<Option<wgpu::BindGroup>> = Vec::with_capacity(commands.len());
        for command in commands {
            let Command::Draw(draw) = command else {
                texture_groups.push(None);
                continue;
            };
            if let (Some(arena), Some(program)) = (&arena, self.programs.get(&draw.program))
                && let Some(layout) = program.uniform_layout()
                && !uniform_groups.contains_key(&draw.program)
            {
                let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&program.desc.label),
                    layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: arena,
                            offset: 0,
                            size: wgpu::BufferSize::new(program.block.bytes().len() as u64),
                        }),
                    }],
                });
                uniform_groups.insert(draw.program, group);
            }
            texture_groups.push(self.texture_group(draw));
        }

        let mut index = 0;
        while index < commands.len() {
            let target = commands[index].target();
            let mut color_clear = None;
            let mut depth_clear = false;
            while let Some(Command::Clear {
                target: t,
                mask,
                color,
            }) = commands.get(index)
            {
                if *t != target {
                    break;
                }
                if mask.contains(ClearMask::COLOR) {
                    color_clear = Some(*color);
                }
                if mask.contains(ClearMask::DEPTH) {
                    depth_clear = true;
                }
                index += 1;
            }
            let start = index;
            while let Some(Command::Draw(draw)) = commands.get(index) {
                if draw.target != target {
                    break;
                }
                index += 1;
            }

            let Some(pass_target) = self.resolve(target) else {
                log::warn!("Skipping commands for {:?}: target cannot be rendered to", target);
                continue;
            };
            let load = match color_clear {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pass_target
                .colors
                .iter()
                .map(|&view| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();
            let depth_stencil_attachment =
                pass_target
                    .depth
                    .map(|view| wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: if depth_clear {
                                wgpu::LoadOp::Clear(1.0)
                            } else {
                                wgpu::LoadOp::Load
                            },
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("defer-ngin pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                ..Default::default()
            });

            for (offset, command) in commands[start..index].iter().enumerate() {
                let Command::Draw(draw) = command else {
                    continue;
                };
                let Some(pipeline) = self
                    .programs
                    .get(&draw.program)
                    .and_then(|p| p.pipeline(&draw.key))
                else {
                    continue;
                };
                let Some(uniforms) = uniform_groups.get(&draw.program) else {
                    continue;
                };
                let Some(buffers) = draw
                    .vertex_buffers
                    .iter()
                    .map(|id| self.buffers.get(id))
                    .collect::<Option<Vec<_>>>()
                else {
                    log::warn!("Skipping draw: a vertex buffer was destroyed");
                    continue;
                };
                let Some([x, y, w, h]) = viewport_rect(draw.viewport, pass_target.size) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_viewport(x, y, w, h, 0.0, 1.0);
                pass.set_bind_group(0, uniforms, &[draw.uniform_offset]);
                if let Some(group) = &texture_groups[start + offset] {
                    pass.set_bind_group(1, group, &[]);
                }
                for (slot, buffer) in buffers.iter().enumerate() {
                    pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                pass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }
    }

    fn copy_for_readback(&self, encoder: &mut wgpu::CommandEncoder) -> Result<Readback> {
        let texture = match &self.target {
            DefaultTarget::Surface {
                readable: false, ..
            } => {
                return Err(RenderError::Capture(
                    "the surface does not allow copies".to_string(),
                ));
            }
            DefaultTarget::Surface { current, .. } => {
                &current
                    .as_ref()
                    .ok_or_else(|| RenderError::Capture("no frame was acquired".to_string()))?
                    .0
                    .texture
            }
            DefaultTarget::Offscreen { texture, .. } => texture,
        };
        let (width, height) = self.default_size();
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = (width * 4).div_ceil(align) * align;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture buffer"),
            size: (padded_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(Readback {
            buffer,
            width,
            height,
            padded_row,
            swap_red_blue: matches!(
                self.target_format,
                TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb
            ),
        })
    }

    fn flush(&mut self) -> Result<()> {
        let recorder = std::mem::take(&mut self.frame);
        for command in &recorder.commands {
            if let Command::Draw(draw) = command
                && let Some(program) = self.programs.get_mut(&draw.program)
            {
                program.prepare_pipeline(&self.device, &draw.key);
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        self.encode(&recorder, &mut encoder);
        let readback = if std::mem::take(&mut self.capture_requested) {
            match self.copy_for_readback(&mut encoder) {
                Ok(readback) => Some(readback),
                Err(e) => {
                    log::error!("{}", e);
                    None
                }
            }
        } else {
            None
        };
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(readback) = readback {
            self.capture = Some(readback.read(&self.device)?);
        }
        Ok(())
    }
}

impl RenderTarget for WgpuDevice {
    fn begin_frame(&mut self) -> Result<()> {
        if self.in_frame {
            return Err(RenderError::RenderState("frame already begun".to_string()));
        }
        if let DefaultTarget::Surface {
            surface,
            config,
            current,
            ..
        } = &mut self.target
        {
            let frame = match surface.get_current_texture() {
                Ok(frame) => frame,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("Surface lost or outdated, reconfiguring");
                    surface.configure(&self.device, config);
                    surface.get_current_texture().map_err(|e| {
                        RenderError::RenderState(format!("surface unavailable: {e}"))
                    })?
                }
                Err(e) => {
                    return Err(RenderError::RenderState(format!(
                        "surface unavailable: {e}"
                    )));
                }
            };
            let view = frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            *current = Some((frame, view));
        }
        self.in_frame = true;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            return Err(RenderError::RenderState(
                "end_frame without begin_frame".to_string(),
            ));
        }
        self.in_frame = false;
        let flushed = self.flush();
        if let DefaultTarget::Surface { current, .. } = &mut self.target
            && let Some((frame, view)) = current.take()
        {
            drop(view);
            frame.present();
        }
        flushed
    }

    fn abort_frame(&mut self) {
        self.frame = FrameRecorder::default();
        self.in_frame = false;
        self.capture_requested = false;
        if let DefaultTarget::Surface { current, .. } = &mut self.target {
            current.take();
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        match &mut self.target {
            DefaultTarget::Surface {
                surface, config, ..
            } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            DefaultTarget::Offscreen { texture, view } => {
                let (new_texture, new_view) =
                    Self::offscreen_texture(&self.device, width, height, self.target_format);
                texture.destroy();
                *texture = new_texture;
                *view = new_view;
            }
        }
    }

    fn size(&self) -> (u32, u32) {
        self.default_size()
    }

    fn request_capture(&mut self) {
        self.capture_requested = true;
    }

    fn take_capture(&mut self) -> Option<image::RgbaImage> {
        self.capture.take()
    }
}
