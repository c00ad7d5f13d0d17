use std::collections::HashMap;

use super::{ErrorSink, convert};
use crate::device::uniforms::UniformBlock;
use crate::device::{CullFace, DepthFunc, ProgramDescriptor, TextureFormat, VertexBufferLayout};

/// Everything a render pipeline depends on besides the program itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub(super) vertex_layout: Vec<VertexBufferLayout>,
    pub(super) color_formats: Vec<TextureFormat>,
    pub(super) depth_format: Option<TextureFormat>,
    pub(super) depth_test: Option<DepthFunc>,
    pub(super) cull: Option<CullFace>,
}

struct LinkedStages {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    vs_entry: String,
    fs_entry: String,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
}

pub(super) struct Program {
    pub(super) desc: ProgramDescriptor,
    pub(super) block: UniformBlock,
    pub(super) log: String,
    stages: Option<LinkedStages>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl Program {
    pub(super) fn link(device: &wgpu::Device, desc: &ProgramDescriptor, errors: &ErrorSink) -> Self {
        let block = UniformBlock::new(&desc.uniforms);
        let mut program = Self {
            desc: desc.clone(),
            block,
            log: String::new(),
            stages: None,
            pipelines: HashMap::new(),
        };
        for stage in [&desc.vertex, &desc.fragment] {
            if !stage.source.contains(&format!("fn {}", stage.entry_point)) {
                program.log = format!("entry point '{}' not found", stage.entry_point);
                return program;
            }
        }

        // Compilation errors are reported synchronously through the
        // uncaptured error handler.
        errors.drain();
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} vertex", desc.label)),
            source: wgpu::ShaderSource::Wgsl(desc.vertex.source.as_str().into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} fragment", desc.label)),
            source: wgpu::ShaderSource::Wgsl(desc.fragment.source.as_str().into()),
        });
        let failures = errors.drain();
        if !failures.is_empty() {
            program.log = failures.join("\n");
            return program;
        }

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} uniforms", desc.label)),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(program.block.bytes().len() as u64),
                },
                count: None,
            }],
        });

        let texture_layout = (program.block.sampler_count() > 0).then(|| {
            let entries: Vec<_> = (0..program.block.sampler_count() as u32)
                .flat_map(|slot| {
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: slot * 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: slot * 2 + 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} textures", desc.label)),
                entries: &entries,
            })
        });

        let pipeline_layout = match &texture_layout {
            Some(textures) => device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &[&uniform_layout, textures],
                immediate_size: 0,
            }),
            None => device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &[&uniform_layout],
                immediate_size: 0,
            }),
        };

        program.stages = Some(LinkedStages {
            vertex,
            fragment,
            vs_entry: desc.vertex.entry_point.clone(),
            fs_entry: desc.fragment.entry_point.clone(),
            uniform_layout,
            texture_layout,
            pipeline_layout,
        });
        program
    }

    pub(super) fn linked(&self) -> bool {
        self.stages.is_some()
    }

    pub(super) fn uniform_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        self.stages.as_ref().map(|s| &s.uniform_layout)
    }

    pub(super) fn texture_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        self.stages.as_ref().and_then(|s| s.texture_layout.as_ref())
    }

    pub(super) fn pipeline(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    /// Build the pipeline for `key` unless it is cached already.
    pub(super) fn prepare_pipeline(&mut self, device: &wgpu::Device, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        let Some(stages) = &self.stages else {
            return;
        };
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .vertex_layout
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: convert::vertex_format(a.format),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .vertex_layout
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: convert::texture_format(*format),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        // Without a depth test nothing is written to depth either.
        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format: convert::texture_format(format),
            depth_write_enabled: key.depth_test.is_some(),
            depth_compare: key
                .depth_test
                .map(convert::compare)
                .unwrap_or(wgpu::CompareFunction::Always),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        log::debug!("Creating pipeline for '{}': {:?}", self.desc.label, key);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&self.desc.label),
            layout: Some(&stages.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &stages.vertex,
                entry_point: Some(stages.vs_entry.as_str()),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &stages.fragment,
                entry_point: Some(stages.fs_entry.as_str()),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: convert::cull_mode(key.cull),
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.pipelines.insert(key.clone(), pipeline);
    }
}
