use std::collections::HashMap;

use crate::device::{AttributePointer, DrawCall, ProgramDesc, UniformDesc, UniformKind, UniformSet, UniformValue};
use crate::error::{RenderError, RenderResult};
use crate::paint::{BlendFactor, BlendMode};

use super::COLOR_FORMAT;

/// Vertex layout + blend state a pipeline was built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    buffers: Vec<(u32, Vec<AttributePointer>)>,
    blend: BlendMode,
}

impl PipelineKey {
    pub fn for_call(call: &DrawCall<'_>) -> Self {
        Self {
            buffers: call
                .vertex_buffers
                .iter()
                .map(|b| (b.stride, b.attributes.to_vec()))
                .collect(),
            blend: call.blend_mode,
        }
    }
}

/// A compiled program: shader module, bind group layouts, uniform storage and
/// the pipelines created for it so far.
pub(super) struct Program {
    pub desc: &'static ProgramDesc,
    module: wgpu::ShaderModule,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_ubo: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl Program {
    pub fn new(device: &wgpu::Device, desc: &'static ProgramDesc) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.wgsl.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prism uniform bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..desc.samplers.len() as u32)
            .flat_map(|i| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: i * 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: i * 2 + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prism texture bgl"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        let uniform_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("prism uniform ubo"),
            size: uniform_block_size(desc.uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prism uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_ubo.as_entire_binding(),
            }],
        });

        Self {
            desc,
            module,
            texture_layout,
            pipeline_layout,
            uniform_ubo,
            uniform_bind_group,
            pipelines: HashMap::new(),
        }
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, values: &UniformSet) -> RenderResult<()> {
        let bytes = pack_uniforms(self.desc.uniforms, values)?;
        queue.write_buffer(&self.uniform_ubo, 0, &bytes);
        Ok(())
    }

    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        textures: &[(&wgpu::TextureView, &wgpu::Sampler)],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = textures
            .iter()
            .enumerate()
            .flat_map(|(i, (view, sampler))| {
                [
                    wgpu::BindGroupEntry {
                        binding: i as u32 * 2,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: i as u32 * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ]
            })
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prism texture bind group"),
            layout: &self.texture_layout,
            entries: &entries,
        })
    }

    /// Builds the pipeline for `key` on first use.
    pub fn ensure_pipeline(&mut self, device: &wgpu::Device, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        log::debug!("building pipeline for `{}` ({:?})", self.desc.label, key.blend);
        let pipeline = build_pipeline(device, self.desc, &self.module, &self.pipeline_layout, key);
        self.pipelines.insert(key.clone(), pipeline);
    }

    pub fn pipeline(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    desc: &ProgramDesc,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
        .buffers
        .iter()
        .map(|(_, attrs)| {
            attrs
                .iter()
                .map(|a| wgpu::VertexAttribute {
                    format: vertex_format(a.components),
                    offset: a.offset as u64,
                    shader_location: a.location,
                })
                .collect()
        })
        .collect();

    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
        .buffers
        .iter()
        .zip(&attributes)
        .map(|((stride, _), attrs)| wgpu::VertexBufferLayout {
            array_stride: *stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: attrs,
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(layout),

        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &buffers,
        },

        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(blend_state(key.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
    }
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    let (src, dst) = mode.factors();
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(src),
        dst_factor: blend_factor(dst),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: component, alpha: component }
}

// ── uniform block layout ──────────────────────────────────────────────────

/// `(align, size)` of a uniform member under WGSL uniform address-space rules.
fn member_layout(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Float => (4, 4),
        UniformKind::Vec4 => (16, 16),
        // mat3x3<f32>: three vec3 columns, each padded to 16 bytes.
        UniformKind::Mat3 => (16, 48),
    }
}

fn uniform_block_size(uniforms: &[UniformDesc]) -> u64 {
    let mut offset = 0usize;
    for u in uniforms {
        let (align, size) = member_layout(u.kind);
        offset = offset.next_multiple_of(align) + size;
    }
    offset.next_multiple_of(16).max(16) as u64
}

/// Packs `values` in declaration order; members without a value are zeroed.
pub(super) fn pack_uniforms(uniforms: &[UniformDesc], values: &UniformSet) -> RenderResult<Vec<u8>> {
    let mut out = vec![0u8; uniform_block_size(uniforms) as usize];
    let mut offset = 0usize;

    for u in uniforms {
        let (align, size) = member_layout(u.kind);
        offset = offset.next_multiple_of(align);

        match (u.kind, values.get(u.name)) {
            (_, None) => {}
            (UniformKind::Float, Some(UniformValue::Float(v))) => {
                out[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&v));
            }
            (UniformKind::Vec4, Some(UniformValue::Vec4(v))) => {
                out[offset..offset + 16].copy_from_slice(bytemuck::cast_slice(&v));
            }
            (UniformKind::Mat3, Some(UniformValue::Mat3(m))) => {
                for col in 0..3 {
                    let at = offset + col * 16;
                    out[at..at + 12].copy_from_slice(bytemuck::cast_slice(&m[col * 3..col * 3 + 3]));
                }
            }
            (kind, Some(value)) => {
                return Err(RenderError::InvalidResource(format!(
                    "uniform `{}` expects {kind:?}, got {:?}",
                    u.name,
                    value.kind()
                )));
            }
        }

        offset += size;
    }

    Ok(out)
}
