use bytemuck::{Pod, Zeroable};

/// Parameters for one pass. Mirrors `Uniforms` in `shaders/common.wgsl`;
/// each pass reads the subset it needs.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Uniforms {
    pub texel_size: [f32; 2],
    pub dye_texel_size: [f32; 2],
    pub point: [f32; 2],
    pub aspect_ratio: f32,
    pub radius: f32,
    pub color: [f32; 4],
    pub dt: f32,
    pub dissipation: f32,
    pub curl: f32,
    pub value: f32,
}

pub const UNIFORMS_SIZE: u64 = std::mem::size_of::<Uniforms>() as u64;

const SLOTS_PER_CHUNK: u64 = 64;

struct Chunk {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Per-frame uniform storage. Every pass gets its own aligned slot so a
/// whole frame can be recorded into one encoder; slots are uploaded in
/// [`UniformArena::flush`] right before submit.
pub struct UniformArena {
    layout: wgpu::BindGroupLayout,
    stride: u64,
    chunks: Vec<Chunk>,
    staging: Vec<u8>,
    used: u64,
}

impl UniformArena {
    pub fn new(device: &wgpu::Device, layout: wgpu::BindGroupLayout) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = UNIFORMS_SIZE.div_ceil(align) * align;
        Self { layout, stride, chunks: Vec::new(), staging: Vec::new(), used: 0 }
    }

    pub fn bind_group_layout_entry() -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(UNIFORMS_SIZE),
            },
            count: None,
        }
    }

    /// Reserves a slot; returns the bind group and dynamic offset to draw with.
    pub fn push(&mut self, device: &wgpu::Device, uniforms: &Uniforms) -> (wgpu::BindGroup, u32) {
        let slot = self.used;
        self.used += 1;

        let chunk = (slot / SLOTS_PER_CHUNK) as usize;
        if chunk == self.chunks.len() {
            log::debug!("uniform arena grows to {} chunks", chunk + 1);
            self.chunks.push(self.new_chunk(device, chunk));
        }

        let start = (slot * self.stride) as usize;
        let end = start + UNIFORMS_SIZE as usize;
        if self.staging.len() < start + self.stride as usize {
            self.staging.resize(start + self.stride as usize, 0);
        }
        self.staging[start..end].copy_from_slice(bytemuck::bytes_of(uniforms));

        let offset = (slot % SLOTS_PER_CHUNK) * self.stride;
        (self.chunks[chunk].bind_group.clone(), offset as u32)
    }

    /// Uploads every slot used since the last flush.
    pub fn flush(&mut self, queue: &wgpu::Queue) {
        let chunk_bytes = (SLOTS_PER_CHUNK * self.stride) as usize;
        let used_bytes = (self.used * self.stride) as usize;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let start = i * chunk_bytes;
            if start >= used_bytes {
                break;
            }
            let end = used_bytes.min(start + chunk_bytes);
            queue.write_buffer(&chunk.buffer, 0, &self.staging[start..end]);
        }
        self.used = 0;
    }

    pub fn pending(&self) -> u64 {
        self.used
    }

    fn new_chunk(&self, device: &wgpu::Device, index: usize) -> Chunk {
        let label = format!("uniforms-{index}");
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&label),
            size: SLOTS_PER_CHUNK * self.stride,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&label),
            layout: &self.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(UNIFORMS_SIZE),
                }),
            }],
        });
        Chunk { buffer, bind_group }
    }
}
