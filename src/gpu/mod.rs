//! Compute-shader backend.
//!
//! Owns the device, the six bindings listed in [`shader`] and one compute
//! pipeline per stage. Every stage is its own submission because the
//! uniform block changes between stages; the queue orders the
//! `write_buffer` before the dispatch that reads it.
//!
//! Per-stage counts (requested, emitted, expired) come from a small atomic
//! counter buffer that is zeroed before and read back after each stage.

mod shader;

pub use shader::{
    generate_compute_shader, EMIT_ENTRY, ENTRY_POINTS, INITIALIZE_ENTRY, REQUEST_ENTRY,
    UPDATE_ENTRY,
};

use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::error::{GpuError, PoolError, Result};
use crate::particle::{Particle, PARTICLE_STRIDE};
use crate::simulation::Backend;
use crate::spatial::{Aabb, SdfNode, SdfTree};
use crate::uniforms::{SimParams, SimUniforms};
use crate::WORKGROUP_SIZE;

const COUNTER_BYTES: u64 = 16;
const REQUESTED: usize = 0;
const EMITTED: usize = 1;
const EXPIRED: usize = 2;

/// The particle pool living in GPU buffers.
pub struct GpuSimulation {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    initialize_pipeline: wgpu::ComputePipeline,
    request_pipeline: wgpu::ComputePipeline,
    emit_pipeline: wgpu::ComputePipeline,
    update_pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    particle_buffer: wgpu::Buffer,
    free_buffer: wgpu::Buffer,
    request_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    counter_buffer: wgpu::Buffer,
    tree: SdfTree,
    capacity: u32,
    uniforms: SimUniforms,
    /// Indices sitting in the request list since the last emission.
    pending: u32,
}

impl GpuSimulation {
    pub async fn new(capacity: u32, tree: SdfTree) -> Result<Self> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity.into());
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("SDF Particles Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::from)?;

        let max = max_capacity(&device.limits());
        if capacity > max {
            return Err(GpuError::CapacityTooLarge { capacity, max }.into());
        }

        // Particle buffer (zero-initialized; the initialize kernel fills it)
        let particle_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Buffer"),
            size: capacity as u64 * PARTICLE_STRIDE as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // A binding cannot be empty, so a tree without nodes uploads one
        // degenerate node and reports octree_size = 0.
        let dummy;
        let node_bytes: &[u8] = if tree.is_empty() {
            dummy = [SdfNode::leaf(Aabb::new(Vec3::ZERO, Vec3::ZERO), Vec3::ZERO)];
            bytemuck::cast_slice(&dummy)
        } else {
            tree.as_bytes()
        };
        let node_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SDF Node Buffer"),
            contents: node_bytes,
            usage: wgpu::BufferUsages::STORAGE,
        });

        let list_size = 4 + capacity as u64 * 4;
        let free_buffer = create_index_list(&device, "Free List Buffer", list_size);
        let request_buffer = create_index_list(&device, "Request List Buffer", list_size);

        let uniforms = SimUniforms::new(&SimParams::default(), &tree, capacity);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sim Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let counter_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Stage Counter Buffer"),
            contents: &[0u8; COUNTER_BYTES as usize],
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Compute Bind Group Layout"),
            entries: &[
                storage_entry(0, false),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(5, false),
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Compute Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: node_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: free_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: request_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: counter_buffer.as_entire_binding(),
                },
            ],
        });

        let compute_shader_src = generate_compute_shader();
        let compute_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(compute_shader_src.into()),
        });

        let compute_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Compute Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&compute_pipeline_layout),
                module: &compute_shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let initialize_pipeline = pipeline(INITIALIZE_ENTRY);
        let request_pipeline = pipeline(REQUEST_ENTRY);
        let emit_pipeline = pipeline(EMIT_ENTRY);
        let update_pipeline = pipeline(UPDATE_ENTRY);

        log::info!(
            "GPU backend on {}: {} slots, tree of {} nodes (depth {})",
            adapter_name,
            capacity,
            tree.len(),
            tree.depth()
        );

        Ok(Self {
            device,
            queue,
            adapter_name,
            initialize_pipeline,
            request_pipeline,
            emit_pipeline,
            update_pipeline,
            bind_group,
            particle_buffer,
            free_buffer,
            request_buffer,
            uniform_buffer,
            counter_buffer,
            tree,
            capacity,
            uniforms,
            pending: 0,
        })
    }

    /// Blocking wrapper around [`GpuSimulation::new`].
    pub fn new_blocking(capacity: u32, tree: SdfTree) -> Result<Self> {
        pollster::block_on(Self::new(capacity, tree))
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn tree(&self) -> &SdfTree {
        &self.tree
    }

    /// Current members of the request list, in no particular order.
    pub fn request_indices(&self) -> Result<Vec<u32>> {
        self.read_index_list(&self.request_buffer)
    }

    /// Upload `uniforms`, then run `invocations` threads of `pipeline`.
    fn dispatch(&self, pipeline: &wgpu::ComputePipeline, uniforms: &SimUniforms, invocations: u32) {
        if invocations == 0 {
            return;
        }
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Compute Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(invocations.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Run one stage and return the counter it increments.
    fn counted_dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        uniforms: &SimUniforms,
        invocations: u32,
        counter: usize,
    ) -> Result<u32> {
        if invocations == 0 {
            return Ok(0);
        }
        self.queue
            .write_buffer(&self.counter_buffer, 0, &[0u8; COUNTER_BYTES as usize]);
        self.dispatch(pipeline, uniforms, invocations);

        let bytes = self.read_buffer(&self.counter_buffer, COUNTER_BYTES)?;
        let counters: [u32; 4] = bytemuck::pod_read_unaligned(&bytes);
        Ok(counters[counter])
    }

    /// Copy the first `size` bytes of `source` to the host.
    fn read_buffer(&self, source: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging_buffer, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let data = buffer_slice.get_mapped_range().to_vec();
        staging_buffer.unmap();
        Ok(data)
    }

    fn read_index_list(&self, list: &wgpu::Buffer) -> Result<Vec<u32>> {
        let bytes = self.read_buffer(list, 4 + self.capacity as u64 * 4)?;
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .collect();
        let Some((&count, indices)) = words.split_first() else {
            return Ok(Vec::new());
        };
        Ok(indices[..(count as usize).min(indices.len())].to_vec())
    }
}

impl Backend for GpuSimulation {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn initialize(&mut self, params: &SimParams) -> Result<()> {
        self.uniforms = SimUniforms::new(params, &self.tree, self.capacity);
        self.dispatch(&self.initialize_pipeline, &self.uniforms, self.capacity);
        self.pending = 0;
        log::debug!("GPU pool initialized: {} free slots", self.capacity);
        Ok(())
    }

    fn request(&mut self, count: u32) -> Result<u32> {
        // The free list never holds more than `capacity` indices
        let invocations = count.min(self.capacity);
        let uniforms = self.uniforms.with_dispatch_count(invocations);
        let moved = self.counted_dispatch(&self.request_pipeline, &uniforms, invocations, REQUESTED)?;
        if moved < count {
            log::warn!("Requested {count} particles but only {moved} slots were free");
        }
        self.pending = (self.pending + moved).min(self.capacity);
        Ok(moved)
    }

    fn emit(&mut self, params: &SimParams) -> Result<u32> {
        self.uniforms = SimUniforms::new(params, &self.tree, self.capacity);
        let uniforms = self.uniforms.with_dispatch_count(self.pending);
        let emitted = self.counted_dispatch(&self.emit_pipeline, &uniforms, self.pending, EMITTED)?;
        self.pending = 0;
        Ok(emitted)
    }

    fn update(&mut self, params: &SimParams) -> Result<u32> {
        self.uniforms = SimUniforms::new(params, &self.tree, self.capacity);
        self.counted_dispatch(&self.update_pipeline, &self.uniforms, self.capacity, EXPIRED)
    }

    fn particles(&mut self) -> Result<Vec<Particle>> {
        let bytes = self.read_buffer(&self.particle_buffer, self.capacity as u64 * PARTICLE_STRIDE as u64)?;
        Ok(bytes
            .chunks_exact(PARTICLE_STRIDE)
            .map(bytemuck::pod_read_unaligned::<Particle>)
            .collect())
    }

    fn free_indices(&mut self) -> Result<Vec<u32>> {
        self.read_index_list(&self.free_buffer)
    }
}

/// Largest pool that fits one 1-D dispatch and one particle binding.
fn max_capacity(limits: &wgpu::Limits) -> u32 {
    let by_dispatch = limits.max_compute_workgroups_per_dimension as u64 * WORKGROUP_SIZE as u64;
    let by_binding = limits.max_storage_buffer_binding_size as u64 / PARTICLE_STRIDE as u64;
    by_dispatch.min(by_binding).min(u32::MAX as u64) as u32
}

fn create_index_list(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_capacity_default_limits() {
        let limits = wgpu::Limits::default();
        let max = max_capacity(&limits);
        assert!(max >= 1_000_000);
        assert!(max as u64 * PARTICLE_STRIDE as u64 <= limits.max_storage_buffer_binding_size as u64);
    }

    #[test]
    fn test_max_capacity_dispatch_bound() {
        let limits = wgpu::Limits {
            max_compute_workgroups_per_dimension: 2,
            ..wgpu::Limits::default()
        };
        assert_eq!(max_capacity(&limits), 2 * WORKGROUP_SIZE);
    }
}
