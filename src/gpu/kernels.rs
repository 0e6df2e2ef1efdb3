use super::{GpuRegion, WgpuBackend};
use crate::backend::{Backend, Kernel, KernelParams};
use crate::emission::StageCopy;
use crate::engine::KernelSet;
use crate::error::{FountainError, Result};
use crate::record_layout::{Particle, Record};
use crate::shader_utils::work_groups;
use std::borrow::Cow;

// This should match the `Params` struct defined in the compute shaders.
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct ShaderParams {
    dt: f32,
    time: f32,
    gravity: f32,
    floor: f32,
    ttl: f32,
    anchor: [f32; 2],
    anchor_velocity: [f32; 2],
    record_count: u32,
    output_offset: u32,
    _padding: u32,
}

impl ShaderParams {
    fn new(params: &KernelParams, record_count: u32, output_offset: u32) -> Self {
        ShaderParams {
            dt: params.dt,
            time: params.time,
            gravity: params.gravity,
            floor: params.floor,
            ttl: params.ttl,
            anchor: params.anchor,
            anchor_velocity: params.anchor_velocity,
            record_count,
            output_offset,
            _padding: 0,
        }
    }
}

/// A compute pipeline plus its uniform buffer.
struct Program {
    pipeline: wgpu::ComputePipeline,
    uniforms: wgpu::Buffer,
}

impl Program {
    fn new(device: &wgpu::Device, label: &str, source: &'static str) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: None,
            module: &module,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel uniforms"),
            size: std::mem::size_of::<ShaderParams>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Program { pipeline, uniforms }
    }

    /// Uploads `params`, binds `storage` after the uniforms and runs one
    /// thread per record.
    fn dispatch(&self, backend: &WgpuBackend, params: &ShaderParams, storage: &[&wgpu::Buffer]) {
        backend
            .queue()
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(params));
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.uniforms.as_entire_binding(),
        }];
        for (i, buffer) in storage.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = backend.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &self.pipeline.get_bind_group_layout(0),
            entries: &entries,
        });
        let mut encoder = backend
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Fountain kernel"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            log::trace!("Dispatching {} work groups", work_groups(params.record_count));
            cpass.dispatch_workgroups(work_groups(params.record_count), 1, 1);
        }
        backend.submit(encoder);
    }
}

struct IntegrateState {
    program: Program,
    survivors: GpuRegion,
}

/// `particles.wgsl`: integration and mortality. Survivors are appended
/// through an atomic counter that is read back after the dispatch.
#[derive(Default)]
pub struct GpuIntegrate {
    state: Option<IntegrateState>,
}

impl Kernel<WgpuBackend> for GpuIntegrate {
    fn name(&self) -> &'static str {
        "particles.wgsl"
    }

    fn invoke(
        &mut self,
        backend: &mut WgpuBackend,
        input: Option<&GpuRegion>,
        output: &mut GpuRegion,
        output_offset: u32,
        record_count: u32,
        params: &KernelParams,
    ) -> Result<u32> {
        let input = input.ok_or_else(|| {
            FountainError::InvalidConfig("particles.wgsl needs an input region".into())
        })?;
        if record_count == 0 {
            return Ok(0);
        }
        let mut state = match self.state.take() {
            Some(state) => state,
            None => IntegrateState {
                program: Program::new(
                    backend.device(),
                    "Particle update",
                    crate::include_shader!("particles.wgsl"),
                ),
                survivors: backend.allocate("Survivor count", 4)?,
            },
        };
        backend.write(&mut state.survivors, 0, &0u32.to_le_bytes());
        state.program.dispatch(
            backend,
            &ShaderParams::new(params, record_count, output_offset),
            &[input.buffer(), output.buffer(), state.survivors.buffer()],
        );
        let count = backend.read(&state.survivors, 0, 4);
        self.state = Some(state);
        let count = count?;
        Ok(bytemuck::pod_read_unaligned::<u32>(&count))
    }
}

/// `emitter.wgsl`: the procedural fountain, computed on the device.
#[derive(Default)]
pub struct GpuFountain {
    program: Option<Program>,
}

impl Kernel<WgpuBackend> for GpuFountain {
    fn name(&self) -> &'static str {
        "emitter.wgsl"
    }

    fn invoke(
        &mut self,
        backend: &mut WgpuBackend,
        _input: Option<&GpuRegion>,
        output: &mut GpuRegion,
        output_offset: u32,
        record_count: u32,
        params: &KernelParams,
    ) -> Result<u32> {
        if record_count == 0 {
            return Ok(0);
        }
        let program = self.program.get_or_insert_with(|| {
            Program::new(
                backend.device(),
                "Procedural emitter",
                crate::include_shader!("emitter.wgsl"),
            )
        });
        program.dispatch(
            backend,
            &ShaderParams::new(params, record_count, output_offset),
            &[output.buffer()],
        );
        Ok(record_count)
    }
}

pub fn kernel_set() -> KernelSet<WgpuBackend> {
    KernelSet {
        update: Box::new(GpuIntegrate::default()),
        stage_copy: Box::new(|| -> Box<dyn Kernel<WgpuBackend>> {
            Box::new(StageCopy::new(Particle::layout().stride()))
        }),
        procedural: Box::new(|| -> Box<dyn Kernel<WgpuBackend>> {
            Box::new(GpuFountain::default())
        }),
    }
}
