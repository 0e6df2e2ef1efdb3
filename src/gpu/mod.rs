//! Device backend on top of `wgpu`. Every record region is a storage
//! buffer; kernels are WGSL compute shaders rendered by `build.rs`.

pub mod kernels;

use crate::backend::Backend;
use crate::error::{FountainError, Result};

pub struct GpuRegion {
    buffer: wgpu::Buffer,
    size: u64,
}

impl GpuRegion {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuBackend {
    /// Picks the default adapter without a surface. Blocks until the device
    /// is ready.
    pub fn new() -> Result<Self> {
        futures::executor::block_on(Self::request())
    }

    async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| FountainError::Device("no suitable adapter".into()))?;
        log::info!("Adapter: {:?}", adapter.get_info());
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Fountain device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| FountainError::Device(e.to_string()))?;
        Ok(WgpuBackend::from_device(device, queue))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuBackend { device, queue }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(Some(encoder.finish()));
    }
}

impl Backend for WgpuBackend {
    type Region = GpuRegion;

    fn allocate(&mut self, label: &str, bytes: u64) -> Result<GpuRegion> {
        let limits = self.device.limits();
        let ceiling = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if bytes > ceiling {
            return Err(FountainError::GrowthFailure {
                requested_bytes: bytes,
                reason: format!("device limit is {} bytes", ceiling),
            });
        }
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(error) = futures::executor::block_on(self.device.pop_error_scope()) {
            return Err(FountainError::GrowthFailure {
                requested_bytes: bytes,
                reason: error.to_string(),
            });
        }
        Ok(GpuRegion {
            buffer,
            size: bytes,
        })
    }

    fn write(&mut self, region: &mut GpuRegion, byte_offset: u64, data: &[u8]) {
        self.queue.write_buffer(&region.buffer, byte_offset, data);
    }

    fn copy(
        &mut self,
        src: &GpuRegion,
        src_offset: u64,
        dst: &mut GpuRegion,
        dst_offset: u64,
        bytes: u64,
    ) {
        if bytes == 0 {
            return;
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Region copy"),
            });
        encoder.copy_buffer_to_buffer(&src.buffer, src_offset, &dst.buffer, dst_offset, bytes);
        self.submit(encoder);
    }

    fn read(&mut self, region: &GpuRegion, byte_offset: u64, bytes: u64) -> Result<Vec<u8>> {
        if bytes == 0 {
            return Ok(Vec::new());
        }
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback copy"),
            });
        encoder.copy_buffer_to_buffer(&region.buffer, byte_offset, &readback, 0, bytes);
        self.submit(encoder);

        let slice = readback.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match futures::executor::block_on(receiver) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(FountainError::Device(e.to_string())),
            Err(_) => return Err(FountainError::Device("readback was cancelled".into())),
        }
        let data = slice.get_mapped_range().to_vec();
        readback.unmap();
        Ok(data)
    }

    fn region_size(&self, region: &GpuRegion) -> u64 {
        region.size
    }
}
