//! Seams between the host-side cycle and whatever owns the record storage.
//!
//! A [`Backend`] hands out storage regions and moves bytes in and out of
//! them. A [`Kernel`] is the opaque transform that runs against those
//! regions; the host only ever learns how many records it wrote.

use crate::error::Result;

pub trait Backend {
    /// Owned handle to one storage region. Dropping it releases the storage.
    type Region;

    /// Allocates `bytes` of storage. Contents are unspecified.
    fn allocate(&mut self, label: &str, bytes: u64) -> Result<Self::Region>;

    fn write(&mut self, region: &mut Self::Region, byte_offset: u64, data: &[u8]);

    fn copy(
        &mut self,
        src: &Self::Region,
        src_offset: u64,
        dst: &mut Self::Region,
        dst_offset: u64,
        bytes: u64,
    );

    /// Blocking readback.
    fn read(&mut self, region: &Self::Region, byte_offset: u64, bytes: u64) -> Result<Vec<u8>>;

    fn region_size(&self, region: &Self::Region) -> u64;
}

/// Scalar inputs shared by every kernel invocation in a frame.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct KernelParams {
    pub dt: f32,
    pub time: f32,
    pub gravity: f32,
    /// Records at or below this height are retired by the update kernel.
    pub floor: f32,
    /// Lifetime given to records created by emission kernels.
    pub ttl: f32,
    pub anchor: [f32; 2],
    pub anchor_velocity: [f32; 2],
}

/// `invoke(input, output, record_count, params) -> count`.
///
/// Update kernels read `record_count` records from `input` and write the
/// survivors contiguously into `output` starting at `output_offset`; the
/// returned count never exceeds `record_count`. Creation kernels write
/// exactly `record_count` records.
pub trait Kernel<B: Backend> {
    fn name(&self) -> &'static str;

    fn invoke(
        &mut self,
        backend: &mut B,
        input: Option<&B::Region>,
        output: &mut B::Region,
        output_offset: u32,
        record_count: u32,
        params: &KernelParams,
    ) -> Result<u32>;
}

impl<B: Backend, K: Kernel<B> + ?Sized> Kernel<B> for Box<K> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn invoke(
        &mut self,
        backend: &mut B,
        input: Option<&B::Region>,
        output: &mut B::Region,
        output_offset: u32,
        record_count: u32,
        params: &KernelParams,
    ) -> Result<u32> {
        (**self).invoke(backend, input, output, output_offset, record_count, params)
    }
}
