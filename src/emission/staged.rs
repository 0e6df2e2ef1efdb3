use super::{EmissionSource, EmitContext, RecordGenerator};
use crate::backend::{Backend, Kernel, KernelParams};
use crate::double_buffer::DoubleBuffer;
use crate::error::{Expected, FountainError, Result};
use crate::record_layout::RecordLayout;

/// Fills a small staging region on the host and lets a copy kernel move
/// the staged records into the back buffer. Per-frame host traffic is
/// bounded by the staging size, not by the population.
pub struct Staged<B: Backend, G, K> {
    generator: G,
    kernel: K,
    layout: RecordLayout,
    staging: B::Region,
    staging_capacity: u32,
    block: Vec<u8>,
    // Records at the start of `block` taken from the generator but not yet
    // delivered.
    pending: u32,
}

impl<B: Backend, G: RecordGenerator, K: Kernel<B>> Staged<B, G, K> {
    pub fn new(
        backend: &mut B,
        layout: RecordLayout,
        staging_capacity: u32,
        generator: G,
        kernel: K,
    ) -> Result<Self> {
        if staging_capacity == 0 {
            return Err(FountainError::InvalidConfig(
                "staging capacity must be non-zero".into(),
            ));
        }
        let staging = backend.allocate("Emit staging", layout.bytes_for(staging_capacity))?;
        Ok(Staged {
            generator,
            kernel,
            layout,
            staging,
            staging_capacity,
            block: Vec::new(),
            pending: 0,
        })
    }
}

impl<B: Backend, G: RecordGenerator, K: Kernel<B>> EmissionSource<B> for Staged<B, G, K> {
    fn name(&self) -> &'static str {
        "staged"
    }

    fn available(&mut self) -> u32 {
        self.generator
            .available()
            .saturating_add(self.pending)
            .min(self.staging_capacity)
    }

    fn emit(
        &mut self,
        backend: &mut B,
        buffer: &mut DoubleBuffer<B>,
        offset: u32,
        budget: u32,
        ctx: &EmitContext,
    ) -> Result<u32> {
        let wanted = budget.min(self.staging_capacity);
        if wanted == 0 {
            return Ok(0);
        }
        if self.pending == 0 {
            self.block.clear();
            self.generator.generate(wanted, ctx, &mut self.block);
            self.pending = self.layout.record_count(&self.block)?.min(wanted);
            self.block.truncate(self.layout.bytes_for(self.pending) as usize);
        }
        let staged = self.pending.min(wanted);
        if staged == 0 {
            return Ok(0);
        }
        let end = offset.checked_add(staged).filter(|&end| end <= buffer.capacity());
        if end.is_none() {
            return Err(FountainError::OutOfBounds {
                offset,
                count: staged,
                capacity: buffer.capacity(),
            });
        }
        let bytes = self.layout.bytes_for(staged) as usize;
        backend.write(&mut self.staging, 0, &self.block[..bytes]);
        let copied = self.kernel.invoke(
            backend,
            Some(&self.staging),
            buffer.back_mut(),
            offset,
            staged,
            &ctx.params,
        )?;
        if copied != staged {
            log::error!(
                "Kernel `{}` copied {} of {} staged records, holding them for the next frame",
                self.kernel.name(),
                copied,
                staged
            );
            return Err(FountainError::KernelProtocolViolation {
                kernel: self.kernel.name(),
                reported: copied,
                expected: Expected::Exactly(staged),
            });
        }
        self.block.drain(..bytes);
        self.pending -= staged;
        Ok(copied)
    }
}

/// Copies staged records into the output region unchanged. The copy is
/// queued on the backend, so on a device it never round-trips the host.
#[derive(Debug)]
pub struct StageCopy {
    stride: u32,
}

impl StageCopy {
    pub fn new(stride: u32) -> Self {
        StageCopy { stride }
    }
}

impl<B: Backend> Kernel<B> for StageCopy {
    fn name(&self) -> &'static str {
        "stage_copy"
    }

    fn invoke(
        &mut self,
        backend: &mut B,
        input: Option<&B::Region>,
        output: &mut B::Region,
        output_offset: u32,
        record_count: u32,
        _params: &KernelParams,
    ) -> Result<u32> {
        let input = input.ok_or_else(|| {
            FountainError::InvalidConfig("stage_copy needs a staging region".into())
        })?;
        let stride = self.stride as u64;
        backend.copy(
            input,
            0,
            output,
            output_offset as u64 * stride,
            record_count as u64 * stride,
        );
        Ok(record_count)
    }
}
