use super::{EmissionSource, EmitContext, UNBOUNDED};
use crate::backend::{Backend, Kernel};
use crate::double_buffer::DoubleBuffer;
use crate::error::{Expected, FountainError, Result};

/// Emission computed entirely by a kernel from scalar parameters (time and
/// emission anchor). Nothing but those scalars crosses to the device.
pub struct Procedural<K> {
    kernel: K,
}

impl<K> Procedural<K> {
    pub fn new(kernel: K) -> Self {
        Procedural { kernel }
    }
}

impl<B: Backend, K: Kernel<B>> EmissionSource<B> for Procedural<K> {
    fn name(&self) -> &'static str {
        "procedural"
    }

    fn available(&mut self) -> u32 {
        UNBOUNDED
    }

    fn emit(
        &mut self,
        backend: &mut B,
        buffer: &mut DoubleBuffer<B>,
        offset: u32,
        budget: u32,
        ctx: &EmitContext,
    ) -> Result<u32> {
        if budget == 0 {
            return Ok(0);
        }
        let capacity = buffer.capacity();
        if offset.checked_add(budget).map_or(true, |end| end > capacity) {
            return Err(FountainError::OutOfBounds {
                offset,
                count: budget,
                capacity,
            });
        }
        let emitted = self
            .kernel
            .invoke(backend, None, buffer.back_mut(), offset, budget, &ctx.params)?;
        // Creation kernels never come up short.
        if emitted != budget {
            return Err(FountainError::KernelProtocolViolation {
                kernel: self.kernel.name(),
                reported: emitted,
                expected: Expected::Exactly(budget),
            });
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KernelParams;
    use crate::double_buffer::Role;
    use crate::host::kernels::Fountain;
    use crate::host::{HostBackend, HostRegion};
    use crate::record_layout::{Particle, Record};

    #[test]
    fn writes_budget_at_offset_without_upload() {
        let mut backend = HostBackend::new();
        let mut buffer = DoubleBuffer::new(&mut backend, Particle::layout(), 16).unwrap();
        let mut source = Procedural::new(Fountain);
        let ctx = EmitContext {
            frame: 3,
            params: KernelParams {
                time: 2.5,
                ttl: 1.0,
                anchor: [0.1, 0.2],
                ..KernelParams::default()
            },
        };
        assert_eq!(source.emit(&mut backend, &mut buffer, 10, 6, &ctx), Ok(6));
        assert_eq!(backend.bytes_uploaded(), 0);
        let bytes = buffer.read(&mut backend, Role::Back, 10, 6).unwrap();
        for (i, chunk) in bytes.chunks_exact(32).enumerate() {
            let p: Particle = bytemuck::pod_read_unaligned(chunk);
            assert_eq!(p, Fountain::particle(i as u32, &ctx.params));
        }
    }

    /// Writes the full budget but reports one record fewer.
    struct Short;

    impl Kernel<HostBackend> for Short {
        fn name(&self) -> &'static str {
            "short"
        }

        fn invoke(
            &mut self,
            backend: &mut HostBackend,
            input: Option<&HostRegion>,
            output: &mut HostRegion,
            output_offset: u32,
            record_count: u32,
            params: &KernelParams,
        ) -> Result<u32> {
            let written =
                Fountain.invoke(backend, input, output, output_offset, record_count, params)?;
            Ok(written - 1)
        }
    }

    #[test]
    fn short_creation_count_is_protocol_violation() {
        let mut backend = HostBackend::new();
        let mut buffer = DoubleBuffer::new(&mut backend, Particle::layout(), 16).unwrap();
        let mut source = Procedural::new(Short);
        let err = source
            .emit(&mut backend, &mut buffer, 2, 5, &EmitContext::default())
            .unwrap_err();
        assert_eq!(
            err,
            FountainError::KernelProtocolViolation {
                kernel: "short",
                reported: 4,
                expected: Expected::Exactly(5),
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn budget_past_capacity_rejected() {
        let mut backend = HostBackend::new();
        let mut buffer = DoubleBuffer::new(&mut backend, Particle::layout(), 16).unwrap();
        let mut source = Procedural::new(Fountain);
        assert!(matches!(
            source.emit(&mut backend, &mut buffer, 12, 6, &EmitContext::default()),
            Err(FountainError::OutOfBounds { .. })
        ));
    }
}
