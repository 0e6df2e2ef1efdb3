use crate::backend::{Backend, Kernel, KernelParams};
use crate::double_buffer::DoubleBuffer;
use crate::error::{Expected, FountainError, Result};

/// Number of input records the update kernel kept. Only the kernel knows
/// which ones.
pub type SurvivorCount = u32;

/// Runs the mortality-capable update kernel from `front` into `back`.
pub struct UpdateStage<B: Backend> {
    kernel: Box<dyn Kernel<B>>,
}

impl<B: Backend> UpdateStage<B> {
    pub fn new(kernel: Box<dyn Kernel<B>>) -> Self {
        UpdateStage { kernel }
    }

    /// Survivors land contiguously at the start of `back`. Blocks until the
    /// kernel's count is available.
    pub fn run(
        &mut self,
        backend: &mut B,
        buffer: &mut DoubleBuffer<B>,
        params: &KernelParams,
    ) -> Result<SurvivorCount> {
        let active = buffer.active_count();
        if active == 0 {
            return Ok(0);
        }
        let (front, back) = buffer.front_and_back_mut();
        let survivors = self
            .kernel
            .invoke(backend, Some(front), back, 0, active, params)?;
        if survivors > active {
            log::error!(
                "Update kernel `{}` reported {} survivors out of {} records",
                self.kernel.name(),
                survivors,
                active
            );
            return Err(FountainError::KernelProtocolViolation {
                kernel: self.kernel.name(),
                reported: survivors,
                expected: Expected::AtMost(active),
            });
        }
        log::trace!("Update: {} -> {} records", active, survivors);
        Ok(survivors)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::double_buffer::Role;
    use crate::host::kernels::Integrate;
    use crate::host::{HostBackend, HostRegion};
    use crate::record_layout::{Particle, Record};

    /// Claims one more survivor than it was given.
    pub(crate) struct Inflating;

    impl Kernel<HostBackend> for Inflating {
        fn name(&self) -> &'static str {
            "inflating"
        }

        fn invoke(
            &mut self,
            _backend: &mut HostBackend,
            _input: Option<&HostRegion>,
            _output: &mut HostRegion,
            _output_offset: u32,
            record_count: u32,
            _params: &KernelParams,
        ) -> Result<u32> {
            Ok(record_count + 1)
        }
    }

    fn seeded(backend: &mut HostBackend, ttls: &[f32]) -> DoubleBuffer<HostBackend> {
        let mut buffer = DoubleBuffer::new(backend, Particle::layout(), 8).unwrap();
        let particles: Vec<Particle> = ttls
            .iter()
            .map(|&ttl| Particle {
                ttl,
                ..Particle::default()
            })
            .collect();
        buffer
            .fill_front(backend, bytemuck::cast_slice(&particles))
            .unwrap();
        buffer
    }

    fn params() -> KernelParams {
        KernelParams {
            dt: 0.5,
            floor: -10.0,
            ..KernelParams::default()
        }
    }

    #[test]
    fn survivors_written_to_back() {
        let mut backend = HostBackend::new();
        let mut buffer = seeded(&mut backend, &[0.25, 2.0, 0.1, 3.0]);
        let mut stage = UpdateStage::new(Box::new(Integrate));
        let survivors = stage.run(&mut backend, &mut buffer, &params()).unwrap();
        assert_eq!(survivors, 2);
        let back = buffer.read(&mut backend, Role::Back, 0, 2).unwrap();
        let ttls: Vec<f32> = back
            .chunks_exact(32)
            .map(|chunk| bytemuck::pod_read_unaligned::<Particle>(chunk).ttl)
            .collect();
        assert_eq!(ttls, vec![1.5, 2.5]);
        // Front is untouched until the swap.
        assert_eq!(buffer.active_count(), 4);
    }

    #[test]
    fn empty_population_skips_kernel() {
        let mut backend = HostBackend::new();
        let mut buffer = seeded(&mut backend, &[]);
        let mut stage = UpdateStage::new(Box::new(Inflating));
        assert_eq!(stage.run(&mut backend, &mut buffer, &params()), Ok(0));
    }

    #[test]
    fn inflated_count_is_protocol_violation() {
        let mut backend = HostBackend::new();
        let mut buffer = seeded(&mut backend, &[1.0, 1.0]);
        let mut stage = UpdateStage::new(Box::new(Inflating));
        assert_eq!(
            stage.run(&mut backend, &mut buffer, &params()),
            Err(FountainError::KernelProtocolViolation {
                kernel: "inflating",
                reported: 3,
                expected: Expected::AtMost(2)
            })
        );
    }
}
