use super::{HostBackend, HostRegion};
use crate::backend::{Kernel, KernelParams};
use crate::emission::StageCopy;
use crate::engine::KernelSet;
use crate::error::{FountainError, Result};
use crate::record_layout::Particle;
use cgmath::Vector2;

const PARTICLE_STRIDE: usize = std::mem::size_of::<Particle>();

fn read_particle(region: &HostRegion, index: u32) -> Particle {
    let start = index as usize * PARTICLE_STRIDE;
    bytemuck::pod_read_unaligned(&region.as_bytes()[start..start + PARTICLE_STRIDE])
}

fn write_particle(region: &mut HostRegion, index: u32, particle: &Particle) {
    let start = index as usize * PARTICLE_STRIDE;
    region.as_bytes_mut()[start..start + PARTICLE_STRIDE]
        .copy_from_slice(bytemuck::bytes_of(particle));
}

fn missing_input(kernel: &str) -> FountainError {
    FountainError::InvalidConfig(format!("kernel `{}` needs an input region", kernel))
}

/// `fract(sin(n) * 43758.5453123)`, the shader-side noise used by the
/// emitter kernels.
pub fn hash_random(n: f32) -> f32 {
    let v = n.sin() * 43758.545_312_3;
    v - v.floor()
}

/// Integrates gravity and lifetime, retiring particles that fall through
/// the floor or run out of time. Survivors are packed from `output_offset`.
#[derive(Debug, Default)]
pub struct Integrate;

impl Kernel<HostBackend> for Integrate {
    fn name(&self) -> &'static str {
        "integrate"
    }

    fn invoke(
        &mut self,
        _backend: &mut HostBackend,
        input: Option<&HostRegion>,
        output: &mut HostRegion,
        output_offset: u32,
        record_count: u32,
        params: &KernelParams,
    ) -> Result<u32> {
        let input = input.ok_or_else(|| missing_input(self.name()))?;
        let mut written = 0;
        for i in 0..record_count {
            let mut particle = read_particle(input, i);
            let velocity =
                Vector2::from(particle.velocity) + Vector2::new(0.0, params.gravity * params.dt);
            let position = Vector2::from(particle.position) + velocity * params.dt;
            particle.ttl -= params.dt;
            if position.y <= params.floor || particle.ttl <= 0.0 {
                continue;
            }
            particle.position = position.into();
            particle.velocity = velocity.into();
            write_particle(output, output_offset + written, &particle);
            written += 1;
        }
        Ok(written)
    }
}

/// Procedural emission: every record is derived from its index, the
/// frame time and the emission anchor. No record data leaves the host.
#[derive(Debug, Default)]
pub struct Fountain;

impl Fountain {
    pub fn particle(index: u32, params: &KernelParams) -> Particle {
        let id = index as f32;
        let angle = (params.time * id).rem_euclid(std::f32::consts::TAU);
        let speed = hash_random(params.time + id).clamp(0.1, 0.9);
        let velocity =
            Vector2::new(angle.sin(), angle.cos()) * speed + Vector2::from(params.anchor_velocity);
        Particle {
            position: params.anchor,
            velocity: velocity.into(),
            color: [
                hash_random(params.time * 1.3 + id),
                hash_random(params.time * 3.4 + id),
                hash_random(params.time * 2.0 + id),
            ],
            ttl: params.ttl,
        }
    }
}

impl Kernel<HostBackend> for Fountain {
    fn name(&self) -> &'static str {
        "fountain"
    }

    fn invoke(
        &mut self,
        _backend: &mut HostBackend,
        _input: Option<&HostRegion>,
        output: &mut HostRegion,
        output_offset: u32,
        record_count: u32,
        params: &KernelParams,
    ) -> Result<u32> {
        for i in 0..record_count {
            write_particle(output, output_offset + i, &Fountain::particle(i, params));
        }
        Ok(record_count)
    }
}

/// The host reference kernels, ready for [`build_engine`](crate::engine::build_engine).
pub fn kernel_set() -> KernelSet<HostBackend> {
    KernelSet {
        update: Box::new(Integrate),
        stage_copy: Box::new(|| -> Box<dyn Kernel<HostBackend>> {
            Box::new(StageCopy::new(PARTICLE_STRIDE as u32))
        }),
        procedural: Box::new(|| -> Box<dyn Kernel<HostBackend>> { Box::new(Fountain) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    fn region_with(backend: &mut HostBackend, particles: &[Particle], capacity: usize) -> HostRegion {
        let mut region = backend
            .allocate("test", (capacity * PARTICLE_STRIDE) as u64)
            .unwrap();
        backend.write(&mut region, 0, bytemuck::cast_slice(particles));
        region
    }

    fn params() -> KernelParams {
        KernelParams {
            dt: 0.1,
            time: 1.0,
            gravity: -1.0,
            floor: -1.0,
            ttl: 2.0,
            anchor: [0.25, 0.5],
            anchor_velocity: [0.0, 0.0],
        }
    }

    #[test]
    fn integrate_compacts_survivors() {
        let mut backend = HostBackend::new();
        let alive = Particle {
            position: [0.0, 0.0],
            velocity: [1.0, 0.0],
            ttl: 1.0,
            ..Particle::default()
        };
        let expired = Particle {
            ttl: 0.05,
            ..alive
        };
        let fallen = Particle {
            position: [0.0, -0.99],
            velocity: [0.0, -1.0],
            ..alive
        };
        let input = region_with(&mut backend, &[expired, alive, fallen, alive], 4);
        let mut output = backend.allocate("out", 4 * PARTICLE_STRIDE as u64).unwrap();
        let survivors = Integrate
            .invoke(&mut backend, Some(&input), &mut output, 0, 4, &params())
            .unwrap();
        assert_eq!(survivors, 2);
        let first = read_particle(&output, 0);
        assert!((first.position[0] - 0.1).abs() < 1e-6);
        assert!((first.velocity[1] + 0.1).abs() < 1e-6);
        assert!((first.ttl - 0.9).abs() < 1e-6);
    }

    #[test]
    fn integrate_requires_input() {
        let mut backend = HostBackend::new();
        let mut output = backend.allocate("out", PARTICLE_STRIDE as u64).unwrap();
        assert!(Integrate
            .invoke(&mut backend, None, &mut output, 0, 1, &params())
            .is_err());
    }

    #[test]
    fn fountain_writes_at_offset() {
        let mut backend = HostBackend::new();
        let mut output = backend.allocate("out", 8 * PARTICLE_STRIDE as u64).unwrap();
        let written = Fountain
            .invoke(&mut backend, None, &mut output, 5, 3, &params())
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(read_particle(&output, 4), Particle::default());
        for i in 0..3 {
            let p = read_particle(&output, 5 + i);
            assert_eq!(p, Fountain::particle(i, &params()));
            assert_eq!(p.position, [0.25, 0.5]);
            assert!(p.color.iter().all(|c| (0.0..1.0).contains(c)));
        }
    }

    #[test]
    fn hash_random_in_unit_interval() {
        for i in 0..100 {
            let v = hash_random(i as f32 * 0.37);
            assert!((0.0..1.0).contains(&v));
        }
    }
}
