use super::{EmitContext, UNBOUNDED};
use crate::config::NozzleParams;
use crate::record_layout::{Particle, Record};
use cgmath::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Host-side record producer feeding the Immediate and Staged sources.
pub trait RecordGenerator {
    fn available(&mut self) -> u32;

    /// Appends at most `count` whole records to `out`. Returns how many.
    fn generate(&mut self, count: u32, ctx: &EmitContext, out: &mut Vec<u8>) -> u32;
}

impl<G: RecordGenerator + ?Sized> RecordGenerator for Box<G> {
    fn available(&mut self) -> u32 {
        (**self).available()
    }

    fn generate(&mut self, count: u32, ctx: &EmitContext, out: &mut Vec<u8>) -> u32 {
        (**self).generate(count, ctx, out)
    }
}

/// Sprays particles out of the emission anchor in random directions,
/// carrying the anchor's own velocity.
pub struct Nozzle {
    params: NozzleParams,
    rng: StdRng,
}

impl Nozzle {
    pub fn new(params: NozzleParams, seed: u64) -> Self {
        Nozzle {
            params,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn particle(&mut self, ctx: &EmitContext) -> Particle {
        let angle = self.rng.gen_range(0.0..=std::f32::consts::TAU);
        let speed = self
            .rng
            .gen_range(self.params.speed_min..=self.params.speed_max);
        let velocity = Vector2::new(angle.cos(), angle.sin()) * speed
            + Vector2::from(ctx.params.anchor_velocity);
        Particle {
            position: ctx.params.anchor,
            velocity: velocity.into(),
            color: [self.rng.gen(), self.rng.gen(), self.rng.gen()],
            ttl: self.rng.gen_range(self.params.ttl_min..=self.params.ttl_max),
        }
    }
}

impl RecordGenerator for Nozzle {
    fn available(&mut self) -> u32 {
        UNBOUNDED
    }

    fn generate(&mut self, count: u32, ctx: &EmitContext, out: &mut Vec<u8>) -> u32 {
        out.reserve(count as usize * std::mem::size_of::<Particle>());
        for _ in 0..count {
            let particle = self.particle(ctx);
            out.extend_from_slice(bytemuck::bytes_of(&particle));
        }
        count
    }
}

/// A finite, ordered list of prepared records.
pub struct Replay<R: Record> {
    pending: VecDeque<R>,
}

impl<R: Record> Replay<R> {
    pub fn new(records: impl IntoIterator<Item = R>) -> Self {
        Replay {
            pending: records.into_iter().collect(),
        }
    }
}

impl<R: Record> RecordGenerator for Replay<R> {
    fn available(&mut self) -> u32 {
        self.pending.len().min(u32::MAX as usize) as u32
    }

    fn generate(&mut self, count: u32, _ctx: &EmitContext, out: &mut Vec<u8>) -> u32 {
        let n = (count as usize).min(self.pending.len());
        for record in self.pending.drain(..n) {
            out.extend_from_slice(bytemuck::bytes_of(&record));
        }
        n as u32
    }
}
