//! Producers of new records. The orchestrator only sees [`EmissionSource`];
//! which strategy sits behind it is a configuration choice.

pub mod cycle;
pub mod generator;
pub mod immediate;
pub mod procedural;
pub mod queue;
pub mod staged;

pub use cycle::Cycle;
pub use generator::{Nozzle, RecordGenerator, Replay};
pub use immediate::Immediate;
pub use procedural::Procedural;
pub use queue::{record_queue, RecordProducer, RecordQueue};
pub use staged::{StageCopy, Staged};

use crate::backend::{Backend, KernelParams};
use crate::double_buffer::DoubleBuffer;
use crate::error::Result;

/// Reported by sources with no upper bound on what they can produce.
pub const UNBOUNDED: u32 = u32::MAX;

/// Per-frame inputs available to every source.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmitContext {
    pub frame: u64,
    pub params: KernelParams,
}

pub trait EmissionSource<B: Backend> {
    fn name(&self) -> &'static str;

    /// Records this source could hand over right now. Asking must not
    /// consume anything: records not taken stay available next frame.
    fn available(&mut self) -> u32;

    /// Writes at most `budget` new records into `back` starting at record
    /// `offset` and returns how many were written.
    fn emit(
        &mut self,
        backend: &mut B,
        buffer: &mut DoubleBuffer<B>,
        offset: u32,
        budget: u32,
        ctx: &EmitContext,
    ) -> Result<u32>;

    /// Called once after the swap.
    fn end_frame(&mut self) {}
}

impl<B: Backend, S: EmissionSource<B> + ?Sized> EmissionSource<B> for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn available(&mut self) -> u32 {
        (**self).available()
    }

    fn emit(
        &mut self,
        backend: &mut B,
        buffer: &mut DoubleBuffer<B>,
        offset: u32,
        budget: u32,
        ctx: &EmitContext,
    ) -> Result<u32> {
        (**self).emit(backend, buffer, offset, budget, ctx)
    }

    fn end_frame(&mut self) {
        (**self).end_frame()
    }
}
