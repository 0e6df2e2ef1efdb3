use super::{EmissionSource, EmitContext, RecordGenerator};
use crate::backend::Backend;
use crate::double_buffer::{DoubleBuffer, Role};
use crate::error::Result;

/// Builds the new records on the host and writes them straight into the
/// back buffer. Transfers `budget * stride` bytes every frame, so it only
/// suits small budgets.
pub struct Immediate<G> {
    generator: G,
    // Reused between frames to avoid a per-frame allocation.
    block: Vec<u8>,
}

impl<G: RecordGenerator> Immediate<G> {
    pub fn new(generator: G) -> Self {
        Immediate {
            generator,
            block: Vec::new(),
        }
    }
}

impl<B: Backend, G: RecordGenerator> EmissionSource<B> for Immediate<G> {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn available(&mut self) -> u32 {
        self.generator.available()
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
        self.block.clear();
        self.generator.generate(budget, ctx, &mut self.block);
        buffer.write(backend, Role::Back, &self.block, offset)
    }
}
