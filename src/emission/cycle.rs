use super::{EmissionSource, EmitContext};
use crate::backend::Backend;
use crate::double_buffer::DoubleBuffer;
use crate::error::{FountainError, Result};

/// Round-robins over several sources, one per frame. Useful for comparing
/// strategies against the same population.
pub struct Cycle<B: Backend> {
    sources: Vec<Box<dyn EmissionSource<B>>>,
    current: usize,
}

impl<B: Backend> Cycle<B> {
    pub fn new(sources: Vec<Box<dyn EmissionSource<B>>>) -> Result<Self> {
        if sources.is_empty() {
            return Err(FountainError::InvalidConfig(
                "cycle needs at least one emission source".into(),
            ));
        }
        Ok(Cycle { sources, current: 0 })
    }

    pub fn current(&self) -> &dyn EmissionSource<B> {
        self.sources[self.current].as_ref()
    }
}

impl<B: Backend> EmissionSource<B> for Cycle<B> {
    fn name(&self) -> &'static str {
        self.current().name()
    }

    fn available(&mut self) -> u32 {
        self.sources[self.current].available()
    }

    fn emit(
        &mut self,
        backend: &mut B,
        buffer: &mut DoubleBuffer<B>,
        offset: u32,
        budget: u32,
        ctx: &EmitContext,
    ) -> Result<u32> {
        self.sources[self.current].emit(backend, buffer, offset, budget, ctx)
    }

    fn end_frame(&mut self) {
        self.sources[self.current].end_frame();
        self.current = (self.current + 1) % self.sources.len();
    }
}
