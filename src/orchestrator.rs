use crate::backend::{Backend, KernelParams};
use crate::double_buffer::{DoubleBuffer, Role};
use crate::emission::{EmissionSource, EmitContext};
use crate::error::{Expected, FountainError, Result};
use crate::record_layout::RecordLayout;
use crate::scheduler::{EmissionBudget, EmissionScheduler};
use crate::update_stage::UpdateStage;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    /// Runs the update kernel. Its survivor count is read back before the
    /// kernel call returns, so any blocking on the device happens here.
    Updating,
    /// Records the already validated survivor count.
    Counting,
    Budgeting,
    Emitting,
    Swapping,
}

/// What happened during one frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub survivors: u32,
    pub budget: EmissionBudget,
    pub emitted: u32,
    pub grown_to: Option<u32>,
    pub growth_failed: bool,
    pub active_count: u32,
    pub capacity: u32,
}

impl FrameReport {
    pub fn capacity_exhausted(&self) -> bool {
        self.budget.capacity_exhausted()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub frames: u64,
    pub aborted_frames: u64,
    pub growth_events: u64,
    pub growth_failures: u64,
    pub capacity_exhausted_frames: u64,
    pub deferred_records: u64,
    pub emitted_records: u64,
    pub retired_records: u64,
}

/// Read-only view of the front buffer for the renderer. Valid until the
/// next frame starts.
pub struct RenderView<'a, R> {
    pub front: &'a R,
    pub active_count: u32,
    pub layout: &'a RecordLayout,
}

/// Owns the double buffer and drives one update/emit/swap cycle per frame.
pub struct FrameOrchestrator<B: Backend> {
    backend: B,
    buffer: DoubleBuffer<B>,
    update: UpdateStage<B>,
    scheduler: EmissionScheduler,
    source: Box<dyn EmissionSource<B>>,
    state: FrameState,
    counters: EngineCounters,
    frame: u64,
}

impl<B: Backend> FrameOrchestrator<B> {
    pub fn new(
        backend: B,
        buffer: DoubleBuffer<B>,
        update: UpdateStage<B>,
        scheduler: EmissionScheduler,
        source: Box<dyn EmissionSource<B>>,
    ) -> Self {
        FrameOrchestrator {
            backend,
            buffer,
            update,
            scheduler,
            source,
            state: FrameState::Idle,
            counters: EngineCounters::default(),
            frame: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    pub fn buffer(&self) -> &DoubleBuffer<B> {
        &self.buffer
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn render_view(&self) -> RenderView<'_, B::Region> {
        RenderView {
            front: self.buffer.front(),
            active_count: self.buffer.active_count(),
            layout: self.buffer.layout(),
        }
    }

    /// Reads the records the renderer would see.
    pub fn read_front(&mut self) -> Result<Vec<u8>> {
        let count = self.buffer.active_count();
        self.buffer
            .read(&mut self.backend, Role::Front, 0, count)
    }

    fn transition(&mut self, next: FrameState) {
        log::trace!("Frame {}: {:?} -> {:?}", self.frame, self.state, next);
        self.state = next;
    }

    fn abort(&mut self, error: &FountainError) {
        log::error!(
            "Frame {} aborted in {:?}: {}",
            self.frame,
            self.state,
            error
        );
        self.counters.aborted_frames += 1;
        self.state = FrameState::Idle;
    }

    /// Runs a full cycle. On error the frame is abandoned before the swap,
    /// so the front buffer and its count are exactly as before.
    pub fn run_frame(&mut self, params: &KernelParams) -> Result<FrameReport> {
        debug_assert_eq!(self.state, FrameState::Idle);
        match self.cycle(params) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }

    fn cycle(&mut self, params: &KernelParams) -> Result<FrameReport> {
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };
        let previous = self.buffer.active_count();

        self.transition(FrameState::Updating);
        let survivors = self.update.run(&mut self.backend, &mut self.buffer, params)?;

        self.transition(FrameState::Counting);
        report.survivors = survivors;

        self.transition(FrameState::Budgeting);
        let available = self.source.available();
        if let Some(target) =
            self.scheduler
                .growth_target(self.buffer.capacity(), survivors, available)
        {
            let old_capacity = self.buffer.capacity();
            match self
                .buffer
                .grow_preserving(&mut self.backend, target, survivors)
            {
                Ok(()) if self.buffer.grown_this_frame() => {
                    log::info!("Grew record buffers {} -> {}", old_capacity, target);
                    self.counters.growth_events += 1;
                    report.grown_to = Some(self.buffer.capacity());
                }
                Ok(()) => {}
                Err(e @ FountainError::GrowthFailure { .. }) => {
                    log::error!("Growth to {} records failed: {}", target, e);
                    self.counters.growth_failures += 1;
                    report.growth_failed = true;
                }
                Err(e) => return Err(e),
            }
        }
        let budget = if report.growth_failed {
            // Survivors still go out; nothing new this frame.
            EmissionBudget {
                count: 0,
                deferred: self.scheduler.max_emit_per_frame.min(available),
                at_capacity: false,
            }
        } else {
            self.scheduler
                .compute_budget(self.buffer.capacity(), survivors, available)
        };
        report.budget = budget;
        if budget.capacity_exhausted() {
            log::debug!(
                "At capacity ({} records), deferring {} records",
                self.buffer.capacity(),
                budget.deferred
            );
            self.counters.capacity_exhausted_frames += 1;
        }

        self.transition(FrameState::Emitting);
        let ctx = EmitContext {
            frame: self.frame,
            params: *params,
        };
        let emitted = self.source.emit(
            &mut self.backend,
            &mut self.buffer,
            survivors,
            budget.count,
            &ctx,
        )?;
        if emitted > budget.count {
            return Err(FountainError::KernelProtocolViolation {
                kernel: self.source.name(),
                reported: emitted,
                expected: Expected::AtMost(budget.count),
            });
        }
        report.emitted = emitted;

        self.transition(FrameState::Swapping);
        self.buffer.commit_back(survivors + emitted)?;
        self.buffer.swap();
        self.source.end_frame();

        self.counters.frames += 1;
        self.counters.emitted_records += emitted as u64;
        self.counters.retired_records += (previous - survivors) as u64;
        self.counters.deferred_records += (budget.deferred + budget.count - emitted) as u64;
        report.active_count = self.buffer.active_count();
        report.capacity = self.buffer.capacity();
        log::trace!("{:?}", report);

        self.transition(FrameState::Idle);
        self.frame += 1;
        Ok(report)
    }
}
