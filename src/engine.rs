//! Assembles a [`FrameOrchestrator`] from [`EngineParams`] for any backend.

use crate::backend::{Backend, Kernel};
use crate::config::{EngineParams, Strategy};
use crate::double_buffer::DoubleBuffer;
use crate::emission::{
    Cycle, EmissionSource, EmitContext, Immediate, Nozzle, Procedural, RecordGenerator,
    RecordQueue, Staged,
};
use crate::error::{FountainError, Result};
use crate::orchestrator::FrameOrchestrator;
use crate::record_layout::{Particle, Record};
use crate::scheduler::EmissionScheduler;
use crate::update_stage::UpdateStage;

/// The backend specific kernels an engine is built from.
pub struct KernelSet<B: Backend> {
    pub update: Box<dyn Kernel<B>>,
    pub stage_copy: Box<dyn Fn() -> Box<dyn Kernel<B>>>,
    pub procedural: Box<dyn Fn() -> Box<dyn Kernel<B>>>,
}

fn staged<B, G>(
    backend: &mut B,
    params: &EngineParams,
    generator: G,
    kernels: &KernelSet<B>,
) -> Result<Box<dyn EmissionSource<B>>>
where
    B: Backend + 'static,
    G: RecordGenerator + 'static,
{
    Ok(Box::new(Staged::new(
        backend,
        Particle::layout(),
        params.emission.staging_capacity,
        generator,
        (kernels.stage_copy)(),
    )?))
}

fn select_source<B: Backend + 'static>(
    backend: &mut B,
    params: &EngineParams,
    queue: Option<RecordQueue>,
    kernels: &KernelSet<B>,
) -> Result<Box<dyn EmissionSource<B>>> {
    // Each host generator gets its own stream so strategies stay comparable.
    let nozzle = |stream: u64| Nozzle::new(params.nozzle, params.seed.wrapping_add(stream));
    match (params.emission.strategy, queue) {
        (Strategy::Immediate, Some(queue)) => Ok(Box::new(Immediate::new(queue))),
        (Strategy::Staged, Some(queue)) => staged(backend, params, queue, kernels),
        (strategy, Some(_)) => Err(FountainError::InvalidConfig(format!(
            "a background producer needs the immediate or staged strategy, not {:?}",
            strategy
        ))),
        (Strategy::Immediate, None) => Ok(Box::new(Immediate::new(nozzle(1)))),
        (Strategy::Staged, None) => staged(backend, params, nozzle(2), kernels),
        (Strategy::Procedural, None) => Ok(Box::new(Procedural::new((kernels.procedural)()))),
        (Strategy::Cycle, None) => {
            let sources: Vec<Box<dyn EmissionSource<B>>> = vec![
                Box::new(Immediate::new(nozzle(1))),
                staged(backend, params, nozzle(2), kernels)?,
                Box::new(Procedural::new((kernels.procedural)())),
            ];
            Ok(Box::new(Cycle::new(sources)?))
        }
    }
}

/// Validates `params`, allocates the record buffers and seeds them with
/// `initial_population` nozzle particles.
pub fn build_engine<B: Backend + 'static>(
    mut backend: B,
    params: &EngineParams,
    kernels: KernelSet<B>,
    queue: Option<RecordQueue>,
) -> Result<FrameOrchestrator<B>> {
    params.validate()?;
    let mut buffer = DoubleBuffer::new(&mut backend, Particle::layout(), params.initial_capacity)?;
    if params.initial_population > 0 {
        let mut seed = Vec::new();
        Nozzle::new(params.nozzle, params.seed).generate(
            params.initial_population,
            &EmitContext::default(),
            &mut seed,
        );
        buffer.fill_front(&mut backend, &seed)?;
    }
    let source = select_source(&mut backend, params, queue, &kernels)?;
    log::info!(
        "Engine: {} records, emitting with `{}`, {:?}",
        buffer.active_count(),
        source.name(),
        params.growth.policy()
    );
    Ok(FrameOrchestrator::new(
        backend,
        buffer,
        UpdateStage::new(kernels.update),
        EmissionScheduler::new(params.max_emit_per_frame, params.growth.policy()),
        source,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KernelParams;
    use crate::emission::record_queue;
    use crate::host::{self, HostBackend};

    fn params(strategy: Strategy) -> EngineParams {
        let mut params = EngineParams::default();
        params.initial_capacity = 256;
        params.initial_population = 16;
        params.max_emit_per_frame = 8;
        params.emission.strategy = strategy;
        params.emission.staging_capacity = 4;
        params
    }

    fn frame_params() -> KernelParams {
        KernelParams {
            dt: 0.02,
            floor: -10.0,
            ttl: 4.0,
            ..KernelParams::default()
        }
    }

    #[test]
    fn seeds_initial_population() {
        let engine = build_engine(
            HostBackend::new(),
            &params(Strategy::Procedural),
            host::kernels::kernel_set(),
            None,
        )
        .unwrap();
        assert_eq!(engine.buffer().active_count(), 16);
        assert_eq!(engine.buffer().capacity(), 256);
    }

    #[test]
    fn cycle_rotates_strategies() {
        let mut engine = build_engine(
            HostBackend::new(),
            &params(Strategy::Cycle),
            host::kernels::kernel_set(),
            None,
        )
        .unwrap();
        let mut names = Vec::new();
        for _ in 0..4 {
            names.push(engine.source_name());
            let report = engine.run_frame(&frame_params()).unwrap();
            // Staging is smaller than the per-frame ceiling.
            assert!(report.emitted == 8 || report.emitted == 4);
        }
        assert_eq!(names, vec!["immediate", "staged", "procedural", "immediate"]);
    }

    #[test]
    fn queue_needs_host_side_strategy() {
        let (_producer, queue) = record_queue(&Particle::layout(), 4, 8);
        assert!(matches!(
            build_engine(
                HostBackend::new(),
                &params(Strategy::Procedural),
                host::kernels::kernel_set(),
                Some(queue),
            ),
            Err(FountainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn queued_records_are_emitted() {
        let (producer, queue) = record_queue(&Particle::layout(), 4, 8);
        let batch = vec![
            Particle {
                ttl: 3.0,
                ..Particle::default()
            };
            5
        ];
        producer
            .try_put(bytemuck::cast_slice(&batch).to_vec())
            .unwrap();
        let mut engine = build_engine(
            HostBackend::new(),
            &params(Strategy::Immediate),
            host::kernels::kernel_set(),
            Some(queue),
        )
        .unwrap();
        let report = engine.run_frame(&frame_params()).unwrap();
        assert_eq!(report.emitted, 5);
        assert_eq!(report.active_count, 21);
        // Queue drained, nothing more to hand over.
        assert_eq!(engine.run_frame(&frame_params()).unwrap().emitted, 0);
    }

    #[test]
    fn invalid_params_rejected() {
        let mut bad = params(Strategy::Immediate);
        bad.initial_capacity = 0;
        assert!(build_engine(HostBackend::new(), &bad, host::kernels::kernel_set(), None).is_err());
    }
}
