use fountain::backend::{Backend, KernelParams};
use fountain::config::EngineParams;
use fountain::emission::{queue, record_queue, Nozzle, RecordQueue};
use fountain::orchestrator::FrameOrchestrator;
use fountain::record_layout::{Particle, Record};
use log::{error, info};

gflags::define! {
    --log_filter: &str = "warn,fountain=info"
}
gflags::define! {
    -h, --help = false
}
gflags::define! {
    /// Engine config. The embedded default is used when not given.
    --config: &str = "fountain_config.toml"
}
gflags::define! {
    --frames: u32 = 600
}
gflags::define! {
    /// Overrides `emission.strategy`: immediate, staged, procedural or cycle.
    --strategy: &str = "cycle"
}
gflags::define! {
    /// Feed emission from a producer thread through a bounded queue.
    --background_producer = false
}
gflags::define! {
    /// Run frames back to back instead of pacing them to the configured fps.
    --fast = false
}
gflags::define! {
    /// Run the kernels on the GPU. Needs the `gpu` feature.
    --gpu = false
}

fn read_config_from_file(path: &str) -> anyhow::Result<EngineParams> {
    let params = std::fs::read_to_string(path)?.parse()?;
    Ok(params)
}

fn load_params() -> anyhow::Result<EngineParams> {
    let mut params = if CONFIG.is_present() {
        match read_config_from_file(CONFIG.flag) {
            Ok(params) => params,
            Err(e) => {
                error!("Failed to parse config file({}): {:?}", CONFIG.flag, e);
                EngineParams::default()
            }
        }
    } else {
        fountain::config::get_engine_config_from_default_file()
    };
    if STRATEGY.is_present() {
        params.emission.strategy = STRATEGY.flag.parse()?;
    }
    params.validate()?;
    Ok(params)
}

fn spawn_producer(params: &EngineParams) -> (queue::BackgroundProducer, RecordQueue) {
    let batch = params.max_emit_per_frame.max(1);
    let (producer, queue) = record_queue(
        &Particle::layout(),
        params.emission.queue_capacity as usize,
        batch,
    );
    // The producer has no view of the moving anchor, its particles start at
    // the origin.
    let handle = queue::spawn_background_producer(
        producer,
        Nozzle::new(params.nozzle, params.seed.wrapping_add(7)),
        KernelParams::default(),
        batch,
        std::time::Duration::from_millis(1),
    );
    (handle, queue)
}

fn run<B: Backend>(mut engine: FrameOrchestrator<B>, params: &EngineParams) -> anyhow::Result<()> {
    let mut clock = fountain::frame_clock::FrameClock::new(params.fps);
    let mut path = fountain::emitter_path::EmitterPath::new(params.simulation.aspect_ratio);
    for _ in 0..FRAMES.flag {
        let frame_time = clock.tick().as_secs_f32();
        let time = clock.elapsed();
        path.update(time);
        let kernel_params = KernelParams {
            dt: fountain::frame_clock::kernel_step(frame_time),
            time,
            gravity: params.simulation.gravity,
            floor: params.simulation.floor,
            ttl: params.emission.ttl,
            anchor: path.anchor(),
            anchor_velocity: path.velocity(),
        };
        let source = engine.source_name();
        let report = engine.run_frame(&kernel_params)?;
        if let Some(capacity) = report.grown_to {
            info!("Frame {}: grew to {} records", report.frame, capacity);
        }
        if report.capacity_exhausted() {
            log::debug!(
                "Frame {}: at capacity, {} records deferred",
                report.frame,
                report.budget.deferred
            );
        }
        log::debug!(
            "Frame {} ({}): {} survivors + {} emitted = {} / {}",
            report.frame,
            source,
            report.survivors,
            report.emitted,
            report.active_count,
            report.capacity
        );
        if !FAST.flag {
            clock.wait_for_next_frame();
        }
    }
    info!(
        "Finished with {} records: {:?}",
        engine.buffer().active_count(),
        engine.counters()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    gflags::parse();
    if HELP.flag {
        gflags::print_help_and_exit(0);
    }
    scrub_log::init_with_filter_string(LOG_FILTER.flag).unwrap();

    let mut params = load_params()?;
    if BACKGROUND_PRODUCER.flag {
        params = params.with_background_producer()?;
    }
    info!("{:?}", params);
    let (producer, queue) = if BACKGROUND_PRODUCER.flag {
        let (producer, queue) = spawn_producer(&params);
        (Some(producer), Some(queue))
    } else {
        (None, None)
    };

    if GPU.flag {
        #[cfg(feature = "gpu")]
        {
            let engine = fountain::engine::build_engine(
                fountain::gpu::WgpuBackend::new()?,
                &params,
                fountain::gpu::kernels::kernel_set(),
                queue,
            )?;
            run(engine, &params)?;
        }
        #[cfg(not(feature = "gpu"))]
        anyhow::bail!("--gpu needs a build with the `gpu` feature");
    } else {
        let engine = fountain::engine::build_engine(
            fountain::host::HostBackend::new(),
            &params,
            fountain::host::kernels::kernel_set(),
            queue,
        )?;
        run(engine, &params)?;
    }

    if let Some(producer) = producer {
        info!("Background producer handed over {} records", producer.stop());
    }
    Ok(())
}
