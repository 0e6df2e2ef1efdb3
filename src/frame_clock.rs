use log::info;

// Kernel time steps never drop below this, so a burst of fast frames does
// not stall the simulation.
pub const MIN_KERNEL_STEP: f32 = 0.02;

#[derive(Debug)]
pub struct FrameClock {
    start: std::time::Instant,
    iteration_start: std::time::Instant,
    pub iteration_duration: std::time::Duration,
}

impl FrameClock {
    pub fn new(fps: f64) -> FrameClock {
        let now = std::time::Instant::now();
        FrameClock {
            start: now,
            iteration_start: now,
            iteration_duration: std::time::Duration::from_secs_f64(1.0 / fps),
        }
    }

    /// Wall time since the previous tick.
    pub fn tick(&mut self) -> std::time::Duration {
        let deadline = self.iteration_start + self.iteration_duration;
        let now = std::time::Instant::now();
        if now > deadline {
            info!("Over time budget by: {:?}", now - deadline);
        }
        let delta_t = now - self.iteration_start;
        self.iteration_start = now;
        delta_t
    }

    /// Seconds since the clock was created.
    pub fn elapsed(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Sleeps off whatever is left of the current frame's budget.
    pub fn wait_for_next_frame(&self) {
        let deadline = self.iteration_start + self.iteration_duration;
        let now = std::time::Instant::now();
        if now < deadline {
            std::thread::sleep(deadline - now);
        }
    }
}

pub fn kernel_step(frame_time: f32) -> f32 {
    frame_time.max(MIN_KERNEL_STEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_step_is_clamped() {
        assert_eq!(kernel_step(0.001), MIN_KERNEL_STEP);
        assert_eq!(kernel_step(0.05), 0.05);
    }

    #[test]
    fn tick_measures_elapsed_time() {
        let mut clock = FrameClock::new(1000.0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.tick() >= std::time::Duration::from_millis(5));
        assert!(clock.tick() < std::time::Duration::from_millis(5));
    }

    // Get some stats about std::thread::sleep
    #[test]
    #[ignore] // Takes a few seconds, run on demand.
    fn sleep_test() {
        let clock = FrameClock::new(60.0);
        let mut max_err: f64 = 0.0;
        for _ in 0..300 {
            let start = std::time::Instant::now();
            clock.wait_for_next_frame();
            std::thread::sleep(clock.iteration_duration);
            let err = start.elapsed().as_secs_f64() - clock.iteration_duration.as_secs_f64();
            max_err = max_err.max(err);
        }
        println!("Max: {}", max_err);
    }
}
