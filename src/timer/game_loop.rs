//! Fixed-timestep game loop (§4.3, "Game loop (specialized
//! repeating timer)").
//!
//! Runs on a dedicated OS thread rather than the timer manager's async
//! tasks, so game-tick pacing is never at the mercy of the tokio scheduler.
//! The accumulator cap is the Spiral-of-Death mitigation: once real time
//! outruns simulated time by more than `max_accumulator_cap`, the excess is
//! dropped rather than dispatched as a catch-up burst.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::stage::message::TimerCallback;

/// Configuration for one stage's game loop (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct GameLoopConfig {
    pub fixed_timestep: Duration,
    pub max_accumulator_cap: Duration,
}

impl GameLoopConfig {
    /// `max_accumulator_cap` defaults to `5 * fixed_timestep`, clamped to at
    /// least `fixed_timestep` (§4.3).
    pub fn new(fixed_timestep: Duration) -> Self {
        let cap = fixed_timestep.saturating_mul(5).max(fixed_timestep);
        Self {
            fixed_timestep,
            max_accumulator_cap: cap,
        }
    }

    pub fn max_ticks_per_iteration(&self) -> u32 {
        (self.max_accumulator_cap.as_nanos() / self.fixed_timestep.as_nanos().max(1)) as u32
    }
}

/// Handle to a running game loop thread. Dropping this handle does not stop
/// the loop; call [`GameLoopHandle::stop`] explicitly.
pub struct GameLoopHandle {
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl GameLoopHandle {
    /// Stopping is idempotent (§4.3): a second call is a no-op.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.join.is_some()
    }
}

impl Drop for GameLoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts a dedicated-thread fixed-timestep loop. `enqueue_tick` is called
/// once per simulated step with `(delta, total_simulated_elapsed)` and is
/// responsible for handing a `TimerMessage` to the owning stage's inbox; it
/// must not block.
pub fn start<F>(config: GameLoopConfig, mut enqueue_tick: F) -> GameLoopHandle
where
    F: FnMut(Duration, Duration) -> TimerCallback + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let thread_running = running.clone();

    let join = thread::Builder::new()
        .name("stagecore-game-loop".to_string())
        .spawn(move || {
            let mut accumulator = Duration::ZERO;
            let mut simulated_elapsed = Duration::ZERO;
            let mut last = Instant::now();
            let max_ticks = config.max_ticks_per_iteration();

            while thread_running.load(Ordering::Acquire) {
                let now = Instant::now();
                let real_elapsed = now.duration_since(last);
                last = now;

                accumulator += real_elapsed;
                if accumulator > config.max_accumulator_cap {
                    accumulator = config.max_accumulator_cap;
                }

                let mut dispatched_this_iteration = 0u32;
                while accumulator >= config.fixed_timestep && dispatched_this_iteration < max_ticks {
                    simulated_elapsed += config.fixed_timestep;
                    let callback = enqueue_tick(config.fixed_timestep, simulated_elapsed);
                    callback();
                    accumulator -= config.fixed_timestep;
                    dispatched_this_iteration += 1;
                }

                let remaining = config.fixed_timestep.saturating_sub(accumulator);
                sleep_hybrid(remaining, &thread_running);
            }
        })
        .expect("failed to spawn game loop thread");

    GameLoopHandle {
        running,
        join: Some(join),
    }
}

/// Coarse sleep while there's more than ~2ms left, then busy-spin the final
/// stretch for tighter wakeup accuracy (§4.3).
fn sleep_hybrid(remaining: Duration, running: &AtomicBool) {
    const SPIN_THRESHOLD: Duration = Duration::from_millis(2);
    if remaining > SPIN_THRESHOLD {
        thread::sleep(remaining - SPIN_THRESHOLD);
    }
    let spin_until = Instant::now() + remaining.min(SPIN_THRESHOLD);
    while Instant::now() < spin_until && running.load(Ordering::Acquire) {
        thread::yield_now();
    }
}
