//! Lifecycle supervisor.
//!
//! Owns the service state and the recurring timer. `start()` runs one cycle
//! immediately and then arms a timer task that spawns a cycle on every tick;
//! `stop()` disarms it. Cycles run as their own tasks, so a slow cycle never
//! delays the timer and stopping never aborts a cycle already in flight.
//!
//! By default ticks fire regardless of whether the previous cycle finished.
//! With `serialize_cycles` a tick is skipped while another cycle is running.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::controller::{CycleReport, UpdateController};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Handle to the armed recurring timer.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn disarm(self) {
        self.task.abort();
    }
}

/// Mutable service state. Only `start()` and `stop()` write to it.
#[derive(Debug)]
pub struct OracleServiceState {
    pub is_running: bool,
    pub process_id: String,
    pub update_interval: Duration,
    pub timer: Option<TimerHandle>,
}

/// Read-only snapshot returned by [`Supervisor::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub is_running: bool,
    pub process_id: String,
    pub update_interval_ms: u64,
    pub timer_armed: bool,
    pub cycles_in_flight: usize,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub update_interval: Duration,
    pub serialize_cycles: bool,
    /// Upper bound on how long shutdown waits for in-flight cycles.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(60_000),
            serialize_cycles: false,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Number of cycles currently running, observable by the drain.
type InFlightCount = Arc<watch::Sender<usize>>;

/// Counts a cycle as in flight for as long as it is alive.
struct InFlight(InFlightCount);

impl InFlight {
    fn enter(counter: &InFlightCount) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }

    /// Enter only if nothing else is in flight.
    fn enter_exclusive(counter: &InFlightCount) -> Option<Self> {
        let entered = counter.send_if_modified(|n| {
            if *n == 0 {
                *n = 1;
                true
            } else {
                false
            }
        });
        entered.then(|| Self(Arc::clone(counter)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor {
    controller: Arc<UpdateController>,
    state: OracleServiceState,
    config: SupervisorConfig,
    in_flight: InFlightCount,
}

impl Supervisor {
    pub fn new(controller: Arc<UpdateController>, config: SupervisorConfig) -> Self {
        let state = OracleServiceState {
            is_running: false,
            process_id: controller.settings().process_id.clone(),
            update_interval: config.update_interval,
            timer: None,
        };
        Self { controller, state, config, in_flight: Arc::new(watch::Sender::new(0)) }
    }

    /// Run one cycle now, then arm the recurring timer.
    pub async fn start(&mut self) {
        if self.state.is_running {
            info!("Oracle service is already running");
            return;
        }

        info!(
            process_id = %self.state.process_id,
            interval_secs = self.state.update_interval.as_secs_f64(),
            serialize_cycles = self.config.serialize_cycles,
            "Starting price oracle service"
        );

        {
            let _guard = InFlight::enter(&self.in_flight);
            self.controller.run_cycle().await;
        }

        self.state.timer = Some(self.arm_timer());
        self.state.is_running = true;
        info!("Oracle service started");
    }

    /// Disarm the timer. Cycles already running are left to finish.
    pub fn stop(&mut self) {
        if !self.state.is_running {
            info!("Oracle service is not running");
            return;
        }

        info!("Stopping price oracle service...");
        if let Some(timer) = self.state.timer.take() {
            timer.disarm();
        }
        self.state.is_running = false;
        info!("Oracle service stopped");
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            is_running: self.state.is_running,
            process_id: self.state.process_id.clone(),
            update_interval_ms: self.state.update_interval.as_millis() as u64,
            timer_armed: self.state.timer.is_some(),
            cycles_in_flight: *self.in_flight.borrow(),
        }
    }

    /// One cycle, no timer.
    pub async fn run_once(&self) -> CycleReport {
        info!("Performing single price update...");
        let _guard = InFlight::enter(&self.in_flight);
        self.controller.run_cycle().await
    }

    /// Start, then block until `shutdown` fires and stop.
    ///
    /// A closed channel counts as a shutdown request.
    pub async fn run_until_shutdown(&mut self, mut shutdown: broadcast::Receiver<()>) {
        self.start().await;
        let _ = shutdown.recv().await;
        info!("Shutdown requested");
        self.stop();
        self.drain().await;
    }

    /// Wait for in-flight cycles, bounded by the configured grace period.
    pub async fn drain(&self) {
        let mut in_flight = self.in_flight.subscribe();
        let idle = in_flight.wait_for(|n| *n == 0);
        if tokio::time::timeout(self.config.shutdown_grace, idle).await.is_err() {
            warn!(
                in_flight = *self.in_flight.borrow(),
                "Shutdown grace period elapsed with cycles still running"
            );
        }
    }

    fn arm_timer(&self) -> TimerHandle {
        let controller = Arc::clone(&self.controller);
        let in_flight = Arc::clone(&self.in_flight);
        let period = self.state.update_interval;
        let serialize = self.config.serialize_cycles;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let guard = if serialize {
                    match InFlight::enter_exclusive(&in_flight) {
                        Some(guard) => guard,
                        None => {
                            warn!("Previous cycle still running, skipping tick");
                            continue;
                        }
                    }
                } else {
                    InFlight::enter(&in_flight)
                };

                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    let _guard = guard;
                    controller.run_cycle().await;
                });
            }
        });

        TimerHandle { task }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(timer) = self.state.timer.take() {
            timer.disarm();
        }
    }
}
