// Periodic fetch-parse-publish loop.
//
// Two pieces of control state, kept under one mutex:
//  - phase: Idle or Polling. At most one cycle is ever in flight.
//  - running: whether the timer keeps scheduling ticks. Independent of phase.
//
// Cycles never touch presentation state. They publish to the ResultStore and
// readers pull from there or subscribe.
extern crate chrono;

use crate::clock::Clock;
use crate::config::Config;
use crate::fetcher::ArrivalFetcher;
use crate::predictions::PredictionParser;
use crate::result::PollError;
use crate::store::ResultStore;
use crate::structs::{ArrivalSnapshot, Direction, DirectionArrivals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Polling { cycle: u64 },
}

struct ControlState {
    running: bool,
    phase: Phase,
    // Bumped by every start() so a timer thread from an earlier run can tell
    // it has been superseded.
    generation: u64,
    next_cycle: u64,
}

struct SchedulerInner {
    fetcher: ArrivalFetcher,
    parser: PredictionParser,
    directions: [Direction; 2],
    store: ResultStore,
    clock: std::sync::Arc<dyn Clock>,
    interval: std::time::Duration,
    control: std::sync::Mutex<ControlState>,
    wakeup: std::sync::Condvar,
}

// Who may start a cycle.
#[derive(Debug, Clone, Copy)]
enum CycleGate {
    // On-demand polls, running or not.
    Always,
    Running,
    // Only the timer thread of this start() generation.
    Timer(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Stopped,
    Busy,
    Published(u64),
    Failed(u64),
}

#[derive(Clone)]
pub struct PollScheduler {
    inner: std::sync::Arc<SchedulerInner>,
}

// Holds the Polling phase for one cycle and puts the scheduler back to Idle
// when dropped, whatever the cycle's outcome.
struct CycleGuard {
    inner: std::sync::Arc<SchedulerInner>,
    cycle: u64,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let mut control = lock_control(&self.inner);
        control.phase = Phase::Idle;
        self.inner.wakeup.notify_all();
    }
}

fn lock_control(inner: &SchedulerInner) -> std::sync::MutexGuard<ControlState> {
    return inner.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
}

impl PollScheduler {
    pub fn new(config: &Config,
               fetcher: ArrivalFetcher,
               store: ResultStore,
               clock: std::sync::Arc<dyn Clock>) -> PollScheduler {
        return PollScheduler{
            inner: std::sync::Arc::new(SchedulerInner{
                fetcher: fetcher,
                parser: PredictionParser::new(config.timestamp_mode, config.timezone),
                directions: config.directions.clone(),
                store: store,
                clock: clock,
                interval: config.poll_interval,
                control: std::sync::Mutex::new(ControlState{
                    running: false,
                    phase: Phase::Idle,
                    generation: 0,
                    next_cycle: 1,
                }),
                wakeup: std::sync::Condvar::new(),
            }),
        };
    }

    pub fn store(&self) -> &ResultStore {
        return &self.inner.store;
    }

    pub fn is_running(&self) -> bool {
        return lock_control(&self.inner).running;
    }

    pub fn clock(&self) -> &std::sync::Arc<dyn Clock> {
        return &self.inner.clock;
    }

    pub fn is_polling(&self) -> bool {
        return self.polling_cycle().is_some();
    }

    /// The cycle currently in flight, if any.
    pub fn polling_cycle(&self) -> Option<u64> {
        return match lock_control(&self.inner).phase {
            Phase::Idle => None,
            Phase::Polling{cycle} => Some(cycle),
        };
    }

    /// Polls right away and then every interval until stopped. No-op if
    /// already running.
    pub fn start(&self) {
        let generation = {
            let mut control = lock_control(&self.inner);
            if control.running {
                return;
            }
            control.running = true;
            control.generation += 1;
            control.generation
        };

        let scheduler = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("poll-timer-{}", generation))
            .spawn(move || scheduler.timer_loop(generation));

        match spawned {
            Ok(_) => info!("Polling every {:?}", self.inner.interval),
            Err(err) => {
                error!("Could not start poll timer: {}", err);
                lock_control(&self.inner).running = false;
            },
        }
    }

    /// Stops scheduling further ticks. A cycle already in flight still
    /// completes and publishes. No-op if already stopped.
    pub fn stop(&self) {
        let mut control = lock_control(&self.inner);
        if !control.running {
            return;
        }
        control.running = false;
        self.inner.wakeup.notify_all();
        info!("Polling stopped");
    }

    /// What the timer does when the interval expires.
    pub fn tick(&self) -> TickOutcome {
        return self.tick_gated(CycleGate::Running);
    }

    fn tick_gated(&self, gate: CycleGate) -> TickOutcome {
        let guard = match self.begin_cycle(gate) {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };
        let cycle = guard.cycle;
        match self.run_cycle(guard) {
            Ok(_) => return TickOutcome::Published(cycle),
            Err(_) => return TickOutcome::Failed(cycle),
        }
    }

    /// Starts a cycle on a worker thread, unless one is already in flight.
    /// Works whether or not the timer is running.
    pub fn trigger_poll_now(&self) -> bool {
        let guard = match self.begin_cycle(CycleGate::Always) {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Poll requested while a cycle is in flight, ignoring");
                return false;
            },
        };

        let scheduler = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("poll-cycle-{}", guard.cycle))
            .spawn(move || {
                let _ = scheduler.run_cycle(guard);
            });

        if let Err(err) = spawned {
            // The guard went down with the closure, so we are Idle again.
            error!("Could not start poll cycle: {}", err);
            return false;
        }
        return true;
    }

    /// Runs one cycle on the calling thread. `None` if one is already in flight.
    pub fn poll_once(&self) -> Option<Result<std::sync::Arc<ArrivalSnapshot>, PollError>> {
        let guard = self.begin_cycle(CycleGate::Always).ok()?;
        return Some(self.run_cycle(guard));
    }

    // Checking the gate and entering Polling happen under one lock, so no
    // cycle can begin after stop() has returned.
    fn begin_cycle(&self, gate: CycleGate) -> Result<CycleGuard, TickOutcome> {
        let mut control = lock_control(&self.inner);
        let allowed = match gate {
            CycleGate::Always => true,
            CycleGate::Running => control.running,
            CycleGate::Timer(generation) => control.running && control.generation == generation,
        };
        if !allowed {
            return Err(TickOutcome::Stopped);
        }
        if control.phase != Phase::Idle {
            return Err(TickOutcome::Busy);
        }
        let cycle = control.next_cycle;
        control.next_cycle += 1;
        control.phase = Phase::Polling{cycle: cycle};
        return Ok(CycleGuard{inner: self.inner.clone(), cycle: cycle});
    }

    fn run_cycle(&self, guard: CycleGuard) -> Result<std::sync::Arc<ArrivalSnapshot>, PollError> {
        let started_at = self.inner.clock.now();

        let outcome = self.fetch_direction(&self.inner.directions[0])
            .and_then(|first| {
                let second = self.fetch_direction(&self.inner.directions[1])?;
                return Ok(ArrivalSnapshot{
                    cycle: guard.cycle,
                    fetched_at: started_at,
                    directions: [first, second],
                });
            });

        match outcome {
            Ok(snapshot) => {
                let snapshot = std::sync::Arc::new(snapshot);
                if self.inner.store.publish(snapshot.clone()) {
                    info!("Cycle {} published: {}", guard.cycle, summarize(&snapshot, started_at));
                }
                return Ok(snapshot);
            },
            Err(err) => {
                warn!("Cycle {} failed, keeping previous arrivals: {}", guard.cycle, err);
                self.inner.store.record_failure(self.inner.clock.now(), &err);
                return Err(err);
            },
        }
    }

    fn fetch_direction(&self, direction: &Direction) -> Result<DirectionArrivals, PollError> {
        let body = self.inner.fetcher.fetch(&direction.stop)
            .map_err(|err| PollError::Fetch{stop: direction.stop.clone(), source: err})?;
        let [next, following] = self.inner.parser.parse(&body)
            .map_err(|err| PollError::Parse{stop: direction.stop.clone(), source: err})?;
        return Ok(DirectionArrivals{
            direction: direction.clone(),
            next: next,
            following: following,
        });
    }

    fn timer_loop(&self, generation: u64) {
        debug!("Timer {} started", generation);
        let mut first_tick = true;
        loop {
            match self.tick_gated(CycleGate::Timer(generation)) {
                TickOutcome::Stopped => break,
                // The poll owed to start() runs as soon as the earlier cycle ends.
                TickOutcome::Busy if first_tick => {
                    debug!("First tick found a cycle in flight, waiting for it");
                    if !self.wait_for_idle(generation) {
                        break;
                    }
                    continue;
                },
                TickOutcome::Busy => debug!("Tick skipped, a cycle is already in flight"),
                _ => {},
            }
            first_tick = false;
            if !self.wait_for_next_tick(generation) {
                break;
            }
        }
        debug!("Timer {} exited", generation);
    }

    // Returns false as soon as this timer is stopped or superseded.
    fn wait_for_idle(&self, generation: u64) -> bool {
        let mut control = lock_control(&self.inner);
        loop {
            if !control.running || control.generation != generation {
                return false;
            }
            if control.phase == Phase::Idle {
                return true;
            }
            control = match self.inner.wakeup.wait(control) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    // Sleeps one interval. Returns false as soon as this timer is stopped or
    // superseded.
    fn wait_for_next_tick(&self, generation: u64) -> bool {
        let deadline = std::time::Instant::now() + self.inner.interval;
        let mut control = lock_control(&self.inner);
        loop {
            if !control.running || control.generation != generation {
                return false;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return true;
            }
            control = match self.inner.wakeup.wait_timeout(control, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

fn summarize(snapshot: &ArrivalSnapshot, now: chrono::DateTime<chrono::Utc>) -> String {
    return snapshot.directions.iter()
        .map(|d| {
            let labels = d.labels(now);
            return format!("{} [{}, {}]", d.direction.name, labels[0], labels[1]);
        })
        .collect::<Vec<String>>()
        .join(" / ");
}
