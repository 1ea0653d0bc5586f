//! Fixed-period background stepping.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::automaton::{Automaton, AutomatonCell};
use crate::error::{Error, Result};

/// Pause after finding another caller's tick in flight.
const CONTENDED_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Control {
    stop: AtomicBool,
    contended: AtomicU64,
}

/// Steps an automaton on its own thread until stopped.
///
/// Each iteration sleeps for `period`, then runs one tick. A tick already in
/// flight from another caller skips the iteration and backs off briefly; any
/// other tick error ends
/// the loop and [`AutoStepper::stop`] reports it. Dropping the stepper stops
/// it and discards the outcome.
pub struct AutoStepper {
    control: Arc<Control>,
    worker: Option<JoinHandle<Result<u64>>>,
}

impl AutoStepper {
    pub fn spawn<C: AutomatonCell>(automaton: Automaton<C>, period: Duration) -> Result<Self> {
        let control = Arc::new(Control::default());
        let shared = Arc::clone(&control);
        let worker = thread::Builder::new()
            .name("cellnet-stepper".to_string())
            .spawn(move || step_loop(&automaton, period, &shared))?;
        info!(period_ms = period.as_millis() as u64, "auto-stepper started");
        Ok(Self {
            control,
            worker: Some(worker),
        })
    }

    /// False once the loop has ended on its own (after a tick error).
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Iterations skipped because another caller's tick was in flight.
    pub fn contended(&self) -> u64 {
        self.control.contended.load(Ordering::Relaxed)
    }

    /// Stop stepping, wait for the tick in progress, and return how many
    /// ticks this stepper ran.
    pub fn stop(mut self) -> Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<u64> {
        self.control.stop.store(true, Ordering::Release);
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or(Err(Error::TickAborted)),
            None => Ok(0),
        }
    }
}

impl Drop for AutoStepper {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("auto-stepper ended with error: {}", e);
        }
    }
}

fn step_loop<C: AutomatonCell>(
    automaton: &Automaton<C>,
    period: Duration,
    control: &Control,
) -> Result<u64> {
    let mut ticks = 0u64;
    while !control.stop.load(Ordering::Acquire) {
        if !period.is_zero() {
            thread::sleep(period);
            if control.stop.load(Ordering::Acquire) {
                break;
            }
        }
        match automaton.step() {
            Ok(_) => ticks += 1,
            // Someone else's tick; try again later.
            Err(Error::TickInFlight) => {
                control.contended.fetch_add(1, Ordering::Relaxed);
                thread::sleep(CONTENDED_BACKOFF);
            }
            Err(e) => {
                error!("auto-stepper halted: {}", e);
                return Err(e);
            }
        }
    }
    info!(ticks, "auto-stepper stopped");
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::network::SimulationNetwork;

    #[test]
    fn steps_until_stopped() {
        let net = SimulationNetwork::default();
        let osc = net.add_node(Cell::oscillator(1, 1, 0)).unwrap();

        let stepper = AutoStepper::spawn(net.automaton().clone(), Duration::from_millis(1)).unwrap();
        while net.tick_count() < 5 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(stepper.is_running());
        let ran = stepper.stop().unwrap();

        assert!(ran >= 5);
        assert_eq!(net.tick_count(), ran);
        assert!(net.get(osc).is_ok());
    }

    #[test]
    fn contends_with_manual_steps() {
        let net = SimulationNetwork::default();
        net.add_node(Cell::node(0.5, 0.5)).unwrap();

        let stepper = AutoStepper::spawn(net.automaton().clone(), Duration::ZERO).unwrap();
        // Manual steps either run or bounce off the in-flight tick.
        for _ in 0..50 {
            match net.step() {
                Ok(_) | Err(Error::TickInFlight) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        let ran = stepper.stop().unwrap();
        assert!(net.tick_count() >= ran);
    }

    #[test]
    fn drop_stops_the_thread() {
        let net = SimulationNetwork::default();
        {
            let _stepper =
                AutoStepper::spawn(net.automaton().clone(), Duration::from_millis(1)).unwrap();
            thread::sleep(Duration::from_millis(10));
        }
        let after_drop = net.tick_count();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(net.tick_count(), after_drop);
    }

    #[test]
    fn backs_off_while_another_tick_is_in_flight() {
        let net = SimulationNetwork::default();
        let x = net.add_node(Cell::node(0.5, 0.5)).unwrap();

        // Park a tick on the write lock, then let a zero-period stepper run
        // into it for a while.
        let (handle, ran, contended) = net
            .with_cell_mut(x, |_| {
                let handle = net.step_async().unwrap();
                let stepper =
                    AutoStepper::spawn(net.automaton().clone(), Duration::ZERO).unwrap();
                thread::sleep(Duration::from_millis(20));
                let contended = stepper.contended();
                (handle, stepper.stop().unwrap(), contended)
            })
            .unwrap();

        assert_eq!(ran, 0);
        // A spinning loop would rack up far more than one retry per backoff.
        assert!(contended <= 40, "{contended} retries in 20ms");
        assert_eq!(handle.wait().unwrap().tick, 1);
    }
}
