//! Polling background scans to completion with a deadline and a cancellation flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use qsweep_shared::{DaqErr, FunctionType, ScanStatus};

use crate::daq::Daq;

/// Where a background scan stands, as far as the sweep is concerned
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPhase {
    Idle,
    Running,
    Error(DaqErr),
}

impl ScanPhase {
    /// Query the driver for the current phase of a function's scan
    pub fn poll(daq: &mut dyn Daq, function: FunctionType) -> Self {
        match daq.poll_status(function) {
            Ok(ScanStatus::Idle) => Self::Idle,
            Ok(ScanStatus::Running) => Self::Running,
            Ok(ScanStatus::Unknown(code)) => Self::Error(DaqErr::new(
                qsweep_shared::ErrorCode::Unknown(i32::from(code)),
                format!("Unrecognized {function:?} scan status {code}"),
            )),
            Err(e) => Self::Error(e),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Shared flag that asks a running sweep to stop after its current status query
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How waiting on a pair of scans ended
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Both scans went idle
    Done { polls: usize },
    Failed { function: FunctionType, err: DaqErr },
    TimedOut { output: ScanPhase, input: ScanPhase },
    Cancelled,
}

/// Poll the output and input scans until both are idle.
///
/// Both statuses are queried each round; between rounds the thread sleeps for
/// `interval`. Waiting ends early on a driver error, once `timeout` has elapsed,
/// or when `cancel` is set.
pub fn wait_idle(
    daq: &mut dyn Daq,
    interval: Duration,
    timeout: Duration,
    cancel: &CancelToken,
) -> WaitOutcome {
    let start = Instant::now();
    let mut polls = 0;
    loop {
        let output = ScanPhase::poll(daq, FunctionType::AnalogOutput);
        let input = ScanPhase::poll(daq, FunctionType::AnalogInput);
        polls += 1;
        debug!("Status poll {polls}: output {output:?}, input {input:?}");

        for (function, phase) in [
            (FunctionType::AnalogOutput, &output),
            (FunctionType::AnalogInput, &input),
        ] {
            if let ScanPhase::Error(err) = phase {
                return WaitOutcome::Failed {
                    function,
                    err: err.clone(),
                };
            }
        }
        if output.is_idle() && input.is_idle() {
            return WaitOutcome::Done { polls };
        }
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        if start.elapsed() >= timeout {
            return WaitOutcome::TimedOut { output, input };
        }

        thread::sleep(interval.min(timeout.saturating_sub(start.elapsed())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daq::{SimConfig, SimulatedDaq};
    use qsweep_shared::{AnalogRange, ScanOptions, ScanRequest};

    fn start_input(daq: &mut SimulatedDaq, options: ScanOptions) {
        let buffer = daq.alloc_buffer(46).unwrap();
        daq.start_input_scan(&ScanRequest {
            low_chan: 0,
            high_chan: 0,
            count: 46,
            rate_hz: 9000.0,
            range: AnalogRange::Bip10Volts,
            buffer,
            options,
        })
        .unwrap();
    }

    #[test]
    fn idle_board_is_done_at_once() {
        let mut daq = SimulatedDaq::default();
        let outcome = wait_idle(
            &mut daq,
            Duration::from_millis(1),
            Duration::from_secs(1),
            &CancelToken::new(),
        );
        assert_eq!(outcome, WaitOutcome::Done { polls: 1 });
    }

    #[test]
    fn running_scan_finishes() {
        let mut daq = SimulatedDaq::new(SimConfig::default().with_polls_to_complete(3));
        start_input(&mut daq, ScanOptions::BACKGROUND);
        let outcome = wait_idle(
            &mut daq,
            Duration::from_millis(1),
            Duration::from_secs(1),
            &CancelToken::new(),
        );
        assert_eq!(outcome, WaitOutcome::Done { polls: 4 });
    }

    #[test]
    fn armed_scan_times_out() {
        let mut daq = SimulatedDaq::default();
        start_input(&mut daq, ScanOptions::BACKGROUND | ScanOptions::EXTTRIGGER);
        let start = Instant::now();
        let outcome = wait_idle(
            &mut daq,
            Duration::from_millis(5),
            Duration::from_millis(50),
            &CancelToken::new(),
        );
        assert_eq!(
            outcome,
            WaitOutcome::TimedOut {
                output: ScanPhase::Idle,
                input: ScanPhase::Running
            }
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancellation_stops_waiting() {
        let mut daq = SimulatedDaq::default();
        start_input(&mut daq, ScanOptions::BACKGROUND | ScanOptions::EXTTRIGGER);
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        remote.cancel();
        let outcome = wait_idle(
            &mut daq,
            Duration::from_millis(5),
            Duration::from_secs(60),
            &cancel,
        );
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }
}
