//! Sweep loop: one triggered output/input scan pair per frequency,
//! followed by a sine fit of the capture.

pub mod context;
pub mod frequencies;
pub mod outcome;
pub mod plan;
pub mod scan_state;

pub use context::{MIN_POLL_INTERVAL, SweepCtx, SyncMode, TriggerConfig};
pub use frequencies::{MAX_SWEEP_POINTS, frequency_list, output_rate};
pub use outcome::{PointFailure, PointOutcome, SweepPoint, SweepReport};
pub use plan::SweepPlan;
pub use scan_state::{CancelToken, ScanPhase, WaitOutcome, wait_idle};

use std::time::Instant;

use tracing::{debug, error, info, warn};

use qsweep_shared::{
    AnalogRange, BufferHandle, DaqErr, DigitalDirection, ErrorCode, FunctionType, PortType,
    ScanOptions, ScanRequest,
};

use crate::capture::CaptureRecord;
use crate::daq::Daq;
use crate::error::SweepErr;
use crate::math::sine_fit::{expected_cycles, fit_sine, phase_grid};
use crate::reporter::Reporter;
use crate::stimulus::Waveform;

/// Board resources resolved once at the start of a sweep
#[derive(Debug, Clone)]
struct Setup {
    ao_range: AnalogRange,
    ao_bits: u8,
    ai_range: AnalogRange,
    ai_bits: u8,

    /// Digital port that fires the trigger in [`SyncMode::DigitalTrigger`]
    trigger_port: Option<PortType>,
}

#[derive(Debug, Clone, Copy)]
struct Buffers {
    output: BufferHandle,
    input: BufferHandle,
}

/// The sweep controller runs one sweep at a time over a board it borrows exclusively,
/// passing each point to its reporters as it completes.
#[derive(Debug, Default)]
pub struct SweepController {
    ctx: SweepCtx,
    reporters: Vec<Box<dyn Reporter>>,
    cancel: CancelToken,
}

impl From<SweepPlan> for SweepController {
    fn from(plan: SweepPlan) -> Self {
        Self {
            ctx: plan.ctx,
            reporters: plan.reporters,
            cancel: CancelToken::new(),
        }
    }
}

impl SweepController {
    pub fn new(ctx: SweepCtx) -> Self {
        Self {
            ctx,
            reporters: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn ctx(&self) -> &SweepCtx {
        &self.ctx
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn reporters(&self) -> &[Box<dyn Reporter>] {
        &self.reporters
    }

    /// A handle that stops the sweep after the status query in progress.
    /// Once cancelled, the controller stays cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run a sweep from `min_hz` to `max_hz` by `step_hz`.
    ///
    /// Failures of a single point are recorded on the point and the sweep moves on.
    /// Errors returned here are fatal to the whole sweep: invalid inputs, a board
    /// missing a capability, driver failures outside the per-point loop, or a
    /// reporter failure.
    pub fn run(
        &mut self,
        daq: &mut dyn Daq,
        min_hz: f64,
        max_hz: f64,
        step_hz: f64,
    ) -> Result<SweepReport, SweepErr> {
        self.ctx.validate()?;
        let frequencies = frequency_list(min_hz, max_hz, step_hz)?;

        info!("Active DAQ device: {}", daq.info().description());
        let setup = self.check_capabilities(daq)?;
        let waveform =
            Waveform::for_sweep(self.ctx.stimulus_amplitude_volts, setup.ao_range, setup.ao_bits)?;

        info!("Minimum frequency: {min_hz}");
        info!("Maximum frequency: {max_hz}");
        info!("Step frequency: {step_hz}");
        info!(
            "Sweeping {} frequencies with {:?} synchronization",
            frequencies.len(),
            self.ctx.sync
        );

        for reporter in self.reporters.iter_mut() {
            reporter
                .init(&self.ctx, &frequencies)
                .map_err(|msg| SweepErr::Report { msg })?;
        }

        // Buffers are reused for every point and released however the sweep ends
        let output = daq
            .alloc_buffer(self.ctx.output_points)
            .map_err(|e| SweepErr::driver("allocating the output buffer", e))?;
        let input = match daq.alloc_buffer(self.ctx.input_points) {
            Ok(input) => input,
            Err(e) => {
                release_buffers(daq, &[output]);
                return Err(SweepErr::driver("allocating the input buffer", e));
            }
        };
        let buffers = Buffers { output, input };

        let result = self.sweep_points(daq, &setup, buffers, &waveform, frequencies);
        release_buffers(daq, &[output, input]);
        let report = result?;

        for reporter in self.reporters.iter_mut() {
            reporter
                .finish(&report)
                .map_err(|msg| SweepErr::Report { msg })?;
        }

        info!(
            "Sweep finished in {:.2} s: {} of {} points fitted",
            report.elapsed.as_secs_f64(),
            report.fitted_count(),
            report.frequencies.len()
        );
        Ok(report)
    }

    /// Resolve ranges and the trigger line, failing on anything the sweep cannot do without
    fn check_capabilities(&self, daq: &mut dyn Daq) -> Result<Setup, SweepErr> {
        let info = daq.info().clone();
        let ctx = &self.ctx;

        let ai = info
            .ai
            .as_ref()
            .filter(|ai| info.supports_analog_input() && ai.supports_scan)
            .ok_or_else(|| SweepErr::MissingCapability {
                msg: "The DAQ device does not support analog input scans".to_owned(),
            })?;
        let ao = info
            .ao
            .as_ref()
            .filter(|ao| info.supports_analog_output() && ao.supports_scan)
            .ok_or_else(|| SweepErr::MissingCapability {
                msg: "The DAQ device does not support analog output scans".to_owned(),
            })?;

        if ctx.channel >= ai.num_chans || ctx.channel >= ao.num_chans {
            return Err(SweepErr::InvalidConfig {
                msg: format!(
                    "Channel {} not available ({} inputs, {} outputs)",
                    ctx.channel, ai.num_chans, ao.num_chans
                ),
            });
        }

        let ao_range = *ao.supported_ranges.get(ctx.ao_range_index).ok_or_else(|| {
            SweepErr::InvalidConfig {
                msg: format!("No analog output range at index {}", ctx.ao_range_index),
            }
        })?;
        let ai_range = *ai.supported_ranges.get(ctx.ai_range_index).ok_or_else(|| {
            SweepErr::InvalidConfig {
                msg: format!("No analog input range at index {}", ctx.ai_range_index),
            }
        })?;

        let trigger_port = match ctx.sync {
            SyncMode::DigitalTrigger => {
                let port = info.first_output_port().ok_or_else(|| {
                    SweepErr::MissingCapability {
                        msg: "The DAQ device has no digital output port for the trigger"
                            .to_owned(),
                    }
                })?;
                if ctx.trigger.bit >= port.num_bits {
                    return Err(SweepErr::InvalidConfig {
                        msg: format!(
                            "Trigger bit {} not on {:?} ({} bits)",
                            ctx.trigger.bit, port.port, port.num_bits
                        ),
                    });
                }
                if port.is_configurable {
                    daq.config_port(port.port, DigitalDirection::Out)
                        .map_err(|e| SweepErr::driver("configuring the trigger port", e))?;
                }
                Some(port.port)
            }
            SyncMode::AnalogTrigger => {
                if ctx.trigger.analog_channel >= ao.num_chans {
                    return Err(SweepErr::MissingCapability {
                        msg: format!(
                            "No analog output channel {} for the trigger",
                            ctx.trigger.analog_channel
                        ),
                    });
                }
                None
            }
            SyncMode::Untriggered => None,
        };

        info!("Output range {ao_range:?}, input range {ai_range:?}, trigger port {trigger_port:?}");
        Ok(Setup {
            ao_range,
            ao_bits: ao.resolution_bits,
            ai_range,
            ai_bits: ai.resolution_bits,
            trigger_port,
        })
    }

    /// Load the stimulus, set up the trigger, and run every point
    fn sweep_points(
        &mut self,
        daq: &mut dyn Daq,
        setup: &Setup,
        buffers: Buffers,
        waveform: &Waveform,
        frequencies: Vec<f64>,
    ) -> Result<SweepReport, SweepErr> {
        daq.write_buffer(buffers.output, &waveform.tile(self.ctx.output_points))
            .map_err(|e| SweepErr::driver("loading the stimulus", e))?;

        let trigger = &self.ctx.trigger;
        match self.ctx.sync {
            SyncMode::DigitalTrigger => {
                daq.set_trigger(
                    trigger.trigger_type,
                    trigger.low_threshold,
                    trigger.high_threshold,
                )
                .map_err(|e| SweepErr::driver("setting the trigger", e))?;
            }
            SyncMode::AnalogTrigger => {
                daq.set_trigger(
                    trigger.trigger_type,
                    trigger.low_threshold,
                    trigger.high_threshold,
                )
                .map_err(|e| SweepErr::driver("setting the trigger", e))?;
                daq.write_analog(trigger.analog_channel, setup.ao_range, trigger.analog_low)
                    .map_err(|e| SweepErr::driver("resetting the analog trigger", e))?;
            }
            SyncMode::Untriggered => {}
        }

        info!("Scan in progress...");
        let start = Instant::now();
        let mut points = Vec::with_capacity(frequencies.len());
        let mut cancelled = false;
        for &freq in frequencies.iter() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let point = self.measure_point(daq, setup, buffers, freq);
            if point.failure() == Some(&PointFailure::Cancelled) {
                cancelled = true;
            }
            for reporter in self.reporters.iter_mut() {
                reporter
                    .consume(&point)
                    .map_err(|msg| SweepErr::Report { msg })?;
            }
            points.push(point);

            if cancelled {
                break;
            }
        }
        let elapsed = start.elapsed();
        if cancelled {
            warn!(
                "Sweep cancelled after {} of {} frequencies",
                points.len(),
                frequencies.len()
            );
        }

        Ok(SweepReport {
            frequencies,
            points,
            elapsed,
            cancelled,
        })
    }

    /// Capture and fit one frequency, recording any failure on the point
    fn measure_point(
        &self,
        daq: &mut dyn Daq,
        setup: &Setup,
        buffers: Buffers,
        freq: f64,
    ) -> SweepPoint {
        let rate_hz = output_rate(freq);
        let out_phase = ScanPhase::poll(daq, FunctionType::AnalogOutput);
        let in_phase = ScanPhase::poll(daq, FunctionType::AnalogInput);
        info!("Frequency: {freq}");
        info!("Loop begin: {out_phase:?}, {in_phase:?}");

        let mut realized_rate_hz = None;
        let outcome = match self.acquire(daq, setup, buffers, freq, rate_hz, &mut realized_rate_hz) {
            Ok(capture) => {
                debug!("Capture at {freq} Hz: {:?}", capture.samples);
                let y = capture.as_f64();
                let fit = fit_sine(&phase_grid(y.len()), &y, expected_cycles(y.len()), &self.ctx.fit);
                let fit_volts = match &fit {
                    Ok(fit) => {
                        info!(
                            "Amplitude at {freq} Hz: {:.2} codes after {} evaluations",
                            fit.amplitude, fit.evaluations
                        );
                        fit.to_volts(setup.ai_range, setup.ai_bits)
                            .inspect_err(|e| warn!("Fit at {freq} Hz not expressible in volts: {e}"))
                            .ok()
                    }
                    Err(e) => {
                        warn!("Fit failed at {freq} Hz: {e}");
                        None
                    }
                };
                PointOutcome::Captured {
                    capture,
                    fit,
                    fit_volts,
                }
            }
            Err(failure) => {
                error!("Sweep point at {freq} Hz failed: {failure}");
                stop_scans(daq);
                PointOutcome::Failed(failure)
            }
        };

        SweepPoint {
            frequency_hz: freq,
            rate_hz,
            realized_rate_hz,
            outcome,
        }
    }

    /// Start, synchronize, and wait out both scans, then copy out the capture
    fn acquire(
        &self,
        daq: &mut dyn Daq,
        setup: &Setup,
        buffers: Buffers,
        freq: f64,
        rate_hz: f64,
        realized_rate_hz: &mut Option<f64>,
    ) -> Result<CaptureRecord, PointFailure> {
        let ctx = &self.ctx;
        let trigger = &ctx.trigger;
        let options = match ctx.sync {
            SyncMode::Untriggered => ScanOptions::BACKGROUND,
            _ => ScanOptions::BACKGROUND | ScanOptions::EXTTRIGGER,
        };
        let out_req = ScanRequest {
            low_chan: ctx.channel,
            high_chan: ctx.channel,
            count: ctx.output_points,
            rate_hz,
            range: setup.ao_range,
            buffer: buffers.output,
            options,
        };
        let in_req = ScanRequest {
            count: ctx.input_points,
            range: setup.ai_range,
            buffer: buffers.input,
            ..out_req.clone()
        };

        match ctx.sync {
            SyncMode::DigitalTrigger => {
                let port = setup.trigger_port.ok_or_else(|| PointFailure::Driver {
                    during: "driving the trigger port".to_owned(),
                    err: DaqErr::new(ErrorCode::BadPort, "No trigger port resolved"),
                })?;
                daq.write_port(port, trigger.port_value)
                    .map_err(driver("driving the trigger port"))?;
                daq.write_bit(port, trigger.bit, false)
                    .map_err(driver("lowering the trigger bit"))?;
                *realized_rate_hz = Some(
                    daq.start_output_scan(&out_req)
                        .map_err(driver("starting the output scan"))?,
                );
                daq.start_input_scan(&in_req)
                    .map_err(driver("starting the input scan"))?;
                daq.write_bit(port, trigger.bit, true)
                    .map_err(driver("raising the trigger bit"))?;
            }
            SyncMode::AnalogTrigger => {
                daq.write_analog(trigger.analog_channel, setup.ao_range, trigger.analog_low)
                    .map_err(driver("resetting the analog trigger"))?;
                *realized_rate_hz = Some(
                    daq.start_output_scan(&out_req)
                        .map_err(driver("starting the output scan"))?,
                );
                daq.start_input_scan(&in_req)
                    .map_err(driver("starting the input scan"))?;
                daq.write_analog(trigger.analog_channel, setup.ao_range, trigger.analog_high)
                    .map_err(driver("raising the analog trigger"))?;
            }
            SyncMode::Untriggered => {
                daq.start_input_scan(&in_req)
                    .map_err(driver("starting the input scan"))?;
                *realized_rate_hz = Some(
                    daq.start_output_scan(&out_req)
                        .map_err(driver("starting the output scan"))?,
                );
            }
        }
        if let Some(realized) = *realized_rate_hz {
            if realized != rate_hz {
                info!("Output rate {rate_hz} Hz realized as {realized} Hz");
            }
        }
        info!("Before data col.: {:?}", ScanPhase::poll(daq, FunctionType::AnalogInput));

        // Both scans run at the output rate
        let timeout = ctx.point_deadline(realized_rate_hz.unwrap_or(rate_hz));
        match wait_idle(daq, ctx.poll_interval(), timeout, &self.cancel) {
            WaitOutcome::Done { polls } => info!("Scans idle after {polls} status polls"),
            WaitOutcome::Failed { function, err } => {
                return Err(PointFailure::Driver {
                    during: format!("polling {function:?} status"),
                    err,
                });
            }
            WaitOutcome::TimedOut { output, input } => {
                return Err(PointFailure::Timeout {
                    waited: timeout,
                    output: format!("{output:?}"),
                    input: format!("{input:?}"),
                });
            }
            WaitOutcome::Cancelled => return Err(PointFailure::Cancelled),
        }

        let mut raw = vec![0; ctx.input_points];
        daq.read_buffer(buffers.input, &mut raw)
            .map_err(driver("reading the input buffer"))?;
        Ok(CaptureRecord::from_input_buffer(freq, &raw))
    }
}

fn driver(during: &'static str) -> impl Fn(DaqErr) -> PointFailure {
    move |err| PointFailure::Driver {
        during: during.to_owned(),
        err,
    }
}

/// Stop both background functions, logging but otherwise ignoring failures
fn stop_scans(daq: &mut dyn Daq) {
    for function in [FunctionType::AnalogOutput, FunctionType::AnalogInput] {
        if let Err(e) = daq.stop_background(function) {
            warn!("Failed to stop {function:?} scan: {e}");
        }
    }
}

fn release_buffers(daq: &mut dyn Daq, handles: &[BufferHandle]) {
    stop_scans(daq);
    for &handle in handles {
        if let Err(e) = daq.free_buffer(handle) {
            warn!("Failed to free {handle:?}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daq::{SimConfig, SimulatedDaq};
    use crate::reporter::MemoryReporter;

    fn ctx() -> SweepCtx {
        SweepCtx {
            op_name: "test".to_owned(),
            op_dir: std::env::temp_dir(),
            point_timeout_ms: 400,
            ..Default::default()
        }
    }

    #[test]
    fn sweeps_three_points_end_to_end() {
        let mut daq = SimulatedDaq::new(SimConfig::default().with_resonator(1100.0, 5.0));
        let mut controller = SweepController::new(ctx());
        let (memory, handle) = MemoryReporter::new();
        controller.add_reporter(Box::new(memory));

        let report = controller.run(&mut daq, 1000.0, 1200.0, 100.0).unwrap();

        assert_eq!(report.frequencies, vec![1000.0, 1100.0, 1200.0]);
        assert_eq!(report.points.len(), 3);
        report.check_complete().unwrap();
        for point in &report.points {
            assert_eq!(point.capture().unwrap().len(), 45);
            assert!(point.amplitude().unwrap() > 0.0);
        }
        assert!(!report.cancelled);
        assert_eq!(daq.live_buffers(), 0);
        assert_eq!(handle.points().len(), 3);

        // Resonance at the middle frequency
        let a = report.amplitudes();
        assert!(a[1] > a[0] && a[1] > a[2]);

        // 10 V stimulus through a 0.8 peak gain
        let volts = report.points[1].amplitude_volts().unwrap();
        assert!((volts - 8.0).abs() < 0.2, "{volts}");
    }

    #[test]
    fn all_sync_modes_capture() {
        for sync in [SyncMode::AnalogTrigger, SyncMode::Untriggered] {
            let mut daq = SimulatedDaq::new(SimConfig::default().with_resonator(1000.0, 5.0));
            let mut controller = SweepController::new(SweepCtx { sync, ..ctx() });
            let report = controller.run(&mut daq, 1000.0, 1000.0, 1.0).unwrap();
            report.check_complete().unwrap();
        }
    }

    #[test]
    fn start_failure_skips_only_that_point() {
        let mut daq = SimulatedDaq::new(SimConfig::default().with_failure_at(1100.0));
        let mut controller = SweepController::new(ctx());
        let report = controller.run(&mut daq, 1000.0, 1200.0, 100.0).unwrap();

        assert_eq!(report.points.len(), 3);
        match report.points[1].failure() {
            Some(PointFailure::Driver { err, .. }) => assert_eq!(err.code, ErrorCode::DeadDevice),
            other => panic!("expected driver failure, got {other:?}"),
        }
        assert!(report.points[0].amplitude().is_some());
        assert!(report.points[2].amplitude().is_some());
        assert!(matches!(
            report.check_complete(),
            Err(SweepErr::IncompleteSweep { captured: 2, .. })
        ));
        assert!(!daq.is_active(FunctionType::AnalogOutput));
        assert!(!daq.is_active(FunctionType::AnalogInput));
        assert_eq!(daq.live_buffers(), 0);
    }

    #[test]
    fn missed_trigger_times_out() {
        let mut daq = SimulatedDaq::new(SimConfig::default().with_trigger_disconnected());
        let mut controller = SweepController::new(ctx());
        let start = Instant::now();
        let report = controller.run(&mut daq, 1000.0, 1100.0, 100.0).unwrap();

        assert!(start.elapsed().as_secs_f64() < 5.0);
        assert!(
            report
                .points
                .iter()
                .all(|p| matches!(p.failure(), Some(PointFailure::Timeout { .. })))
        );
        assert!(!daq.is_active(FunctionType::AnalogInput));
        assert_eq!(daq.live_buffers(), 0);
    }

    #[test]
    fn slow_scan_outlasting_timeout_completes() {
        // 46 samples at 90 Hz take about 0.5 s of board time
        let mut daq = SimulatedDaq::new(
            SimConfig::default()
                .with_resonator(10.0, 5.0)
                .with_realtime_scans(),
        );
        let mut controller = SweepController::new(SweepCtx {
            point_timeout_ms: 200,
            ..ctx()
        });
        let start = Instant::now();
        let report = controller.run(&mut daq, 10.0, 10.0, 1.0).unwrap();

        assert!(start.elapsed().as_secs_f64() > 0.5);
        report.check_complete().unwrap();
        assert_eq!(daq.live_buffers(), 0);
    }

    #[test]
    fn narrow_output_range_is_fatal() {
        let mut daq = SimulatedDaq::default();
        if let Some(ao) = daq.info_mut().ao.as_mut() {
            ao.supported_ranges = vec![AnalogRange::Bip5Volts];
        }
        let mut controller = SweepController::new(ctx());
        assert!(matches!(
            controller.run(&mut daq, 1000.0, 1200.0, 100.0),
            Err(SweepErr::InvalidConfig { .. })
        ));
        assert_eq!(daq.live_buffers(), 0);

        let mut controller = SweepController::new(SweepCtx {
            stimulus_amplitude_volts: 5.0,
            ..ctx()
        });
        let mut daq = SimulatedDaq::new(SimConfig::default().with_resonator(1100.0, 5.0));
        if let Some(ao) = daq.info_mut().ao.as_mut() {
            ao.supported_ranges = vec![AnalogRange::Bip5Volts];
        }
        controller
            .run(&mut daq, 1000.0, 1200.0, 100.0)
            .unwrap()
            .check_complete()
            .unwrap();
    }

    #[test]
    fn cancellation_ends_sweep() {
        let mut daq = SimulatedDaq::new(SimConfig::default().with_trigger_disconnected());
        let mut controller = SweepController::new(SweepCtx {
            point_timeout_ms: 60_000,
            ..ctx()
        });
        let cancel = controller.cancel_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(150));
            cancel.cancel();
        });

        let report = controller.run(&mut daq, 1000.0, 2000.0, 100.0).unwrap();
        canceller.join().unwrap();

        assert!(report.cancelled);
        assert_eq!(report.points.len(), 1);
        assert_eq!(report.points[0].failure(), Some(&PointFailure::Cancelled));
        assert!(report.check_complete().is_err());
        assert_eq!(daq.live_buffers(), 0);
    }

    #[test]
    fn missing_capability_is_fatal() {
        let mut daq = SimulatedDaq::default();
        daq.info_mut().ao = None;
        let mut controller = SweepController::new(ctx());
        assert!(matches!(
            controller.run(&mut daq, 1000.0, 1200.0, 100.0),
            Err(SweepErr::MissingCapability { .. })
        ));

        let mut daq = SimulatedDaq::default();
        daq.info_mut().dio.clear();
        assert!(matches!(
            controller.run(&mut daq, 1000.0, 1200.0, 100.0),
            Err(SweepErr::MissingCapability { .. })
        ));

        // No trigger port is needed without a trigger
        let mut controller = SweepController::new(SweepCtx {
            sync: SyncMode::Untriggered,
            ..ctx()
        });
        controller.run(&mut daq, 1000.0, 1000.0, 1.0).unwrap();
    }

    #[test]
    fn invalid_range_is_fatal() {
        let mut daq = SimulatedDaq::default();
        let mut controller = SweepController::new(ctx());
        assert!(matches!(
            controller.run(&mut daq, 1200.0, 1000.0, 100.0),
            Err(SweepErr::InvalidRange { .. })
        ));
        assert_eq!(daq.live_buffers(), 0);
    }

    /// Reporter that fails on its second point
    #[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
    struct FailingReporter {
        #[serde(skip)]
        seen: usize,
    }

    #[typetag::serde]
    impl Reporter for FailingReporter {
        fn init(&mut self, _ctx: &SweepCtx, _frequencies: &[f64]) -> Result<(), String> {
            Ok(())
        }

        fn consume(&mut self, _point: &SweepPoint) -> Result<(), String> {
            self.seen += 1;
            if self.seen == 2 {
                return Err("disk full".to_owned());
            }
            Ok(())
        }

        fn finish(&mut self, _report: &SweepReport) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn reporter_failure_still_frees_buffers() {
        let mut daq = SimulatedDaq::default();
        let mut controller = SweepController::new(ctx());
        controller.add_reporter(Box::new(FailingReporter::default()));
        assert!(matches!(
            controller.run(&mut daq, 1000.0, 1200.0, 100.0),
            Err(SweepErr::Report { .. })
        ));
        assert_eq!(daq.live_buffers(), 0);
    }
}
