//! Software board with a resonator wired between its analog output and analog input.
//!
//! Background scans follow a small state machine driven by status queries rather
//! than wall-clock time: a scan started with external triggering sits armed until
//! the trigger line satisfies the trigger condition, then reports running for
//! a configured number of status queries before going idle. In real-time mode a
//! released scan also stays running for its own duration, `count / rate`. When an input scan
//! goes idle, its buffer is filled with the resonator's response to whatever
//! stimulus the output scan was last started with.

use core::f64::consts::PI;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use qsweep_shared::{
    AnalogInfo, AnalogRange, BufferHandle, DaqErr, DeviceInfo, DigitalDirection, ErrorCode,
    FunctionType, PortInfo, PortType, RawCode, ScanOptions, ScanRequest, ScanStatus, TriggerType,
};

use super::Daq;

/// Driven second-order bandpass
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Resonator {
    pub center_hz: f64,
    pub q: f64,

    /// Gain at the center frequency
    pub peak_gain: f64,
}

impl Default for Resonator {
    fn default() -> Self {
        Self {
            center_hz: 25_000.0,
            q: 20.0,
            peak_gain: 0.8,
        }
    }
}

impl Resonator {
    /// Gain and phase lead in radians at `freq_hz`
    pub fn response(&self, freq_hz: f64) -> (f64, f64) {
        if !(self.center_hz > 0.0 && self.q > 0.0 && freq_hz.is_finite()) {
            return (0.0, 0.0);
        }
        let r = freq_hz / self.center_hz;
        let damping = r / self.q;
        let detune = 1.0 - r * r;
        let gain = self.peak_gain * damping / detune.hypot(damping);
        let phase = PI / 2.0 - damping.atan2(detune);
        (gain, phase)
    }
}

/// Behavior of the simulated board
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub board_num: u32,
    pub resonator: Resonator,

    /// Standard deviation of noise added at the analog input
    pub noise_volts: f64,

    /// DC level at the analog input
    pub offset_volts: f64,
    pub seed: u64,

    /// Status queries for which a released scan reports running before it goes idle
    pub polls_to_complete: u32,

    /// Keep released scans running until their samples would have been clocked out
    pub realtime: bool,

    /// Scan clock that requested rates are divided down from
    pub clock_hz: f64,
    pub max_rate_hz: f64,

    /// Digital line wired to the external trigger input
    pub trigger_port: PortType,
    pub trigger_bit: u8,

    /// Analog output channel wired to the external trigger input
    pub trigger_channel: u8,
    pub trigger_connected: bool,

    /// Stimulus frequencies at which starting the output scan fails
    pub fail_at_hz: Vec<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            board_num: 0,
            resonator: Resonator::default(),
            noise_volts: 0.005,
            offset_volts: 0.0,
            seed: 0,
            polls_to_complete: 1,
            realtime: false,
            clock_hz: 64e6,
            max_rate_hz: 500e3,
            trigger_port: PortType::FirstPortA,
            trigger_bit: 0,
            trigger_channel: 1,
            trigger_connected: true,
            fail_at_hz: Vec::new(),
        }
    }
}

impl SimConfig {
    pub fn with_resonator(mut self, center_hz: f64, q: f64) -> Self {
        self.resonator.center_hz = center_hz;
        self.resonator.q = q;
        self
    }

    pub fn with_noise(mut self, noise_volts: f64, seed: u64) -> Self {
        self.noise_volts = noise_volts;
        self.seed = seed;
        self
    }

    pub fn with_polls_to_complete(mut self, polls: u32) -> Self {
        self.polls_to_complete = polls;
        self
    }

    /// Hold each released scan running for `count / rate` of wall-clock time
    pub fn with_realtime_scans(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Leave the trigger input floating so that armed scans never start
    pub fn with_trigger_disconnected(mut self) -> Self {
        self.trigger_connected = false;
        self
    }

    /// Fail to start the output scan whenever the stimulus is at `freq_hz`
    pub fn with_failure_at(mut self, freq_hz: f64) -> Self {
        self.fail_at_hz.push(freq_hz);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Low,
    Between,
    High,
}

impl Level {
    fn digital(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }

    fn analog(code: RawCode, low: RawCode, high: RawCode) -> Self {
        if code >= high {
            Self::High
        } else if code <= low {
            Self::Low
        } else {
            Self::Between
        }
    }
}

/// Whether moving the trigger line from `was` to `now` releases armed scans
fn fires(trigger: TriggerType, was: Level, now: Level) -> bool {
    match trigger {
        TriggerType::TrigHigh | TriggerType::TrigAbove => now == Level::High,
        TriggerType::TrigLow | TriggerType::TrigBelow => now == Level::Low,
        TriggerType::TrigPosEdge => now == Level::High && was != Level::High,
        TriggerType::TrigNegEdge => now == Level::Low && was != Level::Low,
        TriggerType::Unknown(_) => false,
    }
}

#[derive(Debug)]
enum ScanMode {
    Armed,
    Running {
        polls_left: u32,
        until: Option<Instant>,
    },
}

#[derive(Debug)]
struct Scan {
    request: ScanRequest,
    mode: ScanMode,
}

/// Tone last loaded on the analog output
#[derive(Debug, Clone, Copy)]
struct Stimulus {
    freq_hz: f64,
    amplitude_volts: f64,
}

#[derive(Debug)]
struct PortState {
    info: PortInfo,
    direction: DigitalDirection,
    value: u16,
}

#[derive(Debug)]
pub struct SimulatedDaq {
    config: SimConfig,
    info: DeviceInfo,
    rng: StdRng,
    buffers: BTreeMap<BufferHandle, Vec<RawCode>>,
    next_handle: u32,
    trigger: (TriggerType, RawCode, RawCode),
    scans: BTreeMap<FunctionType, Scan>,
    stimulus: Option<Stimulus>,
    ports: BTreeMap<PortType, PortState>,
    analog_out: BTreeMap<u8, RawCode>,
}

impl Default for SimulatedDaq {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimulatedDaq {
    pub fn new(config: SimConfig) -> Self {
        let info = DeviceInfo {
            board_num: config.board_num,
            product_name: "Simulated resonator board".to_owned(),
            unique_id: format!("SIM{:04}", config.board_num),
            ai: Some(AnalogInfo {
                num_chans: 8,
                resolution_bits: 16,
                supported_ranges: vec![
                    AnalogRange::Bip10Volts,
                    AnalogRange::Bip5Volts,
                    AnalogRange::Bip2Pt5Volts,
                    AnalogRange::Bip1Volts,
                ],
                supports_scan: true,
            }),
            ao: Some(AnalogInfo {
                num_chans: 2,
                resolution_bits: 16,
                supported_ranges: vec![AnalogRange::Bip10Volts],
                supports_scan: true,
            }),
            dio: vec![
                PortInfo {
                    port: PortType::FirstPortA,
                    num_bits: 8,
                    supports_output: true,
                    is_configurable: true,
                },
                PortInfo {
                    port: PortType::FirstPortB,
                    num_bits: 8,
                    supports_output: true,
                    is_configurable: true,
                },
            ],
        };

        let ports = info
            .dio
            .iter()
            .map(|p| {
                let state = PortState {
                    info: p.clone(),
                    direction: DigitalDirection::In,
                    value: 0,
                };
                (p.port, state)
            })
            .collect();

        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            info,
            buffers: BTreeMap::new(),
            next_handle: 1,
            trigger: (TriggerType::TrigHigh, 0, RawCode::MAX),
            scans: BTreeMap::new(),
            stimulus: None,
            ports,
            analog_out: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of buffers allocated and not yet freed
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Whether a background scan is armed or running for a function
    pub fn is_active(&self, function: FunctionType) -> bool {
        self.scans.contains_key(&function)
    }

    #[cfg(test)]
    pub(crate) fn info_mut(&mut self) -> &mut DeviceInfo {
        &mut self.info
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&Vec<RawCode>, DaqErr> {
        self.buffers
            .get(&handle)
            .ok_or_else(|| DaqErr::new(ErrorCode::BadBuffer, format!("No buffer {handle:?}")))
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut Vec<RawCode>, DaqErr> {
        self.buffers
            .get_mut(&handle)
            .ok_or_else(|| DaqErr::new(ErrorCode::BadBuffer, format!("No buffer {handle:?}")))
    }

    fn subsystem(&self, function: FunctionType) -> Option<&AnalogInfo> {
        match function {
            FunctionType::AnalogInput => self.info.ai.as_ref(),
            FunctionType::AnalogOutput => self.info.ao.as_ref(),
        }
    }

    /// Reject a scan request the way the driver would
    fn check_scan(&self, function: FunctionType, req: &ScanRequest) -> Result<(), DaqErr> {
        let sub = self
            .subsystem(function)
            .filter(|s| s.supports_scan)
            .ok_or_else(|| {
                DaqErr::new(
                    ErrorCode::Unsupported,
                    format!("{function:?} scans are not supported"),
                )
            })?;
        if req.low_chan > req.high_chan || req.high_chan >= sub.num_chans {
            return Err(DaqErr::new(
                ErrorCode::Unsupported,
                format!(
                    "Channels {}..={} out of {} available",
                    req.low_chan, req.high_chan, sub.num_chans
                ),
            ));
        }
        if !sub.supported_ranges.contains(&req.range) {
            return Err(DaqErr::new(
                ErrorCode::BadRange,
                format!("{:?} not supported for {function:?}", req.range),
            ));
        }
        if !(req.rate_hz.is_finite() && req.rate_hz > 0.0 && req.rate_hz <= self.config.max_rate_hz)
        {
            return Err(DaqErr::new(
                ErrorCode::BadRate,
                format!(
                    "Rate {} Hz outside (0, {}] Hz",
                    req.rate_hz, self.config.max_rate_hz
                ),
            ));
        }
        let len = self.buffer(req.buffer)?.len();
        if req.count == 0 || req.count > len {
            return Err(DaqErr::new(
                ErrorCode::BadCount,
                format!("Count {} does not fit buffer of {len}", req.count),
            ));
        }
        if self.scans.contains_key(&function) {
            return Err(DaqErr::new(
                ErrorCode::AlreadyActive,
                format!("{function:?} scan already active"),
            ));
        }
        Ok(())
    }

    /// Nearest rate the scan clock can divide down to
    fn realize_rate(&self, rate_hz: f64) -> f64 {
        let divisor = (self.config.clock_hz / rate_hz).round().max(1.0);
        self.config.clock_hz / divisor
    }

    fn start_scan(&mut self, function: FunctionType, req: &ScanRequest) -> f64 {
        let rate_hz = self.realize_rate(req.rate_hz);
        let request = ScanRequest {
            rate_hz,
            ..req.clone()
        };
        let mode = if req.options.contains(ScanOptions::EXTTRIGGER) {
            ScanMode::Armed
        } else {
            self.release(&request)
        };
        debug!("Simulated {function:?} scan started at {rate_hz} Hz ({mode:?})");
        self.scans.insert(function, Scan { request, mode });
        rate_hz
    }

    /// Release every armed scan if the trigger line change satisfies the trigger condition
    fn drive_trigger(&mut self, was: Level, now: Level) {
        if !self.config.trigger_connected || !fires(self.trigger.0, was, now) {
            return;
        }
        let armed: Vec<FunctionType> = self
            .scans
            .iter()
            .filter(|(_, scan)| matches!(scan.mode, ScanMode::Armed))
            .map(|(&function, _)| function)
            .collect();
        for function in armed {
            if let Some(mode) = self.scans.get(&function).map(|s| self.release(&s.request)) {
                if let Some(scan) = self.scans.get_mut(&function) {
                    scan.mode = mode;
                }
            }
        }
    }

    /// Running state of a scan released now
    fn release(&self, req: &ScanRequest) -> ScanMode {
        let until = self.config.realtime.then(|| {
            let secs = req.count as f64 / req.rate_hz;
            Instant::now() + Duration::try_from_secs_f64(secs).unwrap_or_default()
        });
        ScanMode::Running {
            polls_left: self.config.polls_to_complete,
            until,
        }
    }

    fn trigger_line(&self) -> Level {
        let bit = self
            .ports
            .get(&self.config.trigger_port)
            .is_some_and(|p| p.value & (1 << self.config.trigger_bit) != 0);
        Level::digital(bit)
    }

    fn output_port(&mut self, port: PortType) -> Result<&mut PortState, DaqErr> {
        let state = self
            .ports
            .get_mut(&port)
            .ok_or_else(|| DaqErr::new(ErrorCode::BadPort, format!("No port {port:?}")))?;
        if state.direction != DigitalDirection::Out {
            return Err(DaqErr::new(
                ErrorCode::BadPort,
                format!("{port:?} is not configured for output"),
            ));
        }
        Ok(state)
    }

    /// Write the resonator's response into a finished input scan's buffer
    fn fill_input(&mut self, req: &ScanRequest) -> Result<(), DaqErr> {
        let bits = self
            .info
            .ai
            .as_ref()
            .map(|ai| ai.resolution_bits)
            .ok_or_else(|| DaqErr::new(ErrorCode::Unsupported, "No analog input"))?;

        let (gain, phase, amplitude, step) = match self.stimulus {
            Some(s) => {
                let (gain, phase) = self.config.resonator.response(s.freq_hz);
                let step = 2.0 * PI * s.freq_hz / req.rate_hz;
                (gain, phase, s.amplitude_volts, step)
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };
        let noise = Normal::new(0.0, self.config.noise_volts).map_err(|e| {
            DaqErr::new(ErrorCode::BadRange, format!("Invalid noise level: {e}"))
        })?;

        let mut samples = Vec::with_capacity(req.count);
        // Stale conversion from before the trigger
        samples.push(0);
        for k in 1..req.count {
            let theta = step * (k - 1) as f64 + phase;
            let volts = self.config.offset_volts
                + gain * amplitude * theta.sin()
                + noise.sample(&mut self.rng);
            samples.push(req.range.from_eng(volts, bits)?);
        }

        let buffer = self.buffer_mut(req.buffer)?;
        buffer[..samples.len()].copy_from_slice(&samples);
        Ok(())
    }
}

/// Shortest period in samples over which `codes` repeats
fn fundamental_period(codes: &[RawCode]) -> usize {
    (1..=codes.len() / 2)
        .find(|&p| codes.iter().zip(&codes[p..]).all(|(a, b)| a == b))
        .unwrap_or(codes.len().max(1))
}

impl Daq for SimulatedDaq {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn alloc_buffer(&mut self, len: usize) -> Result<BufferHandle, DaqErr> {
        if len == 0 {
            return Err(DaqErr::new(ErrorCode::BadCount, "Cannot allocate empty buffer"));
        }
        let handle = BufferHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.buffers.insert(handle, vec![0; len]);
        Ok(handle)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<(), DaqErr> {
        if self
            .scans
            .values()
            .any(|scan| scan.request.buffer == handle)
        {
            return Err(DaqErr::new(
                ErrorCode::AlreadyActive,
                format!("{handle:?} is in use by a scan"),
            ));
        }
        self.buffers
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| DaqErr::new(ErrorCode::BadBuffer, format!("No buffer {handle:?}")))
    }

    fn write_buffer(&mut self, handle: BufferHandle, data: &[RawCode]) -> Result<(), DaqErr> {
        let buffer = self.buffer_mut(handle)?;
        if data.len() > buffer.len() {
            return Err(DaqErr::new(
                ErrorCode::BadCount,
                format!("{} samples do not fit buffer of {}", data.len(), buffer.len()),
            ));
        }
        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, handle: BufferHandle, out: &mut [RawCode]) -> Result<(), DaqErr> {
        let buffer = self.buffer(handle)?;
        if out.len() > buffer.len() {
            return Err(DaqErr::new(
                ErrorCode::BadCount,
                format!("{} samples requested from buffer of {}", out.len(), buffer.len()),
            ));
        }
        out.copy_from_slice(&buffer[..out.len()]);
        Ok(())
    }

    fn set_trigger(
        &mut self,
        trigger: TriggerType,
        low_threshold: RawCode,
        high_threshold: RawCode,
    ) -> Result<(), DaqErr> {
        if let TriggerType::Unknown(code) = trigger {
            return Err(DaqErr::new(
                ErrorCode::BadTrigger,
                format!("Unknown trigger type {code}"),
            ));
        }
        if low_threshold > high_threshold {
            return Err(DaqErr::new(
                ErrorCode::BadTrigger,
                format!("Low threshold {low_threshold} above high threshold {high_threshold}"),
            ));
        }
        self.trigger = (trigger, low_threshold, high_threshold);
        Ok(())
    }

    fn start_output_scan(&mut self, req: &ScanRequest) -> Result<f64, DaqErr> {
        self.check_scan(FunctionType::AnalogOutput, req)?;
        let bits = self
            .info
            .ao
            .as_ref()
            .map(|ao| ao.resolution_bits)
            .unwrap_or_default();

        let codes = &self.buffer(req.buffer)?[..req.count];
        let period = fundamental_period(codes);
        let (min, max) = codes
            .iter()
            .fold((RawCode::MAX, RawCode::MIN), |(lo, hi), &c| (lo.min(c), hi.max(c)));
        let amplitude_volts =
            0.5 * (req.range.to_eng(max, bits)? - req.range.to_eng(min, bits)?);
        let freq_hz = self.realize_rate(req.rate_hz) / period as f64;

        if self
            .config
            .fail_at_hz
            .iter()
            .any(|f| ((f - freq_hz) / f).abs() < 1e-3)
        {
            return Err(DaqErr::new(
                ErrorCode::DeadDevice,
                format!("Simulated fault starting output at {freq_hz:.1} Hz"),
            ));
        }

        self.stimulus = Some(Stimulus {
            freq_hz,
            amplitude_volts,
        });
        Ok(self.start_scan(FunctionType::AnalogOutput, req))
    }

    fn start_input_scan(&mut self, req: &ScanRequest) -> Result<f64, DaqErr> {
        self.check_scan(FunctionType::AnalogInput, req)?;
        Ok(self.start_scan(FunctionType::AnalogInput, req))
    }

    fn poll_status(&mut self, function: FunctionType) -> Result<ScanStatus, DaqErr> {
        let finished = match self.scans.get_mut(&function) {
            None => return Ok(ScanStatus::Idle),
            Some(Scan {
                mode: ScanMode::Armed,
                ..
            }) => false,
            Some(Scan {
                mode: ScanMode::Running { polls_left, until },
                ..
            }) => {
                let clocked_out = until.is_none_or(|t| Instant::now() >= t);
                if *polls_left == 0 {
                    clocked_out
                } else {
                    *polls_left -= 1;
                    false
                }
            }
        };
        if !finished {
            return Ok(ScanStatus::Running);
        }

        if let Some(scan) = self.scans.remove(&function) {
            if function == FunctionType::AnalogInput {
                self.fill_input(&scan.request)?;
            }
        }
        Ok(ScanStatus::Idle)
    }

    fn stop_background(&mut self, function: FunctionType) -> Result<(), DaqErr> {
        if self.scans.remove(&function).is_some() {
            info!("Simulated {function:?} scan stopped");
        }
        Ok(())
    }

    fn config_port(&mut self, port: PortType, direction: DigitalDirection) -> Result<(), DaqErr> {
        let state = self
            .ports
            .get_mut(&port)
            .filter(|p| p.info.is_configurable)
            .ok_or_else(|| {
                DaqErr::new(ErrorCode::BadPort, format!("{port:?} is not configurable"))
            })?;
        state.direction = direction;
        Ok(())
    }

    fn write_port(&mut self, port: PortType, value: u16) -> Result<(), DaqErr> {
        let was = self.trigger_line();
        let state = self.output_port(port)?;
        let mask = 1_u16.checked_shl(state.info.num_bits.into()).map_or(u16::MAX, |m| m - 1);
        state.value = value & mask;
        let now = self.trigger_line();
        self.drive_trigger(was, now);
        Ok(())
    }

    fn write_bit(&mut self, port: PortType, bit: u8, high: bool) -> Result<(), DaqErr> {
        let was = self.trigger_line();
        let state = self.output_port(port)?;
        if bit >= state.info.num_bits {
            return Err(DaqErr::new(
                ErrorCode::BadBit,
                format!("{port:?} has no bit {bit}"),
            ));
        }
        if high {
            state.value |= 1 << bit;
        } else {
            state.value &= !(1 << bit);
        }
        let now = self.trigger_line();
        self.drive_trigger(was, now);
        Ok(())
    }

    fn read_port(&mut self, port: PortType) -> Result<u16, DaqErr> {
        self.ports
            .get(&port)
            .map(|p| p.value)
            .ok_or_else(|| DaqErr::new(ErrorCode::BadPort, format!("No port {port:?}")))
    }

    fn write_analog(
        &mut self,
        channel: u8,
        range: AnalogRange,
        value: RawCode,
    ) -> Result<(), DaqErr> {
        let ao = self
            .info
            .ao
            .as_ref()
            .ok_or_else(|| DaqErr::new(ErrorCode::Unsupported, "No analog output"))?;
        if channel >= ao.num_chans {
            return Err(DaqErr::new(
                ErrorCode::Unsupported,
                format!("No analog output channel {channel}"),
            ));
        }
        if !ao.supported_ranges.contains(&range) {
            return Err(DaqErr::new(
                ErrorCode::BadRange,
                format!("{range:?} not supported for analog output"),
            ));
        }
        range.to_eng(value, ao.resolution_bits)?;

        let previous = self.analog_out.insert(channel, value);
        if channel == self.config.trigger_channel {
            let (_, low, high) = self.trigger;
            let was = previous.map_or(Level::Low, |v| Level::analog(v, low, high));
            self.drive_trigger(was, Level::analog(value, low, high));
        }
        Ok(())
    }
}
