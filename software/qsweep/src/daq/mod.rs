//! DAQ boards are the analog and digital I/O the sweep drives: one analog output
//! plays the stimulus, one analog input records the response, and a digital port
//! or second analog output fires the shared external trigger.
use core::fmt::Debug;

use qsweep_shared::{
    AnalogRange, BufferHandle, DaqErr, DeviceInfo, DigitalDirection, FunctionType, PortType,
    RawCode, ScanRequest, ScanStatus, TriggerType,
};

pub mod simulated;
pub use simulated::{Resonator, SimConfig, SimulatedDaq};

/// Object-safe driver surface from the perspective of the sweep.
///
/// Every call is a blocking request to the board that either succeeds
/// or reports the driver's error code and message.
pub trait Daq: Send + Debug {
    /// Identity and capabilities of the board
    fn info(&self) -> &DeviceInfo;

    /// Allocate a driver-owned buffer of `len` samples
    fn alloc_buffer(&mut self, len: usize) -> Result<BufferHandle, DaqErr>;

    /// Release a buffer. The handle is invalid afterward.
    fn free_buffer(&mut self, handle: BufferHandle) -> Result<(), DaqErr>;

    /// Copy samples into the start of a buffer
    fn write_buffer(&mut self, handle: BufferHandle, data: &[RawCode]) -> Result<(), DaqErr>;

    /// Copy samples out of the start of a buffer
    fn read_buffer(&mut self, handle: BufferHandle, out: &mut [RawCode]) -> Result<(), DaqErr>;

    /// Set the condition that releases scans started with external triggering.
    /// Thresholds are raw codes and only matter for analog trigger sources.
    fn set_trigger(
        &mut self,
        trigger: TriggerType,
        low_threshold: RawCode,
        high_threshold: RawCode,
    ) -> Result<(), DaqErr>;

    /// Start playing a buffer on the analog output, returning the rate the board settled on
    fn start_output_scan(&mut self, req: &ScanRequest) -> Result<f64, DaqErr>;

    /// Start recording the analog input into a buffer, returning the rate the board settled on
    fn start_input_scan(&mut self, req: &ScanRequest) -> Result<f64, DaqErr>;

    /// Status of the background scan for a function
    fn poll_status(&mut self, function: FunctionType) -> Result<ScanStatus, DaqErr>;

    /// Stop the background scan for a function. Stopping an idle function is not an error.
    fn stop_background(&mut self, function: FunctionType) -> Result<(), DaqErr>;

    fn config_port(&mut self, port: PortType, direction: DigitalDirection) -> Result<(), DaqErr>;

    fn write_port(&mut self, port: PortType, value: u16) -> Result<(), DaqErr>;

    fn write_bit(&mut self, port: PortType, bit: u8, high: bool) -> Result<(), DaqErr>;

    fn read_port(&mut self, port: PortType) -> Result<u16, DaqErr>;

    /// Set a single analog output channel to a raw code
    fn write_analog(
        &mut self,
        channel: u8,
        range: AnalogRange,
        value: RawCode,
    ) -> Result<(), DaqErr>;
}
