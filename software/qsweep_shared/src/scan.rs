//! Background scan requests, options, and status

use core::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::{enum_with_unknown, AnalogRange};

enum_with_unknown!(
    /// Status of a background scan as reported by the driver
    #[derive(Serialize, Deserialize, Default)]
    pub enum ScanStatus(i16) {
        #[default]
        Idle = 0,
        Running = 1,
    }
);

/// Which background function a status query or stop request refers to
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FunctionType {
    AnalogInput,
    AnalogOutput,
}

enum_with_unknown!(
    /// External trigger condition
    #[derive(Serialize, Deserialize, Default)]
    pub enum TriggerType(i32) {
        #[default]
        TrigHigh = 0,
        TrigLow = 1,
        TrigPosEdge = 2,
        TrigNegEdge = 3,
        TrigAbove = 4,
        TrigBelow = 5,
    }
);

/// Bit set of scan options
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions(pub u32);

impl ScanOptions {
    pub const NONE: Self = Self(0);

    /// Return immediately and run the scan in the background
    pub const BACKGROUND: Self = Self(0x0001);

    /// Hold the scan until the external trigger condition is met
    pub const EXTTRIGGER: Self = Self(0x0002);

    /// Repeat the buffer until stopped
    pub const CONTINUOUS: Self = Self(0x0004);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ScanOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Opaque handle to a driver-owned sample buffer
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferHandle(pub u32);

/// Everything the driver needs to start one background scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub low_chan: u8,
    pub high_chan: u8,

    /// Number of samples to move through the buffer
    pub count: usize,

    /// Requested samples per second per channel
    pub rate_hz: f64,
    pub range: AnalogRange,
    pub buffer: BufferHandle,
    pub options: ScanOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_combine() {
        let opts = ScanOptions::BACKGROUND | ScanOptions::EXTTRIGGER;
        assert!(opts.contains(ScanOptions::BACKGROUND));
        assert!(opts.contains(ScanOptions::EXTTRIGGER));
        assert!(!opts.contains(ScanOptions::CONTINUOUS));
        assert!(opts.contains(ScanOptions::NONE));
    }

    #[test]
    fn status_from_driver_code() {
        assert_eq!(ScanStatus::from(0), ScanStatus::Idle);
        assert_eq!(ScanStatus::from(1), ScanStatus::Running);
        assert_eq!(ScanStatus::from(-1), ScanStatus::Unknown(-1));
    }
}
