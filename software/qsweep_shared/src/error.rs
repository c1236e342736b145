//! Errors reported by a DAQ driver call

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::enum_with_unknown;

enum_with_unknown!(
    /// Failure class reported by the driver.
    /// Bindings map the vendor's numeric codes onto these.
    #[derive(Serialize, Deserialize, Default)]
    #[non_exhaustive]
    pub enum ErrorCode(i32) {
        #[default]
        NoErrors = 0,
        BadBoard = 1,
        DeadDevice = 2,
        BadBuffer = 3,
        BadRange = 4,
        BadRate = 5,
        BadCount = 6,
        AlreadyActive = 7,
        NotActive = 8,
        BadPort = 9,
        BadBit = 10,
        BadTrigger = 11,
        Unsupported = 12,
        Overrun = 13,
    }
);

/// A driver call failed
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DaqErr {
    pub code: ErrorCode,
    pub message: String,
}

impl DaqErr {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Numeric form of the error code, as the driver reported it
    pub fn code_number(&self) -> i32 {
        i32::from(self.code)
    }
}

impl fmt::Display for DaqErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DAQ driver error. Code: {} ({:?}) Message: {}",
            self.code_number(),
            self.code,
            self.message
        )
    }
}

impl std::error::Error for DaqErr {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_survive_conversion() {
        let code = ErrorCode::from(9001);
        assert_eq!(code, ErrorCode::Unknown(9001));
        assert_eq!(i32::from(code), 9001);
        assert_eq!(ErrorCode::from(5), ErrorCode::BadRate);
    }

    #[test]
    fn display_includes_code_and_message() {
        let e = DaqErr::new(ErrorCode::BadRate, "rate out of range");
        let msg = e.to_string();
        assert!(msg.contains("Code: 5"), "{msg}");
        assert!(msg.contains("rate out of range"), "{msg}");
    }
}
