//! Capability records describing a DAQ board

use serde::{Deserialize, Serialize};

use crate::{enum_with_unknown, AnalogRange};

enum_with_unknown!(
    /// Digital I/O port identifiers
    #[derive(Serialize, Deserialize)]
    pub enum PortType(i32) {
        AuxPort = 1,
        FirstPortA = 10,
        FirstPortB = 11,
        FirstPortCL = 12,
        FirstPortCH = 13,
    }
);

/// Direction of a configurable digital port
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalDirection {
    In,
    Out,
}

/// Analog input or output subsystem
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalogInfo {
    pub num_chans: u8,
    pub resolution_bits: u8,

    /// Ranges the subsystem can be programmed for, in the driver's order of preference
    pub supported_ranges: Vec<AnalogRange>,
    pub supports_scan: bool,
}

/// One digital I/O port
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub port: PortType,
    pub num_bits: u8,
    pub supports_output: bool,
    pub is_configurable: bool,
}

/// Identity and capabilities of a board, as reported by the driver
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub board_num: u32,
    pub product_name: String,
    pub unique_id: String,
    pub ai: Option<AnalogInfo>,
    pub ao: Option<AnalogInfo>,
    pub dio: Vec<PortInfo>,
}

impl DeviceInfo {
    pub fn supports_analog_input(&self) -> bool {
        self.ai.as_ref().is_some_and(|ai| ai.num_chans > 0)
    }

    pub fn supports_analog_output(&self) -> bool {
        self.ao.as_ref().is_some_and(|ao| ao.num_chans > 0)
    }

    /// First digital port that can drive an output
    pub fn first_output_port(&self) -> Option<&PortInfo> {
        self.dio.iter().find(|p| p.supports_output)
    }

    /// Name and serial as shown to the operator
    pub fn description(&self) -> String {
        format!("{} ({})", self.product_name, self.unique_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            board_num: 0,
            product_name: "Test board".to_owned(),
            unique_id: "0001".to_owned(),
            ai: Some(AnalogInfo {
                num_chans: 8,
                resolution_bits: 16,
                supported_ranges: vec![AnalogRange::Bip10Volts],
                supports_scan: true,
            }),
            ao: None,
            dio: vec![
                PortInfo {
                    port: PortType::AuxPort,
                    num_bits: 4,
                    supports_output: false,
                    is_configurable: false,
                },
                PortInfo {
                    port: PortType::FirstPortA,
                    num_bits: 8,
                    supports_output: true,
                    is_configurable: true,
                },
            ],
        }
    }

    #[test]
    fn capability_queries() {
        let info = info();
        assert!(info.supports_analog_input());
        assert!(!info.supports_analog_output());
        assert_eq!(
            info.first_output_port().map(|p| p.port),
            Some(PortType::FirstPortA)
        );
        assert_eq!(info.description(), "Test board (0001)");
    }
}
