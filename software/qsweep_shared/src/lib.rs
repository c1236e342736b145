//! Vocabulary shared between the sweep program and any DAQ driver binding.
//!
//! Nothing here performs I/O. Driver bindings translate these types to and from
//! the vendor's own codes, and the sweep program uses them to describe
//! what it asks the board to do.
#![allow(clippy::needless_range_loop)]

pub mod device;
pub mod error;
pub mod range;
pub mod scan;

pub use device::{AnalogInfo, DeviceInfo, DigitalDirection, PortInfo, PortType};
pub use error::{DaqErr, ErrorCode};
pub use range::AnalogRange;
pub use scan::{BufferHandle, FunctionType, ScanOptions, ScanRequest, ScanStatus, TriggerType};

/// Raw sample code as stored in a driver scan buffer
pub type RawCode = u16;

/// Derive To/From with an added "Unknown" variant catch-all for converting
/// from numerical values that do not match a valid variant in order to
/// avoid either panicking or cumbersome error handling.
///
/// Yoinked shamelessly (with some modification) from smoltcp.
#[macro_export]
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr
            ),+ $(,)?
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              $variant
            ),*,
            /// Catch-all for values that do not match a variant
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}
