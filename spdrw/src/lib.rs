//! Host-side SPD reader/writer.
//!
//! Three layers, leaves first: byte-level utilities ([`bits`], [`crc`],
//! [`jep106`]), the SPD decoder ([`spd`]) turning a raw EEPROM image into a
//! typed model with CRC validation and repair, and the device stack
//! ([`device`]) that moves images over a serial-attached programmer or a
//! platform SMBus driver.

use std::fmt;
use std::io;

pub mod bits;
pub mod crc;
pub mod device;
pub mod jep106;
pub mod spd;

/// The spdrw error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpdError {
    /// SPD image size does not match the detected RAM type.
    BadLength,
    /// One or more covered sections fail checksum validation.
    Crc,
    /// The transport did not deliver the expected response in time. The
    /// session's request/response alignment must be considered lost.
    Timeout,
    /// The transport is not open, or closed during an operation.
    Closed,
    /// The I2C device answered NACK: absent for probes, write protected for
    /// writes, unsupported for page and identification probes.
    Nack,
    /// The operation is not valid for the detected RAM type or the hardware
    /// at hand.
    Unsupported,
    /// A post-write read-back did not match the intended byte.
    VerifyFailed,
    /// The device rejected the argument frame.
    BadFrame,
    /// Any other transport-level I/O failure.
    Io(io::ErrorKind),
}

/// The result type for spdrw.
pub type Result<T> = std::result::Result<T, SpdError>;

#[rustfmt::skip]
impl fmt::Display for SpdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpdError::BadLength    => write!(f, "SPD image size does not match the RAM type"),
            SpdError::Crc          => write!(f, "checksum validation failed"),
            SpdError::Timeout      => write!(f, "device response timed out"),
            SpdError::Closed       => write!(f, "transport is not open"),
            SpdError::Nack         => write!(f, "device did not acknowledge"),
            SpdError::Unsupported  => write!(f, "operation not supported by this device"),
            SpdError::VerifyFailed => write!(f, "write verification failed"),
            SpdError::BadFrame     => write!(f, "malformed request frame"),
            SpdError::Io(kind)     => write!(f, "transport I/O error: {:?}", kind),
        }
    }
}

impl std::error::Error for SpdError {}

impl From<io::Error> for SpdError {
    fn from(err: io::Error) -> SpdError {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SpdError::Timeout,
            io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => SpdError::Closed,
            kind => SpdError::Io(kind),
        }
    }
}
