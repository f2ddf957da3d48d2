//! Device backends and the EEPROM I/O orchestrator.
//!
//! Two backends reach the module EEPROMs: the serial-attached programmer
//! ([`programmer::Programmer`]) and the host's own SMBus controller
//! ([`smbus::SmbusAdapter`]). Both present the same capability surface
//! through [`EepromLink`], which is all the orchestrator ([`eeprom`])
//! consumes.

use crate::{Result, SpdError};

pub mod eeprom;
pub mod programmer;
pub mod smbus;
pub mod transport;

pub use eeprom::{Progress, WriteFailure, WriteSummary};
pub use programmer::Programmer;
pub use smbus::{SmbusAdapter, SmbusDriver, SmbusPlatform};
pub use transport::{open_serial, StreamTransport, Transport};

/// The operations a byte-addressable SPD EEPROM backend must provide.
///
/// Offsets are flat within `[0, max_spd_size)`; DDR4 page switching and DDR5
/// register paging happen below this surface.
pub trait EepromLink {
    /// Fill `buf` from `offset`. Implementations may split the request
    /// internally but must either fill the whole buffer or fail.
    fn read(&mut self, addr: u8, offset: u16, buf: &mut [u8]) -> Result<()>;

    /// Write one byte. No read-back; verification is the orchestrator's
    /// business.
    fn write_byte(&mut self, addr: u8, offset: u16, value: u8) -> Result<()>;

    /// Whether a device acknowledges at `addr`.
    fn probe(&mut self, addr: u8) -> Result<bool>;

    /// Bus addresses with a device present.
    fn scan(&mut self) -> Result<Vec<u8>>;

    /// Largest read this backend moves in one transaction.
    fn max_transfer(&self) -> usize;

    /// Largest SPD image this backend can address.
    fn max_spd_size(&self) -> usize;

    /// Lift reversible write protection, where the hardware can.
    fn clear_protection(&mut self) -> Result<()> {
        Err(SpdError::Unsupported)
    }
}
