//! The host SMBus backend.
//!
//! The platform binding itself (i2c-dev ioctls, WinRing0, whatever the OS
//! offers) is an external collaborator; this module defines the seam it
//! plugs into and wraps it in the same [`EepromLink`] capability surface the
//! programmer presents. SMBus controllers typically stop at DDR3: there is
//! no page broadcast, no pin control and no high-voltage protection path,
//! so the advertised SPD size caps at 256 bytes unless the driver says
//! otherwise.

use log::debug;

use crate::device::EepromLink;
use crate::Result;

use spdrw_fw::protocol::EEPROM_BASE_ADDRESS;

/// One opened SMBus controller, as supplied by the platform binding.
pub trait SmbusDriver {
    /// Whether a device acknowledges at `addr`.
    fn probe(&mut self, addr: u8) -> Result<bool>;

    /// SMBus byte read at a flat offset.
    fn read_byte(&mut self, addr: u8, offset: u16) -> Result<u8>;

    /// SMBus byte write at a flat offset.
    fn write_byte(&mut self, addr: u8, offset: u16, value: u8) -> Result<()>;

    /// Largest SPD image this controller can address.
    fn max_spd_size(&self) -> usize {
        256
    }
}

/// Discovery of usable controllers on this platform.
pub trait SmbusPlatform {
    type Adapter: SmbusDriver;

    /// Indices of controllers worth offering to the user.
    fn enumerate(&mut self) -> Result<Vec<u8>>;

    fn open(&mut self, index: u8) -> Result<Self::Adapter>;
}

/// [`EepromLink`] over a platform SMBus controller.
pub struct SmbusAdapter<D: SmbusDriver> {
    driver: D,
    index: u8,
}

impl<D: SmbusDriver> SmbusAdapter<D> {
    pub fn new(driver: D, index: u8) -> Self {
        SmbusAdapter { driver, index }
    }

    pub fn index(&self) -> u8 {
        self.index
    }
}

impl<D: SmbusDriver> EepromLink for SmbusAdapter<D> {
    fn read(&mut self, addr: u8, offset: u16, buf: &mut [u8]) -> Result<()> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.driver.read_byte(addr, offset + i as u16)?;
        }
        Ok(())
    }

    fn write_byte(&mut self, addr: u8, offset: u16, value: u8) -> Result<()> {
        self.driver.write_byte(addr, offset, value)
    }

    fn probe(&mut self, addr: u8) -> Result<bool> {
        self.driver.probe(addr)
    }

    fn scan(&mut self) -> Result<Vec<u8>> {
        let mut found = Vec::new();
        for i in 0..8 {
            let addr = EEPROM_BASE_ADDRESS + i;
            if self.driver.probe(addr)? {
                found.push(addr);
            }
        }
        debug!("smbus {}: {} device(s)", self.index, found.len());
        Ok(found)
    }

    /// SMBus moves one byte per transaction.
    fn max_transfer(&self) -> usize {
        1
    }

    fn max_spd_size(&self) -> usize {
        self.driver.max_spd_size()
    }
}
