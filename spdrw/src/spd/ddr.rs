//! DDR (first generation) SPD (128 bytes).

use crate::jep106::ManufacturerId;
use crate::spd::{self, timing, ManufacturingDate, Picos};
use crate::{Result, SpdError};

/// Decoded view of a DDR SDRAM SPD image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdrSpd {
    bytes: Vec<u8>,
}

impl DdrSpd {
    pub const SIZE: usize = 128;

    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SpdError::BadLength);
        }
        Ok(DdrSpd {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn row_address_bits(&self) -> u8 {
        self.bytes[3]
    }

    pub fn column_address_bits(&self) -> u8 {
        self.bytes[4]
    }

    pub fn ranks(&self) -> u8 {
        self.bytes[5]
    }

    pub fn data_width(&self) -> u16 {
        self.bytes[6] as u16 | (self.bytes[7] as u16) << 8
    }

    pub fn device_banks(&self) -> u8 {
        self.bytes[17]
    }

    pub fn voltage(&self) -> Option<f32> {
        match self.bytes[8] {
            0x04 => Some(2.5),
            _ => None,
        }
    }

    pub fn tck_min(&self) -> Picos {
        timing::from_tenths(self.bytes[9])
    }

    /// Supported CAS latencies in half steps: bit n of byte 18 advertises
    /// CL 1 + n/2.
    pub fn cas_latencies(&self) -> Vec<f32> {
        (0..7)
            .filter(|&n| self.bytes[18] >> n & 1 == 1)
            .map(|n| 1.0 + n as f32 * 0.5)
            .collect()
    }

    pub fn trcd(&self) -> Picos {
        timing::from_quarters(self.bytes[29])
    }

    pub fn trp(&self) -> Picos {
        timing::from_quarters(self.bytes[27])
    }

    pub fn trrd(&self) -> Picos {
        timing::from_quarters(self.bytes[28])
    }

    pub fn tras(&self) -> Picos {
        Picos::from_ns(self.bytes[30] as i64)
    }

    /// tRC: whole nanoseconds in byte 41 plus the fraction index packed in
    /// the extension byte's high nibble.
    pub fn trc(&self) -> Picos {
        timing::from_whole_and_fraction(self.bytes[41] as u16, self.bytes[40] >> 4)
    }

    /// tRFC: byte 42 plus the extension byte's +256 ns carry (bit 0) and
    /// fraction index (bits [3:1]).
    pub fn trfc(&self) -> Picos {
        let carry = if self.bytes[40] & 1 == 1 { 256 } else { 0 };
        timing::from_whole_and_fraction(self.bytes[42] as u16 + carry, self.bytes[40] >> 1 & 0b111)
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.tck_min().frequency_mhz()
    }

    pub fn capacity_bytes(&self) -> u64 {
        let rows = self.row_address_bits() as u32;
        let cols = self.column_address_bits() as u32;
        let width = (self.bytes[6] & 0xF0) as u64;
        if rows == 0 || rows > 16 || cols == 0 || cols > 16 || width == 0 {
            return 0;
        }
        (1u64 << rows) * (1u64 << cols) * self.device_banks() as u64 * width
            * self.ranks() as u64
            / 8
    }

    pub fn manufacturer_id(&self) -> ManufacturerId {
        ManufacturerId::from_stream(&self.bytes[64..72])
    }

    pub fn part_number(&self) -> String {
        spd::read_ascii(&self.bytes[73..91])
    }

    pub fn manufacturing_date(&self) -> Option<ManufacturingDate> {
        ManufacturingDate::from_bcd(self.bytes[93], self.bytes[94])
    }

    pub fn serial_number(&self) -> [u8; 4] {
        [self.bytes[95], self.bytes[96], self.bytes[97], self.bytes[98]]
    }

    pub fn crc_status(&self) -> bool {
        spd::crc8_section_ok(&self.bytes, 63, 63)
    }

    pub fn fix_crc(&mut self) {
        spd::crc8_section_fix(&mut self.bytes, 63, 63);
    }
}
