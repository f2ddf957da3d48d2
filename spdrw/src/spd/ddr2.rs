//! DDR2 SPD (128 bytes), including the NVIDIA EPP overclocking block.

use nom::bytes::complete::tag;
use nom::IResult;

use crate::bits::sub_byte;
use crate::jep106::ManufacturerId;
use crate::spd::{self, timing, ManufacturingDate, Picos};
use crate::{Result, SpdError};

/// Offset of the "NVm" EPP gate.
const EPP_MAGIC_OFFSET: usize = 99;
const EPP_MAGIC: &[u8] = b"NVm";

/// Decoded view of a DDR2 SPD image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ddr2Spd {
    bytes: Vec<u8>,
}

impl Ddr2Spd {
    pub const SIZE: usize = 128;

    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SpdError::BadLength);
        }
        Ok(Ddr2Spd {
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
        sub_byte(self.bytes[5], 2, 3) + 1
    }

    pub fn data_width(&self) -> u16 {
        self.bytes[6] as u16
    }

    pub fn device_banks(&self) -> u8 {
        self.bytes[17]
    }

    pub fn voltage(&self) -> Option<f32> {
        match self.bytes[8] {
            0x05 => Some(1.8),
            _ => None,
        }
    }

    pub fn tck_min(&self) -> Picos {
        timing::from_tenths(self.bytes[9])
    }

    /// Supported CAS latencies; bit n of byte 18 advertises CL n.
    pub fn cas_latencies(&self) -> Vec<u8> {
        (2..8).filter(|&n| self.bytes[18] >> n & 1 == 1).collect()
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

    pub fn twr(&self) -> Picos {
        timing::from_quarters(self.bytes[36])
    }

    pub fn twtr(&self) -> Picos {
        timing::from_quarters(self.bytes[37])
    }

    pub fn trtp(&self) -> Picos {
        timing::from_quarters(self.bytes[38])
    }

    pub fn tras(&self) -> Picos {
        Picos::from_ns(self.bytes[30] as i64)
    }

    pub fn trc(&self) -> Picos {
        timing::from_whole_and_fraction(self.bytes[41] as u16, self.bytes[40] >> 4)
    }

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

    /// Enhanced Performance Profiles, when the "NVm" gate is present.
    /// Full profiles carry the complete timing set, abbreviated ones only
    /// voltage, clock and CAS.
    pub fn epp(&self) -> Option<Vec<EppProfile>> {
        let gate: IResult<&[u8], &[u8]> =
            tag(EPP_MAGIC)(&self.bytes[EPP_MAGIC_OFFSET..EPP_MAGIC_OFFSET + 3]);
        gate.ok()?;

        let (count, stride, full) = match self.bytes[102] {
            0x01 => (2usize, 12usize, true),
            0x02 => (4, 6, false),
            _ => return None,
        };
        let enabled = self.bytes[103];
        let mut profiles = Vec::new();
        for n in 0..count {
            if enabled >> n & 1 == 0 {
                continue;
            }
            let at = 104 + n * stride;
            let block = &self.bytes[at..at + stride];
            profiles.push(EppProfile {
                index: n as u8,
                voltage_mv: block[0] as u32 * 20,
                tck: timing::from_tenths(block[1]),
                trcd: full.then(|| timing::from_quarters(block[2])),
                trp: full.then(|| timing::from_quarters(block[3])),
                tras: full.then(|| Picos::from_ns(block[4] as i64)),
                cas_support: if full { block[5] } else { block[2] },
            });
        }
        Some(profiles)
    }
}

/// One decoded EPP profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EppProfile {
    pub index: u8,
    pub voltage_mv: u32,
    pub tck: Picos,
    pub trcd: Option<Picos>,
    pub trp: Option<Picos>,
    pub tras: Option<Picos>,
    /// Bit n advertises CAS latency n, as in the base block.
    pub cas_support: u8,
}

impl EppProfile {
    pub fn frequency_mhz(&self) -> f64 {
        self.tck.frequency_mhz()
    }
}
