//! DDR3 SPD (256 bytes), including XMP 1.x profiles.
//!
//! DDR3 introduces the medium/fine timebase pair: timings are stored as MTB
//! multiples (bytes 10/11 hold the MTB as a nanosecond fraction, typically
//! 1/8 ns) corrected by signed FTB offsets (byte 9 holds the FTB as a
//! picosecond fraction).

use bitflags::bitflags;
use nom::bytes::complete::tag;
use nom::IResult;

use crate::bits::{get_bit, sub_byte};
use crate::jep106::ManufacturerId;
use crate::spd::{self, ManufacturingDate, Picos, Timebase, Timing};
use crate::{Result, SpdError};

/// XMP header magic, shared with DDR4.
pub(crate) const XMP_MAGIC: &[u8] = &[0x0C, 0x4A];
const XMP_OFFSET: usize = 176;
const XMP_PROFILE_OFFSETS: [usize; 2] = [185, 220];
const XMP_PROFILE_LEN: usize = 35;

bitflags! {
    /// Module nominal voltage support, byte 6.
    pub struct VoltageSupport: u8 {
        const V1_50 = 0b001;
        const V1_35 = 0b010;
        const V1_25 = 0b100;
    }
}

/// Decoded view of a DDR3 SPD image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ddr3Spd {
    bytes: Vec<u8>,
}

impl Ddr3Spd {
    pub const SIZE: usize = 256;

    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SpdError::BadLength);
        }
        Ok(Ddr3Spd {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_used(&self) -> usize {
        match sub_byte(self.bytes[0], 3, 4) {
            1 => 128,
            2 => 176,
            3 => 256,
            _ => 0,
        }
    }

    pub fn bytes_total(&self) -> usize {
        match sub_byte(self.bytes[0], 6, 3) {
            1 => 256,
            _ => 0,
        }
    }

    /// When set, the checksum covers bytes 0..=116 only.
    pub fn crc_excludes_vendor_block(&self) -> bool {
        get_bit(self.bytes[0], 7)
    }

    pub fn module_type(&self) -> u8 {
        sub_byte(self.bytes[3], 3, 4)
    }

    /// Die density in megabits, byte 4 bits [3:0].
    pub fn density_mbits(&self) -> u32 {
        1u32 << (sub_byte(self.bytes[4], 3, 4) + 8)
    }

    pub fn device_banks(&self) -> u8 {
        // Codes past 8 banks are reserved; saturate instead of overflowing.
        (1u16 << (sub_byte(self.bytes[4], 6, 3) + 3)).min(128) as u8
    }

    pub fn row_address_bits(&self) -> u8 {
        sub_byte(self.bytes[5], 5, 3) + 12
    }

    pub fn column_address_bits(&self) -> u8 {
        sub_byte(self.bytes[5], 2, 3) + 9
    }

    pub fn voltage_support(&self) -> VoltageSupport {
        VoltageSupport::from_bits_truncate(self.bytes[6])
    }

    pub fn ranks(&self) -> u8 {
        sub_byte(self.bytes[7], 5, 3) + 1
    }

    /// SDRAM device width in bits.
    pub fn device_width(&self) -> u8 {
        (4u16 << sub_byte(self.bytes[7], 2, 3)).min(64) as u8
    }

    /// Primary bus width in bits.
    pub fn primary_bus_width(&self) -> u8 {
        (8u16 << sub_byte(self.bytes[8], 2, 3)).min(64) as u8
    }

    pub fn bus_width_extension(&self) -> u8 {
        match sub_byte(self.bytes[8], 4, 2) {
            1 => 8,
            _ => 0,
        }
    }

    /// Medium timebase from bytes 10/11, a nanosecond fraction.
    pub fn mtb(&self) -> Timebase {
        Timebase::from_ns_fraction(self.bytes[10], self.bytes[11])
    }

    /// Fine timebase from byte 9 nibbles, a picosecond fraction.
    pub fn ftb(&self) -> Timebase {
        Timebase::from_ps_fraction(self.bytes[9] >> 4, self.bytes[9] & 0x0F)
    }

    fn t(&self, medium: u16, fine_at: Option<usize>) -> Picos {
        let fine = fine_at.map(|at| self.bytes[at] as i8).unwrap_or(0);
        Timing::new(medium, fine).resolve(self.mtb(), self.ftb())
    }

    pub fn tck_min(&self) -> Picos {
        self.t(self.bytes[12] as u16, Some(34))
    }

    /// Supported CAS latencies; bit 0 of the byte 14/15 mask advertises CL4.
    pub fn cas_latencies(&self) -> Vec<u8> {
        let mask = self.bytes[14] as u16 | (self.bytes[15] as u16) << 8;
        (0..15).filter(|&n| mask >> n & 1 == 1).map(|n| n + 4).collect()
    }

    pub fn taa_min(&self) -> Picos {
        self.t(self.bytes[16] as u16, Some(35))
    }

    pub fn twr_min(&self) -> Picos {
        self.t(self.bytes[17] as u16, None)
    }

    pub fn trcd_min(&self) -> Picos {
        self.t(self.bytes[18] as u16, Some(36))
    }

    pub fn trrd_min(&self) -> Picos {
        self.t(self.bytes[19] as u16, None)
    }

    pub fn trp_min(&self) -> Picos {
        self.t(self.bytes[20] as u16, Some(37))
    }

    pub fn tras_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[21], 3, 4) as u16) << 8 | self.bytes[22] as u16;
        self.t(medium, None)
    }

    pub fn trc_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[21], 7, 4) as u16) << 8 | self.bytes[23] as u16;
        self.t(medium, Some(38))
    }

    pub fn trfc_min(&self) -> Picos {
        let medium = self.bytes[24] as u16 | (self.bytes[25] as u16) << 8;
        self.t(medium, None)
    }

    pub fn twtr_min(&self) -> Picos {
        self.t(self.bytes[26] as u16, None)
    }

    pub fn trtp_min(&self) -> Picos {
        self.t(self.bytes[27] as u16, None)
    }

    pub fn tfaw_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[28], 3, 4) as u16) << 8 | self.bytes[29] as u16;
        self.t(medium, None)
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.tck_min().frequency_mhz()
    }

    pub fn capacity_bytes(&self) -> u64 {
        let per_die_bytes = self.density_mbits() as u64 * 1024 * 1024 / 8;
        per_die_bytes * (self.primary_bus_width() / self.device_width()) as u64
            * self.ranks() as u64
    }

    pub fn manufacturer_id(&self) -> ManufacturerId {
        ManufacturerId::from_code_pair(self.bytes[117], self.bytes[118])
    }

    pub fn part_number(&self) -> String {
        spd::read_ascii(&self.bytes[128..146])
    }

    pub fn manufacturing_date(&self) -> Option<ManufacturingDate> {
        ManufacturingDate::from_bcd(self.bytes[120], self.bytes[121])
    }

    pub fn serial_number(&self) -> [u8; 4] {
        [self.bytes[122], self.bytes[123], self.bytes[124], self.bytes[125]]
    }

    fn crc_covered(&self) -> usize {
        if self.crc_excludes_vendor_block() {
            117
        } else {
            126
        }
    }

    pub fn crc_status(&self) -> bool {
        spd::crc16_section_ok(&self.bytes, 0, self.crc_covered(), 126)
    }

    pub fn fix_crc(&mut self) {
        let covered = self.crc_covered();
        spd::crc16_section_fix(&mut self.bytes, 0, covered, 126);
    }

    /// XMP 1.x profiles, gated on the 0x0C 0x4A magic at byte 176 and the
    /// per-profile enable bits. Each profile may override the medium
    /// timebase; the fine timebase is inherited from the base block.
    pub fn xmp(&self) -> Option<Vec<Xmp1Profile<'_>>> {
        let gate: IResult<&[u8], &[u8]> = tag(XMP_MAGIC)(&self.bytes[XMP_OFFSET..XMP_OFFSET + 2]);
        gate.ok()?;

        let enabled = self.bytes[178];
        let mut profiles = Vec::new();
        for (n, &at) in XMP_PROFILE_OFFSETS.iter().enumerate() {
            if enabled >> n & 1 == 0 {
                continue;
            }
            let mtb_at = 180 + n * 2;
            let mtb = Timebase::from_ns_fraction(self.bytes[mtb_at], self.bytes[mtb_at + 1]);
            profiles.push(Xmp1Profile {
                index: n as u8,
                block: &self.bytes[at..at + XMP_PROFILE_LEN],
                mtb,
                ftb: self.ftb(),
            });
        }
        Some(profiles)
    }

    pub fn xmp_version(&self) -> Option<u8> {
        let gate: IResult<&[u8], &[u8]> = tag(XMP_MAGIC)(&self.bytes[XMP_OFFSET..XMP_OFFSET + 2]);
        gate.ok()?;
        Some(self.bytes[179])
    }
}

/// Borrowed view of one XMP 1.x profile block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xmp1Profile<'a> {
    pub index: u8,
    block: &'a [u8],
    mtb: Timebase,
    ftb: Timebase,
}

impl Xmp1Profile<'_> {
    fn t(&self, medium: u16) -> Picos {
        Timing::new(medium, 0).resolve(self.mtb, self.ftb)
    }

    /// Module voltage in millivolts (20 mV units in the image).
    pub fn voltage_mv(&self) -> u32 {
        self.block[0] as u32 * 20
    }

    pub fn tck(&self) -> Picos {
        self.t(self.block[1] as u16)
    }

    pub fn taa(&self) -> Picos {
        self.t(self.block[2] as u16)
    }

    pub fn cas_support(&self) -> u16 {
        self.block[3] as u16 | (self.block[4] as u16) << 8
    }

    pub fn tcwl(&self) -> Picos {
        self.t(self.block[5] as u16)
    }

    pub fn trp(&self) -> Picos {
        self.t(self.block[6] as u16)
    }

    pub fn trcd(&self) -> Picos {
        self.t(self.block[7] as u16)
    }

    pub fn twr(&self) -> Picos {
        self.t(self.block[8] as u16)
    }

    pub fn tras(&self) -> Picos {
        self.t((sub_byte(self.block[9], 3, 4) as u16) << 8 | self.block[10] as u16)
    }

    pub fn trc(&self) -> Picos {
        self.t((sub_byte(self.block[9], 7, 4) as u16) << 8 | self.block[11] as u16)
    }

    pub fn trfc(&self) -> Picos {
        self.t(self.block[12] as u16 | (self.block[13] as u16) << 8)
    }

    pub fn trtp(&self) -> Picos {
        self.t(self.block[14] as u16)
    }

    pub fn trrd(&self) -> Picos {
        self.t(self.block[15] as u16)
    }

    pub fn tfaw(&self) -> Picos {
        self.t((sub_byte(self.block[16], 3, 4) as u16) << 8 | self.block[17] as u16)
    }

    pub fn twtr(&self) -> Picos {
        self.t(self.block[18] as u16)
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.tck().frequency_mhz()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;
    use crate::spd::{RamType, Spd, TYPE_OFFSET};

    fn stamp_crc(b: &mut [u8]) {
        let covered = if b[0] & 0x80 != 0 { 117 } else { 126 };
        let crc = crc16(&b[..covered]);
        b[126] = (crc & 0xFF) as u8;
        b[127] = (crc >> 8) as u8;
    }

    fn image() -> Vec<u8> {
        let mut b = vec![0u8; Ddr3Spd::SIZE];
        b[0] = 0x92; // crc covers 0..=116, 176 bytes used, 256 total
        b[1] = 0x13;
        b[TYPE_OFFSET] = RamType::Ddr3.code();
        b[3] = 0x02; // UDIMM
        b[4] = 0b0000_0011; // 8 banks, 2 Gb
        b[5] = 0b0001_1001; // 15 rows, 10 cols
        b[6] = 0b011; // 1.5 V and 1.35 V
        b[7] = 0b0000_1001; // 2 ranks, x8
        b[8] = 0b0000_0011; // 64 bit primary
        b[9] = 0x11; // FTB 1 ps
        b[10] = 1; // MTB 1/8 ns
        b[11] = 8;
        b[12] = 12; // tCK 1.5 ns -> DDR3-1333
        b[14] = 0b0111_1000; // CL 7..10
        b[16] = 108; // tAA 13.5 ns
        b[17] = 120;
        b[18] = 108;
        b[20] = 108;
        b[21] = 0x12;
        b[22] = 0x20; // tRAS 0x220 * 125 ps = 68 ns
        b[23] = 0x2C;
        b[24] = 0x40;
        b[25] = 0x01; // tRFC 0x140 * 125 = 40 ns
        b[28] = 0x01;
        b[29] = 0x20;
        b[117] = 0x80;
        b[118] = 0xAD; // SK Hynix
        b[120] = 0x14;
        b[121] = 0x30;
        b[122..126].copy_from_slice(&[9, 8, 7, 6]);
        b[128..132].copy_from_slice(b"D3T1");
        stamp_crc(&mut b);
        b
    }

    fn with_xmp(mut b: Vec<u8>) -> Vec<u8> {
        b[176] = 0x0C;
        b[177] = 0x4A;
        b[178] = 0b01; // profile 1 enabled
        b[179] = 0x12;
        b[180] = 1; // profile MTB 1/12 ns
        b[181] = 12;
        let p = 185;
        b[p] = 80; // 1.6 V
        b[p + 1] = 12; // tCK = 1 ns -> DDR3-2000
        b[p + 2] = 108;
        b[p + 3] = 0b0100_0000; // CL 10
        b[p + 6] = 108;
        b[p + 7] = 108;
        stamp_crc(&mut b);
        b
    }

    #[test]
    fn geometry_and_capacity() {
        let spd = Ddr3Spd::new(&image()).unwrap();
        assert_eq!(spd.density_mbits(), 2048);
        assert_eq!(spd.device_banks(), 8);
        assert_eq!(spd.row_address_bits(), 15);
        assert_eq!(spd.column_address_bits(), 10);
        assert_eq!(spd.ranks(), 2);
        assert_eq!(spd.device_width(), 8);
        assert_eq!(spd.primary_bus_width(), 64);
        // 2 Gb dies, 8 per rank, 2 ranks = 4 GiB.
        assert_eq!(spd.capacity_bytes(), 4 * 1024 * 1024 * 1024);
        assert!(spd
            .voltage_support()
            .contains(VoltageSupport::V1_50 | VoltageSupport::V1_35));
    }

    #[test]
    fn timebase_timings_resolve() {
        let spd = Ddr3Spd::new(&image()).unwrap();
        assert_eq!(spd.tck_min(), Picos(1500));
        assert!((spd.frequency_mhz() - 666.67).abs() < 0.01);
        assert_eq!(spd.taa_min(), Picos(13_500));
        assert_eq!(spd.cas_latencies(), vec![7, 8, 9, 10]);
        assert_eq!(spd.tras_min(), Picos(68_000));
        assert_eq!(spd.trfc_min(), Picos(40_000));
        assert_eq!(spd.tfaw_min(), Picos(36_000));
    }

    #[test]
    fn crc_flip_fix_restores_and_touches_only_the_checksum() {
        let mut spd = Ddr3Spd::new(&image()).unwrap();
        assert!(spd.crc_status());
        spd.bytes[10] = 0xAA;
        assert!(!spd.crc_status());
        let before = spd.as_bytes().to_vec();
        spd.fix_crc();
        assert!(spd.crc_status());
        assert_eq!(&spd.as_bytes()[..126], &before[..126]);
        assert_ne!(&spd.as_bytes()[126..128], &before[126..128]);
    }

    #[test]
    fn fixing_a_valid_image_changes_nothing() {
        let mut spd = Ddr3Spd::new(&image()).unwrap();
        let before = spd.as_bytes().to_vec();
        spd.fix_crc();
        assert_eq!(spd.as_bytes(), &before[..]);
    }

    #[test]
    fn coverage_bit_selects_the_covered_prefix() {
        let mut b = image();
        b[0] &= 0x7F; // cover 0..=125
        stamp_crc(&mut b);
        let spd = Ddr3Spd::new(&b).unwrap();
        assert!(spd.crc_status());
        // A flip inside the vendor-excluded tail now breaks the checksum.
        let mut b2 = b.clone();
        b2[120] ^= 0xFF;
        assert!(!Ddr3Spd::new(&b2).unwrap().crc_status());
    }

    #[test]
    fn xmp_profile_overrides_the_medium_timebase() {
        let spd = Ddr3Spd::new(&with_xmp(image())).unwrap();
        assert_eq!(spd.xmp_version(), Some(0x12));
        let profiles = spd.xmp().unwrap();
        assert_eq!(profiles.len(), 1);
        let p = &profiles[0];
        assert_eq!(p.voltage_mv(), 1600);
        // 12 * (1/12 ns) = 1 ns.
        assert_eq!(p.tck(), Picos(1000));
        assert_eq!(p.cas_support(), 0b0100_0000);
    }

    #[test]
    fn xmp_without_magic_is_absent() {
        let spd = Ddr3Spd::new(&image()).unwrap();
        assert!(spd.xmp().is_none());
    }

    #[test]
    fn identity_fields() {
        let spd = Spd::decode(&image()).unwrap();
        assert_eq!(spd.manufacturer_id().name(), Some("SK Hynix"));
        assert_eq!(spd.part_number(), "D3T1");
        assert_eq!(spd.serial_number(), [9, 8, 7, 6]);
        let date = spd.manufacturing_date().unwrap();
        assert_eq!((date.year, date.week), (14, 30));
    }
}
