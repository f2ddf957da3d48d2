//! DDR4 SPD (512 bytes), including XMP 2.0 profiles.
//!
//! DDR4 fixes the medium timebase at 125 ps and the fine timebase at 1 ps,
//! and splits the image into two independently checksummed 128-byte
//! sections (base configuration and module specific).

use nom::bytes::complete::tag;
use nom::IResult;

use crate::bits::{get_bit, sub_byte};
use crate::jep106::ManufacturerId;
use crate::spd::ddr3::XMP_MAGIC;
use crate::spd::{self, ManufacturingDate, Picos, Timebase, Timing};
use crate::{Result, SpdError};

const XMP_OFFSET: usize = 384;
const XMP_PROFILE_OFFSETS: [usize; 2] = [393, 440];
const XMP_PROFILE_LEN: usize = 47;

/// How the SDRAM dies load the data bus, byte 6 bits [1:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLoading {
    NotSpecified,
    MultiLoadStack,
    SingleLoadStack,
    Reserved,
}

/// Decoded view of a DDR4 SPD image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ddr4Spd {
    bytes: Vec<u8>,
}

impl Ddr4Spd {
    pub const SIZE: usize = 512;

    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SpdError::BadLength);
        }
        Ok(Ddr4Spd {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes the manufacturer actually programmed, byte 0 bits [3:0] in
    /// 128-byte blocks.
    pub fn bytes_used(&self) -> usize {
        sub_byte(self.bytes[0], 3, 4) as usize * 128
    }

    /// Total EEPROM size, byte 0 bits [6:4] in 256-byte halves.
    pub fn bytes_total(&self) -> usize {
        sub_byte(self.bytes[0], 6, 3) as usize * 256
    }

    pub fn base_module_type(&self) -> u8 {
        sub_byte(self.bytes[3], 3, 4)
    }

    pub fn is_hybrid(&self) -> bool {
        get_bit(self.bytes[3], 7)
    }

    pub fn hybrid_media(&self) -> bool {
        get_bit(self.bytes[3], 4)
    }

    /// Die density in megabits. Codes 8 and 9 are the 12 and 24 Gb parts
    /// that fall outside the power-of-two ladder.
    pub fn density_mbits(&self) -> u32 {
        match sub_byte(self.bytes[4], 3, 4) {
            code @ 0..=7 => 2u32 << (code + 7),
            8 => 12 * 1024,
            9 => 24 * 1024,
            _ => 0,
        }
    }

    pub fn bank_groups(&self) -> u8 {
        2 * sub_byte(self.bytes[4], 7, 2)
    }

    pub fn banks_per_group(&self) -> u8 {
        1 << (sub_byte(self.bytes[4], 5, 2) + 2)
    }

    pub fn row_address_bits(&self) -> u8 {
        sub_byte(self.bytes[5], 5, 3) + 12
    }

    pub fn column_address_bits(&self) -> u8 {
        sub_byte(self.bytes[5], 2, 3) + 9
    }

    pub fn die_count(&self) -> u8 {
        sub_byte(self.bytes[6], 6, 3) + 1
    }

    pub fn signal_loading(&self) -> SignalLoading {
        match sub_byte(self.bytes[6], 1, 2) {
            0 => SignalLoading::NotSpecified,
            1 => SignalLoading::MultiLoadStack,
            2 => SignalLoading::SingleLoadStack,
            _ => SignalLoading::Reserved,
        }
    }

    pub fn voltage(&self) -> Option<f32> {
        get_bit(self.bytes[11], 0).then_some(1.2)
    }

    pub fn ranks(&self) -> u8 {
        sub_byte(self.bytes[12], 5, 3) + 1
    }

    pub fn device_width(&self) -> u8 {
        (4u16 << sub_byte(self.bytes[12], 2, 3)).min(64) as u8
    }

    pub fn rank_mix_asymmetric(&self) -> bool {
        get_bit(self.bytes[12], 6)
    }

    pub fn primary_bus_width(&self) -> u8 {
        (8u16 << sub_byte(self.bytes[13], 2, 3)).min(64) as u8
    }

    pub fn bus_width_extension(&self) -> u8 {
        match sub_byte(self.bytes[13], 4, 2) {
            1 => 8,
            _ => 0,
        }
    }

    fn t(&self, medium: u16, fine_at: Option<usize>) -> Picos {
        let fine = fine_at.map(|at| self.bytes[at] as i8).unwrap_or(0);
        Timing::new(medium, fine).resolve(Timebase::DDR4_MTB, Timebase::DDR4_FTB)
    }

    pub fn tckavg_min(&self) -> Picos {
        self.t(self.bytes[18] as u16, Some(125))
    }

    pub fn tckavg_max(&self) -> Picos {
        self.t(self.bytes[19] as u16, Some(124))
    }

    /// Supported CAS latencies from the byte 20..=23 mask. Bit 7 of byte 23
    /// moves the whole window from CL7+ to CL23+.
    pub fn cas_latencies(&self) -> Vec<u8> {
        cas_from_mask(&self.bytes[20..24])
    }

    pub fn taa_min(&self) -> Picos {
        self.t(self.bytes[24] as u16, Some(123))
    }

    pub fn trcd_min(&self) -> Picos {
        self.t(self.bytes[25] as u16, Some(122))
    }

    pub fn trp_min(&self) -> Picos {
        self.t(self.bytes[26] as u16, Some(121))
    }

    pub fn tras_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[27], 3, 4) as u16) << 8 | self.bytes[28] as u16;
        self.t(medium, None)
    }

    pub fn trc_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[27], 7, 4) as u16) << 8 | self.bytes[29] as u16;
        self.t(medium, Some(120))
    }

    pub fn trfc1_min(&self) -> Picos {
        self.t(self.bytes[30] as u16 | (self.bytes[31] as u16) << 8, None)
    }

    pub fn trfc2_min(&self) -> Picos {
        self.t(self.bytes[32] as u16 | (self.bytes[33] as u16) << 8, None)
    }

    pub fn trfc4_min(&self) -> Picos {
        self.t(self.bytes[34] as u16 | (self.bytes[35] as u16) << 8, None)
    }

    pub fn tfaw_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[36], 3, 4) as u16) << 8 | self.bytes[37] as u16;
        self.t(medium, None)
    }

    pub fn trrd_s_min(&self) -> Picos {
        self.t(self.bytes[38] as u16, Some(119))
    }

    pub fn trrd_l_min(&self) -> Picos {
        self.t(self.bytes[39] as u16, Some(118))
    }

    pub fn tccd_l_min(&self) -> Picos {
        self.t(self.bytes[40] as u16, Some(117))
    }

    pub fn twr_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[41], 3, 4) as u16) << 8 | self.bytes[42] as u16;
        self.t(medium, None)
    }

    pub fn twtr_s_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[43], 3, 4) as u16) << 8 | self.bytes[44] as u16;
        self.t(medium, None)
    }

    pub fn twtr_l_min(&self) -> Picos {
        let medium = (sub_byte(self.bytes[43], 7, 4) as u16) << 8 | self.bytes[45] as u16;
        self.t(medium, None)
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.tckavg_min().frequency_mhz()
    }

    pub fn capacity_bytes(&self) -> u64 {
        let per_die_bytes = self.density_mbits() as u64 * 1024 * 1024 / 8;
        let width = self.device_width();
        if width == 0 {
            return 0;
        }
        let mut total = per_die_bytes * (self.primary_bus_width() / width) as u64
            * self.ranks() as u64;
        if self.signal_loading() == SignalLoading::SingleLoadStack {
            total *= self.die_count() as u64;
        }
        total
    }

    pub fn manufacturer_id(&self) -> ManufacturerId {
        ManufacturerId::from_code_pair(self.bytes[320], self.bytes[321])
    }

    pub fn dram_manufacturer_id(&self) -> ManufacturerId {
        ManufacturerId::from_code_pair(self.bytes[350], self.bytes[351])
    }

    pub fn manufacturing_date(&self) -> Option<ManufacturingDate> {
        ManufacturingDate::from_bcd(self.bytes[323], self.bytes[324])
    }

    pub fn serial_number(&self) -> [u8; 4] {
        [self.bytes[325], self.bytes[326], self.bytes[327], self.bytes[328]]
    }

    pub fn part_number(&self) -> String {
        spd::read_ascii(&self.bytes[329..349])
    }

    pub fn crc_status(&self) -> bool {
        spd::crc16_section_ok(&self.bytes, 0, 126, 126)
            && spd::crc16_section_ok(&self.bytes, 128, 126, 254)
    }

    pub fn fix_crc(&mut self) {
        spd::crc16_section_fix(&mut self.bytes, 0, 126, 126);
        spd::crc16_section_fix(&mut self.bytes, 128, 126, 254);
    }

    /// XMP 2.0 profiles, gated on the magic at byte 384. The base MTB/FTB
    /// pair applies inside profiles too.
    pub fn xmp(&self) -> Option<Vec<Xmp2Profile<'_>>> {
        let gate: IResult<&[u8], &[u8]> = tag(XMP_MAGIC)(&self.bytes[XMP_OFFSET..XMP_OFFSET + 2]);
        gate.ok()?;

        let enabled = self.bytes[386];
        let mut profiles = Vec::new();
        for (n, &at) in XMP_PROFILE_OFFSETS.iter().enumerate() {
            if enabled >> n & 1 == 0 {
                continue;
            }
            profiles.push(Xmp2Profile {
                index: n as u8,
                block: &self.bytes[at..at + XMP_PROFILE_LEN],
            });
        }
        Some(profiles)
    }

    pub fn xmp_version(&self) -> Option<u8> {
        let gate: IResult<&[u8], &[u8]> = tag(XMP_MAGIC)(&self.bytes[XMP_OFFSET..XMP_OFFSET + 2]);
        gate.ok()?;
        Some(self.bytes[387])
    }
}

/// CAS support mask decode shared with the XMP block: four little-endian
/// mask bytes, window base selected by the top bit of the last byte.
fn cas_from_mask(mask: &[u8]) -> Vec<u8> {
    let base = if get_bit(mask[3], 7) { 23 } else { 7 };
    let bits = mask[0] as u32 | (mask[1] as u32) << 8 | (mask[2] as u32) << 16
        | ((mask[3] & 0x7F) as u32) << 24;
    (0..30).filter(|&n| bits >> n & 1 == 1).map(|n| base + n).collect()
}

/// Borrowed view of one XMP 2.0 profile block. The field order mirrors the
/// base configuration section, with the fine offsets trailing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xmp2Profile<'a> {
    pub index: u8,
    block: &'a [u8],
}

impl Xmp2Profile<'_> {
    fn t(&self, medium: u16, fine_at: Option<usize>) -> Picos {
        let fine = fine_at.map(|at| self.block[at] as i8).unwrap_or(0);
        Timing::new(medium, fine).resolve(Timebase::DDR4_MTB, Timebase::DDR4_FTB)
    }

    /// Module voltage in millivolts: integer volts in bit 7, hundredths
    /// below.
    pub fn voltage_mv(&self) -> u32 {
        let volts = if get_bit(self.block[0], 7) { 1000 } else { 0 };
        volts + (self.block[0] & 0x7F) as u32 * 10
    }

    pub fn tck(&self) -> Picos {
        self.t(self.block[3] as u16, None)
    }

    pub fn cas_latencies(&self) -> Vec<u8> {
        cas_from_mask(&self.block[4..8])
    }

    pub fn taa(&self) -> Picos {
        self.t(self.block[8] as u16, Some(46))
    }

    pub fn trcd(&self) -> Picos {
        self.t(self.block[9] as u16, Some(45))
    }

    pub fn trp(&self) -> Picos {
        self.t(self.block[10] as u16, Some(44))
    }

    pub fn tras(&self) -> Picos {
        self.t((sub_byte(self.block[11], 3, 4) as u16) << 8 | self.block[12] as u16, None)
    }

    pub fn trc(&self) -> Picos {
        self.t(
            (sub_byte(self.block[11], 7, 4) as u16) << 8 | self.block[13] as u16,
            Some(43),
        )
    }

    pub fn trfc1(&self) -> Picos {
        self.t(self.block[14] as u16 | (self.block[15] as u16) << 8, None)
    }

    pub fn trfc2(&self) -> Picos {
        self.t(self.block[16] as u16 | (self.block[17] as u16) << 8, None)
    }

    pub fn trfc4(&self) -> Picos {
        self.t(self.block[18] as u16 | (self.block[19] as u16) << 8, None)
    }

    pub fn tfaw(&self) -> Picos {
        self.t((sub_byte(self.block[20], 3, 4) as u16) << 8 | self.block[21] as u16, None)
    }

    pub fn trrd_s(&self) -> Picos {
        self.t(self.block[22] as u16, Some(42))
    }

    pub fn trrd_l(&self) -> Picos {
        self.t(self.block[23] as u16, Some(41))
    }

    pub fn tccd_l(&self) -> Picos {
        self.t(self.block[24] as u16, Some(40))
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
        let crc = crc16(&b[..126]);
        b[126] = (crc & 0xFF) as u8;
        b[127] = (crc >> 8) as u8;
        let crc = crc16(&b[128..254]);
        b[254] = (crc & 0xFF) as u8;
        b[255] = (crc >> 8) as u8;
    }

    fn image() -> Vec<u8> {
        let mut b = vec![0u8; Ddr4Spd::SIZE];
        b[0] = 0x23; // used 384, total 512
        b[1] = 0x12;
        b[TYPE_OFFSET] = RamType::Ddr4.code();
        b[3] = 0x02; // UDIMM
        b[4] = 0b0101_0101; // 2 bank groups, 8 banks/group... see asserts
        b[5] = 0b0010_1001; // 17 rows, 10 cols
        b[6] = 0b0000_0000;
        b[11] = 0b0000_0011;
        b[12] = 0b0000_1001; // 2 ranks, x8
        b[13] = 0b0000_0011; // 64 bit
        b[18] = 7; // 875 ps -> DDR4-2286
        b[19] = 13;
        b[20] = 0b1111_1100; // CL 9..14
        b[23] = 0;
        b[24] = 96;
        b[25] = 96;
        b[26] = 96;
        b[27] = 0x12;
        b[28] = 0x00; // tRAS 0x200
        b[29] = 0x10; // tRC 0x110
        b[30] = 0x20;
        b[31] = 0x01; // tRFC1 0x120 * 125 = 36 ns
        b[125] = (-8i8) as u8; // tCK fine
        b[123] = (-8i8) as u8; // tAA fine
        b[320] = 0x81;
        b[321] = 0x98; // Kingston
        b[323] = 0x20;
        b[324] = 0x02;
        b[325..329].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        b[329..335].copy_from_slice(b"KF3200");
        stamp_crc(&mut b);
        b
    }

    fn with_xmp(mut b: Vec<u8>) -> Vec<u8> {
        b[384] = 0x0C;
        b[385] = 0x4A;
        b[386] = 0b01;
        b[387] = 0x20;
        let p = 393;
        b[p] = 0x80 | 35; // 1.35 V
        b[p + 3] = 6; // 750 ps -> DDR4-2666
        b[p + 4] = 0b0010_0000; // CL 12
        b[p + 8] = 110; // tAA
        b[p + 46] = (-5i8) as u8; // tAA fine
        stamp_crc(&mut b);
        b
    }

    #[test]
    fn byte_zero_splits_used_and_total() {
        let spd = Ddr4Spd::new(&image()).unwrap();
        assert_eq!(spd.bytes_used(), 384);
        assert_eq!(spd.bytes_total(), 512);
    }

    #[test]
    fn geometry_decodes() {
        let spd = Ddr4Spd::new(&image()).unwrap();
        // 0b0101_0101: groups = 2*1, banks/group = 1<<(1+2), density code 5.
        assert_eq!(spd.bank_groups(), 2);
        assert_eq!(spd.banks_per_group(), 8);
        assert_eq!(spd.density_mbits(), 8192);
        assert_eq!(spd.row_address_bits(), 17);
        assert_eq!(spd.column_address_bits(), 10);
        assert_eq!(spd.ranks(), 2);
        assert_eq!(spd.device_width(), 8);
        assert_eq!(spd.primary_bus_width(), 64);
        assert_eq!(spd.voltage(), Some(1.2));
        // 8 Gb dies, x8 on a 64-bit bus, 2 ranks = 16 GiB.
        assert_eq!(spd.capacity_bytes(), 16 * 1024 * 1024 * 1024);
    }

    #[test]
    fn twelve_gigabit_density_code() {
        let mut b = image();
        b[4] = (b[4] & 0xF0) | 0x08;
        let spd = Ddr4Spd::new(&b).unwrap();
        assert_eq!(spd.density_mbits(), 12288);
    }

    #[test]
    fn fine_offsets_shift_the_medium_grid() {
        let spd = Ddr4Spd::new(&image()).unwrap();
        assert_eq!(spd.tckavg_min(), Picos(867));
        assert_eq!(spd.taa_min(), Picos(11_992));
        assert_eq!(spd.tras_min(), Picos(64_000));
        assert_eq!(spd.trc_min(), Picos(34_000));
        assert_eq!(spd.trfc1_min(), Picos(36_000));
        assert_eq!(spd.cas_latencies(), vec![9, 10, 11, 12, 13, 14]);
    }

    #[test]
    fn high_range_cas_window() {
        let mut b = image();
        b[20] = 0b0000_0011;
        b[23] = 0x80;
        let spd = Ddr4Spd::new(&b).unwrap();
        assert_eq!(spd.cas_latencies(), vec![23, 24]);
    }

    #[test]
    fn both_sections_validate_and_fix() {
        let mut spd = Ddr4Spd::new(&image()).unwrap();
        assert!(spd.crc_status());
        spd.bytes[130] = 0x77;
        assert!(!spd.crc_status());
        spd.fix_crc();
        assert!(spd.crc_status());
    }

    #[test]
    fn zeroed_second_half_still_validates() {
        // Byte 0 = 0x23, bytes 128..=255 all zero: the stored zero checksum
        // matches a zero section, so status hangs on section 0 alone.
        let mut b = vec![0u8; Ddr4Spd::SIZE];
        b[0] = 0x23;
        b[TYPE_OFFSET] = RamType::Ddr4.code();
        b[18] = 7;
        let crc = crc16(&b[..126]);
        b[126] = (crc & 0xFF) as u8;
        b[127] = (crc >> 8) as u8;
        let spd = Spd::decode(&b).unwrap();
        assert_eq!(spd.ram_type(), RamType::Ddr4);
        assert!(spd.crc_status());
    }

    #[test]
    fn xmp_profile_reuses_the_fixed_timebases() {
        let spd = Ddr4Spd::new(&with_xmp(image())).unwrap();
        assert_eq!(spd.xmp_version(), Some(0x20));
        let profiles = spd.xmp().unwrap();
        assert_eq!(profiles.len(), 1);
        let p = &profiles[0];
        assert_eq!(p.voltage_mv(), 1350);
        assert_eq!(p.tck(), Picos(750));
        assert_eq!(p.taa(), Picos(110 * 125 - 5));
        assert_eq!(p.cas_latencies(), vec![12]);
        assert!((p.frequency_mhz() - 1333.33).abs() < 0.01);
    }

    #[test]
    fn identity_fields() {
        let spd = Spd::decode(&image()).unwrap();
        assert_eq!(spd.manufacturer_id().name(), Some("Kingston"));
        assert_eq!(spd.part_number(), "KF3200");
        assert_eq!(spd.serial_number(), [0xDE, 0xAD, 0xBE, 0xEF]);
    }
}
