//! DDR5 SPD (1024 bytes), including XMP 3.0 and EXPO profile blocks.
//!
//! DDR5 drops the timebase machinery: timings are little-endian picosecond
//! (or, for the refresh intervals, nanosecond) byte pairs. The module may be
//! asymmetric, with odd ranks built from a second SDRAM definition. Beyond
//! the base checksum, every present overclocking block carries its own
//! CRC16 section.

use byteorder::{ByteOrder, LittleEndian};
use nom::bytes::complete::tag;
use nom::IResult;

use crate::bits::{get_bit, sub_byte};
use crate::jep106::ManufacturerId;
use crate::spd::ddr3::XMP_MAGIC;
use crate::spd::{self, ManufacturingDate, Picos};
use crate::{Result, SpdError};

const XMP_OFFSET: usize = 0x280;
const XMP_HEADER_LEN: usize = 64;
const XMP_PROFILE_LEN: usize = 64;
const XMP_PROFILE_COUNT: usize = 5;

const EXPO_OFFSET: usize = 0x340;
const EXPO_LEN: usize = 128;
const EXPO_MAGIC: &[u8] = b"EXPO";
const EXPO_PROFILE_OFFSETS: [usize; 2] = [8, 64];

/// Density and packaging of one SDRAM definition (the module's first or
/// second half).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdramDefinition {
    /// Die density in gigabits.
    pub density_gbits: u32,
    pub die_per_package: u8,
    pub row_address_bits: u8,
    pub column_address_bits: u8,
    /// I/O width in bits.
    pub io_width: u8,
    pub bank_groups: u8,
    pub banks_per_group: u8,
}

impl SdramDefinition {
    fn decode(block: &[u8]) -> Self {
        let density_gbits = match sub_byte(block[0], 4, 5) {
            1 => 4,
            2 => 8,
            3 => 12,
            4 => 16,
            5 => 24,
            6 => 32,
            7 => 48,
            8 => 64,
            _ => 0,
        };
        SdramDefinition {
            density_gbits,
            die_per_package: 1 << sub_byte(block[0], 7, 3),
            row_address_bits: sub_byte(block[1], 4, 5) + 16,
            column_address_bits: sub_byte(block[1], 7, 3) + 10,
            io_width: (4u16 << sub_byte(block[2], 7, 3)).min(64) as u8,
            bank_groups: 1 << sub_byte(block[3], 7, 3),
            banks_per_group: 1 << sub_byte(block[3], 2, 3),
        }
    }
}

/// Decoded view of a DDR5 SPD image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ddr5Spd {
    bytes: Vec<u8>,
}

impl Ddr5Spd {
    pub const SIZE: usize = 1024;

    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(SpdError::BadLength);
        }
        Ok(Ddr5Spd {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes the manufacturer programmed, byte 0 bits [3:0] in 128-byte
    /// blocks.
    pub fn bytes_used(&self) -> usize {
        sub_byte(self.bytes[0], 3, 4) as usize * 128
    }

    /// Total EEPROM size from byte 0 bits [6:4].
    pub fn bytes_total(&self) -> usize {
        match sub_byte(self.bytes[0], 6, 3) {
            1 => 256,
            2 => 384,
            3 => 512,
            4 => 768,
            5 => 1024,
            _ => 0,
        }
    }

    pub fn base_module_type(&self) -> u8 {
        sub_byte(self.bytes[3], 3, 4)
    }

    pub fn is_hybrid(&self) -> bool {
        get_bit(self.bytes[3], 7)
    }

    /// The first SDRAM definition (even ranks).
    pub fn first_sdram(&self) -> SdramDefinition {
        SdramDefinition::decode(&self.bytes[4..8])
    }

    /// The second SDRAM definition (odd ranks of an asymmetric module).
    pub fn second_sdram(&self) -> SdramDefinition {
        SdramDefinition::decode(&self.bytes[8..12])
    }

    fn ps_field(&self, at: usize) -> Picos {
        Picos(LittleEndian::read_u16(&self.bytes[at..at + 2]) as i64)
    }

    fn ns_field(&self, at: usize) -> Picos {
        Picos(LittleEndian::read_u16(&self.bytes[at..at + 2]) as i64 * 1000)
    }

    pub fn tckavg_min(&self) -> Picos {
        self.ps_field(20)
    }

    pub fn tckavg_max(&self) -> Picos {
        self.ps_field(22)
    }

    /// Supported CAS latencies: bit k of the five-byte mask at 24..=28
    /// advertises CL 20 + 2k.
    pub fn cas_latencies(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, &byte) in self.bytes[24..29].iter().enumerate() {
            for bit in 0..8 {
                if byte >> bit & 1 == 1 {
                    out.push(20 + 2 * (i as u8 * 8 + bit));
                }
            }
        }
        out
    }

    pub fn taa_min(&self) -> Picos {
        self.ps_field(30)
    }

    pub fn trcd_min(&self) -> Picos {
        self.ps_field(32)
    }

    pub fn trp_min(&self) -> Picos {
        self.ps_field(34)
    }

    pub fn tras_min(&self) -> Picos {
        self.ps_field(36)
    }

    pub fn trc_min(&self) -> Picos {
        self.ps_field(38)
    }

    pub fn twr_min(&self) -> Picos {
        self.ps_field(40)
    }

    pub fn trfc1_min(&self) -> Picos {
        self.ns_field(42)
    }

    pub fn trfc2_min(&self) -> Picos {
        self.ns_field(44)
    }

    pub fn trfcsb_min(&self) -> Picos {
        self.ns_field(46)
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.tckavg_min().frequency_mhz()
    }

    /// Data rate in megatransfers per second.
    pub fn data_rate_mts(&self) -> f64 {
        2.0 * self.frequency_mhz()
    }

    pub fn ranks(&self) -> u8 {
        sub_byte(self.bytes[234], 5, 3) + 1
    }

    /// Asymmetric modules populate odd ranks from the second SDRAM
    /// definition.
    pub fn rank_mix_asymmetric(&self) -> bool {
        get_bit(self.bytes[234], 6)
    }

    pub fn channels(&self) -> u8 {
        1 << sub_byte(self.bytes[235], 6, 2)
    }

    pub fn bus_width_extension(&self) -> u8 {
        match sub_byte(self.bytes[235], 4, 2) {
            1 => 4,
            2 => 8,
            _ => 0,
        }
    }

    /// Primary bus width per channel in bits.
    pub fn primary_bus_width(&self) -> u8 {
        (8u16 << sub_byte(self.bytes[235], 2, 3)).min(64) as u8
    }

    fn half_capacity_bytes(&self, def: SdramDefinition, ranks: u64) -> u64 {
        if def.io_width == 0 || def.density_gbits == 0 {
            return 0;
        }
        let per_die_mb = def.density_gbits as u64 * 1024 / 8;
        per_die_mb
            * self.channels() as u64
            * (self.primary_bus_width() / def.io_width) as u64
            * def.die_per_package as u64
            * ranks
            * 1024
            * 1024
    }

    pub fn capacity_bytes(&self) -> u64 {
        let ranks = self.ranks() as u64;
        if self.rank_mix_asymmetric() {
            let even = (ranks + 1) / 2;
            let odd = ranks / 2;
            self.half_capacity_bytes(self.first_sdram(), even)
                + self.half_capacity_bytes(self.second_sdram(), odd)
        } else {
            self.half_capacity_bytes(self.first_sdram(), ranks)
        }
    }

    pub fn manufacturer_id(&self) -> ManufacturerId {
        ManufacturerId::from_code_pair(self.bytes[512], self.bytes[513])
    }

    pub fn dram_manufacturer_id(&self) -> ManufacturerId {
        ManufacturerId::from_code_pair(self.bytes[552], self.bytes[553])
    }

    pub fn manufacturing_date(&self) -> Option<ManufacturingDate> {
        ManufacturingDate::from_bcd(self.bytes[515], self.bytes[516])
    }

    pub fn serial_number(&self) -> [u8; 4] {
        [self.bytes[517], self.bytes[518], self.bytes[519], self.bytes[520]]
    }

    pub fn part_number(&self) -> String {
        spd::read_ascii(&self.bytes[521..551])
    }

    fn xmp_present(&self) -> bool {
        let gate: IResult<&[u8], &[u8]> = tag(XMP_MAGIC)(&self.bytes[XMP_OFFSET..XMP_OFFSET + 2]);
        gate.is_ok()
    }

    fn expo_present(&self) -> bool {
        let gate: IResult<&[u8], &[u8]> =
            tag(EXPO_MAGIC)(&self.bytes[EXPO_OFFSET..EXPO_OFFSET + 4]);
        gate.is_ok()
    }

    fn xmp_enabled_mask(&self) -> u8 {
        self.bytes[XMP_OFFSET + 3] & 0x1F
    }

    /// Every checksummed section present in this image: the base section
    /// plus one per gated overclocking block.
    fn crc_sections(&self) -> Vec<(usize, usize, usize)> {
        let mut sections = vec![(0, 510, 510)];
        if self.xmp_present() {
            sections.push((XMP_OFFSET, XMP_HEADER_LEN - 2, XMP_OFFSET + XMP_HEADER_LEN - 2));
            for n in 0..XMP_PROFILE_COUNT {
                if self.xmp_enabled_mask() >> n & 1 == 1 {
                    let at = XMP_OFFSET + XMP_HEADER_LEN + n * XMP_PROFILE_LEN;
                    sections.push((at, XMP_PROFILE_LEN - 2, at + XMP_PROFILE_LEN - 2));
                }
            }
        }
        if self.expo_present() {
            sections.push((EXPO_OFFSET, EXPO_LEN - 2, EXPO_OFFSET + EXPO_LEN - 2));
        }
        sections
    }

    pub fn crc_status(&self) -> bool {
        self.crc_sections()
            .iter()
            .all(|&(start, covered, at)| spd::crc16_section_ok(&self.bytes, start, covered, at))
    }

    pub fn fix_crc(&mut self) {
        for (start, covered, at) in self.crc_sections() {
            spd::crc16_section_fix(&mut self.bytes, start, covered, at);
        }
    }

    /// XMP 3.0 profiles: up to five 64-byte blocks after the 64-byte header.
    pub fn xmp(&self) -> Option<Vec<Xmp3Profile<'_>>> {
        if !self.xmp_present() {
            return None;
        }
        let enabled = self.xmp_enabled_mask();
        let mut profiles = Vec::new();
        for n in 0..XMP_PROFILE_COUNT {
            if enabled >> n & 1 == 0 {
                continue;
            }
            let at = XMP_OFFSET + XMP_HEADER_LEN + n * XMP_PROFILE_LEN;
            profiles.push(Xmp3Profile {
                index: n as u8,
                name: self.xmp_profile_name(n),
                block: &self.bytes[at..at + XMP_PROFILE_LEN],
            });
        }
        Some(profiles)
    }

    pub fn xmp_version(&self) -> Option<u8> {
        self.xmp_present().then(|| self.bytes[XMP_OFFSET + 2])
    }

    /// Profile labels for the first three profiles live in the block header.
    fn xmp_profile_name(&self, n: usize) -> Option<String> {
        if n >= 3 {
            return None;
        }
        let at = XMP_OFFSET + 16 + n * 16;
        let name = spd::read_ascii(&self.bytes[at..at + 16]);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// EXPO profiles: up to two 56-byte blocks inside the 128-byte block.
    pub fn expo(&self) -> Option<Vec<ExpoProfile<'_>>> {
        if !self.expo_present() {
            return None;
        }
        let enabled = self.bytes[EXPO_OFFSET + 5] & 0b11;
        let mut profiles = Vec::new();
        for (n, &rel) in EXPO_PROFILE_OFFSETS.iter().enumerate() {
            if enabled >> n & 1 == 0 {
                continue;
            }
            let at = EXPO_OFFSET + rel;
            profiles.push(ExpoProfile {
                index: n as u8,
                block: &self.bytes[at..at + 56],
            });
        }
        Some(profiles)
    }
}

/// Borrowed view of one XMP 3.0 profile block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xmp3Profile<'a> {
    pub index: u8,
    pub name: Option<String>,
    block: &'a [u8],
}

impl Xmp3Profile<'_> {
    fn ps(&self, at: usize) -> Picos {
        Picos(LittleEndian::read_u16(&self.block[at..at + 2]) as i64)
    }

    fn ns(&self, at: usize) -> Picos {
        Picos(LittleEndian::read_u16(&self.block[at..at + 2]) as i64 * 1000)
    }

    pub fn vdd_mv(&self) -> u32 {
        LittleEndian::read_u16(&self.block[0..2]) as u32
    }

    pub fn vddq_mv(&self) -> u32 {
        LittleEndian::read_u16(&self.block[2..4]) as u32
    }

    pub fn vpp_mv(&self) -> u32 {
        LittleEndian::read_u16(&self.block[4..6]) as u32
    }

    pub fn tck(&self) -> Picos {
        self.ps(6)
    }

    pub fn cas_latencies(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, &byte) in self.block[8..13].iter().enumerate() {
            for bit in 0..8 {
                if byte >> bit & 1 == 1 {
                    out.push(20 + 2 * (i as u8 * 8 + bit));
                }
            }
        }
        out
    }

    pub fn taa(&self) -> Picos {
        self.ps(14)
    }

    pub fn trcd(&self) -> Picos {
        self.ps(16)
    }

    pub fn trp(&self) -> Picos {
        self.ps(18)
    }

    pub fn tras(&self) -> Picos {
        self.ps(20)
    }

    pub fn trc(&self) -> Picos {
        self.ps(22)
    }

    pub fn twr(&self) -> Picos {
        self.ps(24)
    }

    pub fn trfc1(&self) -> Picos {
        self.ns(26)
    }

    pub fn trfc2(&self) -> Picos {
        self.ns(28)
    }

    pub fn trfcsb(&self) -> Picos {
        self.ns(30)
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.tck().frequency_mhz()
    }

    pub fn data_rate_mts(&self) -> f64 {
        2.0 * self.frequency_mhz()
    }
}

/// Borrowed view of one EXPO profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpoProfile<'a> {
    pub index: u8,
    block: &'a [u8],
}

impl ExpoProfile<'_> {
    fn ps(&self, at: usize) -> Picos {
        Picos(LittleEndian::read_u16(&self.block[at..at + 2]) as i64)
    }

    fn ns(&self, at: usize) -> Picos {
        Picos(LittleEndian::read_u16(&self.block[at..at + 2]) as i64 * 1000)
    }

    pub fn vdd_mv(&self) -> u32 {
        LittleEndian::read_u16(&self.block[0..2]) as u32
    }

    pub fn vddq_mv(&self) -> u32 {
        LittleEndian::read_u16(&self.block[2..4]) as u32
    }

    pub fn vpp_mv(&self) -> u32 {
        LittleEndian::read_u16(&self.block[4..6]) as u32
    }

    pub fn tck(&self) -> Picos {
        self.ps(6)
    }

    pub fn taa(&self) -> Picos {
        self.ps(8)
    }

    pub fn trcd(&self) -> Picos {
        self.ps(10)
    }

    pub fn trp(&self) -> Picos {
        self.ps(12)
    }

    pub fn tras(&self) -> Picos {
        self.ps(14)
    }

    pub fn trc(&self) -> Picos {
        self.ps(16)
    }

    pub fn twr(&self) -> Picos {
        self.ps(18)
    }

    pub fn trfc1(&self) -> Picos {
        self.ns(20)
    }

    pub fn trfc2(&self) -> Picos {
        self.ns(22)
    }

    pub fn trfcsb(&self) -> Picos {
        self.ns(24)
    }

    pub fn data_rate_mts(&self) -> f64 {
        2.0 * self.tck().frequency_mhz()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;
    use crate::spd::{RamType, Spd, TYPE_OFFSET};

    fn stamp_base_crc(b: &mut [u8]) {
        let crc = crc16(&b[..510]);
        b[510] = (crc & 0xFF) as u8;
        b[511] = (crc >> 8) as u8;
    }

    fn image() -> Vec<u8> {
        let mut b = vec![0u8; Ddr5Spd::SIZE];
        b[0] = 0x30;
        b[1] = 0x10;
        b[TYPE_OFFSET] = RamType::Ddr5.code();
        b[3] = 0x02; // UDIMM
        b[4] = 0b0000_0100; // 16 Gb, 1 die
        b[5] = 0b0000_0000; // 16 rows, 10 cols
        b[6] = 0b0010_0000; // x8
        b[7] = 0b0110_0010; // 8 bank groups, 4 banks each
        LittleEndian::write_u16(&mut b[20..22], 416); // DDR5-4800
        LittleEndian::write_u16(&mut b[22..24], 1010);
        b[24] = 0b0000_0011; // CL 20, 22... see assert
        LittleEndian::write_u16(&mut b[30..32], 13_750);
        LittleEndian::write_u16(&mut b[32..34], 13_750);
        LittleEndian::write_u16(&mut b[34..36], 13_750);
        LittleEndian::write_u16(&mut b[36..38], 32_000);
        LittleEndian::write_u16(&mut b[38..40], 45_750);
        LittleEndian::write_u16(&mut b[40..42], 30_000);
        LittleEndian::write_u16(&mut b[42..44], 295); // ns
        LittleEndian::write_u16(&mut b[44..46], 160);
        LittleEndian::write_u16(&mut b[46..48], 130);
        b[234] = 0b0000_1000; // 2 ranks, symmetric
        b[235] = 0b0000_0011; // 1 channel, 64 bit
        b[512] = 0x80;
        b[513] = 0xCE; // Samsung
        b[515] = 0x23;
        b[516] = 0x11;
        b[517..521].copy_from_slice(&[4, 3, 2, 1]);
        b[521..527].copy_from_slice(b"D5TEST");
        stamp_base_crc(&mut b);
        b
    }

    fn stamp_block_crc(b: &mut [u8], start: usize, covered: usize) {
        let crc = crc16(&b[start..start + covered]);
        b[start + covered] = (crc & 0xFF) as u8;
        b[start + covered + 1] = (crc >> 8) as u8;
    }

    fn with_xmp(mut b: Vec<u8>) -> Vec<u8> {
        b[XMP_OFFSET] = 0x0C;
        b[XMP_OFFSET + 1] = 0x4A;
        b[XMP_OFFSET + 2] = 0x30;
        b[XMP_OFFSET + 3] = 0b0000_0001;
        b[XMP_OFFSET + 16..XMP_OFFSET + 23].copy_from_slice(b"Extreme");
        let p = XMP_OFFSET + XMP_HEADER_LEN;
        LittleEndian::write_u16(&mut b[p..p + 2], 1435); // VDD
        LittleEndian::write_u16(&mut b[p + 2..p + 4], 1435);
        LittleEndian::write_u16(&mut b[p + 4..p + 6], 1800);
        LittleEndian::write_u16(&mut b[p + 6..p + 8], 312); // DDR5-6400
        b[p + 8] = 0b0000_0100; // CL 24
        LittleEndian::write_u16(&mut b[p + 14..p + 16], 9980);
        stamp_block_crc(&mut b, XMP_OFFSET, XMP_HEADER_LEN - 2);
        stamp_block_crc(&mut b, p, XMP_PROFILE_LEN - 2);
        b
    }

    fn with_expo(mut b: Vec<u8>) -> Vec<u8> {
        b[EXPO_OFFSET..EXPO_OFFSET + 4].copy_from_slice(b"EXPO");
        b[EXPO_OFFSET + 4] = 0x01;
        b[EXPO_OFFSET + 5] = 0b01;
        let p = EXPO_OFFSET + 8;
        LittleEndian::write_u16(&mut b[p..p + 2], 1400);
        LittleEndian::write_u16(&mut b[p + 6..p + 8], 333); // DDR5-6000
        stamp_block_crc(&mut b, EXPO_OFFSET, EXPO_LEN - 2);
        b
    }

    #[test]
    fn sdram_definition_decodes() {
        let spd = Ddr5Spd::new(&image()).unwrap();
        let first = spd.first_sdram();
        assert_eq!(first.density_gbits, 16);
        assert_eq!(first.die_per_package, 1);
        assert_eq!(first.row_address_bits, 16);
        assert_eq!(first.column_address_bits, 10);
        assert_eq!(first.io_width, 8);
        assert_eq!(first.bank_groups, 8);
        assert_eq!(first.banks_per_group, 4);
    }

    #[test]
    fn direct_picosecond_timings() {
        let spd = Ddr5Spd::new(&image()).unwrap();
        assert_eq!(spd.tckavg_min(), Picos(416));
        assert!((spd.data_rate_mts() - 4807.7).abs() < 0.1);
        assert_eq!(spd.taa_min(), Picos(13_750));
        assert_eq!(spd.trfc1_min(), Picos(295_000));
        assert_eq!(spd.cas_latencies(), vec![20, 22]);
    }

    #[test]
    fn symmetric_capacity() {
        let spd = Ddr5Spd::new(&image()).unwrap();
        // 16 Gb x8 dies on one 64-bit channel, 2 ranks = 32 GiB.
        assert_eq!(spd.ranks(), 2);
        assert_eq!(spd.channels(), 1);
        assert_eq!(spd.primary_bus_width(), 64);
        assert_eq!(spd.capacity_bytes(), 32 * 1024 * 1024 * 1024);
    }

    #[test]
    fn asymmetric_capacity_sums_both_halves() {
        let mut b = image();
        b[234] = 0b0100_1000; // 2 ranks, asymmetric
        b[8] = 0b0000_0010; // second half: 8 Gb, 1 die
        b[9] = 0;
        b[10] = 0b0010_0000; // x8
        b[11] = 0b0110_0010;
        stamp_base_crc(&mut b);
        let spd = Ddr5Spd::new(&b).unwrap();
        // 16 GiB even rank + 8 GiB odd rank.
        assert_eq!(spd.capacity_bytes(), 24 * 1024 * 1024 * 1024);
    }

    #[test]
    fn base_crc_round_trip() {
        let mut spd = Ddr5Spd::new(&image()).unwrap();
        assert!(spd.crc_status());
        spd.bytes[100] ^= 0x55;
        assert!(!spd.crc_status());
        spd.fix_crc();
        assert!(spd.crc_status());
    }

    #[test]
    fn xmp_profiles_carry_their_own_sections() {
        let spd = Ddr5Spd::new(&with_xmp(image())).unwrap();
        assert!(spd.crc_status());
        assert_eq!(spd.xmp_version(), Some(0x30));
        let profiles = spd.xmp().unwrap();
        assert_eq!(profiles.len(), 1);
        let p = &profiles[0];
        assert_eq!(p.name.as_deref(), Some("Extreme"));
        assert_eq!(p.vdd_mv(), 1435);
        assert_eq!(p.tck(), Picos(312));
        assert_eq!(p.taa(), Picos(9980));
        assert_eq!(p.cas_latencies(), vec![24]);

        // Corrupt a profile byte: only the profile section fails, and the
        // fixer repairs it in place.
        let mut spd = Ddr5Spd::new(&with_xmp(image())).unwrap();
        spd.bytes[XMP_OFFSET + XMP_HEADER_LEN + 4] ^= 0xFF;
        assert!(!spd.crc_status());
        spd.fix_crc();
        assert!(spd.crc_status());
    }

    #[test]
    fn expo_block_decodes_and_checksums() {
        let spd = Ddr5Spd::new(&with_expo(image())).unwrap();
        assert!(spd.crc_status());
        let profiles = spd.expo().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].vdd_mv(), 1400);
        assert_eq!(profiles[0].tck(), Picos(333));
        assert!((profiles[0].data_rate_mts() - 6006.0).abs() < 0.1);
    }

    #[test]
    fn absent_blocks_are_not_gated_in() {
        let spd = Ddr5Spd::new(&image()).unwrap();
        assert!(spd.xmp().is_none());
        assert!(spd.expo().is_none());
    }

    #[test]
    fn identity_strings() {
        let spd = Spd::decode(&image()).unwrap();
        assert_eq!(spd.ram_type(), RamType::Ddr5);
        assert_eq!(spd.to_string(), "Samsung D5TEST");
        assert_eq!(spd.serial_number(), [4, 3, 2, 1]);
        let date = spd.manufacturing_date().unwrap();
        assert_eq!((date.year, date.week), (23, 11));
    }
}
