//! The host/programmer wire contract.
//!
//! Every request is a single opcode byte followed by a fixed-length argument
//! frame (plus a variable tail for page writes and name updates); every
//! response is a fixed-length byte sequence. There is no length prefix and no
//! escaping, so both sides of the link must agree on this table statically.

use bitflags::bitflags;

/// Liveness check. Responds with [`WELCOME`].
pub const CMD_TEST: u8 = b't';
/// Firmware version query. Responds with 8 ASCII digits, `YYYYMMDD`.
pub const CMD_VERSION: u8 = b'v';
/// Reversible write protection capability report from the last self-test.
pub const CMD_RSWP_REPORT: u8 = b'f';
/// Re-run the write protection self-test and report the fresh bitmask.
pub const CMD_RSWP_RETEST: u8 = b'e';
/// Bus scan. Responds with a bitmap of EEPROMs present at 0x50..0x57.
pub const CMD_SCAN_BUS: u8 = b's';
/// Single-address presence probe.
pub const CMD_PROBE: u8 = b'a';
/// Byte read: addr, offset_hi, offset_lo, len. Responds with `len` bytes.
pub const CMD_READ: u8 = b'r';
/// Single byte write: addr, offset_hi, offset_lo, value.
pub const CMD_WRITE: u8 = b'w';
/// Page write: addr, offset_hi, offset_lo, len (1..=16), then `len` bytes.
pub const CMD_WRITE_PAGE: u8 = b'g';
/// Pin control: pin id, state (or [`GET`]).
pub const CMD_PIN: u8 = b'p';
/// Reversible software write protection: block, state (or [`GET`]).
pub const CMD_RSWP: u8 = b'b';
/// Permanent software write protection: addr, state (or [`GET`]).
pub const CMD_PSWP: u8 = b'l';
/// I2C clock mode: 0 = 100 kHz, 1 = 400 kHz (or [`GET`]).
pub const CMD_I2C_CLOCK: u8 = b'c';
/// Device name: [`GET`], or length (<= 16) followed by the name bytes.
pub const CMD_NAME: u8 = b'n';
/// DDR4 presence detection at the given address.
pub const CMD_DDR4_DETECT: u8 = b'4';
/// DDR5 presence detection at the given address.
pub const CMD_DDR5_DETECT: u8 = b'5';
/// Clear the programmer's persistent settings region.
pub const CMD_FACTORY_RESET: u8 = b'-';

/// Generic positive response, also ENABLED/ON.
pub const SUCCESS: u8 = 0x01;
/// Generic negative response (NACK, bad argument, failed feedback check).
pub const ERROR: u8 = 0xFF;
/// Disabled/off/zero response.
pub const ZERO: u8 = 0x00;
/// Sent by the firmware once it is ready to accept commands.
pub const WELCOME: u8 = b'!';
/// Response to a malformed or unrecognised opcode.
pub const UNKNOWN: u8 = b'?';
/// As a state argument: query the current state instead of setting it.
pub const GET: u8 = b'?';

/// Maximum payload of a single page write frame.
pub const PAGE_WRITE_MAX: usize = 16;
/// Maximum stored device name length.
pub const NAME_MAX: usize = 16;
/// Maximum read chunk a single request may ask for.
pub const READ_MAX: usize = 32;

/// Control pin identifiers for [`CMD_PIN`].
pub mod pin {
    /// DDR5 local-bus isolation relay (offline mode).
    pub const OFFLINE_MODE: u8 = 0;
    /// SA1 select line, used for pre-DDR4 block protection.
    pub const SA1: u8 = 1;
    /// 9 V generator on SA0, the RSWP enable gate.
    pub const HIGH_VOLTAGE: u8 = 9;
}

/// I2C device-select codes the firmware issues on behalf of the host.
pub mod dsc {
    /// Set DDR4 page address 0 (broadcast, no data).
    pub const SPA0: u8 = 0x6C;
    /// Set DDR4 page address 1 (broadcast, no data).
    pub const SPA1: u8 = 0x6E;
    /// Read the active DDR4 page address.
    pub const RPA: u8 = 0x6D;
    /// Set reversible write protection, blocks 0..=3.
    pub const SWP: [u8; 4] = [0x62, 0x68, 0x6A, 0x60];
    /// Read reversible write protection state, blocks 0..=3.
    pub const SWP_READ: [u8; 4] = [0x63, 0x69, 0x6B, 0x61];
    /// Clear reversible write protection (all blocks).
    pub const CWP: u8 = 0x66;

    /// Permanent write protection device-select code for a module address.
    pub const fn pswp(addr: u8) -> u8 {
        (0b0110 << 3) | (addr & 0b111)
    }

    /// Thermal sensor device-select code for a module address (DDR4 fallback
    /// detection).
    pub const fn thermal_sensor(addr: u8) -> u8 {
        (0b0011 << 3) | (addr & 0b111)
    }
}

/// First EEPROM bus address; modules answer at `0x50 + n`, n in 0..8.
pub const EEPROM_BASE_ADDRESS: u8 = 0x50;

/// DDR5 SPD hub memory registers reachable while the hub is in legacy mode.
pub mod spd5 {
    /// MR0, device type most significant byte.
    pub const MR0: u8 = 0x00;
    /// MR11, legacy-mode page register (128-byte pages).
    pub const MR11: u8 = 0x0B;
    /// Device type values reported by known SPD5 hubs.
    pub const DEVICE_TYPES: [u8; 2] = [0x51, 0x52];
    /// Set when the first command byte addresses EEPROM memory instead of
    /// the register file.
    pub const MEMREG: u8 = 0x80;
    /// Bytes per legacy-mode page.
    pub const PAGE_SIZE: u16 = 128;
}

bitflags! {
    /// Which module generations the programmer can reversibly write protect,
    /// as established by the boot self-test.
    pub struct RswpSupport: u8 {
        const DDR2 = 0b0001;
        const DDR3 = 0b0010;
        const DDR4 = 0b0100;
        const DDR5 = 0b1000;
    }
}

/// Persistent settings layout in programmer NVRAM.
pub mod nvram {
    /// Device name, zero padded.
    pub const NAME_OFFSET: u8 = 0x00;
    /// Feature bits; bit 0 selects the fast (400 kHz) I2C clock.
    pub const FEATURES_OFFSET: u8 = 0x20;
    pub const FEATURE_FAST_CLOCK: u8 = 0b0000_0001;
    /// Everything below this offset is cleared by a factory reset.
    pub const REGION_END: u8 = 0x21;
}

/// Fixed argument-frame length for an opcode, not counting the variable tail
/// of page writes and name updates. `None` means the opcode is not part of
/// the contract.
pub fn arg_len(opcode: u8) -> Option<usize> {
    match opcode {
        CMD_TEST | CMD_VERSION | CMD_RSWP_REPORT | CMD_RSWP_RETEST | CMD_SCAN_BUS
        | CMD_FACTORY_RESET => Some(0),
        CMD_PROBE | CMD_DDR4_DETECT | CMD_DDR5_DETECT | CMD_I2C_CLOCK | CMD_NAME => Some(1),
        CMD_PIN | CMD_RSWP | CMD_PSWP => Some(2),
        CMD_READ | CMD_WRITE | CMD_WRITE_PAGE => Some(4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_has_a_frame_length() {
        for op in [
            CMD_TEST,
            CMD_VERSION,
            CMD_RSWP_REPORT,
            CMD_RSWP_RETEST,
            CMD_SCAN_BUS,
            CMD_PROBE,
            CMD_READ,
            CMD_WRITE,
            CMD_WRITE_PAGE,
            CMD_PIN,
            CMD_RSWP,
            CMD_PSWP,
            CMD_I2C_CLOCK,
            CMD_NAME,
            CMD_DDR4_DETECT,
            CMD_DDR5_DETECT,
            CMD_FACTORY_RESET,
        ] {
            assert!(arg_len(op).is_some(), "opcode {:#04x}", op);
        }
        assert_eq!(arg_len(b'z'), None);
    }

    #[test]
    fn pswp_select_code_masks_the_address() {
        assert_eq!(dsc::pswp(0x50), 0b0110_000);
        assert_eq!(dsc::pswp(0x57), 0b0110_111);
    }

    #[test]
    fn rswp_support_round_trips_through_bits() {
        let caps = RswpSupport::DDR4 | RswpSupport::DDR5;
        assert_eq!(RswpSupport::from_bits_truncate(caps.bits()), caps);
        assert_eq!(caps.bits(), 0b1100);
    }
}
