//! The programmer command engine.
//!
//! A bare cooperative loop: wait for an opcode byte, collect its fixed
//! argument frame under a bounded timeout, run the command to completion,
//! flush the response. A short frame is dropped without a response; the host
//! observes the resulting timeout and resynchronises by reopening the
//! session. All I2C side effects of one command are observable before the
//! next command is accepted.

use byteorder::{BigEndian, ByteOrder};

use crate::hal::{Clock, ControlPins, I2cPort, Nvram, SerialLink};
use crate::protocol::{self, dsc, nvram, pin, spd5, RswpSupport};

/// Firmware build date, reported by the version command.
pub const FIRMWARE_VERSION: &[u8; 8] = b"20240301";

/// Per-frame argument timeout.
const FRAME_TIMEOUT_MS: u32 = 100;
/// EEPROM internal write cycle settle time.
const WRITE_SETTLE_MS: u32 = 10;
/// 9 V generator rise time before the feedback input is trusted.
const HV_SETTLE_MS: u32 = 25;

/// What kind of device answered at a bus address, learned from detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceKind {
    Unknown,
    /// Plain EEPROM, possibly with the DDR4 two-page address space.
    Eeprom,
    /// DDR5 SPD hub, paged through MR11 in legacy mode.
    Spd5Hub,
}

pub struct Firmware<B, P, N, C, S> {
    i2c: B,
    pins: P,
    nvram: N,
    clock: C,
    link: S,
    /// Shadow of the last SPA0/SPA1 broadcast. Invariant: equals the bus
    /// page latch unless another master has issued an SPA since.
    page: u8,
    /// Last driven SA1 level; the line has no feedback input.
    sa1: bool,
    rswp_caps: RswpSupport,
    kinds: [DeviceKind; 8],
}

impl<B, P, N, C, S> Firmware<B, P, N, C, S>
where
    B: I2cPort,
    P: ControlPins,
    N: Nvram,
    C: Clock,
    S: SerialLink,
{
    pub fn new(i2c: B, pins: P, nvram: N, clock: C, link: S) -> Self {
        Firmware {
            i2c,
            pins,
            nvram,
            clock,
            link,
            page: 0,
            sa1: false,
            rswp_caps: RswpSupport::empty(),
            kinds: [DeviceKind::Unknown; 8],
        }
    }

    /// Power-on sequence: restore persisted settings, establish protection
    /// capabilities, then greet the host.
    pub fn boot(&mut self) {
        let fast = self.nvram.load(nvram::FEATURES_OFFSET) & nvram::FEATURE_FAST_CLOCK != 0;
        self.i2c.set_fast_clock(fast);
        self.rswp_caps = self.self_test();
        self.link.write(&[protocol::WELCOME]);
    }

    /// Service at most one command. Returns `false` when no opcode byte was
    /// waiting.
    pub fn poll(&mut self) -> bool {
        let opcode = match self.link.read_byte() {
            Some(b) => b,
            None => return false,
        };
        self.dispatch(opcode);
        true
    }

    fn dispatch(&mut self, opcode: u8) {
        let arg_len = match protocol::arg_len(opcode) {
            Some(n) => n,
            None => {
                self.link.write(&[protocol::UNKNOWN]);
                return;
            }
        };
        let mut args = [0u8; 4];
        if !self.read_frame(&mut args[..arg_len]) {
            // Partial frame: drop silently, the host will time out.
            return;
        }
        match opcode {
            protocol::CMD_TEST => self.link.write(&[protocol::WELCOME]),
            protocol::CMD_VERSION => self.link.write(FIRMWARE_VERSION),
            protocol::CMD_RSWP_REPORT => {
                let bits = self.rswp_caps.bits();
                self.link.write(&[bits]);
            }
            protocol::CMD_RSWP_RETEST => {
                self.rswp_caps = self.self_test();
                let bits = self.rswp_caps.bits();
                self.link.write(&[bits]);
            }
            protocol::CMD_SCAN_BUS => {
                let bitmap = self.scan_bitmap();
                self.link.write(&[bitmap]);
            }
            protocol::CMD_PROBE => {
                let ack = self.i2c.write(args[0], &[]);
                self.respond_bool(ack);
            }
            protocol::CMD_READ => self.cmd_read(args),
            protocol::CMD_WRITE => self.cmd_write(args),
            protocol::CMD_WRITE_PAGE => self.cmd_write_page(args),
            protocol::CMD_PIN => self.cmd_pin(args[0], args[1]),
            protocol::CMD_RSWP => self.cmd_rswp(args[0], args[1]),
            protocol::CMD_PSWP => self.cmd_pswp(args[0], args[1]),
            protocol::CMD_I2C_CLOCK => self.cmd_i2c_clock(args[0]),
            protocol::CMD_NAME => self.cmd_name(args[0]),
            protocol::CMD_DDR4_DETECT => {
                let found = self.detect_ddr4(args[0]);
                self.respond_bool(found);
            }
            protocol::CMD_DDR5_DETECT => {
                let found = self.detect_ddr5(args[0]);
                if found {
                    self.kinds[(args[0] & 0b111) as usize] = DeviceKind::Spd5Hub;
                }
                self.respond_bool(found);
            }
            protocol::CMD_FACTORY_RESET => {
                for offset in 0..nvram::REGION_END {
                    self.nvram.store(offset, 0);
                }
                self.link.write(&[protocol::SUCCESS]);
            }
            _ => self.link.write(&[protocol::UNKNOWN]),
        }
    }

    fn respond_bool(&mut self, ok: bool) {
        let b = if ok { protocol::SUCCESS } else { protocol::ERROR };
        self.link.write(&[b]);
    }

    /// Collect `buf.len()` argument bytes within the frame timeout.
    fn read_frame(&mut self, buf: &mut [u8]) -> bool {
        let start = self.clock.millis();
        let mut got = 0;
        while got < buf.len() {
            match self.link.read_byte() {
                Some(b) => {
                    buf[got] = b;
                    got += 1;
                }
                None => {
                    if self.clock.millis().wrapping_sub(start) >= FRAME_TIMEOUT_MS {
                        return false;
                    }
                    self.clock.delay_ms(1);
                }
            }
        }
        true
    }

    // ---- EEPROM access ----------------------------------------------------

    fn cmd_read(&mut self, args: [u8; 4]) {
        let addr = args[0];
        let offset = BigEndian::read_u16(&args[1..3]);
        let len = (args[3] as usize).min(protocol::READ_MAX);
        let mut buf = [0u8; protocol::READ_MAX];
        if !self.eeprom_read(addr, offset, &mut buf[..len]) {
            // Keep the frame aligned: a NACKed read answers with zero filler.
            buf = [protocol::ZERO; protocol::READ_MAX];
        }
        self.link.write(&buf[..len]);
    }

    fn cmd_write(&mut self, args: [u8; 4]) {
        let addr = args[0];
        let offset = BigEndian::read_u16(&args[1..3]);
        let ok = self.eeprom_write(addr, offset, &[args[3]]);
        self.respond_bool(ok);
    }

    fn cmd_write_page(&mut self, args: [u8; 4]) {
        let addr = args[0];
        let offset = BigEndian::read_u16(&args[1..3]);
        let len = args[3] as usize;
        if len == 0 || len > protocol::PAGE_WRITE_MAX {
            self.respond_bool(false);
            return;
        }
        let mut data = [0u8; protocol::PAGE_WRITE_MAX];
        if !self.read_frame(&mut data[..len]) {
            return;
        }
        let ok = self.eeprom_write(addr, offset, &data[..len]);
        self.respond_bool(ok);
    }

    fn eeprom_read(&mut self, addr: u8, offset: u16, buf: &mut [u8]) -> bool {
        let local = self.adjust_page(addr, offset);
        self.i2c.write_read(addr, &[local], buf)
    }

    fn eeprom_write(&mut self, addr: u8, offset: u16, data: &[u8]) -> bool {
        let local = self.adjust_page(addr, offset);
        let mut frame = [0u8; 1 + protocol::PAGE_WRITE_MAX];
        frame[0] = local;
        frame[1..1 + data.len()].copy_from_slice(data);
        let ack = self.i2c.write(addr, &frame[..1 + data.len()]);
        self.clock.delay_ms(WRITE_SETTLE_MS);
        ack
    }

    /// Steer the device's address window at `offset` and return the local
    /// (in-page) offset to put on the wire.
    ///
    /// DDR5 hubs are paged per device through MR11; everything else shares
    /// the bus-wide DDR4 page latch: offsets below 256 select page 0,
    /// 256..512 select page 1.
    fn adjust_page(&mut self, addr: u8, offset: u16) -> u8 {
        let slot = (addr & 0b111) as usize;
        if offset >= 256 && self.kinds[slot] == DeviceKind::Unknown {
            self.kinds[slot] = if self.detect_ddr5(addr) {
                DeviceKind::Spd5Hub
            } else {
                DeviceKind::Eeprom
            };
        }
        if self.kinds[slot] == DeviceKind::Spd5Hub {
            let page = (offset / spd5::PAGE_SIZE) as u8;
            self.i2c.write(addr, &[spd5::MR11, page]);
            return spd5::MEMREG | (offset % spd5::PAGE_SIZE) as u8;
        }
        let page = if offset < 256 { 0 } else { 1 };
        if page != self.page {
            self.set_page_address(page);
        }
        (offset & 0xFF) as u8
    }

    /// Broadcast SPA0/SPA1. Every EEPROM on the bus latches the new page, so
    /// the shadow tracks the whole bus, not one device.
    fn set_page_address(&mut self, page: u8) {
        let code = if page == 0 { dsc::SPA0 } else { dsc::SPA1 };
        // SPA is not acknowledged; the result is intentionally ignored.
        let _ = self.i2c.write(code, &[]);
        self.page = page;
    }

    // ---- Write protection -------------------------------------------------

    fn cmd_rswp(&mut self, block: u8, state: u8) {
        if block > 3 {
            self.link.write(&[protocol::ERROR]);
            return;
        }
        match state {
            protocol::GET => {
                let ack = self.i2c.read(dsc::SWP_READ[block as usize], &mut []);
                let protected = !ack;
                self.link.write(&[if protected {
                    protocol::SUCCESS
                } else {
                    protocol::ZERO
                }]);
            }
            0 => {
                let ok = self.rswp_clear();
                self.respond_bool(ok);
            }
            _ => {
                let ok = self.rswp_set(block);
                self.respond_bool(ok);
            }
        }
    }

    fn set_sa1(&mut self, high: bool) {
        self.pins.set_sa1(high);
        self.sa1 = high;
    }

    /// Assert 9 V on SA0, verify the rail came up, then issue the SWP
    /// device-select for the block. SA1 is held low during set.
    fn rswp_set(&mut self, block: u8) -> bool {
        if !self.high_voltage(true) {
            self.high_voltage(false);
            return false;
        }
        self.set_sa1(false);
        let ack = self.i2c.write(dsc::SWP[block as usize], &[]);
        self.high_voltage(false);
        ack
    }

    /// Clear protection for all blocks: CWP with SA1 high under 9 V.
    fn rswp_clear(&mut self) -> bool {
        if !self.high_voltage(true) {
            self.high_voltage(false);
            return false;
        }
        self.set_sa1(true);
        let ack = self.i2c.write(dsc::CWP, &[]);
        self.high_voltage(false);
        self.set_sa1(false);
        ack
    }

    /// Drive the 9 V generator and cross-check the feedback input after the
    /// rail has had time to move. Returns whether the observed state matches
    /// the request.
    fn high_voltage(&mut self, on: bool) -> bool {
        self.pins.set_high_voltage(on);
        self.clock.delay_ms(HV_SETTLE_MS);
        self.pins.high_voltage_feedback() == on
    }

    fn cmd_pswp(&mut self, addr: u8, state: u8) {
        let code = dsc::pswp(addr);
        match state {
            protocol::GET => {
                // One don't-care byte leaves the protection bit untouched;
                // ACK means the device is still writable.
                let ack = self.i2c.write(code, &[0]);
                self.link.write(&[if ack { protocol::ZERO } else { protocol::SUCCESS }]);
            }
            _ => {
                // Two don't-care bytes force the protection bit to zero,
                // setting permanent protection.
                let ack = self.i2c.write(code, &[0, 0]);
                self.clock.delay_ms(WRITE_SETTLE_MS);
                self.respond_bool(ack);
            }
        }
    }

    // ---- Pins, clock, name ------------------------------------------------

    fn cmd_pin(&mut self, pin_id: u8, state: u8) {
        match (pin_id, state) {
            (pin::HIGH_VOLTAGE, protocol::GET) => {
                let on = self.pins.high_voltage_feedback();
                self.link.write(&[if on { protocol::SUCCESS } else { protocol::ZERO }]);
            }
            (pin::HIGH_VOLTAGE, s) => {
                let ok = self.high_voltage(s != 0);
                self.respond_bool(ok);
            }
            (pin::SA1, protocol::GET) => {
                let b = if self.sa1 { protocol::SUCCESS } else { protocol::ZERO };
                self.link.write(&[b]);
            }
            (pin::SA1, s) => {
                self.set_sa1(s != 0);
                self.link.write(&[protocol::SUCCESS]);
            }
            (pin::OFFLINE_MODE, protocol::GET) => {
                let on = self.pins.offline_feedback();
                self.link.write(&[if on { protocol::SUCCESS } else { protocol::ZERO }]);
            }
            (pin::OFFLINE_MODE, s) => {
                self.pins.set_offline(s != 0);
                let ok = self.pins.offline_feedback() == (s != 0);
                self.respond_bool(ok);
            }
            _ => self.link.write(&[protocol::ERROR]),
        }
    }

    fn cmd_i2c_clock(&mut self, mode: u8) {
        match mode {
            protocol::GET => {
                let features = self.nvram.load(nvram::FEATURES_OFFSET);
                let fast = features & nvram::FEATURE_FAST_CLOCK != 0;
                self.link.write(&[if fast { protocol::SUCCESS } else { protocol::ZERO }]);
            }
            0 | 1 => {
                let mut features = self.nvram.load(nvram::FEATURES_OFFSET);
                if mode == 1 {
                    features |= nvram::FEATURE_FAST_CLOCK;
                } else {
                    features &= !nvram::FEATURE_FAST_CLOCK;
                }
                self.nvram.store(nvram::FEATURES_OFFSET, features);
                self.i2c.set_fast_clock(mode == 1);
                self.link.write(&[protocol::SUCCESS]);
            }
            _ => self.link.write(&[protocol::ERROR]),
        }
    }

    fn cmd_name(&mut self, mode_or_len: u8) {
        if mode_or_len == protocol::GET {
            let mut name = [0u8; protocol::NAME_MAX];
            for (i, slot) in name.iter_mut().enumerate() {
                *slot = self.nvram.load(nvram::NAME_OFFSET + i as u8);
            }
            self.link.write(&name);
            return;
        }
        let len = mode_or_len as usize;
        if len > protocol::NAME_MAX {
            // Drain the oversized payload to keep the stream aligned, then
            // reject it.
            let mut scratch = [0u8; 255];
            let _ = self.read_frame(&mut scratch[..len]);
            self.link.write(&[protocol::ERROR]);
            return;
        }
        let mut name = [0u8; protocol::NAME_MAX];
        if !self.read_frame(&mut name[..len]) {
            return;
        }
        for (i, b) in name.iter().enumerate() {
            self.nvram.store(nvram::NAME_OFFSET + i as u8, *b);
        }
        self.link.write(&[protocol::SUCCESS]);
    }

    // ---- Detection and self-test ------------------------------------------

    fn scan_bitmap(&mut self) -> u8 {
        let mut bitmap = 0u8;
        for i in 0..8 {
            if self.i2c.write(protocol::EEPROM_BASE_ADDRESS + i, &[]) {
                bitmap |= 1 << i;
            }
        }
        bitmap
    }

    /// DDR5 hubs expose their device type in MR0; the register file is
    /// selected by a first command byte with the MEMREG bit clear, so this
    /// read is harmless on plain EEPROMs.
    fn detect_ddr5(&mut self, addr: u8) -> bool {
        let mut mr0 = [0u8; 1];
        if !self.i2c.write_read(addr, &[spd5::MR0], &mut mr0) {
            return false;
        }
        spd5::DEVICE_TYPES.contains(&mr0[0])
    }

    /// DDR4 detection: RPA after SPA0 first, then the thermal-sensor device
    /// code, then a page-0/page-1 sample comparison for parts that support
    /// neither probe.
    fn detect_ddr4(&mut self, addr: u8) -> bool {
        self.set_page_address(0);
        if self.i2c.read(dsc::RPA, &mut []) {
            return true;
        }
        if self.i2c.write(dsc::thermal_sensor(addr), &[]) {
            return true;
        }
        // EEPROMs without the page latch mirror page 0; any mismatch means a
        // second page really exists.
        let mut p0 = [0u8; 16];
        let mut p1 = [0u8; 16];
        let mut found = false;
        for offset in (0u16..256).step_by(16) {
            self.set_page_address(0);
            let ok0 = self.i2c.write_read(addr, &[(offset & 0xFF) as u8], &mut p0);
            self.set_page_address(1);
            let ok1 = self.i2c.write_read(addr, &[(offset & 0xFF) as u8], &mut p1);
            if ok0 && ok1 && p0 != p1 {
                found = true;
                break;
            }
        }
        self.set_page_address(0);
        found
    }

    /// Establish which module generations this unit can write protect:
    /// a working offline relay covers DDR5, a working 9 V rail covers DDR4,
    /// and an SA1-sensitive bus covers DDR2/DDR3.
    fn self_test(&mut self) -> RswpSupport {
        self.pins.reset();
        let mut caps = RswpSupport::empty();

        self.pins.set_offline(true);
        if self.pins.offline_feedback() {
            caps |= RswpSupport::DDR5;
        }
        self.pins.set_offline(false);

        if self.high_voltage(true) {
            caps |= RswpSupport::DDR4;
        }
        self.high_voltage(false);

        let baseline = self.scan_bitmap();
        self.set_sa1(true);
        let shifted = self.scan_bitmap();
        self.set_sa1(false);
        if baseline != shifted {
            caps |= RswpSupport::DDR2 | RswpSupport::DDR3;
        }
        caps
    }
}
