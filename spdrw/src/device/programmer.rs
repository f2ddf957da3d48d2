//! The programmer client.
//!
//! Every method maps 1:1 onto a firmware opcode. The session owns the
//! transport exclusively; commands are strictly serialized because the wire
//! carries no interleaving frames. A timeout invalidates request/response
//! alignment, so the session marks itself closed and refuses further
//! commands until reopened.

use log::{debug, info, warn};
use nom::bytes::complete::take_while_m_n;
use nom::IResult;

use spdrw_fw::protocol as proto;
use spdrw_fw::protocol::RswpSupport;

use crate::device::{EepromLink, Transport};
use crate::{Result, SpdError};

/// Control pins reachable through the pin-control opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    OfflineMode,
    Sa1,
    HighVoltage,
}

impl Pin {
    fn id(self) -> u8 {
        match self {
            Pin::OfflineMode => proto::pin::OFFLINE_MODE,
            Pin::Sa1 => proto::pin::SA1,
            Pin::HighVoltage => proto::pin::HIGH_VOLTAGE,
        }
    }
}

/// A session with one programmer device.
pub struct Programmer<T: Transport> {
    transport: T,
    port: String,
    open: bool,
    /// Target EEPROM base address for convenience APIs, 0x50..=0x57.
    address: u8,
    /// Mirror of the firmware's DDR4 page shadow. `None` after another
    /// actor may have touched the bus (see [`Programmer::invalidate_page_cache`]).
    page: Option<u8>,
}

impl<T: Transport> Programmer<T> {
    /// Establish a session: the firmware transmits the welcome byte once it
    /// is ready, and nothing may be sent before it arrives.
    pub fn open(mut transport: T, port: impl Into<String>) -> Result<Self> {
        let port = port.into();
        let mut welcome = [0u8; 1];
        transport.recv_exact(&mut welcome)?;
        if welcome[0] != proto::WELCOME {
            return Err(SpdError::BadFrame);
        }
        info!("programmer on {} is ready", port);
        Ok(Programmer {
            transport,
            port,
            open: true,
            address: proto::EEPROM_BASE_ADDRESS,
            page: Some(0),
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    /// The mirrored DDR4 page shadow, if still trustworthy.
    pub fn cached_page(&self) -> Option<u8> {
        self.page
    }

    /// Forget the page shadow. Required whenever another transport may have
    /// broadcast SPA0/SPA1 on the same bus since our last command.
    pub fn invalidate_page_cache(&mut self) {
        self.page = None;
    }

    fn command(&mut self, opcode: u8, args: &[u8], response: &mut [u8]) -> Result<()> {
        if !self.open {
            return Err(SpdError::Closed);
        }
        let mut frame = Vec::with_capacity(1 + args.len());
        frame.push(opcode);
        frame.extend_from_slice(args);
        debug!("-> {:02X?}", frame);
        self.transport.send(&frame)?;
        match self.transport.recv_exact(response) {
            Ok(()) => {
                debug!("<- {:02X?}", response);
                Ok(())
            }
            Err(err) => {
                if err == SpdError::Timeout {
                    // Alignment is gone; everything after this would read
                    // stale bytes.
                    warn!("response timed out, closing session on {}", self.port);
                    self.open = false;
                }
                Err(err)
            }
        }
    }

    fn command1(&mut self, opcode: u8, args: &[u8]) -> Result<u8> {
        let mut response = [0u8; 1];
        self.command(opcode, args, &mut response)?;
        Ok(response[0])
    }

    fn expect_ack(byte: u8) -> Result<()> {
        match byte {
            proto::SUCCESS => Ok(()),
            proto::ERROR => Err(SpdError::Nack),
            proto::UNKNOWN => Err(SpdError::BadFrame),
            _ => Err(SpdError::BadFrame),
        }
    }

    /// Liveness check: the device echoes its welcome byte.
    pub fn test(&mut self) -> Result<bool> {
        Ok(self.command1(proto::CMD_TEST, &[])? == proto::WELCOME)
    }

    /// Firmware build date as an integer, `YYYYMMDD`.
    pub fn version(&mut self) -> Result<u32> {
        let mut response = [0u8; 8];
        self.command(proto::CMD_VERSION, &[], &mut response)?;
        let digits: IResult<&[u8], &[u8]> =
            take_while_m_n(8, 8, |b: u8| b.is_ascii_digit())(&response[..]);
        let (_, digits) = digits.map_err(|_| SpdError::BadFrame)?;
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(SpdError::BadFrame)
    }

    /// Presence bitmap for addresses 0x50..=0x57; bit i is 0x50 + i.
    pub fn scan(&mut self) -> Result<u8> {
        self.command1(proto::CMD_SCAN_BUS, &[])
    }

    pub fn scan_addresses(&mut self) -> Result<Vec<u8>> {
        let bitmap = self.scan()?;
        Ok((0..8)
            .filter(|i| bitmap >> i & 1 == 1)
            .map(|i| proto::EEPROM_BASE_ADDRESS + i)
            .collect())
    }

    pub fn probe(&mut self, addr: u8) -> Result<bool> {
        Ok(self.command1(proto::CMD_PROBE, &[addr])? == proto::SUCCESS)
    }

    /// Read `buf.len()` bytes from a flat offset. Requests are split so no
    /// wire read exceeds the firmware chunk limit or straddles a device page
    /// (128 bytes, the smaller of the DDR4 and DDR5 windows), and the page
    /// shadow mirror tracks the firmware's.
    pub fn read(&mut self, addr: u8, offset: u16, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let at = offset as usize + done;
            let page_room = 128 - at % 128;
            let len = (buf.len() - done).min(proto::READ_MAX).min(page_room);
            let args = [addr, (at >> 8) as u8, (at & 0xFF) as u8, len as u8];
            self.command(proto::CMD_READ, &args, &mut buf[done..done + len])?;
            if at < 512 {
                self.page = Some((at >= 256) as u8);
            }
            done += len;
        }
        Ok(())
    }

    pub fn write_byte(&mut self, addr: u8, offset: u16, value: u8) -> Result<()> {
        let args = [addr, (offset >> 8) as u8, (offset & 0xFF) as u8, value];
        let ack = self.command1(proto::CMD_WRITE, &args)?;
        if offset < 512 {
            self.page = Some((offset >= 256) as u8);
        }
        Self::expect_ack(ack)
    }

    /// Write up to one hardware page (16 bytes). The caller keeps the data
    /// inside a single page row; the EEPROM wraps otherwise.
    pub fn write_page(&mut self, addr: u8, offset: u16, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > proto::PAGE_WRITE_MAX {
            return Err(SpdError::Unsupported);
        }
        let mut args = Vec::with_capacity(4 + data.len());
        args.extend_from_slice(&[addr, (offset >> 8) as u8, (offset & 0xFF) as u8, data.len() as u8]);
        args.extend_from_slice(data);
        let mut response = [0u8; 1];
        self.command(proto::CMD_WRITE_PAGE, &args, &mut response)?;
        if offset < 512 {
            self.page = Some((offset >= 256) as u8);
        }
        Self::expect_ack(response[0])
    }

    pub fn set_pin(&mut self, pin: Pin, on: bool) -> Result<()> {
        let ack = self.command1(proto::CMD_PIN, &[pin.id(), on as u8])?;
        Self::expect_ack(ack)
    }

    pub fn pin_state(&mut self, pin: Pin) -> Result<bool> {
        match self.command1(proto::CMD_PIN, &[pin.id(), proto::GET])? {
            proto::SUCCESS => Ok(true),
            proto::ZERO => Ok(false),
            _ => Err(SpdError::BadFrame),
        }
    }

    /// Enable reversible write protection for one block. Valid blocks are
    /// 0..=3.
    pub fn rswp_set(&mut self, block: u8) -> Result<()> {
        if block > 3 {
            return Err(SpdError::Unsupported);
        }
        let ack = self.command1(proto::CMD_RSWP, &[block, 1])?;
        Self::expect_ack(ack)
    }

    /// Clear reversible write protection. The firmware clears every block;
    /// the block argument is immaterial.
    pub fn rswp_clear(&mut self) -> Result<()> {
        let ack = self.command1(proto::CMD_RSWP, &[0, 0])?;
        Self::expect_ack(ack)
    }

    /// Whether a block is currently protected.
    pub fn rswp_status(&mut self, block: u8) -> Result<bool> {
        if block > 3 {
            return Err(SpdError::Unsupported);
        }
        match self.command1(proto::CMD_RSWP, &[block, proto::GET])? {
            proto::SUCCESS => Ok(true),
            proto::ZERO => Ok(false),
            _ => Err(SpdError::BadFrame),
        }
    }

    /// Set permanent write protection. This cannot be undone.
    pub fn pswp_set(&mut self, addr: u8) -> Result<()> {
        let ack = self.command1(proto::CMD_PSWP, &[addr, 1])?;
        Self::expect_ack(ack)
    }

    /// Whether the device at `addr` is permanently protected.
    pub fn pswp_status(&mut self, addr: u8) -> Result<bool> {
        match self.command1(proto::CMD_PSWP, &[addr, proto::GET])? {
            proto::SUCCESS => Ok(true),
            proto::ZERO => Ok(false),
            _ => Err(SpdError::BadFrame),
        }
    }

    /// Select the bus clock: false = 100 kHz, true = 400 kHz. Persists in
    /// programmer NVRAM.
    pub fn set_fast_clock(&mut self, fast: bool) -> Result<()> {
        let ack = self.command1(proto::CMD_I2C_CLOCK, &[fast as u8])?;
        Self::expect_ack(ack)
    }

    pub fn fast_clock(&mut self) -> Result<bool> {
        match self.command1(proto::CMD_I2C_CLOCK, &[proto::GET])? {
            proto::SUCCESS => Ok(true),
            proto::ZERO => Ok(false),
            _ => Err(SpdError::BadFrame),
        }
    }

    /// The device's persistent name.
    pub fn name(&mut self) -> Result<String> {
        let mut response = [0u8; proto::NAME_MAX];
        self.command(proto::CMD_NAME, &[proto::GET], &mut response)?;
        let end = response.iter().position(|&b| b == 0).unwrap_or(response.len());
        Ok(String::from_utf8_lossy(&response[..end]).into_owned())
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > proto::NAME_MAX {
            return Err(SpdError::Unsupported);
        }
        let mut args = Vec::with_capacity(1 + bytes.len());
        args.push(bytes.len() as u8);
        args.extend_from_slice(bytes);
        let mut response = [0u8; 1];
        self.command(proto::CMD_NAME, &args, &mut response)?;
        Self::expect_ack(response[0])
    }

    /// Which module generations the device can write protect, from its last
    /// self-test.
    pub fn rswp_capabilities(&mut self) -> Result<RswpSupport> {
        let bits = self.command1(proto::CMD_RSWP_REPORT, &[])?;
        Ok(RswpSupport::from_bits_truncate(bits))
    }

    /// Re-run the self-test and report the fresh capability mask.
    pub fn retest_rswp(&mut self) -> Result<RswpSupport> {
        let bits = self.command1(proto::CMD_RSWP_RETEST, &[])?;
        Ok(RswpSupport::from_bits_truncate(bits))
    }

    pub fn detect_ddr4(&mut self, addr: u8) -> Result<bool> {
        let byte = self.command1(proto::CMD_DDR4_DETECT, &[addr])?;
        // Detection broadcasts SPA; the firmware parks the latch on page 0.
        self.page = Some(0);
        Ok(byte == proto::SUCCESS)
    }

    pub fn detect_ddr5(&mut self, addr: u8) -> Result<bool> {
        Ok(self.command1(proto::CMD_DDR5_DETECT, &[addr])? == proto::SUCCESS)
    }

    /// Clear the programmer's persistent settings.
    pub fn factory_reset(&mut self) -> Result<()> {
        let ack = self.command1(proto::CMD_FACTORY_RESET, &[])?;
        Self::expect_ack(ack)
    }
}

impl<T: Transport> EepromLink for Programmer<T> {
    fn read(&mut self, addr: u8, offset: u16, buf: &mut [u8]) -> Result<()> {
        Programmer::read(self, addr, offset, buf)
    }

    fn write_byte(&mut self, addr: u8, offset: u16, value: u8) -> Result<()> {
        Programmer::write_byte(self, addr, offset, value)
    }

    fn probe(&mut self, addr: u8) -> Result<bool> {
        Programmer::probe(self, addr)
    }

    fn scan(&mut self) -> Result<Vec<u8>> {
        self.scan_addresses()
    }

    fn max_transfer(&self) -> usize {
        proto::READ_MAX
    }

    fn max_spd_size(&self) -> usize {
        1024
    }

    fn clear_protection(&mut self) -> Result<()> {
        self.rswp_clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Transport;
    use std::collections::VecDeque;

    /// A transport that checks each outgoing frame against a script and
    /// feeds back the scripted response.
    struct Scripted {
        steps: VecDeque<(Vec<u8>, Vec<u8>)>,
        pending: VecDeque<u8>,
    }

    impl Scripted {
        fn new(steps: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
            Scripted {
                steps: steps.into(),
                pending: VecDeque::new(),
            }
        }

        fn with_welcome(steps: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
            let mut s = Scripted::new(steps);
            // The welcome arrives unprompted on connection.
            s.pending.push_back(proto::WELCOME);
            s
        }
    }

    impl Transport for Scripted {
        fn send(&mut self, bytes: &[u8]) -> crate::Result<()> {
            let (expect, reply) = self.steps.pop_front().expect("unexpected frame");
            assert_eq!(bytes, &expect[..], "frame mismatch");
            self.pending.extend(reply);
            Ok(())
        }

        fn recv_exact(&mut self, buf: &mut [u8]) -> crate::Result<()> {
            for slot in buf.iter_mut() {
                *slot = self.pending.pop_front().ok_or(SpdError::Timeout)?;
            }
            Ok(())
        }
    }

    fn open(steps: Vec<(Vec<u8>, Vec<u8>)>) -> Programmer<Scripted> {
        Programmer::open(Scripted::with_welcome(steps), "mock").unwrap()
    }

    #[test]
    fn open_requires_the_welcome_byte() {
        let mut t = Scripted::new(vec![]);
        t.pending.extend([0x55]);
        assert!(Programmer::open(t, "mock").is_err());
    }

    #[test]
    fn scan_decodes_the_bitmap() {
        let mut p = open(vec![(vec![b's'], vec![0b0000_0101])]);
        assert_eq!(p.scan_addresses().unwrap(), vec![0x50, 0x52]);
    }

    #[test]
    fn version_parses_eight_digits() {
        let mut p = open(vec![(vec![b'v'], b"20240301".to_vec())]);
        assert_eq!(p.version().unwrap(), 20_240_301);
    }

    #[test]
    fn version_rejects_garbage() {
        let mut p = open(vec![(vec![b'v'], b"2024030x".to_vec())]);
        assert_eq!(p.version(), Err(SpdError::BadFrame));
    }

    #[test]
    fn read_splits_on_chunk_and_page_boundaries() {
        // 40 bytes from 0xF0: 16 to the page edge, then 24 from 0x100.
        let mut p = open(vec![
            (vec![b'r', 0x50, 0x00, 0xF0, 16], vec![0xAA; 16]),
            (vec![b'r', 0x50, 0x01, 0x00, 24], vec![0xBB; 24]),
        ]);
        let mut buf = [0u8; 40];
        p.read(0x50, 0x00F0, &mut buf).unwrap();
        assert_eq!(&buf[..16], &[0xAA; 16]);
        assert_eq!(&buf[16..], &[0xBB; 24]);
        assert_eq!(p.cached_page(), Some(1));
    }

    #[test]
    fn write_byte_maps_nack() {
        let mut p = open(vec![(vec![b'w', 0x50, 0x00, 0x10, 0xAB], vec![proto::ERROR])]);
        assert_eq!(p.write_byte(0x50, 0x10, 0xAB), Err(SpdError::Nack));
    }

    #[test]
    fn write_page_rejects_empty_and_oversized_payloads() {
        let mut p = open(vec![]);
        assert_eq!(p.write_page(0x50, 0, &[]), Err(SpdError::Unsupported));
        assert_eq!(p.write_page(0x50, 0, &[0u8; 17]), Err(SpdError::Unsupported));
    }

    #[test]
    fn rswp_block_domain_checked_host_side() {
        let mut p = open(vec![]);
        assert_eq!(p.rswp_set(4), Err(SpdError::Unsupported));
        assert_eq!(p.rswp_status(4), Err(SpdError::Unsupported));
    }

    #[test]
    fn rswp_status_maps_enabled_and_disabled() {
        let mut p = open(vec![
            (vec![b'b', 2, b'?'], vec![proto::SUCCESS]),
            (vec![b'b', 2, b'?'], vec![proto::ZERO]),
        ]);
        assert!(p.rswp_status(2).unwrap());
        assert!(!p.rswp_status(2).unwrap());
    }

    #[test]
    fn name_round_trip() {
        let mut reply = vec![0u8; 16];
        reply[..4].copy_from_slice(b"spd1");
        let mut p = open(vec![
            (vec![b'n', 4, b's', b'p', b'd', b'1'], vec![proto::SUCCESS]),
            (vec![b'n', b'?'], reply),
        ]);
        p.set_name("spd1").unwrap();
        assert_eq!(p.name().unwrap(), "spd1");
    }

    #[test]
    fn capabilities_decode_the_bitmask() {
        let mut p = open(vec![(vec![b'f'], vec![0b1100])]);
        let caps = p.rswp_capabilities().unwrap();
        assert!(caps.contains(RswpSupport::DDR4 | RswpSupport::DDR5));
        assert!(!caps.contains(RswpSupport::DDR2));
    }

    #[test]
    fn timeout_poisons_the_session() {
        let mut p = open(vec![(vec![b's'], vec![])]);
        assert_eq!(p.scan(), Err(SpdError::Timeout));
        assert!(!p.is_open());
        // Every subsequent command is refused until reopen.
        assert_eq!(p.test(), Err(SpdError::Closed));
    }

    #[test]
    fn page_cache_invalidation() {
        let mut p = open(vec![]);
        assert_eq!(p.cached_page(), Some(0));
        p.invalidate_page_cache();
        assert_eq!(p.cached_page(), None);
    }
}
