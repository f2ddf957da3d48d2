//! Hardware abstraction traits the firmware engine is generic over.
//!
//! A board port supplies one implementation of each. The engine never talks
//! to hardware directly, which also lets the command machine run on the host
//! against mock implementations in tests.

/// Master-mode access to the module bus.
///
/// All addresses are 7-bit device-select codes. Every call performs a
/// complete transaction (start, address, payload, stop) and reports whether
/// the target acknowledged its address.
pub trait I2cPort {
    /// Address the device for writing and send `bytes`. An empty `bytes`
    /// degenerates to a pure address probe.
    fn write(&mut self, addr: u8, bytes: &[u8]) -> bool;

    /// Address the device for reading and fill `buf`. An empty `buf`
    /// degenerates to a pure address probe in read mode.
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> bool;

    /// Combined write-then-read with a repeated start in between.
    fn write_read(&mut self, addr: u8, out: &[u8], buf: &mut [u8]) -> bool;

    /// Switch the bus clock between standard (100 kHz) and fast (400 kHz).
    fn set_fast_clock(&mut self, fast: bool);
}

/// The programmer's control lines.
pub trait ControlPins {
    /// Drive the 9 V generator enable on SA0.
    fn set_high_voltage(&mut self, on: bool);
    /// Feedback input sensing the actual 9 V rail state.
    fn high_voltage_feedback(&self) -> bool;

    /// Drive the SA1 select line.
    fn set_sa1(&mut self, high: bool);

    /// Drive the DDR5 offline-mode relay, isolating the local bus from the
    /// system SMBus.
    fn set_offline(&mut self, on: bool);
    /// Feedback input sensing the relay state.
    fn offline_feedback(&self) -> bool;

    /// Return every line to its idle state.
    fn reset(&mut self);
}

/// Byte-addressable persistent settings storage.
pub trait Nvram {
    fn load(&self, offset: u8) -> u8;
    fn store(&mut self, offset: u8, value: u8);
}

/// Time source for settle delays and frame timeouts.
pub trait Clock {
    fn millis(&self) -> u32;
    fn delay_ms(&mut self, ms: u32);
}

/// The byte stream to the host.
pub trait SerialLink {
    /// Non-blocking read of the next received byte.
    fn read_byte(&mut self) -> Option<u8>;
    /// Queue response bytes for transmission.
    fn write(&mut self, bytes: &[u8]);
}
