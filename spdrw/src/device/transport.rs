//! Byte-stream transport to the programmer.
//!
//! The wire protocol itself lives in `spdrw_fw::protocol`; this module only
//! moves bytes. [`StreamTransport`] adapts anything that reads and writes
//! (a serial port, an in-memory mock) and [`open_serial`] configures a real
//! port the way the programmer expects it: 115200 8N1, no flow control.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::{Result, SpdError};

/// Framed byte exchange with the device: requests go out whole, responses
/// are read to exact length. Deadline handling belongs to the underlying
/// stream; expiry surfaces as [`SpdError::Timeout`].
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// [`Transport`] over any blocking reader/writer.
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: Read + Write> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        StreamTransport { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut got = 0;
        while got < buf.len() {
            let n = self.stream.read(&mut buf[got..])?;
            if n == 0 {
                return Err(SpdError::Closed);
            }
            got += n;
        }
        Ok(())
    }
}

/// Open and configure a serial port for programmer traffic. `timeout` is
/// the session deadline applied to every read.
pub fn open_serial(
    path: &Path,
    timeout: Duration,
) -> Result<StreamTransport<serial::SystemPort>> {
    use serial::core::{
        BaudRate, CharSize, FlowControl, Parity, SerialDevice, SerialPortSettings, StopBits,
    };

    let mut port = serial::open(path).map_err(into_io)?;
    let mut settings = port.read_settings().map_err(into_io)?;
    settings
        .set_baud_rate(BaudRate::Baud115200)
        .map_err(into_io)?;
    settings.set_char_size(CharSize::Bits8);
    settings.set_parity(Parity::ParityNone);
    settings.set_stop_bits(StopBits::Stop1);
    settings.set_flow_control(FlowControl::FlowNone);
    port.write_settings(&settings).map_err(into_io)?;
    port.set_timeout(timeout).map_err(into_io)?;
    debug!("opened {} at 115200 8N1, timeout {:?}", path.display(), timeout);
    Ok(StreamTransport::new(port))
}

fn into_io(err: serial::Error) -> SpdError {
    SpdError::from(io::Error::from(err))
}
