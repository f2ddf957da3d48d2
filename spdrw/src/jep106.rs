//! JEP-106 manufacturer identification.
//!
//! A manufacturer is addressed by a continuation count (how many 0x7F bytes
//! precede the code in the original byte stream) and the code itself, which
//! carries an odd-parity bit in its most significant bit. First-generation
//! SPDs store the raw stream (bytes 64..=71); DDR3 and later store the
//! continuation count and code as a two-byte pair.

use std::fmt;

/// A decoded JEP-106 manufacturer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufacturerId {
    /// Number of continuation bytes, i.e. bank index minus one.
    pub continuation: u8,
    /// Identification code, parity bit included.
    pub code: u8,
}

impl ManufacturerId {
    pub fn new(continuation: u8, code: u8) -> Self {
        ManufacturerId { continuation, code }
    }

    /// Decode the two-byte form used by DDR3 and later: the first byte holds
    /// the continuation count under its own parity bit, the second the code.
    pub fn from_code_pair(count_byte: u8, code: u8) -> Self {
        ManufacturerId {
            continuation: count_byte & 0x7F,
            code,
        }
    }

    /// Decode the raw byte stream used by SDRAM/DDR/DDR2: leading 0x7F bytes
    /// are continuations, the first other byte is the code.
    pub fn from_stream(stream: &[u8]) -> Self {
        let continuation = stream.iter().take_while(|&&b| b == 0x7F).count() as u8;
        let code = stream
            .iter()
            .find(|&&b| b != 0x7F)
            .copied()
            .unwrap_or(0);
        ManufacturerId { continuation, code }
    }

    /// Re-encode as the DDR3+ two-byte pair, restoring odd parity over the
    /// continuation count.
    pub fn to_code_pair(self) -> (u8, u8) {
        let parity = (self.continuation.count_ones() & 1) == 0;
        let count_byte = if parity {
            self.continuation | 0x80
        } else {
            self.continuation
        };
        (count_byte, self.code)
    }

    /// Manufacturer name, when the (bank, code) pair is on file.
    pub fn name(self) -> Option<&'static str> {
        MANUFACTURERS
            .iter()
            .find(|&&(cont, code, _)| cont == self.continuation && code == self.code)
            .map(|&(_, _, name)| name)
    }
}

impl fmt::Display for ManufacturerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown ({}, 0x{:02X})", self.continuation, self.code),
        }
    }
}

/// (continuation count, code with parity, name). A working subset of the
/// JEP-106 banks; DRAM module and die vendors only.
#[rustfmt::skip]
static MANUFACTURERS: &[(u8, u8, &str)] = &[
    // Bank 1
    (0, 0x01, "AMD"),
    (0, 0x04, "Fujitsu"),
    (0, 0x07, "Hitachi"),
    (0, 0x10, "NEC"),
    (0, 0x15, "Philips Semiconductors"),
    (0, 0x1C, "Mitsubishi"),
    (0, 0x2C, "Micron Technology"),
    (0, 0x40, "ProMOS/Mosel Vitelic"),
    (0, 0x62, "Sanyo"),
    (0, 0x89, "Intel"),
    (0, 0x97, "Texas Instruments"),
    (0, 0xAD, "SK Hynix"),
    (0, 0xB0, "Sharp"),
    (0, 0xB3, "IDT"),
    (0, 0xC1, "Infineon"),
    (0, 0xCE, "Samsung"),
    (0, 0xDA, "Winbond Electronics"),
    (0, 0xE0, "LG Semiconductor"),
    (0, 0x3D, "Tektronix"),
    // Bank 2
    (1, 0x94, "Smart Modular"),
    (1, 0x98, "Kingston"),
    (1, 0xA8, "US Modular"),
    (1, 0xBA, "PNY Technologies"),
    (1, 0xC5, "SpecTek Incorporated"),
    (1, 0x7A, "Apacer Technology"),
    (1, 0x9B, "Crosscom"),
    // Bank 3
    (2, 0x0B, "Nanya Technology"),
    (2, 0x9E, "Corsair"),
    (2, 0xC8, "Agilent Technologies"),
    (2, 0xFE, "Elpida"),
    // Bank 4
    (3, 0x0B, "Mushkin Enhanced Memory"),
    (3, 0x25, "Kingmax Semiconductor"),
    (3, 0xB0, "OCZ Technology"),
    (3, 0xCB, "A-DATA Technology"),
    (3, 0xEF, "Team Group"),
    // Bank 5
    (4, 0x51, "Qimonda"),
    (4, 0xB0, "Patriot Memory (PDP Systems)"),
    (4, 0xCD, "G.Skill"),
    (4, 0xBA, "Virtium Technology"),
    // Bank 6
    (5, 0x02, "Netlist"),
    (5, 0x9B, "Crucial Technology"),
    (5, 0x51, "Qimonda AG"),
    (5, 0xF7, "Avant Technology"),
    // Bank 7
    (6, 0x16, "Montage Technology Group"),
    (6, 0x43, "Ramaxel Technology"),
    (6, 0x94, "ATP Electronics"),
    // Bank 8
    (7, 0x28, "Gigaram"),
    (7, 0x57, "Essencore Limited"),
    (7, 0x32, "CXMT"),
    // Bank 9
    (8, 0x1B, "ASint Technology"),
    (8, 0xC8, "Golden Empire"),
    // Bank 10
    (9, 0x13, "Biwin Semiconductor"),
    (9, 0xD6, "Lexar Co Limited"),
];
