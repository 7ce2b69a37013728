//! MIPI-DSI command descriptors as handed to the bus transport.
//!
//! A [`Descriptor`] is one physical command unit: data type, payload bytes,
//! post-command wait and the "last packet" marker that closes a batched
//! burst. The engine builds these; the transport only consumes them.

use alloc::vec::Vec;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// MIPI-DSI packet data types used by panel command sets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataType {
    /// Generic short write, no parameters.
    GenericShortWrite0 = 0x03,
    /// Generic read, no parameters.
    GenericRead0 = 0x04,
    /// DCS short write, no parameters (command byte only).
    DcsShortWrite = 0x05,
    /// DCS read.
    DcsRead = 0x06,
    /// Generic short write, one parameter.
    GenericShortWrite1 = 0x13,
    /// Generic read, one parameter.
    GenericRead1 = 0x14,
    /// DCS short write with one parameter.
    DcsShortWriteParam = 0x15,
    /// Generic short write, two parameters.
    GenericShortWrite2 = 0x23,
    /// Generic read, two parameters.
    GenericRead2 = 0x24,
    /// Generic long write.
    GenericLongWrite = 0x29,
    /// Set maximum return packet size.
    MaxReturnSize = 0x37,
    /// DCS long write.
    DcsLongWrite = 0x39,
}

/// Coarse classification of a [`DataType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandClass {
    /// Short (single packet) write.
    ShortWrite,
    /// Long write; batches with neighbouring long writes.
    LongWrite,
    /// Read request.
    Read,
}

impl DataType {
    /// Decode a raw header byte.
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0x03 => Self::GenericShortWrite0,
            0x04 => Self::GenericRead0,
            0x05 => Self::DcsShortWrite,
            0x06 => Self::DcsRead,
            0x13 => Self::GenericShortWrite1,
            0x14 => Self::GenericRead1,
            0x15 => Self::DcsShortWriteParam,
            0x23 => Self::GenericShortWrite2,
            0x24 => Self::GenericRead2,
            0x29 => Self::GenericLongWrite,
            0x37 => Self::MaxReturnSize,
            0x39 => Self::DcsLongWrite,
            _ => return None,
        })
    }

    /// Raw header byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Which class of command this type belongs to.
    pub fn class(self) -> CommandClass {
        match self {
            Self::GenericLongWrite | Self::DcsLongWrite => CommandClass::LongWrite,
            Self::GenericRead0 | Self::GenericRead1 | Self::GenericRead2 | Self::DcsRead => {
                CommandClass::Read
            }
            Self::GenericShortWrite0
            | Self::GenericShortWrite1
            | Self::GenericShortWrite2
            | Self::DcsShortWrite
            | Self::DcsShortWriteParam
            | Self::MaxReturnSize => CommandClass::ShortWrite,
        }
    }

    /// `true` for generic and DCS long writes.
    pub fn is_long_write(self) -> bool {
        self.class() == CommandClass::LongWrite
    }

    /// `true` for any read request.
    pub fn is_read(self) -> bool {
        self.class() == CommandClass::Read
    }
}

// ---------------------------------------------------------------------------
// Transmission speed
// ---------------------------------------------------------------------------

/// Link mode a command set is transmitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmissionSpeed {
    /// Low-power escape mode.
    #[default]
    LowPower,
    /// High-speed mode.
    HighSpeed,
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// One physical command unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Packet data type.
    pub data_type: DataType,
    /// Payload bytes; for reads, the register address.
    pub payload: Vec<u8>,
    /// Wait after this command, in milliseconds.
    pub wait_ms: u32,
    /// Wait after this command, in frames.
    pub wait_frames: u32,
    /// Bytes expected back (reads only).
    pub rx_len: u8,
    /// Global-parameter offset applied before a read.
    pub rx_offset: u16,
    /// Closes the current burst when set.
    pub last: bool,
}

impl Descriptor {
    /// Build a write descriptor with no wait and `last` cleared.
    pub fn write(data_type: DataType, payload: Vec<u8>) -> Self {
        Self {
            data_type,
            payload,
            wait_ms: 0,
            wait_frames: 0,
            rx_len: 0,
            rx_offset: 0,
            last: false,
        }
    }

    /// Build a read descriptor for `addr` expecting `rx_len` bytes.
    pub fn read(data_type: DataType, addr: u8, rx_len: u8) -> Self {
        let mut payload = Vec::with_capacity(1);
        payload.push(addr);
        Self {
            data_type,
            payload,
            wait_ms: 0,
            wait_frames: 0,
            rx_len,
            rx_offset: 0,
            last: true,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn data_type_round_trips_known_bytes() {
        for raw in [0x03u8, 0x04, 0x05, 0x06, 0x13, 0x14, 0x15, 0x23, 0x24, 0x29, 0x37, 0x39] {
            let ty = DataType::from_u8(raw).expect("known data type");
            assert_eq!(ty.as_u8(), raw);
        }
        assert_eq!(DataType::from_u8(0x00), None);
        assert_eq!(DataType::from_u8(0xFF), None);
    }

    #[test]
    fn long_writes_classified() {
        assert!(DataType::GenericLongWrite.is_long_write());
        assert!(DataType::DcsLongWrite.is_long_write());
        assert!(!DataType::DcsShortWrite.is_long_write());
        assert!(DataType::DcsRead.is_read());
        assert_eq!(DataType::DcsShortWriteParam.class(), CommandClass::ShortWrite);
    }

    #[test]
    fn read_descriptor_is_last_by_default() {
        let d = Descriptor::read(DataType::DcsRead, 0xA1, 4);
        assert!(d.last);
        assert_eq!(d.payload, [0xA1]);
        assert_eq!(d.rx_len, 4);
    }
}
