//! Binary command sets
//!
//! Pre-encoded command lists as they come out of the panel's property data:
//!
//! ```text
//! +-------+------+----+-----+---------+-----------+----------------+
//! | dtype | last | vc | ack | wait ms | dlen (BE) | payload[dlen]  |
//! |  u8   |  u8  | u8 | u8  |   u8    |    u16    |                |
//! +-------+------+----+-----+---------+-----------+----------------+
//! ```
//!
//! Virtual channel and ack request are handled by the transport and are
//! not kept. Every binary command is static.

use std::vec::Vec;

use panel_platform::{DataType, Descriptor};

use crate::error::ScriptError;
use crate::fragment::CommandDescriptor;

/// Header bytes preceding each payload.
pub const HEADER_LEN: usize = 7;

/// Split `bytes` into commands.
pub fn parse(key: &str, bytes: &[u8]) -> Result<Vec<CommandDescriptor>, ScriptError> {
    let overrun = |offset| ScriptError::Overrun {
        key: key.into(),
        offset,
    };

    let mut commands = Vec::new();
    let mut rest = bytes;
    let mut offset = 0usize;
    while !rest.is_empty() {
        let header = rest.get(..HEADER_LEN).ok_or_else(|| overrun(offset))?;
        let &[dtype, last, _vc, _ack, wait, len_hi, len_lo] = header else {
            return Err(overrun(offset));
        };
        let data_type = DataType::from_u8(dtype).ok_or_else(|| ScriptError::UnknownDataType {
            key: key.into(),
            data_type: dtype,
        })?;
        let dlen = usize::from(u16::from_be_bytes([len_hi, len_lo]));
        let end = HEADER_LEN.checked_add(dlen).ok_or_else(|| overrun(offset))?;
        let payload = rest.get(HEADER_LEN..end).ok_or_else(|| overrun(offset))?;

        let mut descriptor = Descriptor::write(data_type, payload.to_vec());
        descriptor.wait_ms = u32::from(wait);
        descriptor.last = last != 0;
        commands.push(CommandDescriptor::fixed(descriptor));

        rest = rest.get(end..).unwrap_or_default();
        offset = offset.saturating_add(end);
    }
    Ok(commands)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn two_commands() {
        let bytes = [
            0x39, 0, 0, 0, 0, 0, 3, 0xF0, 0x5A, 0x5A, //
            0x05, 1, 0, 0, 120, 0, 1, 0x11,
        ];
        let commands = parse("k", &bytes).expect("well formed");
        assert_eq!(commands.len(), 2);
        let first = commands.first().expect("first").descriptor();
        assert_eq!(first.data_type, DataType::DcsLongWrite);
        assert_eq!(first.payload, [0xF0, 0x5A, 0x5A]);
        assert!(!first.last);
        let second = commands.get(1).expect("second").descriptor();
        assert_eq!(second.wait_ms, 120);
        assert!(second.last);
    }

    #[test]
    fn payload_past_end_is_overrun() {
        let bytes = [0x39, 0, 0, 0, 0, 0, 4, 0xF0, 0x5A];
        assert_eq!(
            parse("k", &bytes),
            Err(ScriptError::Overrun {
                key: "k".into(),
                offset: 0
            })
        );
    }

    #[test]
    fn trailing_partial_header_is_overrun() {
        let bytes = [0x05, 1, 0, 0, 0, 0, 1, 0x29, 0x05, 1];
        assert!(matches!(
            parse("k", &bytes),
            Err(ScriptError::Overrun { offset: 8, .. })
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(matches!(
            parse("k", &[0x7F, 0, 0, 0, 0, 0, 0]),
            Err(ScriptError::UnknownDataType { data_type: 0x7F, .. })
        ));
    }

    #[test]
    fn empty_data_is_empty_set() {
        assert_eq!(parse("k", &[]), Ok(Vec::new()));
    }
}
