//! # Trap Payload Decoding
//!
//! The wire format of a trap's data details belongs to the transport, so the
//! resolver only talks to the [`TrapPayloadDecoder`] seam and asks for the
//! fields it needs for a given trap kind.
//!
//! [`StlPayloadDecoder`] is the reference implementation. It reads the
//! big-endian layouts below; every multi-byte field is network order.
//!
//! | view               | layout                                        | bytes |
//! |--------------------|-----------------------------------------------|-------|
//! | GID                | subnet prefix u64, interface id u64           | 16    |
//! | LID (+ port)       | lid u32, [port u8]                            | 4–5   |
//! | switch pkey record | lid1 u32, lid2 u32, pkey u16, sl u8, port u8  | 12    |
//! | sys-guid change    | new system image guid u64, lid u32            | 12    |

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::model::topology::{Gid, Guid, Lid};

/// Failure to read a field out of a trap payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload truncated: {field} needs {needed} bytes, got {got}")]
    /// The payload ends before `field` does.
    Truncated {
        /// Name of the field being read.
        field: &'static str,
        /// Bytes required up to the end of that field.
        needed: usize,
        /// Bytes actually present.
        got: usize,
    },
}

/// Sub-record of a switch bad-pkey trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPKeyRecord {
    /// Switch that saw the bad key.
    pub lid1: Lid,
    /// Requester on the other side.
    pub lid2: Lid,
    /// Offending partition key.
    pub pkey: u16,
    /// Service level of the packet.
    pub sl: u8,
    /// Switch port the packet arrived on.
    pub port: u8,
}

/// Sub-record of a changed system image GUID trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysGuidChange {
    /// The new system image GUID.
    pub system_image_guid: Guid,
    /// Node whose GUID changed.
    pub lid: Lid,
}

/// Field-level access to a trap payload.
pub trait TrapPayloadDecoder: Send + Sync {
    /// The GID carried by GID in/out of service traps.
    fn decode_gid(&self, payload: &[u8]) -> Result<Gid, DecodeError>;

    /// The LID at the start of a LID-style payload.
    fn decode_lid(&self, payload: &[u8]) -> Result<Lid, DecodeError>;

    /// Port number following the LID, when the trap carries one.
    fn decode_port(&self, payload: &[u8]) -> Option<u8>;

    /// The switch bad-pkey sub-record.
    fn decode_switch_pkey(&self, payload: &[u8]) -> Result<SwitchPKeyRecord, DecodeError>;

    /// The system image GUID change sub-record.
    fn decode_sys_guid_change(&self, payload: &[u8]) -> Result<SysGuidChange, DecodeError>;
}

/// Big-endian decoder for the layouts in the table above.
#[derive(Debug, Clone, Copy, Default)]
pub struct StlPayloadDecoder;

const GID_LEN: usize = 16;
const LID_LEN: usize = 4;
const SWITCH_PKEY_LEN: usize = 12;
const SYS_GUID_LEN: usize = 12;

fn ensure(field: &'static str, payload: &[u8], needed: usize) -> Result<(), DecodeError> {
    if payload.len() < needed {
        return Err(DecodeError::Truncated { field, needed, got: payload.len() });
    }
    Ok(())
}

impl TrapPayloadDecoder for StlPayloadDecoder {
    fn decode_gid(&self, payload: &[u8]) -> Result<Gid, DecodeError> {
        ensure("gid", payload, GID_LEN)?;
        let mut buf = payload;
        let subnet_prefix = buf.get_u64();
        let interface_id = Guid(buf.get_u64());
        Ok(Gid { subnet_prefix, interface_id })
    }

    fn decode_lid(&self, payload: &[u8]) -> Result<Lid, DecodeError> {
        ensure("lid", payload, LID_LEN)?;
        let mut buf = payload;
        Ok(Lid(buf.get_u32()))
    }

    fn decode_port(&self, payload: &[u8]) -> Option<u8> {
        payload.get(LID_LEN).copied()
    }

    fn decode_switch_pkey(&self, payload: &[u8]) -> Result<SwitchPKeyRecord, DecodeError> {
        ensure("switch pkey record", payload, SWITCH_PKEY_LEN)?;
        let mut buf = payload;
        Ok(SwitchPKeyRecord {
            lid1: Lid(buf.get_u32()),
            lid2: Lid(buf.get_u32()),
            pkey: buf.get_u16(),
            sl: buf.get_u8(),
            port: buf.get_u8(),
        })
    }

    fn decode_sys_guid_change(&self, payload: &[u8]) -> Result<SysGuidChange, DecodeError> {
        ensure("sys guid change", payload, SYS_GUID_LEN)?;
        let mut buf = payload;
        Ok(SysGuidChange {
            system_image_guid: Guid(buf.get_u64()),
            lid: Lid(buf.get_u32()),
        })
    }
}

/// Payload builders matching [`StlPayloadDecoder`]'s layouts. Used by fixtures
/// and by transports that synthesize notices.
pub mod encode {
    use super::*;

    /// 16-byte GID payload.
    pub fn gid(gid: Gid) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(GID_LEN);
        buf.put_u64(gid.subnet_prefix);
        buf.put_u64(gid.interface_id.0);
        buf.to_vec()
    }

    /// LID payload, with a trailing port byte when `port` is set.
    pub fn lid(lid: Lid, port: Option<u8>) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(LID_LEN + 1);
        buf.put_u32(lid.0);
        if let Some(port) = port {
            buf.put_u8(port);
        }
        buf.to_vec()
    }

    /// 12-byte switch bad-pkey payload.
    pub fn switch_pkey(record: SwitchPKeyRecord) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SWITCH_PKEY_LEN);
        buf.put_u32(record.lid1.0);
        buf.put_u32(record.lid2.0);
        buf.put_u16(record.pkey);
        buf.put_u8(record.sl);
        buf.put_u8(record.port);
        buf.to_vec()
    }

    /// 12-byte system image GUID change payload.
    pub fn sys_guid_change(change: SysGuidChange) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SYS_GUID_LEN);
        buf.put_u64(change.system_image_guid.0);
        buf.put_u32(change.lid.0);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_gid() {
        let gid = Gid { subnet_prefix: 0xfe80_0000_0000_0000, interface_id: Guid(0x0011_7501_0102_0304) };
        let decoded = StlPayloadDecoder.decode_gid(&encode::gid(gid)).unwrap();
        assert_eq!(decoded, gid);
    }

    #[test]
    fn test_decode_lid_with_and_without_port() {
        let with_port = encode::lid(Lid(0x2a), Some(17));
        assert_eq!(with_port, vec![0, 0, 0, 0x2a, 17]);
        assert_eq!(StlPayloadDecoder.decode_lid(&with_port).unwrap(), Lid(0x2a));
        assert_eq!(StlPayloadDecoder.decode_port(&with_port), Some(17));

        let bare = encode::lid(Lid(5), None);
        assert_eq!(StlPayloadDecoder.decode_port(&bare), None);
    }

    #[test]
    fn test_decode_switch_pkey_fields() {
        let bytes = vec![0, 0, 0, 7, 0, 0, 0, 9, 0x80, 0x01, 3, 12];
        let record = StlPayloadDecoder.decode_switch_pkey(&bytes).unwrap();
        assert_eq!(record.lid1, Lid(7));
        assert_eq!(record.lid2, Lid(9));
        assert_eq!(record.pkey, 0x8001);
        assert_eq!(record.sl, 3);
        assert_eq!(record.port, 12);
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let err = StlPayloadDecoder.decode_gid(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { field: "gid", needed: 16, got: 3 });
        assert!(StlPayloadDecoder.decode_lid(&[]).is_err());
        assert!(StlPayloadDecoder.decode_sys_guid_change(&[0; 11]).is_err());
    }
}
