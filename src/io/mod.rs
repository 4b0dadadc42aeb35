//! Checked readers for the MySQL length-encoded wire primitives.

use bytes::{Buf, Bytes};
use bytestring::ByteString;

use crate::error::{err_protocol, Result};

/// Extends [`Bytes`] with the length-encoded integer and string encodings
/// used throughout the MySQL protocol.
///
/// <https://dev.mysql.com/doc/internals/en/integer.html#packet-Protocol::LengthEncodedInteger>
///
/// Every reader checks the remaining length first; a truncated buffer is a
/// protocol error, never a panic. Packets reach the proxy from both clients
/// and backends, so nothing here trusts the peer.
pub trait BufExt: Buf {
    /// Read a length-encoded integer.
    fn get_uint_lenenc(&mut self) -> Result<u64>;

    /// Read a length-encoded byte sequence.
    fn get_bytes_lenenc(&mut self) -> Result<Bytes>;

    /// Read a length-encoded string, validated as UTF-8.
    fn get_str_lenenc(&mut self) -> Result<ByteString>;
}

impl BufExt for Bytes {
    fn get_uint_lenenc(&mut self) -> Result<u64> {
        if self.remaining() < 1 {
            return Err(err_protocol!("unexpected end of packet in length-encoded integer"));
        }

        Ok(match self.get_u8() {
            0xfc => {
                check_remaining(self, 2)?;
                u64::from(self.get_u16_le())
            }

            0xfd => {
                check_remaining(self, 3)?;
                self.get_uint_le(3)
            }

            0xfe => {
                check_remaining(self, 8)?;
                self.get_u64_le()
            }

            v => u64::from(v),
        })
    }

    fn get_bytes_lenenc(&mut self) -> Result<Bytes> {
        let size = self.get_uint_lenenc()?;
        let size = usize::try_from(size)
            .map_err(|_| err_protocol!("string length overflows usize: {}", size))?;

        check_remaining(self, size)?;

        Ok(self.split_to(size))
    }

    fn get_str_lenenc(&mut self) -> Result<ByteString> {
        let bytes = self.get_bytes_lenenc()?;

        ByteString::try_from(bytes).map_err(|_| err_protocol!("string is not valid UTF-8"))
    }
}

fn check_remaining(buf: &Bytes, size: usize) -> Result<()> {
    if buf.remaining() < size {
        return Err(err_protocol!(
            "expected {} more bytes but only {} remain",
            size,
            buf.remaining()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::BufExt;

    #[test]
    fn test_uint_lenenc_one_byte() {
        let mut buf = Bytes::from_static(&[0xfa]);
        assert_eq!(buf.get_uint_lenenc().unwrap(), 250);
    }

    #[test]
    fn test_uint_lenenc_two_bytes() {
        let mut buf = Bytes::from_static(&[0xfc, 0x10, 0x27]);
        assert_eq!(buf.get_uint_lenenc().unwrap(), 10_000);
    }

    #[test]
    fn test_uint_lenenc_three_bytes() {
        let mut buf = Bytes::from_static(&[0xfd, 0x40, 0x42, 0x0f]);
        assert_eq!(buf.get_uint_lenenc().unwrap(), 1_000_000);
    }

    #[test]
    fn test_uint_lenenc_eight_bytes() {
        let mut buf = Bytes::from_static(&[0xfe, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(buf.get_uint_lenenc().unwrap(), 1);
    }

    #[test]
    fn test_uint_lenenc_truncated() {
        let mut buf = Bytes::from_static(&[0xfc, 0x10]);
        assert!(buf.get_uint_lenenc().is_err());
    }

    #[test]
    fn test_str_lenenc() {
        let mut buf = Bytes::from_static(b"\x05hello");
        assert_eq!(&*buf.get_str_lenenc().unwrap(), "hello");
    }

    #[test]
    fn test_str_lenenc_truncated() {
        let mut buf = Bytes::from_static(b"\x09hello");
        assert!(buf.get_str_lenenc().is_err());
    }

    #[test]
    fn test_str_lenenc_invalid_utf8() {
        let mut buf = Bytes::from_static(&[0x02, 0xff, 0xfe]);
        assert!(buf.get_str_lenenc().is_err());
    }
}
