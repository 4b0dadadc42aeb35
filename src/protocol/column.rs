use bytes::{Buf, Bytes};
use bytestring::ByteString;

use crate::error::{err_protocol, Result};
use crate::io::BufExt;

bitflags::bitflags! {
    /// <https://mariadb.com/kb/en/result-set-packets/#column-details-flag>
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColumnFlags: u16 {
        /// Field can't be `NULL`.
        const NOT_NULL = 1;

        /// Field is part of a primary key.
        const PRIMARY_KEY = 2;

        /// Field is part of a unique key.
        const UNIQUE_KEY = 4;

        /// Field is part of a multi-part unique or primary key.
        const MULTIPLE_KEY = 8;

        /// Field is a blob.
        const BLOB = 16;

        /// Field is unsigned.
        const UNSIGNED = 32;

        /// Field is zero filled.
        const ZEROFILL = 64;

        /// Field has a binary collation.
        const BINARY_COLLATION = 128;

        /// Field is an enumeration.
        const ENUM = 256;

        /// Field is an auto-increment field.
        const AUTO_INCREMENT = 512;

        /// Field is a timestamp.
        const TIMESTAMP = 1024;

        /// Field is a set.
        const SET = 2048;

        /// Field does not have a default value.
        const NO_DEFAULT_VALUE = 4096;

        /// Field is set to NOW on UPDATE.
        const ON_UPDATE_NOW = 8192;

        /// Field is a number.
        const NUM = 32768;
    }
}

/// Describes one column of a prepared statement's result set.
///
/// Decoded from the column-definition packets that follow
/// COM_STMT_PREPARE_OK and retained verbatim in the statement registry so
/// the proxy can answer later prepares from the cache without touching a
/// backend.
///
/// <https://dev.mysql.com/doc/internals/en/com-query-response.html#packet-Protocol::ColumnDefinition>
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub schema: ByteString,
    pub table_alias: ByteString,
    pub table: ByteString,
    pub alias: ByteString,
    pub name: ByteString,
    pub charset: u16,
    pub max_size: u32,
    pub ty: u8,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl ColumnDefinition {
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let catalog = buf.get_str_lenenc()?;

        // we are told that this is always "def"
        if &*catalog != "def" {
            return Err(err_protocol!("expected catalog \"def\" but found {:?}", &*catalog));
        }

        let schema = buf.get_str_lenenc()?;
        let table_alias = buf.get_str_lenenc()?;
        let table = buf.get_str_lenenc()?;
        let alias = buf.get_str_lenenc()?;
        let name = buf.get_str_lenenc()?;

        let fixed_len_fields_len = buf.get_uint_lenenc()?;

        // we are told that this is *always* 0x0c
        if fixed_len_fields_len != 0x0c {
            return Err(err_protocol!(
                "expected 0x0c bytes of fixed column fields but found 0x{:02x}",
                fixed_len_fields_len
            ));
        }

        if buf.remaining() < 0x0c {
            return Err(err_protocol!(
                "column definition truncated after {} bytes",
                buf.remaining()
            ));
        }

        let charset = buf.get_u16_le();
        let max_size = buf.get_u32_le();
        let ty = buf.get_u8();
        let flags = ColumnFlags::from_bits_truncate(buf.get_u16_le());
        let decimals = buf.get_u8();

        Ok(Self { schema, table_alias, table, alias, name, charset, max_size, ty, flags, decimals })
    }

    /// Column name as presented to the client: the alias when one is set,
    /// the plain name otherwise.
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}
