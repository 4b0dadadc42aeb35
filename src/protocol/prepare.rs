use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Result};
use crate::protocol::ColumnDefinition;

/// The fixed-size head of a COM_STMT_PREPARE response.
///
/// `statement_id` is the id the *backend* assigned on its own connection;
/// it never reaches a client. The registry keeps the counts and discards
/// the id, the backend table keeps the id.
///
/// <https://dev.mysql.com/doc/internals/en/com-stmt-prepare-response.html#packet-COM_STMT_PREPARE_OK>
///
#[derive(Debug, Clone, Copy)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub columns: u16,
    pub params: u16,
    pub warnings: u16,
}

impl PrepareOk {
    pub fn decode(buf: Bytes) -> Result<Self> {
        const SIZE: usize = 12;

        let mut slice = buf.get(..SIZE).ok_or_else(|| {
            err_protocol!("PrepareOk expected 12 bytes but got {} bytes", buf.len())
        })?;

        let status = slice.get_u8();
        if status != 0x00 {
            return Err(err_protocol!(
                "expected 0x00 (COM_STMT_PREPARE_OK) but found 0x{:02x}",
                status
            ));
        }

        let statement_id = slice.get_u32_le();
        let columns = slice.get_u16_le();
        let params = slice.get_u16_le();

        slice.advance(1); // reserved: string<1>

        let warnings = slice.get_u16_le();

        Ok(Self { statement_id, columns, params, warnings })
    }
}

/// A complete, shape-checked COM_STMT_PREPARE response: the OK head plus
/// the column definitions that followed it.
///
/// Parameter definitions are not retained; the server sends them but
/// their type information is unreliable and nothing downstream reads it.
/// Construction is the single place the `fields.len() == columns`
/// invariant is enforced, so the registry can rely on it unconditionally.
#[derive(Debug, Clone)]
pub struct PrepareReply {
    ok: PrepareOk,
    fields: Vec<ColumnDefinition>,
}

impl PrepareReply {
    pub fn new(ok: PrepareOk, fields: Vec<ColumnDefinition>) -> Result<Self> {
        if fields.len() != usize::from(ok.columns) {
            return Err(err_protocol!(
                "prepare reply declared {} columns but carried {} definitions",
                ok.columns,
                fields.len()
            ));
        }

        Ok(Self { ok, fields })
    }

    pub fn ok(&self) -> &PrepareOk {
        &self.ok
    }

    pub fn fields(&self) -> &[ColumnDefinition] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<ColumnDefinition> {
        self.fields
    }
}
