//! The slice of the MySQL protocol the statement core consumes.
//!
//! The proxy's wire codec owns packet framing and the command loop; what
//! lives here are the structures the codec hands across the boundary: the
//! COM_STMT_PREPARE response ([`PrepareOk`], [`ColumnDefinition`]) that
//! seeds a [`crate::stmt::StatementInfo`], and the flag sets captured into
//! execute metadata.

mod column;
mod command;
mod cursor;
mod prepare;

pub use column::{ColumnDefinition, ColumnFlags};
pub use command::ComQueryCommand;
pub use cursor::CursorFlags;
pub use prepare::{PrepareOk, PrepareReply};
