//! Prepared-statement bookkeeping core for the mason MySQL proxy.
//!
//! A single client-visible prepared statement may be executed against many
//! backends, and each backend assigns it an independent statement id. The
//! proxy therefore never forwards a backend statement id to a client.
//! Instead it runs a three-way translation:
//!
//! * the **client id**, a small per-session integer handed to the client in
//!   the COM_STMT_PREPARE response;
//! * the **global id**, the proxy-wide identifier for one canonical
//!   statement, issued by [`StatementRegistry`];
//! * the **native id**, the identifier a specific backend connection
//!   received from its server, tracked by [`BackendStatements`].
//!
//! [`StatementRegistry`] is shared by every worker thread and holds one
//! [`StatementInfo`] per canonical statement, keyed both by a deterministic
//! identity fingerprint and by global id. Sessions translate at the edges:
//! [`ClientStatements`] issues and recycles client ids, [`BackendStatements`]
//! binds native handles. [`LongDataHandler`] stages COM_STMT_SEND_LONG_DATA
//! payloads between prepare and execute, and [`ExecuteMetaTable`] keeps the
//! last execute snapshot per statement so a session can replay it against
//! another backend after a failover.

mod error;

pub mod io;
pub mod protocol;
pub mod stmt;

pub use error::{Error, Result};
pub use protocol::{
    ColumnDefinition, ColumnFlags, ComQueryCommand, CursorFlags, PrepareOk, PrepareReply,
};
pub use stmt::{
    fingerprint, BackendStatement, BackendStatements, BindMeta, ClientStatements, ExecuteMeta,
    ExecuteMetaTable, InternRequest, LongDataHandler, QueryDigest, RegistryMetrics,
    SessionStatements, StatementInfo, StatementProperties, StatementRegistry, StatementRow,
};
