//! Statement identity, the process-wide registry, and the per-session
//! translation tables.

mod execute_meta;
mod info;
mod long_data;
mod registry;
mod session;

pub use execute_meta::{BindMeta, ExecuteMeta, ExecuteMetaTable};
pub use info::{fingerprint, InternRequest, QueryDigest, StatementInfo, StatementProperties};
pub use long_data::LongDataHandler;
pub use registry::{RegistryMetrics, StatementRegistry, StatementRow};
pub use session::{BackendStatement, BackendStatements, ClientStatements, SessionStatements};
