use bytes::Bytes;
use hashbrown::HashMap;

use crate::error::{err_protocol, Result};
use crate::protocol::CursorFlags;

/// One parameter of a captured COM_STMT_EXECUTE: its declared wire type
/// and the encoded value, borrowed out of the retained packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMeta {
    pub ty: u8,
    pub unsigned: bool,
    pub value: Bytes,
}

/// Snapshot of the most recent COM_STMT_EXECUTE for one statement in one
/// session.
///
/// If the backend dies mid-execute, the session re-prepares on another
/// backend and replays this snapshot; the raw packet is kept so the
/// replay can be framed without re-encoding the parameters.
///
/// The bind, null and length arrays are parallel and always exactly
/// `num_params` long; construction is the only way to build one, so the
/// shape holds everywhere downstream.
#[derive(Debug, Clone)]
pub struct ExecuteMeta {
    pub stmt_id: u32,
    pub flags: CursorFlags,
    pub num_params: u16,
    pub binds: Box<[BindMeta]>,
    pub is_nulls: Box<[bool]>,
    pub lengths: Box<[u64]>,
    pub packet: Bytes,
}

impl ExecuteMeta {
    pub fn new(
        stmt_id: u32,
        flags: CursorFlags,
        binds: Vec<BindMeta>,
        is_nulls: Vec<bool>,
        lengths: Vec<u64>,
        packet: Bytes,
    ) -> Result<Self> {
        let num_params = binds.len();

        if is_nulls.len() != num_params || lengths.len() != num_params {
            return Err(err_protocol!(
                "execute metadata arrays disagree: {} binds, {} null flags, {} lengths",
                num_params,
                is_nulls.len(),
                lengths.len()
            ));
        }

        let num_params = u16::try_from(num_params)
            .map_err(|_| err_protocol!("{} parameters overflow the wire count", num_params))?;

        Ok(Self {
            stmt_id,
            flags,
            num_params,
            binds: binds.into_boxed_slice(),
            is_nulls: is_nulls.into_boxed_slice(),
            lengths: lengths.into_boxed_slice(),
            packet,
        })
    }
}

/// Per-session table of execute snapshots, keyed by global statement id.
///
/// Server side, this state lives inside the backend's own statement
/// structures; client side the proxy has to keep it itself, which is what
/// makes backend failover replayable at all.
#[derive(Default)]
pub struct ExecuteMetaTable {
    entries: HashMap<u64, ExecuteMeta>,
}

impl ExecuteMetaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the snapshot for a statement, destroying any previous one.
    pub fn insert(&mut self, global_id: u64, meta: ExecuteMeta) {
        self.entries.insert(global_id, meta);
    }

    pub fn find(&self, global_id: u64) -> Option<&ExecuteMeta> {
        self.entries.get(&global_id)
    }

    /// Remove the snapshot for a statement; false when none was stored.
    pub fn erase(&mut self, global_id: u64) -> bool {
        self.entries.remove(&global_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
