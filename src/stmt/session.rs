use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::protocol::PrepareReply;
use crate::stmt::registry::StatementRegistry;

/// Client side of a session's statement translation: client id ↔ global
/// id, with id issue and recycling.
///
/// Owned by exactly one client-facing session and only ever touched by
/// the thread currently driving that session, so there is no lock here.
///
/// A client may PREPARE the same text more than once and legitimately
/// hold several client ids for one global statement; the reverse map is a
/// multimap for that reason, and the registry reference this session
/// contributes is released only when the last of those ids closes. The
/// wire layer keeps the accounting symmetric by interning a statement
/// only when [`is_bound`][Self::is_bound] is false and otherwise pairing
/// [`StatementRegistry::find_by_fingerprint`] with
/// [`generate_client_id`][Self::generate_client_id].
pub struct ClientStatements {
    registry: Arc<StatementRegistry>,
    client_to_global: HashMap<u32, u64>,
    global_to_clients: HashMap<u64, SmallVec<[u32; 2]>>,
    free_ids: Vec<u32>,
    max_client_id: u32,
}

impl ClientStatements {
    pub fn new(registry: Arc<StatementRegistry>) -> Self {
        Self {
            registry,
            client_to_global: HashMap::new(),
            global_to_clients: HashMap::new(),
            free_ids: Vec::new(),
            max_client_id: 0,
        }
    }

    /// Issue a client-visible statement id bound to `global_id`.
    ///
    /// Recycled ids are handed out LIFO before the counter advances; ids
    /// are unique among the session's live statements.
    pub fn generate_client_id(&mut self, global_id: u64) -> u32 {
        let client_id = match self.free_ids.pop() {
            Some(id) => id,

            None => {
                self.max_client_id += 1;
                self.max_client_id
            }
        };

        self.client_to_global.insert(client_id, global_id);
        self.global_to_clients.entry(global_id).or_default().push(client_id);

        client_id
    }

    pub fn global_id_from_client(&self, client_id: u32) -> Option<u64> {
        self.client_to_global.get(&client_id).copied()
    }

    /// Whether this session already holds at least one client id for
    /// `global_id`.
    pub fn is_bound(&self, global_id: u64) -> bool {
        self.global_to_clients.contains_key(&global_id)
    }

    /// Close one client id. Returns false when the id is unknown (the
    /// caller answers the client with ER_UNKNOWN_STMT_HANDLER).
    ///
    /// The registry reference is dropped only when this was the session's
    /// last client id for the statement.
    pub fn close_client(&mut self, client_id: u32) -> bool {
        let global_id = match self.client_to_global.remove(&client_id) {
            Some(global_id) => global_id,
            None => return false,
        };

        if let Some(client_ids) = self.global_to_clients.get_mut(&global_id) {
            client_ids.retain(|&mut id| id != client_id);

            if client_ids.is_empty() {
                self.global_to_clients.remove(&global_id);
                self.registry.ref_client(global_id, -1);
            }
        }

        self.free_ids.push(client_id);

        true
    }

    /// Live client ids in this session.
    pub fn len(&self) -> usize {
        self.client_to_global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.client_to_global.is_empty()
    }
}

impl Drop for ClientStatements {
    fn drop(&mut self) {
        // one reference per distinct statement, exactly what this session
        // contributed
        for &global_id in self.global_to_clients.keys() {
            self.registry.ref_client(global_id, -1);
        }
    }
}

/// The proxy's record of one statement prepared on one backend
/// connection: the id that server assigned plus the counts needed to
/// frame COM_STMT_EXECUTE and COM_STMT_CLOSE against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatement {
    pub id: u32,
    pub num_params: u16,
    pub num_columns: u16,
}

impl BackendStatement {
    pub fn from_reply(reply: &PrepareReply) -> Self {
        let ok = reply.ok();

        Self { id: ok.statement_id, num_params: ok.params, num_columns: ok.columns }
    }
}

/// Backend side of the translation: native id ↔ global id for one backend
/// connection, plus the native handle objects themselves.
///
/// Owned by a single backend connection and touched only by the thread
/// holding it. A connection prepares a given statement at most once, so
/// both directions are plain maps and the three of them move in lockstep.
pub struct BackendStatements {
    registry: Arc<StatementRegistry>,
    native_to_global: HashMap<u32, u64>,
    global_to_native: HashMap<u64, u32>,
    statements: HashMap<u64, BackendStatement>,
}

impl BackendStatements {
    pub fn new(registry: Arc<StatementRegistry>) -> Self {
        Self {
            registry,
            native_to_global: HashMap::new(),
            global_to_native: HashMap::new(),
            statements: HashMap::new(),
        }
    }

    /// Record that this connection has `global_id` prepared as `stmt`.
    ///
    /// The first bind takes a server reference in the registry. Binding a
    /// statement this connection already has is a no-op that keeps the
    /// existing mapping and returns false.
    pub fn bind(&mut self, global_id: u64, stmt: BackendStatement) -> bool {
        if self.global_to_native.contains_key(&global_id) {
            return false;
        }

        self.native_to_global.insert(stmt.id, global_id);
        self.global_to_native.insert(global_id, stmt.id);
        self.statements.insert(global_id, stmt);

        self.registry.ref_server(global_id, 1);

        true
    }

    pub fn native_id_for_global(&self, global_id: u64) -> Option<u32> {
        self.global_to_native.get(&global_id).copied()
    }

    pub fn global_id_from_native(&self, native_id: u32) -> Option<u64> {
        self.native_to_global.get(&native_id).copied()
    }

    pub fn statement_for_global(&self, global_id: u64) -> Option<&BackendStatement> {
        self.statements.get(&global_id)
    }

    /// Statements prepared on this connection.
    pub fn len(&self) -> usize {
        self.native_to_global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.native_to_global.is_empty()
    }

    /// Unbind everything, dropping the server references, and hand the
    /// native handles back so the connection can send COM_STMT_CLOSE for
    /// each while it is still usable.
    pub fn detach_all(&mut self) -> Vec<BackendStatement> {
        let statements: Vec<BackendStatement> = self.statements.drain().map(|(_, s)| s).collect();

        for global_id in self.global_to_native.keys() {
            self.registry.ref_server(*global_id, -1);
        }

        self.native_to_global.clear();
        self.global_to_native.clear();

        statements
    }
}

impl Drop for BackendStatements {
    fn drop(&mut self) {
        // a torn-down connection cannot close statements on the wire;
        // only the registry accounting remains to settle
        for &global_id in self.global_to_native.keys() {
            self.registry.ref_server(global_id, -1);
        }
    }
}

/// A session's statement table, tagged by which side of the proxy the
/// session faces. The two variants share almost no state, only the
/// teardown obligation and a size.
pub enum SessionStatements {
    Client(ClientStatements),
    Backend(BackendStatements),
}

impl SessionStatements {
    pub fn client(registry: Arc<StatementRegistry>) -> Self {
        SessionStatements::Client(ClientStatements::new(registry))
    }

    pub fn backend(registry: Arc<StatementRegistry>) -> Self {
        SessionStatements::Backend(BackendStatements::new(registry))
    }

    pub fn is_client(&self) -> bool {
        matches!(self, SessionStatements::Client(_))
    }

    pub fn len(&self) -> usize {
        match self {
            SessionStatements::Client(table) => table.len(),
            SessionStatements::Backend(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
