use std::sync::Arc;

use bytestring::ByteString;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::protocol::{ComQueryCommand, PrepareReply};
use crate::stmt::info::{fingerprint, InternRequest, QueryDigest, StatementInfo};

/// Process-wide registry of canonical prepared statements.
///
/// Constructed once at proxy startup and shared as
/// `Arc<StatementRegistry>` with every worker. Two indices are kept under
/// a single reader/writer lock: fingerprint → global id, and global id →
/// entry. The lock also guards the id free stack, the monotonic id
/// counter and both reference counts of every entry; the counts are plain
/// integers rather than atomics because the "remove when both reach zero"
/// decision must be observed atomically with the index mutation.
///
/// Global ids start at 1 and are dense: ids freed by removal are pushed
/// onto a LIFO stack and reused before the counter advances. 0 is
/// reserved to mean "no statement".
pub struct StatementRegistry {
    inner: RwLock<RegistryInner>,
}

struct RegistryInner {
    by_fingerprint: HashMap<u64, u64>,
    statements: HashMap<u64, StatementEntry>,
    free_ids: Vec<u64>,
    next_id: u64,

    /// Live entries whose client refcount is zero: statements kept only
    /// because a backend still has them prepared.
    zero_client_refs: u64,
}

struct StatementEntry {
    info: Arc<StatementInfo>,
    client_refs: u64,
    server_refs: u64,
}

/// Read-lock snapshot of the registry counters, surfaced as status
/// variables by the admin layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryMetrics {
    /// Distinct statements known to the registry.
    pub client_unique: u64,

    /// Sum of client reference counts across all statements.
    pub client_total: u64,

    /// Highest global id ever allocated.
    pub max_stmt_id: u64,

    /// Statements with no client bound but still prepared on a backend.
    pub cached: u64,

    /// Distinct statements prepared on at least one backend.
    pub server_unique: u64,

    /// Sum of server reference counts across all statements.
    pub server_total: u64,
}

/// One row of [`StatementRegistry::enumerate`], ready for the admin layer
/// to project into a resultset.
#[derive(Debug, Clone)]
pub struct StatementRow {
    pub global_id: u64,
    pub hostgroup: u32,
    pub username: ByteString,
    pub schemaname: ByteString,
    pub query: ByteString,
    pub digest_text: Option<ByteString>,
    pub command: ComQueryCommand,
    pub num_columns: u16,
    pub num_params: u16,
    pub client_refs: u64,
    pub server_refs: u64,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_fingerprint: HashMap::new(),
                statements: HashMap::new(),
                free_ids: Vec::new(),
                next_id: 0,
                zero_client_refs: 0,
            }),
        }
    }

    /// Look up or create the canonical record for one statement identity,
    /// taking a client reference on it.
    ///
    /// On a hit the supplied prepare reply is discarded; the cached
    /// metadata wins. On a miss a fresh global id is issued (recycled ids
    /// first) and the record is installed in both indices with one client
    /// reference and no server references. The returned `Arc` stays valid
    /// until the caller gives the reference back through
    /// [`ref_client`][Self::ref_client] with a negative delta.
    pub fn intern(&self, req: InternRequest<'_>) -> Arc<StatementInfo> {
        let fp = fingerprint(req.hostgroup, req.username, req.schemaname, req.query);
        let mut inner = self.inner.write();

        if let Some(&id) = inner.by_fingerprint.get(&fp) {
            let matches = inner
                .statements
                .get(&id)
                .expect("fingerprint index points at a missing statement entry")
                .info
                .matches_identity(req.hostgroup, req.username, req.schemaname, req.query);

            if matches {
                let revived = inner.statements[&id].client_refs == 0;
                if revived {
                    inner.zero_client_refs -= 1;
                }

                let entry = inner.statements.get_mut(&id).unwrap();
                entry.client_refs += 1;

                return Arc::clone(&entry.info);
            }

            // 64-bit collision with a different identity tuple: keep the
            // slot with its first owner and register the newcomer by id
            // only
            log::warn!(
                "statement fingerprint collision on {:#018x} (hostgroup {}, schema {:?})",
                fp,
                req.hostgroup,
                req.schemaname,
            );

            let id = inner.allocate_id();
            let info = Arc::new(StatementInfo::new(id, fp, req));

            inner.statements.insert(
                id,
                StatementEntry { info: Arc::clone(&info), client_refs: 1, server_refs: 0 },
            );

            return info;
        }

        let id = inner.allocate_id();
        let info = Arc::new(StatementInfo::new(id, fp, req));

        inner.by_fingerprint.insert(fp, id);
        inner.statements.insert(
            id,
            StatementEntry { info: Arc::clone(&info), client_refs: 1, server_refs: 0 },
        );

        info
    }

    /// Read-locked lookup by identity fingerprint. Reference counts are
    /// untouched.
    pub fn find_by_fingerprint(&self, fp: u64) -> Option<Arc<StatementInfo>> {
        let inner = self.inner.read();
        let id = *inner.by_fingerprint.get(&fp)?;

        inner.statements.get(&id).map(|entry| Arc::clone(&entry.info))
    }

    /// Read-locked lookup by global id. Reference counts are untouched.
    pub fn find_by_global_id(&self, id: u64) -> Option<Arc<StatementInfo>> {
        let inner = self.inner.read();

        inner.statements.get(&id).map(|entry| Arc::clone(&entry.info))
    }

    /// Adjust the client reference count of `id` by `delta`.
    ///
    /// When both counts reach zero the record is removed and its id
    /// recycled. Driving a count below zero is an accounting bug in the
    /// caller; it is logged and clamped.
    pub fn ref_client(&self, id: u64, delta: i64) {
        let mut inner = self.inner.write();
        inner.ref_client(id, delta);
    }

    /// Adjust the server reference count of `id` by `delta`; otherwise as
    /// [`ref_client`][Self::ref_client].
    pub fn ref_server(&self, id: u64, delta: i64) {
        let mut inner = self.inner.write();
        inner.ref_server(id, delta);
    }

    /// Replace the prepare-reply metadata of `id` after a re-prepare
    /// returned refined information. Returns false when the id is
    /// unknown.
    ///
    /// The replacement is copy-on-write: sessions holding the previous
    /// `Arc` keep reading the old snapshot, lookups after this call see
    /// the new one.
    pub fn update_metadata(&self, id: u64, reply: &PrepareReply) -> bool {
        let mut inner = self.inner.write();

        let entry = match inner.statements.get_mut(&id) {
            Some(entry) => entry,
            None => return false,
        };

        let ok = reply.ok();
        let info = Arc::make_mut(&mut entry.info);

        info.num_columns = ok.columns;
        info.num_params = ok.params;
        info.warning_count = ok.warnings;
        info.fields = reply.fields().to_vec().into_boxed_slice();

        true
    }

    /// Attach or replace the digester's output for `id`. Returns false
    /// when the id is unknown. Copy-on-write like
    /// [`update_metadata`][Self::update_metadata].
    pub fn set_digest(&self, id: u64, digest: QueryDigest) -> bool {
        let mut inner = self.inner.write();

        let entry = match inner.statements.get_mut(&id) {
            Some(entry) => entry,
            None => return false,
        };

        Arc::make_mut(&mut entry.info).digest = Some(digest);

        true
    }

    /// Counter snapshot under the read lock.
    pub fn metrics(&self) -> RegistryMetrics {
        let inner = self.inner.read();

        let mut client_total = 0;
        let mut server_total = 0;
        let mut server_unique = 0;

        for entry in inner.statements.values() {
            client_total += entry.client_refs;
            server_total += entry.server_refs;

            if entry.server_refs > 0 {
                server_unique += 1;
            }
        }

        RegistryMetrics {
            client_unique: inner.statements.len() as u64,
            client_total,
            max_stmt_id: inner.next_id,
            cached: inner.zero_client_refs,
            server_unique,
            server_total,
        }
    }

    /// Dump every live statement for admin introspection. The snapshot is
    /// taken under the read lock; rows are fully owned so the lock is
    /// released before the caller formats anything.
    pub fn enumerate(&self) -> Vec<StatementRow> {
        let inner = self.inner.read();

        let mut rows: Vec<StatementRow> = inner
            .statements
            .values()
            .map(|entry| {
                let info = &entry.info;

                StatementRow {
                    global_id: info.global_id,
                    hostgroup: info.hostgroup,
                    username: info.username.clone(),
                    schemaname: info.schemaname.clone(),
                    query: info.query.clone(),
                    digest_text: info.digest.as_ref().map(|digest| digest.text.clone()),
                    command: info.command,
                    num_columns: info.num_columns,
                    num_params: info.num_params,
                    client_refs: entry.client_refs,
                    server_refs: entry.server_refs,
                }
            })
            .collect();

        rows.sort_unstable_by_key(|row| row.global_id);

        rows
    }

    /// Number of distinct statements currently registered.
    pub fn len(&self) -> usize {
        self.inner.read().statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryInner {
    fn allocate_id(&mut self) -> u64 {
        match self.free_ids.pop() {
            Some(id) => {
                log::trace!("recycling global statement id {}", id);
                id
            }

            None => {
                self.next_id += 1;
                self.next_id
            }
        }
    }

    fn ref_client(&mut self, id: u64, delta: i64) {
        let entry = match self.statements.get_mut(&id) {
            Some(entry) => entry,
            None => return,
        };

        let was_zero = entry.client_refs == 0;
        entry.client_refs = adjust(entry.client_refs, delta, id, "client");

        if entry.client_refs == 0 && !was_zero {
            self.zero_client_refs += 1;
        } else if entry.client_refs > 0 && was_zero {
            self.zero_client_refs -= 1;
        }

        self.remove_if_dead(id);
    }

    fn ref_server(&mut self, id: u64, delta: i64) {
        let entry = match self.statements.get_mut(&id) {
            Some(entry) => entry,
            None => return,
        };

        entry.server_refs = adjust(entry.server_refs, delta, id, "server");

        self.remove_if_dead(id);
    }

    fn remove_if_dead(&mut self, id: u64) {
        let entry = match self.statements.get(&id) {
            Some(entry) => entry,
            None => return,
        };

        if entry.client_refs != 0 || entry.server_refs != 0 {
            return;
        }

        let entry = self.statements.remove(&id).unwrap();

        // a collision loser never owned the fingerprint slot
        if self.by_fingerprint.get(&entry.info.fingerprint) == Some(&id) {
            self.by_fingerprint.remove(&entry.info.fingerprint);
        }

        self.zero_client_refs -= 1;
        self.free_ids.push(id);
    }
}

fn adjust(count: u64, delta: i64, id: u64, which: &str) -> u64 {
    if delta >= 0 {
        count + delta as u64
    } else {
        let sub = delta.unsigned_abs();

        if sub > count {
            log::error!(
                "{} refcount underflow on statement {} ({} - {}); clamping to zero",
                which,
                id,
                count,
                sub
            );

            0
        } else {
            count - sub
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::protocol::{ComQueryCommand, PrepareOk, PrepareReply};
    use crate::stmt::info::{InternRequest, QueryDigest, StatementProperties};

    use super::StatementRegistry;

    fn reply(columns: u16, params: u16) -> PrepareReply {
        let ok = PrepareOk { statement_id: 99, columns, params, warnings: 0 };

        let field = crate::protocol::ColumnDefinition {
            schema: "db".into(),
            table_alias: "t".into(),
            table: "t".into(),
            alias: "a".into(),
            name: "a".into(),
            charset: 0x3f,
            max_size: 11,
            ty: 3,
            flags: crate::protocol::ColumnFlags::empty(),
            decimals: 0,
        };

        PrepareReply::new(ok, vec![field; usize::from(columns)]).unwrap()
    }

    fn request<'a>(query: &'a str, reply: &'a PrepareReply) -> InternRequest<'a> {
        InternRequest {
            hostgroup: 1,
            username: "alice",
            schemaname: "db",
            query,
            reply,
            properties: StatementProperties::default(),
            digest: None,
        }
    }

    #[test]
    fn test_intern_is_idempotent_in_identity() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 1);

        let first = registry.intern(request("SELECT ?", &reply));
        let second = registry.intern(request("SELECT ?", &reply));

        assert_eq!(first.global_id, second.global_id);
        assert_eq!(registry.metrics().client_total, 2);
        assert_eq!(registry.metrics().client_unique, 1);
    }

    #[test]
    fn test_intern_classifies_and_freezes() {
        let registry = StatementRegistry::new();
        let reply = reply(1, 0);

        let info = registry.intern(InternRequest {
            digest: Some(QueryDigest { hash: 0xfeed, text: "SELECT ?".into() }),
            ..request("SELECT 1 FROM t", &reply)
        });

        assert_eq!(info.global_id, 1);
        assert_eq!(info.command, ComQueryCommand::Select);
        assert_eq!(info.num_columns, 1);
        assert_eq!(info.fields.len(), 1);
        assert!(info.is_select_not_for_update);
        assert_eq!(info.digest.as_ref().unwrap().hash, 0xfeed);
    }

    #[test]
    fn test_lookup_does_not_touch_refcounts() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 0);
        let info = registry.intern(request("SELECT 1", &reply));

        let by_fp = registry.find_by_fingerprint(info.fingerprint).unwrap();
        let by_id = registry.find_by_global_id(info.global_id).unwrap();

        assert_eq!(by_fp.global_id, by_id.global_id);
        assert_eq!(registry.metrics().client_total, 1);
        assert!(registry.find_by_global_id(777).is_none());
    }

    #[test]
    fn test_removal_requires_both_counts_zero() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 0);
        let info = registry.intern(request("SELECT 1", &reply));

        registry.ref_server(info.global_id, 1);
        registry.ref_client(info.global_id, -1);

        // still cached for the backend
        assert!(registry.find_by_global_id(info.global_id).is_some());
        assert_eq!(registry.metrics().cached, 1);

        registry.ref_server(info.global_id, -1);

        assert!(registry.find_by_global_id(info.global_id).is_none());
        assert!(registry.find_by_fingerprint(info.fingerprint).is_none());
        assert_eq!(registry.metrics().cached, 0);
    }

    #[test]
    fn test_reviving_cached_statement() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 0);
        let info = registry.intern(request("SELECT 1", &reply));

        registry.ref_server(info.global_id, 1);
        registry.ref_client(info.global_id, -1);
        assert_eq!(registry.metrics().cached, 1);

        let revived = registry.intern(request("SELECT 1", &reply));

        assert_eq!(revived.global_id, info.global_id);
        assert_eq!(registry.metrics().cached, 0);
        assert_eq!(registry.metrics().client_total, 1);
    }

    #[test]
    fn test_global_id_recycling_is_lifo() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 0);

        let a = registry.intern(request("SELECT 1", &reply));
        let b = registry.intern(request("SELECT 2", &reply));
        let c = registry.intern(request("SELECT 3", &reply));
        assert_eq!((a.global_id, b.global_id, c.global_id), (1, 2, 3));

        registry.ref_client(1, -1);
        registry.ref_client(2, -1);
        registry.ref_client(3, -1);

        assert_eq!(registry.intern(request("SELECT 4", &reply)).global_id, 3);
        assert_eq!(registry.intern(request("SELECT 5", &reply)).global_id, 2);
        assert_eq!(registry.intern(request("SELECT 6", &reply)).global_id, 1);
        assert_eq!(registry.intern(request("SELECT 7", &reply)).global_id, 4);
        assert_eq!(registry.metrics().max_stmt_id, 4);
    }

    #[test]
    fn test_underflow_clamps() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 0);
        let info = registry.intern(request("SELECT 1", &reply));

        registry.ref_server(info.global_id, 1);
        registry.ref_client(info.global_id, -5);

        // clamped to zero, not wrapped; entry survives on the server ref
        assert!(registry.find_by_global_id(info.global_id).is_some());
        assert_eq!(registry.metrics().client_total, 0);
    }

    #[test]
    fn test_update_metadata_is_copy_on_write() {
        let registry = StatementRegistry::new();
        let initial = reply(0, 0);
        let info = registry.intern(request("SELECT 1", &initial));
        assert_eq!(info.num_columns, 0);

        let refined = reply(1, 0);
        assert!(registry.update_metadata(info.global_id, &refined));
        assert!(!registry.update_metadata(777, &refined));

        // the old snapshot is untouched, new lookups see the refinement
        assert_eq!(info.num_columns, 0);
        let fresh = registry.find_by_global_id(info.global_id).unwrap();
        assert_eq!(fresh.num_columns, 1);
        assert!(!Arc::ptr_eq(&info, &fresh));
    }

    #[test]
    fn test_set_digest_after_intern() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 0);
        let info = registry.intern(request("SELECT 1", &reply));
        assert!(info.digest.is_none());

        let digest = QueryDigest { hash: 0xabad1dea, text: "SELECT ?".into() };
        assert!(registry.set_digest(info.global_id, digest.clone()));
        assert!(!registry.set_digest(777, digest));

        let fresh = registry.find_by_global_id(info.global_id).unwrap();
        assert_eq!(fresh.digest.as_ref().unwrap().hash, 0xabad1dea);
    }

    #[test]
    fn test_enumerate_rows() {
        let registry = StatementRegistry::new();
        let reply = reply(0, 2);

        registry.intern(request("SELECT ?, ?", &reply));
        registry.intern(InternRequest { hostgroup: 7, ..request("DELETE FROM t", &reply) });

        let rows = registry.enumerate();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].global_id, 1);
        assert_eq!(rows[0].num_params, 2);
        assert_eq!(rows[1].hostgroup, 7);
        assert_eq!(rows[1].command, ComQueryCommand::Delete);
    }
}
