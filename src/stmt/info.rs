use bytestring::ByteString;
use xxhash_rust::xxh3::xxh3_64;

use crate::protocol::{ColumnDefinition, ComQueryCommand, PrepareReply};

/// Policy values attached to a statement at intern time and stored
/// verbatim; the caching layer above the core interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementProperties {
    /// Seconds a resultset for this statement may be served from cache;
    /// negative disables caching.
    pub cache_ttl: i32,

    /// Per-execution timeout in milliseconds; 0 means unbounded.
    pub timeout_ms: i32,

    /// Artificial delay before execution in milliseconds; 0 means none.
    pub delay_ms: i32,
}

impl Default for StatementProperties {
    fn default() -> Self {
        Self { cache_ttl: -1, timeout_ms: 0, delay_ms: 0 }
    }
}

/// Semantic digest of the statement text, produced by the query digester
/// and stored as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDigest {
    pub hash: u64,
    pub text: ByteString,
}

/// Everything the registry needs to intern one statement: the identity
/// tuple, the backend's prepare reply, policy values and the optional
/// digest.
#[derive(Debug)]
pub struct InternRequest<'a> {
    pub hostgroup: u32,
    pub username: &'a str,
    pub schemaname: &'a str,
    pub query: &'a str,
    pub reply: &'a PrepareReply,
    pub properties: StatementProperties,
    pub digest: Option<QueryDigest>,
}

/// The canonical metadata record for one logical prepared statement.
///
/// Shared as `Arc<StatementInfo>` by every session holding the statement.
/// All fields are frozen once the record is constructed; a re-prepare with
/// refined metadata replaces the record copy-on-write under the registry's
/// write lock, so readers always observe a consistent snapshot. The client
/// and server reference counts live next to the `Arc` inside the registry,
/// not here, because the both-zero removal decision has to be made under
/// the same lock that mutates the indices.
#[derive(Debug, Clone)]
pub struct StatementInfo {
    /// Proxy-wide statement id; this is what clients see. 0 is never
    /// issued.
    pub global_id: u64,

    /// Identity fingerprint; primary cache key.
    pub fingerprint: u64,

    pub hostgroup: u32,
    pub username: ByteString,
    pub schemaname: ByteString,
    pub query: ByteString,

    pub command: ComQueryCommand,
    pub digest: Option<QueryDigest>,

    pub num_columns: u16,
    pub num_params: u16,
    pub warning_count: u16,

    /// One descriptor per result-set column; empty iff `num_columns == 0`.
    pub fields: Box<[ColumnDefinition]>,

    pub properties: StatementProperties,

    /// `SELECT` without a trailing `FOR UPDATE`; such statements are safe
    /// to route to read replicas.
    pub is_select_not_for_update: bool,
}

impl StatementInfo {
    pub(crate) fn new(global_id: u64, fp: u64, req: InternRequest<'_>) -> Self {
        let command = ComQueryCommand::classify(req.query);
        let ok = req.reply.ok();

        Self {
            global_id,
            fingerprint: fp,
            hostgroup: req.hostgroup,
            username: ByteString::from(req.username),
            schemaname: ByteString::from(req.schemaname),
            query: ByteString::from(req.query),
            command,
            digest: req.digest,
            num_columns: ok.columns,
            num_params: ok.params,
            warning_count: ok.warnings,
            fields: req.reply.fields().to_vec().into_boxed_slice(),
            properties: req.properties,
            is_select_not_for_update: command == ComQueryCommand::Select
                && !ends_with_for_update(req.query),
        }
    }

    /// Length of the statement text in bytes.
    pub fn query_length(&self) -> usize {
        self.query.len()
    }

    pub(crate) fn matches_identity(
        &self,
        hostgroup: u32,
        username: &str,
        schemaname: &str,
        query: &str,
    ) -> bool {
        self.hostgroup == hostgroup
            && &*self.username == username
            && &*self.schemaname == schemaname
            && &*self.query == query
    }
}

/// Deterministic 64-bit identity fingerprint over
/// `(hostgroup, username, schemaname, query)`.
///
/// Each variable-length field is length-prefixed before hashing so that no
/// two distinct tuples can serialize to the same byte sequence. Stability
/// across processes is not required, only equality within one; xxh3 gives
/// both.
pub fn fingerprint(hostgroup: u32, username: &str, schemaname: &str, query: &str) -> u64 {
    let mut buf =
        Vec::with_capacity(4 + 3 * 8 + username.len() + schemaname.len() + query.len());

    buf.extend_from_slice(&hostgroup.to_le_bytes());

    for part in [username, schemaname, query] {
        buf.extend_from_slice(&(part.len() as u64).to_le_bytes());
        buf.extend_from_slice(part.as_bytes());
    }

    xxh3_64(&buf)
}

fn ends_with_for_update(query: &str) -> bool {
    let trimmed = query.trim_end().trim_end_matches(';').trim_end();

    if trimmed.len() < "FOR UPDATE".len() {
        return false;
    }

    let split = trimmed.len() - "FOR UPDATE".len();
    if !trimmed.is_char_boundary(split) {
        return false;
    }

    let (head, tail) = trimmed.split_at(split);

    tail.eq_ignore_ascii_case("FOR UPDATE") && head.ends_with(|c: char| c.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::{ends_with_for_update, fingerprint};

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint(1, "alice", "db", "SELECT 1");
        let b = fingerprint(1, "alice", "db", "SELECT 1");

        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_fields() {
        let base = fingerprint(1, "alice", "db", "SELECT 1");

        assert_ne!(base, fingerprint(2, "alice", "db", "SELECT 1"));
        assert_ne!(base, fingerprint(1, "bob", "db", "SELECT 1"));
        assert_ne!(base, fingerprint(1, "alice", "other", "SELECT 1"));
        assert_ne!(base, fingerprint(1, "alice", "db", "SELECT 2"));
    }

    #[test]
    fn test_fingerprint_no_concatenation_ambiguity() {
        // without framing these hash the same byte stream
        assert_ne!(fingerprint(1, "ab", "c", "q"), fingerprint(1, "a", "bc", "q"));
        assert_ne!(fingerprint(1, "a", "", "bq"), fingerprint(1, "a", "b", "q"));
    }

    #[test]
    fn test_for_update_suffix() {
        assert!(ends_with_for_update("SELECT * FROM t WHERE id = ? FOR UPDATE"));
        assert!(ends_with_for_update("select * from t for update;  "));
        assert!(ends_with_for_update("select * from t\nFOR UPDATE"));

        assert!(!ends_with_for_update("SELECT * FROM t"));
        assert!(!ends_with_for_update("SELECT 'FOR UPDATE'x"));
        assert!(!ends_with_for_update("FOR UPDATE"));
        assert!(!ends_with_for_update("SELECT xFOR UPDATE"));
    }
}
