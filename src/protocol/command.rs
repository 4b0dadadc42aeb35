/// The query command tag of a prepared statement.
///
/// Classified once at intern time from the leading keyword of the
/// statement text and kept in the registry; the routing and caching layers
/// branch on it without re-reading the SQL. This is a token match, not a
/// parse: anything it does not recognize is [`Unknown`][Self::Unknown].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ComQueryCommand {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Set,
    Show,
    Begin,
    Commit,
    Rollback,
    Create,
    Alter,
    Drop,
    Truncate,
    Call,
    Use,
    Describe,
    Explain,
    Grant,
    Revoke,
    Lock,
    Unlock,
    Analyze,
    Optimize,
    Unknown,
}

impl ComQueryCommand {
    /// Classify a statement by its first keyword.
    ///
    /// Leading whitespace and `/* ... */` comments are skipped, matching
    /// what servers accept in front of a statement.
    pub fn classify(query: &str) -> Self {
        let token = match first_token(query) {
            Some(token) => token,
            None => return ComQueryCommand::Unknown,
        };

        match_keyword(token)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComQueryCommand::Select => "SELECT",
            ComQueryCommand::Insert => "INSERT",
            ComQueryCommand::Update => "UPDATE",
            ComQueryCommand::Delete => "DELETE",
            ComQueryCommand::Replace => "REPLACE",
            ComQueryCommand::Set => "SET",
            ComQueryCommand::Show => "SHOW",
            ComQueryCommand::Begin => "BEGIN",
            ComQueryCommand::Commit => "COMMIT",
            ComQueryCommand::Rollback => "ROLLBACK",
            ComQueryCommand::Create => "CREATE",
            ComQueryCommand::Alter => "ALTER",
            ComQueryCommand::Drop => "DROP",
            ComQueryCommand::Truncate => "TRUNCATE",
            ComQueryCommand::Call => "CALL",
            ComQueryCommand::Use => "USE",
            ComQueryCommand::Describe => "DESCRIBE",
            ComQueryCommand::Explain => "EXPLAIN",
            ComQueryCommand::Grant => "GRANT",
            ComQueryCommand::Revoke => "REVOKE",
            ComQueryCommand::Lock => "LOCK",
            ComQueryCommand::Unlock => "UNLOCK",
            ComQueryCommand::Analyze => "ANALYZE",
            ComQueryCommand::Optimize => "OPTIMIZE",
            ComQueryCommand::Unknown => "UNKNOWN",
        }
    }
}

fn match_keyword(token: &str) -> ComQueryCommand {
    // WITH introduces a common table expression whose outermost statement
    // is a SELECT for every prepared-statement use we route
    if token.eq_ignore_ascii_case("WITH") {
        return ComQueryCommand::Select;
    }

    for (keyword, command) in KEYWORDS {
        if token.eq_ignore_ascii_case(keyword) {
            return *command;
        }
    }

    ComQueryCommand::Unknown
}

const KEYWORDS: &[(&str, ComQueryCommand)] = &[
    ("SELECT", ComQueryCommand::Select),
    ("INSERT", ComQueryCommand::Insert),
    ("UPDATE", ComQueryCommand::Update),
    ("DELETE", ComQueryCommand::Delete),
    ("REPLACE", ComQueryCommand::Replace),
    ("SET", ComQueryCommand::Set),
    ("SHOW", ComQueryCommand::Show),
    ("BEGIN", ComQueryCommand::Begin),
    ("START", ComQueryCommand::Begin),
    ("COMMIT", ComQueryCommand::Commit),
    ("ROLLBACK", ComQueryCommand::Rollback),
    ("CREATE", ComQueryCommand::Create),
    ("ALTER", ComQueryCommand::Alter),
    ("DROP", ComQueryCommand::Drop),
    ("TRUNCATE", ComQueryCommand::Truncate),
    ("CALL", ComQueryCommand::Call),
    ("USE", ComQueryCommand::Use),
    ("DESC", ComQueryCommand::Describe),
    ("DESCRIBE", ComQueryCommand::Describe),
    ("EXPLAIN", ComQueryCommand::Explain),
    ("GRANT", ComQueryCommand::Grant),
    ("REVOKE", ComQueryCommand::Revoke),
    ("LOCK", ComQueryCommand::Lock),
    ("UNLOCK", ComQueryCommand::Unlock),
    ("ANALYZE", ComQueryCommand::Analyze),
    ("OPTIMIZE", ComQueryCommand::Optimize),
];

fn first_token(query: &str) -> Option<&str> {
    let mut rest = query;

    loop {
        rest = rest.trim_start();

        if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(end) => rest = &after[end + 2..],
                None => return None,
            }

            continue;
        }

        break;
    }

    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());

    if end == 0 {
        return None;
    }

    Some(&rest[..end])
}
