use bytes::BytesMut;

/// Per-session staging for COM_STMT_SEND_LONG_DATA.
///
/// Payload for a parameter can arrive in any number of packets between
/// PREPARE and EXECUTE; chunks for the same `(statement, parameter)` are
/// concatenated in arrival order, which is exactly how the server itself
/// accumulates them. EXECUTE consumes the staged data and calls
/// [`reset`][Self::reset]; CLOSE and COM_STMT_RESET do the same.
///
/// The record count is small in practice (one per parameter actually
/// streamed), so this is a flat vector scanned linearly.
#[derive(Default)]
pub struct LongDataHandler {
    records: Vec<LongData>,
}

struct LongData {
    stmt_id: u32,
    param_id: u16,
    data: BytesMut,
    is_null: bool,
}

impl LongDataHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a chunk. Returns true when this created a record, false when
    /// the chunk was appended to one that already existed.
    pub fn add(&mut self, stmt_id: u32, param_id: u16, data: &[u8], is_null: bool) -> bool {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.stmt_id == stmt_id && r.param_id == param_id)
        {
            record.data.extend_from_slice(data);
            record.is_null = is_null;

            return false;
        }

        self.records.push(LongData {
            stmt_id,
            param_id,
            data: BytesMut::from(data),
            is_null,
        });

        true
    }

    /// The accumulated payload and null flag for one parameter, if any
    /// long data was staged for it.
    pub fn get(&self, stmt_id: u32, param_id: u16) -> Option<(&[u8], bool)> {
        self.records
            .iter()
            .find(|r| r.stmt_id == stmt_id && r.param_id == param_id)
            .map(|r| (&*r.data, r.is_null))
    }

    /// Drop everything staged for `stmt_id`, reporting how many records
    /// were removed.
    pub fn reset(&mut self, stmt_id: u32) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.stmt_id != stmt_id);

        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::LongDataHandler;

    #[test]
    fn test_chunks_concatenate() {
        let mut handler = LongDataHandler::new();

        assert!(handler.add(3, 0, b"he", false));
        assert!(!handler.add(3, 0, b"llo", false));

        let (data, is_null) = handler.get(3, 0).unwrap();
        assert_eq!(data, b"hello");
        assert!(!is_null);
    }

    #[test]
    fn test_params_kept_apart() {
        let mut handler = LongDataHandler::new();

        handler.add(3, 0, b"a", false);
        handler.add(3, 1, b"b", false);
        handler.add(4, 0, b"c", true);

        assert_eq!(handler.get(3, 0).unwrap().0, b"a");
        assert_eq!(handler.get(3, 1).unwrap().0, b"b");
        assert_eq!(handler.get(4, 0).unwrap(), (&b"c"[..], true));
        assert_eq!(handler.get(4, 1), None);
    }

    #[test]
    fn test_reset_reports_removed_count() {
        let mut handler = LongDataHandler::new();

        handler.add(3, 0, b"he", false);
        handler.add(3, 0, b"llo", false);
        handler.add(3, 1, b"x", false);
        handler.add(9, 0, b"other", false);

        // two records under statement 3: the merged param 0 and param 1
        assert_eq!(handler.reset(3), 2);
        assert_eq!(handler.get(3, 0), None);
        assert_eq!(handler.get(9, 0).unwrap().0, b"other");

        assert_eq!(handler.reset(3), 0);
        assert_eq!(handler.len(), 1);
    }
}
