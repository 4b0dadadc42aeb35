bitflags::bitflags! {
    /// The flags byte of COM_STMT_EXECUTE.
    ///
    /// An empty set is `CURSOR_TYPE_NO_CURSOR`.
    ///
    /// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/mysql__com_8h.html#a3e5e9e744ff6f7b989a604fd669977da>
    ///
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CursorFlags: u8 {
        const READ_ONLY = 1;
        const FOR_UPDATE = 2;
        const SCROLLABLE = 4;
    }
}
