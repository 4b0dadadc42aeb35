use std::borrow::Cow;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Represents all the ways an operation in this crate can fail.
///
/// Registry and session-table lookups never error; absence is expressed
/// with `Option` or `bool`. `Error` is reserved for data that violates the
/// wire shape: truncated packets, bad tags, invalid UTF-8, or protocol
/// arrays whose length disagrees with their declared count.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Unexpected or invalid data encountered while decoding a packet or
    /// constructing a protocol structure.
    #[error("encountered unexpected or invalid data: {0}")]
    Protocol(Cow<'static, str>),
}

impl Error {
    pub(crate) fn protocol(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Protocol(message.into())
    }
}

macro_rules! err_protocol {
    ($expr:expr) => {
        $crate::error::Error::protocol($expr)
    };

    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::protocol(format!($fmt, $($arg)*))
    };
}

pub(crate) use err_protocol;
