// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A typed Kind so callers can match on the error category (size-mismatch,
//    no-index, cancelled, ...) without parsing the message
// 3. A way to centralize logging errors into the tracing system at the
//    point they are constructed

use std::borrow::Cow;
use std::fmt;

use backtrace_error::DynBacktraceError;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// The error kinds the core surfaces, per the error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    SizeMismatch,
    TypeMismatch,
    Io,
    Decode,
    DimOverflow,
    NoIndex,
    UnknownColumn,
    UnknownFunction,
    Cancelled,
    TimedOut,
    InvalidState,
    /// A kind bucket for conditions not named explicitly above, e.g.
    /// errors bubbled up through `From<std::io::Error>` before they are
    /// re-tagged by the caller.
    Other,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::SizeMismatch => "size-mismatch",
            Kind::TypeMismatch => "type-mismatch",
            Kind::Io => "io-error",
            Kind::Decode => "decode-error",
            Kind::DimOverflow => "dim-overflow",
            Kind::NoIndex => "no-index",
            Kind::UnknownColumn => "unknown-column",
            Kind::UnknownFunction => "unknown-function",
            Kind::Cancelled => "cancelled",
            Kind::TimedOut => "timed-out",
            Kind::InvalidState => "invalid-state",
            Kind::Other => "error",
        };
        f.write_str(s)
    }
}

struct SimpleErr(Cow<'static, str>);
impl fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {
    fn description(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.inner)
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(Kind::Other, err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: Kind, err: E) -> Error {
        error!(target: "bitindex", kind = %kind, "{:?}", err);
        let inner = DynBacktraceError::from(err);
        Error { kind, inner }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }
}

/// Build an ad-hoc error of the given kind from a message.
pub fn kind_err(kind: Kind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(kind, SimpleErr(msg.into()))
}

/// Build an ad-hoc `Kind::Other` error from a message, mirroring the
/// teacher's `err()` helper for call sites that do not care about the kind.
pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    kind_err(Kind::Other, msg)
}

#[test]
fn test_error() {
    let e = err("test error");
    assert_eq!(e.kind(), Kind::Other);
    let e = kind_err(Kind::NoIndex, "no index for column x");
    assert_eq!(e.kind(), Kind::NoIndex);
    assert!(format!("{e}").contains("no-index"));
}
