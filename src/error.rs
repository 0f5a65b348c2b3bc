//! Error types returned by this crate.
//!
//! The upstream MemoryModule loader this crate is descended from reports
//! failure through a thread-local "last error" value, mirroring
//! `GetLastError`, which forces every caller to check a side channel after
//! a null return. We return a typed [`Error`] directly from the operation
//! that failed instead.

use core::fmt;

/// Everything that can go wrong while parsing, mapping, or running a PE
/// image.
#[derive(Debug)]
pub enum Error {
    /// The DOS or NT header signature didn't match. Corresponds to
    /// `ERROR_BAD_EXE_FORMAT`.
    BadFormat(String),
    /// A header field referenced a location outside of `bytes`, or was
    /// otherwise internally inconsistent.
    Malformed(String),
    /// Reserving or committing virtual memory failed. Corresponds to
    /// `ERROR_OUTOFMEMORY`.
    OutOfMemory(&'static str),
    /// A host `load` callback returned null for a dependency name.
    /// Corresponds to `ERROR_MOD_NOT_FOUND`.
    ModuleNotFound(String),
    /// A host `get_symbol` callback returned null for an imported name or
    /// ordinal. Corresponds to `ERROR_PROC_NOT_FOUND`.
    SymbolNotFound { dll: String, symbol: SymbolKey },
    /// The image's entry point returned `false`.
    DllInitFailed,
    /// A byte offset read from `bytes` via [`scroll`] fell outside the
    /// buffer or otherwise didn't decode.
    Scroll(scroll::Error),
}

/// Identifies an import either by name or by ordinal, matching the high-bit
/// discriminant on the thunk that produced it.
#[derive(Debug, Clone)]
pub enum SymbolKey {
    Name(String),
    Ordinal(u16),
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKey::Name(name) => write!(f, "{name}"),
            SymbolKey::Ordinal(ord) => write!(f, "#{ord}"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadFormat(msg) => write!(f, "bad PE image: {msg}"),
            Error::Malformed(msg) => write!(f, "malformed PE image: {msg}"),
            Error::OutOfMemory(stage) => write!(f, "out of memory during {stage}"),
            Error::ModuleNotFound(name) => write!(f, "dependency not found: {name}"),
            Error::SymbolNotFound { dll, symbol } => {
                write!(f, "symbol {symbol} not found in {dll}")
            }
            Error::DllInitFailed => write!(f, "entry point returned failure"),
            Error::Scroll(err) => write!(f, "buffer read error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Scroll(err) => Some(err),
            _ => None,
        }
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
