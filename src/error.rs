use thiserror::Error;

/// Errors produced while reading DWARF data.
#[derive(Debug, Error)]
pub enum Error {
    /// The input bytes violate the DWARF specification or an internal
    /// invariant (bad version, truncated record, unknown mandatory opcode).
    #[error("DWARF format error: {0}")]
    Format(String),

    /// A value accessor was invoked on a value whose form cannot satisfy it,
    /// e.g. reading a block as a flag.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// An I/O failure while loading a container file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! bail_format {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Format(format!($($arg)*)))
    };
}

macro_rules! bail_mismatch {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::TypeMismatch(format!($($arg)*)))
    };
}

pub(crate) use bail_format;
pub(crate) use bail_mismatch;
