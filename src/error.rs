//! Crate-wide error type.

use thiserror::Error;

use crate::training::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while training, saving, loading or scoring models.
#[derive(Debug, Error)]
pub enum Error {
    /// Signature tag, loader key or body structure does not match what the
    /// decoder expects. Nothing is constructed when this is returned.
    #[error("corrupt model: {0}")]
    CorruptModel(String),

    /// The stamped version falls outside the range this build can read.
    #[error(
        "incompatible model version {found:#010x}: readable range is {min:#010x}..={max:#010x}"
    )]
    IncompatibleVersion { found: u32, min: u32, max: u32 },

    /// Training input or configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A caller-supplied argument violates a precondition.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested operation is not available on this model.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// I/O failure while reading or writing a model.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptModel(msg.into())
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Map an I/O error raised while decoding: running out of bytes means the
    /// file is truncated, which is corruption rather than an I/O fault.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::CorruptModel("unexpected end of model data".into())
        } else {
            Self::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_corrupt_model() {
        let err = Error::from_read(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, Error::CorruptModel(_)));

        let err = Error::from_read(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn version_error_renders_hex() {
        let err = Error::IncompatibleVersion {
            found: 0x0002_0000,
            min: 0x0001_0001,
            max: 0x0001_0005,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x00020000"), "{msg}");
        assert!(msg.contains("0x00010005"), "{msg}");
    }
}
