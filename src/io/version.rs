//! Model format versions and the rules deciding what can be read back.
//!
//! Every persisted model kind owns one [`VersionInfo`] constant. A stamped
//! file version `v` is loadable iff `can_read_back <= v <= written`. Format
//! revisions are additive: each one only introduces optional fields, and each
//! such field carries its own [`FieldGate`] that is checked during decode.

use crate::error::{Error, Result};

/// Version stamp and identity of one persisted model kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Fixed 8-byte tag checked before any other header field is trusted.
    pub signature: [u8; 8],
    /// Version this build writes.
    pub written: u32,
    /// Oldest reader version able to read what this build writes.
    pub readable: u32,
    /// Oldest stamped version this build still decodes.
    pub can_read_back: u32,
    /// Key used to dispatch nested blocks through a loader registry.
    pub loader_signature: &'static str,
}

impl VersionInfo {
    /// Create a version descriptor.
    ///
    /// Panics in const context if the ordering
    /// `can_read_back <= readable <= written` is violated.
    pub const fn new(
        signature: &[u8; 8],
        written: u32,
        readable: u32,
        can_read_back: u32,
        loader_signature: &'static str,
    ) -> Self {
        assert!(can_read_back <= readable && readable <= written);
        Self {
            signature: *signature,
            written,
            readable,
            can_read_back,
            loader_signature,
        }
    }

    /// Signature rendered for diagnostics (non-ASCII bytes escaped).
    pub fn signature_str(&self) -> String {
        render_signature(&self.signature)
    }
}

pub(crate) fn render_signature(sig: &[u8; 8]) -> String {
    sig.iter().flat_map(|b| std::ascii::escape_default(*b)).map(char::from).collect()
}

/// Returns `true` iff a file stamped `file_version` is decodable by `current`.
#[inline]
pub fn can_load(file_version: u32, current: &VersionInfo) -> bool {
    current.can_read_back <= file_version && file_version <= current.written
}

/// [`can_load`] as a fallible check.
pub fn negotiate(file_version: u32, current: &VersionInfo) -> Result<()> {
    if can_load(file_version, current) {
        Ok(())
    } else {
        Err(Error::IncompatibleVersion {
            found: file_version,
            min: current.can_read_back,
            max: current.written,
        })
    }
}

/// Version at which an optional body field was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGate {
    pub name: &'static str,
    pub introduced: u32,
}

impl FieldGate {
    pub const fn new(name: &'static str, introduced: u32) -> Self {
        Self { name, introduced }
    }

    /// Whether a body stamped `file_version` carries this field.
    #[inline]
    pub const fn is_present(&self, file_version: u32) -> bool {
        file_version >= self.introduced
    }
}
