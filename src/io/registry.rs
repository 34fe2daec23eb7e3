//! Keyed loader registry for nested model blocks.
//!
//! A nested block carries its own header. The registry reads that header,
//! looks up the decoder registered under the block's loader signature, checks
//! the block against the decoder's [`VersionInfo`] and only then decodes it.

use std::collections::HashMap;
use std::fmt;

use super::binary::{ModelHeader, ModelReader, MAX_ARRAY_LEN};
use super::version::VersionInfo;
use crate::error::{Error, Result};

/// Decoder for one model kind. Receives the reader positioned after the
/// block header, and the header itself (for per-field version gates).
pub type LoadFn<T> = fn(&mut ModelReader<'_>, &ModelHeader) -> Result<Box<T>>;

/// A registered decoder and the version descriptor it understands.
pub struct LoaderEntry<T: ?Sized> {
    pub version: &'static VersionInfo,
    pub load: LoadFn<T>,
}

impl<T: ?Sized> Clone for LoaderEntry<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for LoaderEntry<T> {}

/// Map from loader signature to decoder.
pub struct LoaderRegistry<T: ?Sized> {
    entries: HashMap<&'static str, LoaderEntry<T>>,
}

impl<T: ?Sized> Default for LoaderRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for LoaderRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("LoaderRegistry").field("loaders", &keys).finish()
    }
}

impl<T: ?Sized> LoaderRegistry<T> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Register a decoder under `version.loader_signature`, returning the
    /// entry it replaced, if any.
    pub fn register(&mut self, version: &'static VersionInfo, load: LoadFn<T>) -> Option<LoaderEntry<T>> {
        self.entries
            .insert(version.loader_signature, LoaderEntry { version, load })
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, version: &'static VersionInfo, load: LoadFn<T>) -> Self {
        self.register(version, load);
        self
    }

    pub fn get(&self, loader_signature: &str) -> Option<&LoaderEntry<T>> {
        self.entries.get(loader_signature)
    }

    pub fn contains(&self, loader_signature: &str) -> bool {
        self.entries.contains_key(loader_signature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode one block (header + body) from `reader`.
    pub fn load(&self, reader: &mut ModelReader<'_>) -> Result<Box<T>> {
        let header = ModelHeader::read(reader)?;
        let entry = self.get(&header.loader_signature).ok_or_else(|| {
            Error::corrupt(format!(
                "no loader registered for signature {:?}",
                header.loader_signature
            ))
        })?;
        header.check_against(entry.version)?;
        (entry.load)(reader, &header)
    }

    /// Decode a length-prefixed nested block. The block must be consumed
    /// exactly; leftover or missing bytes are corruption.
    pub fn load_nested(&self, reader: &mut ModelReader<'_>) -> Result<Box<T>> {
        let len = reader.read_len(MAX_ARRAY_LEN)?;
        let block = reader.read_vec(len)?;
        let mut src = block.as_slice();
        let mut sub = ModelReader::new(&mut src);
        let value = self.load(&mut sub)?;
        sub.expect_end()?;
        Ok(value)
    }
}
