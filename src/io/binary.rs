//! Little-endian binary primitives and the per-model header.
//!
//! # Header layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       8     Model signature (fixed per model kind)
//! 8       4     Written version
//! 12      4     Readable version
//! 16      4     Can-read-back version
//! 20      4+n   Loader signature (u32 length + UTF-8)
//! ```
//!
//! All integers are little-endian. Strings and arrays are prefixed with a
//! `u32` element count.

use std::io::{Read, Write};

use super::version::{negotiate, render_signature, VersionInfo};
use crate::error::{Error, Result};

/// Longest string accepted by the reader.
pub const MAX_STRING_LEN: usize = 1 << 20;

/// Largest element count accepted for a length-prefixed array.
pub const MAX_ARRAY_LEN: usize = 1 << 28;

// ============================================================================
// Writer
// ============================================================================

/// Sink for model bytes.
pub struct ModelWriter<'a> {
    inner: &'a mut dyn Write,
}

impl<'a> ModelWriter<'a> {
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(u8::from(v))
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Write an element count, rejecting lengths the reader would refuse.
    pub fn write_len(&mut self, len: usize, limit: usize) -> Result<()> {
        if len > limit {
            return Err(Error::invalid_input(format!(
                "length {len} exceeds the format limit of {limit}"
            )));
        }
        // limit <= u32::MAX by construction of the constants above
        self.write_u32(len as u32)
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_len(s.len(), MAX_STRING_LEN)?;
        self.write_bytes(s.as_bytes())
    }

    pub fn write_u32_slice(&mut self, values: &[u32]) -> Result<()> {
        self.write_len(values.len(), MAX_ARRAY_LEN)?;
        values.iter().try_for_each(|&v| self.write_u32(v))
    }

    pub fn write_f32_slice(&mut self, values: &[f32]) -> Result<()> {
        self.write_len(values.len(), MAX_ARRAY_LEN)?;
        values.iter().try_for_each(|&v| self.write_f32(v))
    }

    pub fn write_bool_slice(&mut self, values: &[bool]) -> Result<()> {
        self.write_len(values.len(), MAX_ARRAY_LEN)?;
        values.iter().try_for_each(|&v| self.write_bool(v))
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Source of model bytes.
///
/// Every read that runs out of input fails with [`Error::CorruptModel`].
pub struct ModelReader<'a> {
    inner: &'a mut dyn Read,
}

impl<'a> ModelReader<'a> {
    pub fn new(inner: &'a mut dyn Read) -> Self {
        Self { inner }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(Error::from_read)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::corrupt(format!("invalid boolean byte {other:#04x}"))),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    pub fn read_len(&mut self, limit: usize) -> Result<usize> {
        let len = self.read_u32()? as usize;
        if len > limit {
            return Err(Error::corrupt(format!("length {len} exceeds limit {limit}")));
        }
        Ok(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len(MAX_STRING_LEN)?;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| Error::corrupt("string is not valid UTF-8"))
    }

    /// Read `len` raw bytes without trusting `len` for the allocation size.
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let taken = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut out)
            .map_err(Error::from_read)?;
        if taken != len {
            return Err(Error::corrupt(format!(
                "block truncated: expected {len} bytes, got {taken}"
            )));
        }
        Ok(out)
    }

    fn read_seq<T>(&mut self, mut read_one: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let len = self.read_len(MAX_ARRAY_LEN)?;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(read_one(self)?);
        }
        Ok(out)
    }

    pub fn read_u32_vec(&mut self) -> Result<Vec<u32>> {
        self.read_seq(Self::read_u32)
    }

    pub fn read_f32_vec(&mut self) -> Result<Vec<f32>> {
        self.read_seq(Self::read_f32)
    }

    pub fn read_bool_vec(&mut self) -> Result<Vec<bool>> {
        self.read_seq(Self::read_bool)
    }

    /// Fails unless the underlying source is exhausted.
    pub fn expect_end(&mut self) -> Result<()> {
        let mut probe = [0u8; 1];
        match self.inner.read(&mut probe) {
            Ok(0) => Ok(()),
            Ok(_) => Err(Error::corrupt("trailing bytes after model block")),
            Err(e) => Err(Error::from_read(e)),
        }
    }
}

// ============================================================================
// Header
// ============================================================================

/// Header preceding every persisted model block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHeader {
    pub signature: [u8; 8],
    pub written: u32,
    pub readable: u32,
    pub can_read_back: u32,
    pub loader_signature: String,
}

impl ModelHeader {
    /// Header stamped with the current version of `info`.
    pub fn current(info: &VersionInfo) -> Self {
        Self::stamped(info, info.written)
    }

    /// Header stamped with an older `version` of the same model kind.
    pub fn stamped(info: &VersionInfo, version: u32) -> Self {
        Self {
            signature: info.signature,
            written: version,
            readable: info.readable.min(version),
            can_read_back: info.can_read_back.min(version),
            loader_signature: info.loader_signature.to_string(),
        }
    }

    pub fn write(&self, writer: &mut ModelWriter<'_>) -> Result<()> {
        writer.write_bytes(&self.signature)?;
        writer.write_u32(self.written)?;
        writer.write_u32(self.readable)?;
        writer.write_u32(self.can_read_back)?;
        writer.write_string(&self.loader_signature)
    }

    /// Read a header of unknown kind. Only the internal version ordering is
    /// checked; use [`check_against`](Self::check_against) before decoding.
    pub fn read(reader: &mut ModelReader<'_>) -> Result<Self> {
        let signature = reader.read_array::<8>()?;
        let (written, readable, can_read_back) = read_versions(reader)?;
        let loader_signature = reader.read_string()?;
        Ok(Self {
            signature,
            written,
            readable,
            can_read_back,
            loader_signature,
        })
    }

    /// Read a header that must belong to `info`, failing at the first field
    /// that disagrees: signature, then version range, then loader key.
    pub fn read_expecting(reader: &mut ModelReader<'_>, info: &VersionInfo) -> Result<Self> {
        let signature = reader.read_array::<8>()?;
        check_signature(&signature, info)?;
        let (written, readable, can_read_back) = read_versions(reader)?;
        negotiate(written, info)?;
        let loader_signature = reader.read_string()?;
        check_loader(&loader_signature, info)?;
        Ok(Self {
            signature,
            written,
            readable,
            can_read_back,
            loader_signature,
        })
    }

    /// Validate an already-read header against `info`.
    pub fn check_against(&self, info: &VersionInfo) -> Result<()> {
        check_signature(&self.signature, info)?;
        negotiate(self.written, info)?;
        check_loader(&self.loader_signature, info)
    }
}

fn read_versions(reader: &mut ModelReader<'_>) -> Result<(u32, u32, u32)> {
    let written = reader.read_u32()?;
    let readable = reader.read_u32()?;
    let can_read_back = reader.read_u32()?;
    if !(can_read_back <= readable && readable <= written) {
        return Err(Error::corrupt(format!(
            "inconsistent version stamp: written {written:#010x}, readable {readable:#010x}, \
             can read back {can_read_back:#010x}"
        )));
    }
    Ok((written, readable, can_read_back))
}

fn check_signature(signature: &[u8; 8], info: &VersionInfo) -> Result<()> {
    if signature != &info.signature {
        return Err(Error::corrupt(format!(
            "model signature mismatch: expected \"{}\", found \"{}\"",
            info.signature_str(),
            render_signature(signature)
        )));
    }
    Ok(())
}

fn check_loader(loader_signature: &str, info: &VersionInfo) -> Result<()> {
    if loader_signature != info.loader_signature {
        return Err(Error::corrupt(format!(
            "loader signature mismatch: expected {:?}, found {loader_signature:?}",
            info.loader_signature
        )));
    }
    Ok(())
}
