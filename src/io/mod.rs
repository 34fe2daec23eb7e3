//! Versioned binary persistence.
//!
//! Every persisted object is a *block*: a [`ModelHeader`] followed by a body
//! whose layout is owned by the model kind. Blocks nest: a model may embed a
//! sub-model as a length-prefixed block, decoded through a [`LoaderRegistry`]
//! keyed by the sub-model's own loader signature.
//!
//! - [`version`]: version descriptors, negotiation and per-field gates
//! - [`binary`]: little-endian primitives and the header
//! - [`registry`]: keyed decoders for nested blocks

pub mod binary;
pub mod registry;
pub mod version;

use std::io::{Read, Write};

pub use binary::{ModelHeader, ModelReader, ModelWriter};
pub use registry::{LoadFn, LoaderEntry, LoaderRegistry};
pub use version::{can_load, negotiate, FieldGate, VersionInfo};

use crate::error::Result;
use crate::model::CalibratedModel;

/// An object that can be written as a versioned block.
pub trait Persist {
    /// Version descriptor of this model kind.
    fn version_info(&self) -> &'static VersionInfo;

    /// Write the body (everything after the header) in the layout of
    /// `version`, which is always within the negotiable range.
    fn write_body(&self, writer: &mut ModelWriter<'_>, version: u32) -> Result<()>;
}

/// Write `model` as a block stamped with its current version.
pub fn write_block<P: Persist + ?Sized>(writer: &mut ModelWriter<'_>, model: &P) -> Result<()> {
    let info = model.version_info();
    ModelHeader::current(info).write(writer)?;
    model.write_body(writer, info.written)
}

/// Write `model` as a length-prefixed nested block.
pub fn write_nested<P: Persist + ?Sized>(writer: &mut ModelWriter<'_>, model: &P) -> Result<()> {
    let mut block = Vec::new();
    write_block(&mut ModelWriter::new(&mut block), model)?;
    writer.write_len(block.len(), binary::MAX_ARRAY_LEN)?;
    writer.write_bytes(&block)
}

/// Save a model in the current format.
pub fn save<W: Write>(model: &CalibratedModel, sink: W) -> Result<()> {
    model.save(sink)
}

/// Load a model, resolving any nested calibrator through the process-wide
/// calibrator registry.
pub fn load<R: Read>(source: R) -> Result<CalibratedModel> {
    CalibratedModel::load(source)
}
